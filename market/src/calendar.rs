//! Trading-session calendar.
//!
//! Responsibilities:
//!   • Validate and hold the per-market trading-hours table
//!   • Answer "what session state is market X in at time T"
//!   • Atomically swap in a new table on reload (copy-on-write)
//!
//! Readers clone an `Arc` snapshot of the table, so a concurrent reload can
//! never expose a partially updated table.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Utc};
use parking_lot::RwLock;
use thiserror::Error;

use crate::types::{HoursTable, MarketHours, MarketSession, SessionState};

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("market {market}: open {open} is not before close {close}")]
    OpenNotBeforeClose {
        market: String,
        open: String,
        close: String,
    },

    #[error("market {market}: pre-open {pre_open} is after open {open}")]
    PreOpenAfterOpen {
        market: String,
        pre_open: String,
        open: String,
    },

    #[error("market {market}: after-hours end {end} is before close {close}")]
    AfterHoursBeforeClose {
        market: String,
        end: String,
        close: String,
    },

    #[error("market {market}: weekday mask {mask:#09b} is empty or out of range")]
    BadWeekdayMask { market: String, mask: u8 },

    #[error("market {market}: UTC offset {minutes} minutes is out of range")]
    BadUtcOffset { market: String, minutes: i32 },
}

/// Largest real-world zone offset is UTC+14.
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Session-state oracle over an immutable, swappable trading-hours table.
pub struct MarketCalendar {
    table: RwLock<Arc<HoursTable>>,
}

impl MarketCalendar {
    /// Build a calendar from a validated table. Invalid tables are a
    /// startup failure, not something to limp along with.
    pub fn new(table: HoursTable) -> Result<Self, CalendarError> {
        validate_table(&table)?;
        Ok(Self {
            table: RwLock::new(Arc::new(table)),
        })
    }

    /// Calendar over the built-in standard table.
    pub fn standard() -> Self {
        Self {
            // The built-in table is covered by tests; validation cannot fail.
            table: RwLock::new(Arc::new(HoursTable::standard())),
        }
    }

    /// Validate and atomically swap in a new table.
    ///
    /// Readers holding the previous snapshot keep it until they finish;
    /// nobody ever observes a half-replaced table.
    pub fn reload(&self, table: HoursTable) -> Result<(), CalendarError> {
        validate_table(&table)?;
        let version = table.version;
        *self.table.write() = Arc::new(table);
        tracing::info!(version, "trading-hours table reloaded");
        Ok(())
    }

    /// Point-in-time snapshot of the current table.
    pub fn snapshot(&self) -> Arc<HoursTable> {
        Arc::clone(&self.table.read())
    }

    /// Session state for `market` at `at`.
    ///
    /// Unknown markets resolve to Closed: strategies map Closed to their
    /// longer TTL, so the failure mode is staleness rather than hammering
    /// upstream with an over-fresh cache.
    pub fn session_state(&self, market: &str, at: DateTime<Utc>) -> MarketSession {
        let table = self.snapshot();

        let state = match table.markets.get(market) {
            Some(hours) => state_at(hours, at),
            None => {
                tracing::warn!(market, "unknown market, treating session as Closed");
                SessionState::Closed
            }
        };

        MarketSession {
            market: market.to_string(),
            state,
            as_of: at,
        }
    }
}

fn state_at(hours: &MarketHours, at: DateTime<Utc>) -> SessionState {
    let local = at + Duration::minutes(hours.utc_offset_minutes as i64);

    let weekday_bit = 1u8 << local.weekday().num_days_from_monday();
    if hours.weekday_mask & weekday_bit == 0 {
        return SessionState::Closed;
    }

    if hours.holidays.contains(&local.date_naive()) {
        return SessionState::Closed;
    }

    let t = local.time();
    if t >= hours.open && t < hours.close {
        SessionState::Open
    } else if t >= hours.pre_open && t < hours.open {
        SessionState::PreMarket
    } else if t >= hours.close && t < hours.after_close_end {
        SessionState::AfterHours
    } else {
        SessionState::Closed
    }
}

fn validate_table(table: &HoursTable) -> Result<(), CalendarError> {
    for (market, hours) in &table.markets {
        if hours.open >= hours.close {
            return Err(CalendarError::OpenNotBeforeClose {
                market: market.clone(),
                open: hours.open.to_string(),
                close: hours.close.to_string(),
            });
        }

        if hours.pre_open > hours.open {
            return Err(CalendarError::PreOpenAfterOpen {
                market: market.clone(),
                pre_open: hours.pre_open.to_string(),
                open: hours.open.to_string(),
            });
        }

        if hours.after_close_end < hours.close {
            return Err(CalendarError::AfterHoursBeforeClose {
                market: market.clone(),
                end: hours.after_close_end.to_string(),
                close: hours.close.to_string(),
            });
        }

        if hours.weekday_mask == 0 || hours.weekday_mask > 0b0111_1111 {
            return Err(CalendarError::BadWeekdayMask {
                market: market.clone(),
                mask: hours.weekday_mask,
            });
        }

        if hours.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(CalendarError::BadUtcOffset {
                market: market.clone(),
                minutes: hours.utc_offset_minutes,
            });
        }
    }

    Ok(())
}
