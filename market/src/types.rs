//! Shared types for the market-session domain.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Market code returned when no detection rule matches.
pub const UNKNOWN_MARKET: &str = "UNKNOWN";

/// Trading-session state of a market at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Open,
    Closed,
    PreMarket,
    AfterHours,
}

impl SessionState {
    /// True only for regular trading hours; pre-market and after-hours
    /// count as off-session for TTL purposes.
    pub fn is_open(&self) -> bool {
        matches!(self, SessionState::Open)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Open => "Open",
            SessionState::Closed => "Closed",
            SessionState::PreMarket => "PreMarket",
            SessionState::AfterHours => "AfterHours",
        };
        f.write_str(s)
    }
}

impl FromStr for SessionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Open" => Ok(SessionState::Open),
            "Closed" => Ok(SessionState::Closed),
            "PreMarket" => Ok(SessionState::PreMarket),
            "AfterHours" => Ok(SessionState::AfterHours),
            other => Err(format!("invalid SessionState value: {}", other)),
        }
    }
}

/// Point-in-time session snapshot for one market.
///
/// Computed on demand and never persisted; it is cheap enough to recompute
/// per TTL decision, which avoids the session state itself going stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketSession {
    pub market: String,
    pub state: SessionState,
    pub as_of: DateTime<Utc>,
}

/// Trading hours for one market, all times in the market's local clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketHours {
    /// Offset of the market's local clock from UTC, in minutes.
    pub utc_offset_minutes: i32,

    /// Start of pre-market trading.
    pub pre_open: NaiveTime,

    /// Start of the regular session.
    pub open: NaiveTime,

    /// End of the regular session.
    pub close: NaiveTime,

    /// End of after-hours trading. Equal to `close` for markets without
    /// an after-hours session.
    pub after_close_end: NaiveTime,

    /// Trading weekdays, bit 0 = Monday .. bit 6 = Sunday.
    pub weekday_mask: u8,

    /// Full-day holiday closures (local dates).
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
}

/// Immutable, versioned table of trading hours per market.
///
/// Swapped wholesale on reload; never mutated in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HoursTable {
    #[serde(default)]
    pub version: u32,
    pub markets: HashMap<String, MarketHours>,
}

pub const WEEKDAYS_MON_FRI: u8 = 0b0001_1111;

impl HoursTable {
    /// Built-in table covering the markets the detector knows about.
    ///
    /// Offsets are standard-time offsets; operators that care about DST
    /// supply their own table through configuration.
    pub fn standard() -> Self {
        let mut markets = HashMap::new();

        markets.insert(
            "US".to_string(),
            MarketHours {
                utc_offset_minutes: -300,
                pre_open: time(4, 0),
                open: time(9, 30),
                close: time(16, 0),
                after_close_end: time(20, 0),
                weekday_mask: WEEKDAYS_MON_FRI,
                holidays: Vec::new(),
            },
        );

        markets.insert(
            "HK".to_string(),
            MarketHours {
                utc_offset_minutes: 480,
                pre_open: time(9, 0),
                open: time(9, 30),
                close: time(16, 0),
                after_close_end: time(16, 0),
                weekday_mask: WEEKDAYS_MON_FRI,
                holidays: Vec::new(),
            },
        );

        markets.insert(
            "CN".to_string(),
            MarketHours {
                utc_offset_minutes: 480,
                pre_open: time(9, 15),
                open: time(9, 30),
                close: time(15, 0),
                after_close_end: time(15, 0),
                weekday_mask: WEEKDAYS_MON_FRI,
                holidays: Vec::new(),
            },
        );

        markets.insert(
            "JP".to_string(),
            MarketHours {
                utc_offset_minutes: 540,
                pre_open: time(8, 0),
                open: time(9, 0),
                close: time(15, 0),
                after_close_end: time(15, 0),
                weekday_mask: WEEKDAYS_MON_FRI,
                holidays: Vec::new(),
            },
        );

        markets.insert(
            "UK".to_string(),
            MarketHours {
                utc_offset_minutes: 0,
                pre_open: time(7, 0),
                open: time(8, 0),
                close: time(16, 30),
                after_close_end: time(17, 0),
                weekday_mask: WEEKDAYS_MON_FRI,
                holidays: Vec::new(),
            },
        );

        Self {
            version: 1,
            markets,
        }
    }
}

fn time(h: u32, m: u32) -> NaiveTime {
    // Only called with in-range literals.
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or_default()
}
