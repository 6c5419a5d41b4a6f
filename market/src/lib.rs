//! Market-session domain: which market a symbol belongs to, and whether
//! that market is currently trading.
//!
//! Responsibilities:
//!   • Infer a market code from a raw symbol string (`MarketDetector`)
//!   • Report the trading-session state of a market at a point in time
//!     (`MarketCalendar`)
//!
//! Both are the *only* holders of their respective tables. Call sites must
//! route through them instead of keeping local copies of pattern rules or
//! trading hours.

pub mod calendar;
pub mod detector;
pub mod types;

pub use calendar::{CalendarError, MarketCalendar};
pub use detector::MarketDetector;
pub use types::{HoursTable, MarketHours, MarketSession, SessionState, UNKNOWN_MARKET};
