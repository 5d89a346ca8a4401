use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One instrument as quoted on the current fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentQuote {
    pub ticker: String,
    pub display_name: String,
    pub yes_price: Option<Decimal>,
    pub no_price: Option<Decimal>,
    pub volume: Option<Decimal>,
}

impl InstrumentQuote {
    /// Price tracked for movement detection.
    pub fn current_price(&self) -> Option<Decimal> {
        self.yes_price
    }
}

/// A detected change between two consecutive observed prices of one ticker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovementRecord {
    pub ticker: String,
    pub display_name: String,
    pub previous_price: Decimal,
    pub current_price: Decimal,
    pub difference: Decimal,
    pub significant: bool,
    pub detected_at: DateTime<Utc>,
    pub market_group: String,
}

impl MovementRecord {
    pub fn sample_line(&self) -> String {
        format!(
            "{}: {} → {} (diff={})",
            self.ticker, self.previous_price, self.current_price, self.difference
        )
    }
}

/// How the tracked instruments are selected upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStrategy {
    /// Resolve an event to its member tickers, then fetch each member.
    ByEvent(String),
    /// Scan the market listing and keep tickers starting with the prefix.
    ByPrefix(String),
}

impl FetchStrategy {
    pub fn market_group(&self) -> &str {
        match self {
            FetchStrategy::ByEvent(g) | FetchStrategy::ByPrefix(g) => g,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FetchStrategy::ByEvent(_) => "event",
            FetchStrategy::ByPrefix(_) => "prefix",
        }
    }
}
