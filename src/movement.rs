use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::types::{InstrumentQuote, MovementRecord};

/// Last fetched price per ticker. Lives only in process memory, so a restart
/// makes every ticker "first seen" again.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PriceBaseline {
    prices: HashMap<String, Decimal>,
}

impl PriceBaseline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ticker: &str) -> Option<Decimal> {
        self.prices.get(ticker).copied()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, Decimal)> for PriceBaseline {
    fn from_iter<I: IntoIterator<Item = (S, Decimal)>>(iter: I) -> Self {
        Self {
            prices: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MovementDetector {
    threshold: Decimal,
    market_group: String,
}

impl MovementDetector {
    /// Negative thresholds are clamped to zero.
    pub fn new(threshold: Decimal, market_group: impl Into<String>) -> Self {
        Self {
            threshold: threshold.max(Decimal::ZERO),
            market_group: market_group.into(),
        }
    }

    pub fn threshold(&self) -> Decimal {
        self.threshold
    }

    /// Diffs `quotes` against `baseline`, advancing the baseline to the fetched
    /// prices. Every nonzero change is returned; `significant` marks those at or
    /// above the threshold. Quotes without a price leave their entry alone.
    pub fn detect(
        &self,
        quotes: &[InstrumentQuote],
        baseline: &mut PriceBaseline,
        now: DateTime<Utc>,
    ) -> Vec<MovementRecord> {
        let mut out = vec![];

        for q in quotes {
            let Some(current) = q.current_price() else { continue };

            let Some(previous) = baseline.get(&q.ticker) else {
                baseline.prices.insert(q.ticker.clone(), current);
                continue;
            };

            if current == previous {
                continue;
            }

            let Some(difference) = current.checked_sub(previous) else {
                tracing::warn!(
                    ticker = %q.ticker,
                    prev = %previous,
                    curr = %current,
                    "price difference out of range; no movement recorded"
                );
                baseline.prices.insert(q.ticker.clone(), current);
                continue;
            };
            out.push(MovementRecord {
                ticker: q.ticker.clone(),
                display_name: q.display_name.clone(),
                previous_price: previous,
                current_price: current,
                difference,
                significant: difference.abs() >= self.threshold,
                detected_at: now,
                market_group: self.market_group.clone(),
            });
            baseline.prices.insert(q.ticker.clone(), current);
        }

        out
    }
}
