use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::store::{Document, DocumentStore, FieldValue};
use crate::types::{InstrumentQuote, MovementRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub snapshot_written: bool,
    pub movements_written: usize,
    pub movement_write_failures: usize,
}

/// Persists the per-ticker snapshot and the append-only movement log.
#[derive(Clone)]
pub struct SnapshotWriter {
    store: Arc<dyn DocumentStore>,
    snapshot_collection: String,
    movements_collection: String,
    market_group: String,
}

impl SnapshotWriter {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        snapshot_collection: impl Into<String>,
        movements_collection: impl Into<String>,
        market_group: impl Into<String>,
    ) -> Self {
        Self {
            store,
            snapshot_collection: snapshot_collection.into(),
            movements_collection: movements_collection.into(),
            market_group: market_group.into(),
        }
    }

    /// Snapshot first, then each movement on its own. Failures are logged and
    /// reported; nothing here is retried or rolled back.
    pub async fn persist(
        &self,
        quotes: &[InstrumentQuote],
        movements: &[MovementRecord],
        now: DateTime<Utc>,
    ) -> WriteReport {
        let mut report = WriteReport::default();

        let docs = self.snapshot_docs(quotes, now);
        let n = docs.len();
        match self.store.commit_merge(&self.snapshot_collection, docs).await {
            Ok(()) => report.snapshot_written = true,
            Err(e) => tracing::error!(
                collection = %self.snapshot_collection,
                docs = n,
                error = %e,
                "snapshot write failed"
            ),
        }

        for m in movements {
            match self.store.append(&self.movements_collection, movement_doc(m)).await {
                Ok(id) => {
                    report.movements_written += 1;
                    tracing::debug!(ticker = %m.ticker, doc_id = %id, "movement logged");
                }
                Err(e) => {
                    report.movement_write_failures += 1;
                    tracing::error!(
                        collection = %self.movements_collection,
                        ticker = %m.ticker,
                        error = %e,
                        "movement write failed"
                    );
                }
            }
        }

        report
    }

    /// One document per ticker. A ticker listed twice keeps its last quote.
    pub fn snapshot_docs(&self, quotes: &[InstrumentQuote], now: DateTime<Utc>) -> Vec<(String, Document)> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut out: Vec<(String, Document)> = Vec::with_capacity(quotes.len());

        for q in quotes {
            let doc = self.snapshot_doc(q, now);
            match index.get(q.ticker.as_str()) {
                Some(&i) => out[i].1 = doc,
                None => {
                    index.insert(q.ticker.as_str(), out.len());
                    out.push((q.ticker.clone(), doc));
                }
            }
        }
        out
    }

    fn snapshot_doc(&self, q: &InstrumentQuote, now: DateTime<Utc>) -> Document {
        let mut d = Document::new();
        d.insert("ticker".into(), q.ticker.as_str().into());
        d.insert("display_name".into(), q.display_name.as_str().into());
        d.insert("yes_price".into(), q.yes_price.into());
        d.insert("no_price".into(), q.no_price.into());
        d.insert("volume".into(), q.volume.into());
        d.insert("market_group".into(), self.market_group.as_str().into());
        d.insert("updated_at".into(), FieldValue::Timestamp(now));
        d
    }
}

fn movement_doc(m: &MovementRecord) -> Document {
    let mut d = Document::new();
    d.insert("ticker".into(), m.ticker.as_str().into());
    d.insert("display_name".into(), m.display_name.as_str().into());
    d.insert("previous_price".into(), m.previous_price.into());
    d.insert("current_price".into(), m.current_price.into());
    d.insert("difference".into(), m.difference.into());
    d.insert("significant".into(), m.significant.into());
    d.insert("detected_at".into(), m.detected_at.into());
    d.insert("market_group".into(), m.market_group.as_str().into());
    d
}
