pub mod auth;
pub mod firestore;
pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Timestamp(DateTime<Utc>),
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(v)
    }
}

/// Whole numbers are stored as integers, everything else as doubles.
impl From<Decimal> for FieldValue {
    fn from(v: Decimal) -> Self {
        if v.fract().is_zero() {
            if let Some(i) = v.to_i64() {
                return FieldValue::Integer(i);
            }
        }
        v.to_f64().map(FieldValue::Double).unwrap_or(FieldValue::Null)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

pub type Document = BTreeMap<String, FieldValue>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store auth failed: {0}")]
    Auth(String),
    #[error("store request to {target} failed: {source}")]
    Transport {
        target: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("store rejected write to {target}: status={status} body_snippet={body}")]
    Rejected {
        target: String,
        status: u16,
        body: String,
    },
    #[error("document {0} already exists")]
    AlreadyExists(String),
    #[error("unexpected store response: {0}")]
    Protocol(String),
}

/// Document store with merge-upsert and append-only semantics.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Merge-upserts every `(doc_id, fields)` pair atomically. Fields not named
    /// in a document are left untouched on the stored copy.
    async fn commit_merge(
        &self,
        collection: &str,
        docs: Vec<(String, Document)>,
    ) -> Result<(), StoreError>;

    /// Creates a new uniquely-keyed document and returns its id. Never
    /// overwrites.
    async fn append(&self, collection: &str, doc: Document) -> Result<String, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn decimal_encoding() {
        assert_eq!(FieldValue::from(dec!(53)), FieldValue::Integer(53));
        assert_eq!(FieldValue::from(dec!(53.00)), FieldValue::Integer(53));
        assert_eq!(FieldValue::from(dec!(-2)), FieldValue::Integer(-2));
        assert_eq!(FieldValue::from(dec!(0.5)), FieldValue::Double(0.5));
        assert_eq!(FieldValue::from(None::<Decimal>), FieldValue::Null);
        assert_eq!(FieldValue::from(Some(dec!(7))), FieldValue::Integer(7));
    }
}
