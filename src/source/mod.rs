use async_trait::async_trait;

use crate::kalshi::signer::SignError;
use crate::types::InstrumentQuote;

/// Everything that can make one cycle's fetch fail. The poll loop treats every
/// variant the same way: no quotes this cycle, baseline untouched.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request signing failed: {0}")]
    Signing(#[from] SignError),
    #[error("invalid request url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("GET {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("GET {endpoint} non-200: status={status} body_snippet={body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("GET {endpoint} returned a non-JSON body: {reason} body_snippet={body}")]
    Decode {
        endpoint: String,
        reason: String,
        body: String,
    },
    #[error("GET {endpoint} response is missing `{field}`")]
    MissingField {
        endpoint: String,
        field: &'static str,
    },
}

/// Source of the current quotes for the tracked market group.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch_quotes(&self) -> Result<Vec<InstrumentQuote>, FetchError>;
}
