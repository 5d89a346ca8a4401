pub mod market_data;
pub mod signer;
pub mod types;

pub use market_data::{FetchOptions, KalshiMarketData};
pub use signer::{SignError, Signer};
