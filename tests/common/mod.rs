use std::collections::VecDeque;
use std::sync::{Mutex, OnceLock};

use async_trait::async_trait;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use rust_decimal::Decimal;

use kalshi_mover_poller::source::{FetchError, QuoteSource};
use kalshi_mover_poller::types::InstrumentQuote;

pub fn test_key_pem() -> &'static str {
    static PEM: OnceLock<String> = OnceLock::new();
    PEM.get_or_init(|| {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).expect("generate rsa key");
        key.to_pkcs8_pem(LineEnding::LF)
            .expect("encode pem")
            .as_str()
            .to_owned()
    })
}

pub fn quote(ticker: &str, yes: Option<i64>) -> InstrumentQuote {
    InstrumentQuote {
        ticker: ticker.to_string(),
        display_name: ticker.to_string(),
        yes_price: yes.map(Decimal::from),
        no_price: yes.map(|y| Decimal::from(100 - y)),
        volume: None,
    }
}

pub fn fetch_failure() -> FetchError {
    FetchError::Status {
        endpoint: "/events/EVT".to_string(),
        status: 503,
        body: "unavailable".to_string(),
    }
}

/// Replays one scripted result per cycle.
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<Vec<InstrumentQuote>, FetchError>>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Vec<InstrumentQuote>, FetchError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }
}

#[async_trait]
impl QuoteSource for ScriptedSource {
    async fn fetch_quotes(&self) -> Result<Vec<InstrumentQuote>, FetchError> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(vec![]))
    }
}
