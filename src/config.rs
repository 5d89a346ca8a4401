use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::kalshi::{FetchOptions, Signer};
use crate::store::auth::ServiceAccount;
use crate::store::firestore::DEFAULT_FIRESTORE_URL;
use crate::types::FetchStrategy;

pub const DEFAULT_BASE_URL: &str = "https://api.elections.kalshi.com/trade-api/v2";

/// Raw environment settings (`KALSHI_API_KEY_ID` → `kalshi_api_key_id`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub kalshi_api_key_id: Option<String>,
    pub kalshi_private_key_pem: Option<String>,
    pub kalshi_base_url: String,

    pub market_group: String,
    pub fetch_strategy: String,

    pub min_move: String,
    pub poll_interval: f64,

    pub firebase_service_account_json: Option<String>,
    pub firestore_base_url: String,
    pub snapshot_collection: String,
    pub movements_collection: String,

    pub http_timeout_sec: u64,
    pub store_timeout_sec: u64,
    pub member_fetch_concurrency: usize,
    pub prefix_page_limit: usize,
    pub prefix_max_pages: usize,

    // Stats
    pub stats_log_sec: u64,
    pub stats_jsonl_path: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::load(config::Environment::default())
    }

    fn load(env: config::Environment) -> Result<Self> {
        let c = config::Config::builder()
            .set_default("kalshi_base_url", DEFAULT_BASE_URL)?
            .set_default("market_group", "KXNCAAFPLAYOFF-25")?
            .set_default("fetch_strategy", "event")?
            .set_default("min_move", "0.5")?
            .set_default("poll_interval", 5.0)?
            .set_default("firestore_base_url", DEFAULT_FIRESTORE_URL)?
            .set_default("snapshot_collection", "cfp_markets")?
            .set_default("movements_collection", "cfp_movers")?
            .set_default("http_timeout_sec", 10)?
            .set_default("store_timeout_sec", 10)?
            .set_default("member_fetch_concurrency", 4)?
            .set_default("prefix_page_limit", 200)?
            .set_default("prefix_max_pages", 50)?
            .set_default("stats_log_sec", 60)?
            .add_source(env)
            .build()?;
        Ok(c.try_deserialize()?)
    }
}

/// Validated configuration. Building one proves the credentials are usable.
#[derive(Debug)]
pub struct AppConfig {
    pub api_key_id: String,
    pub signer: Arc<Signer>,
    pub base_url: String,
    pub strategy: FetchStrategy,
    pub threshold: Decimal,
    pub poll_interval: Duration,

    pub service_account: ServiceAccount,
    pub firestore_base_url: String,
    pub snapshot_collection: String,
    pub movements_collection: String,
    pub store_timeout: Duration,

    pub fetch: FetchOptions,

    pub stats_log_sec: u64,
    pub stats_jsonl_path: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::from_settings(Settings::from_env()?)
    }

    pub fn from_settings(s: Settings) -> Result<Self> {
        let api_key_id = required("KALSHI_API_KEY_ID", s.kalshi_api_key_id)?;
        let pem = required("KALSHI_PRIVATE_KEY_PEM", s.kalshi_private_key_pem)?;
        let sa_json = required("FIREBASE_SERVICE_ACCOUNT_JSON", s.firebase_service_account_json)?;

        let signer = Signer::from_pem(&pem).context("KALSHI_PRIVATE_KEY_PEM")?;
        signer
            .sign("GET", "/")
            .context("KALSHI_PRIVATE_KEY_PEM failed a trial signature")?;

        let service_account =
            ServiceAccount::from_json(&sa_json).context("FIREBASE_SERVICE_ACCOUNT_JSON")?;

        let strategy = parse_strategy(&s.fetch_strategy, &s.market_group)?;
        let threshold = parse_threshold(&s.min_move)?;

        anyhow::ensure!(
            s.poll_interval.is_finite() && s.poll_interval > 0.0,
            "POLL_INTERVAL must be a positive number of seconds, got {}",
            s.poll_interval
        );
        let poll_interval =
            Duration::try_from_secs_f64(s.poll_interval).context("POLL_INTERVAL")?;
        anyhow::ensure!(s.http_timeout_sec > 0, "HTTP_TIMEOUT_SEC must be positive");
        anyhow::ensure!(s.store_timeout_sec > 0, "STORE_TIMEOUT_SEC must be positive");

        Ok(Self {
            api_key_id,
            signer: Arc::new(signer),
            base_url: s.kalshi_base_url.trim().to_string(),
            strategy,
            threshold,
            poll_interval,
            service_account,
            firestore_base_url: s.firestore_base_url.trim().to_string(),
            snapshot_collection: s.snapshot_collection,
            movements_collection: s.movements_collection,
            store_timeout: Duration::from_secs(s.store_timeout_sec),
            fetch: FetchOptions {
                timeout: Duration::from_secs(s.http_timeout_sec),
                member_concurrency: s.member_fetch_concurrency,
                page_limit: s.prefix_page_limit,
                max_pages: s.prefix_max_pages,
            },
            stats_log_sec: s.stats_log_sec,
            stats_jsonl_path: s.stats_jsonl_path,
        })
    }

    /// Last four characters of the key id, for logs.
    pub fn api_key_suffix(&self) -> &str {
        let k = &self.api_key_id;
        match k.char_indices().rev().nth(3) {
            Some((i, _)) => &k[i..],
            None => k,
        }
    }
}

fn required(name: &str, v: Option<String>) -> Result<String> {
    v.map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .with_context(|| format!("{} not set", name))
}

fn parse_strategy(kind: &str, group: &str) -> Result<FetchStrategy> {
    let group = group.trim();
    anyhow::ensure!(!group.is_empty(), "MARKET_GROUP must not be empty");
    match kind.trim().to_ascii_lowercase().as_str() {
        "event" | "by_event" => Ok(FetchStrategy::ByEvent(group.to_string())),
        "prefix" | "by_prefix" => Ok(FetchStrategy::ByPrefix(group.to_string())),
        other => anyhow::bail!("FETCH_STRATEGY must be `event` or `prefix`, got `{}`", other),
    }
}

fn parse_threshold(raw: &str) -> Result<Decimal> {
    let raw = raw.trim();
    let t = Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .with_context(|| format!("MIN_MOVE is not a number: `{}`", raw))?;
    anyhow::ensure!(!t.is_sign_negative(), "MIN_MOVE must be non-negative, got {}", t);
    Ok(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{service_account_json, test_key};
    use rust_decimal_macros::dec;

    fn settings(extra: &[(&str, &str)]) -> Result<Settings> {
        let (_, pem) = test_key();
        let mut vars: config::Map<String, String> = config::Map::new();
        vars.insert("KALSHI_API_KEY_ID".into(), "abcd-1234-wxyz".into());
        vars.insert("KALSHI_PRIVATE_KEY_PEM".into(), pem.clone());
        vars.insert(
            "FIREBASE_SERVICE_ACCOUNT_JSON".into(),
            service_account_json("https://oauth2.googleapis.com/token"),
        );
        for (k, v) in extra {
            vars.insert(k.to_string(), v.to_string());
        }
        Settings::load(config::Environment::default().source(Some(vars)))
    }

    #[test]
    fn defaults_apply() {
        let cfg = AppConfig::from_settings(settings(&[]).unwrap()).unwrap();
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.strategy, FetchStrategy::ByEvent("KXNCAAFPLAYOFF-25".into()));
        assert_eq!(cfg.threshold, dec!(0.5));
        assert_eq!(cfg.poll_interval, Duration::from_secs(5));
        assert_eq!(cfg.snapshot_collection, "cfp_markets");
        assert_eq!(cfg.movements_collection, "cfp_movers");
        assert_eq!(cfg.fetch.timeout, Duration::from_secs(10));
        assert_eq!(cfg.service_account.project_id, "proj");
        assert_eq!(cfg.api_key_suffix(), "wxyz");
    }

    #[test]
    fn overrides_apply() {
        let cfg = AppConfig::from_settings(
            settings(&[
                ("FETCH_STRATEGY", "prefix"),
                ("MARKET_GROUP", "KXNBA"),
                ("MIN_MOVE", "2"),
                ("POLL_INTERVAL", "1.5"),
                ("PREFIX_PAGE_LIMIT", "100"),
            ])
            .unwrap(),
        )
        .unwrap();
        assert_eq!(cfg.strategy, FetchStrategy::ByPrefix("KXNBA".into()));
        assert_eq!(cfg.threshold, dec!(2));
        assert_eq!(cfg.poll_interval, Duration::from_millis(1500));
        assert_eq!(cfg.fetch.page_limit, 100);
    }

    #[test]
    fn missing_credentials_fail() {
        let mut s = settings(&[]).unwrap();
        s.kalshi_api_key_id = None;
        let err = AppConfig::from_settings(s).unwrap_err();
        assert!(err.to_string().contains("KALSHI_API_KEY_ID not set"));

        let mut s = settings(&[]).unwrap();
        s.firebase_service_account_json = Some("  ".into());
        assert!(AppConfig::from_settings(s).is_err());
    }

    #[test]
    fn malformed_credentials_fail() {
        let mut s = settings(&[]).unwrap();
        s.kalshi_private_key_pem = Some("not a key".into());
        assert!(AppConfig::from_settings(s).is_err());

        let mut s = settings(&[]).unwrap();
        s.firebase_service_account_json = Some("{broken".into());
        assert!(AppConfig::from_settings(s).is_err());
    }

    #[test]
    fn bad_numbers_fail() {
        for (k, v) in [
            ("MIN_MOVE", "-1"),
            ("MIN_MOVE", "lots"),
            ("POLL_INTERVAL", "0"),
            ("POLL_INTERVAL", "1e30"),
            ("FETCH_STRATEGY", "series"),
        ] {
            let s = settings(&[(k, v)]);
            let res = s.and_then(AppConfig::from_settings);
            assert!(res.is_err(), "{}={} should be rejected", k, v);
        }
    }

    #[test]
    fn zero_threshold_is_allowed() {
        assert_eq!(parse_threshold("0").unwrap(), Decimal::ZERO);
    }
}
