use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;

use super::signer::Signer;
use super::types::{parse_quote, EventResponse, MarketResponse, MarketsPage};
use crate::source::{FetchError, QuoteSource};
use crate::types::{FetchStrategy, InstrumentQuote};

const HDR_ACCESS_KEY: &str = "KALSHI-ACCESS-KEY";
const HDR_ACCESS_TIMESTAMP: &str = "KALSHI-ACCESS-TIMESTAMP";
const HDR_ACCESS_SIGNATURE: &str = "KALSHI-ACCESS-SIGNATURE";

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub member_concurrency: usize,
    pub page_limit: usize,
    pub max_pages: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            member_concurrency: 4,
            page_limit: 200,
            max_pages: 50,
        }
    }
}

/// Signed Kalshi REST client for one tracked market group.
pub struct KalshiMarketData {
    base_url: String,
    api_key_id: String,
    signer: Arc<Signer>,
    http: reqwest::Client,
    strategy: FetchStrategy,
    member_concurrency: usize,
    page_limit: usize,
    max_pages: usize,
}

impl KalshiMarketData {
    pub fn new(
        base_url: String,
        api_key_id: String,
        signer: Arc<Signer>,
        strategy: FetchStrategy,
        opts: FetchOptions,
    ) -> Result<Self> {
        Url::parse(&base_url).with_context(|| format!("invalid base url {}", base_url))?;

        let http = reqwest::Client::builder()
            .timeout(opts.timeout)
            .build()
            .context("build reqwest client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key_id,
            signer,
            http,
            strategy,
            member_concurrency: opts.member_concurrency.max(1),
            page_limit: opts.page_limit.max(1),
            max_pages: opts.max_pages.max(1),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let raw = format!("{}{}", self.base_url, endpoint);
        let mut url = Url::parse(&raw).map_err(|e| FetchError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }

        // Signed over the path only; the query string is not part of the message.
        let auth = self.signer.sign("GET", url.path())?;

        tracing::debug!(url = %url, "kalshi GET");

        let resp = self
            .http
            .get(url)
            .header(HDR_ACCESS_KEY, &self.api_key_id)
            .header(HDR_ACCESS_TIMESTAMP, &auth.timestamp)
            .header(HDR_ACCESS_SIGNATURE, &auth.signature)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|source| FetchError::Transport {
            endpoint: endpoint.to_string(),
            source,
        })?;

        if status != StatusCode::OK {
            return Err(FetchError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body: snippet(&body, 512),
            });
        }

        serde_json::from_str(&body).map_err(|e| FetchError::Decode {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
            body: snippet(&body, 512),
        })
    }

    /// `Ok(None)` when the market entry is malformed and was dropped.
    async fn fetch_market(&self, ticker: &str) -> Result<Option<InstrumentQuote>, FetchError> {
        let endpoint = format!("/markets/{}", ticker);
        let resp: MarketResponse = self.get_json(&endpoint, &[]).await?;
        let market = resp.market.ok_or(FetchError::MissingField {
            endpoint,
            field: "market",
        })?;
        Ok(parse_quote(&market))
    }

    async fn fetch_by_event(&self, event_ticker: &str) -> Result<Vec<InstrumentQuote>, FetchError> {
        let endpoint = format!("/events/{}", event_ticker);
        let resp: EventResponse = self.get_json(&endpoint, &[]).await?;
        let tickers = resp.member_tickers().ok_or(FetchError::MissingField {
            endpoint,
            field: "markets",
        })?;

        tracing::debug!(
            event = %event_ticker,
            members = tickers.len(),
            conc = self.member_concurrency,
            "fetching event members"
        );

        // Ordered so the output follows the event's listing order.
        let results: Vec<(String, Result<Option<InstrumentQuote>, FetchError>)> =
            stream::iter(tickers.into_iter().map(|ticker| async move {
                let res = self.fetch_market(&ticker).await;
                (ticker, res)
            }))
            .buffered(self.member_concurrency)
            .collect()
            .await;

        let mut out = Vec::with_capacity(results.len());
        let mut dropped = 0usize;
        let mut failed = 0usize;
        for (ticker, res) in results {
            match res {
                Ok(Some(q)) => out.push(q),
                Ok(None) => dropped += 1,
                Err(e) => {
                    failed += 1;
                    tracing::warn!(ticker = %ticker, error = %e, "member fetch failed; skipping");
                }
            }
        }

        if dropped > 0 {
            tracing::debug!(dropped, "dropped malformed market entries");
        }
        if failed > 0 {
            tracing::warn!(failed, fetched = out.len(), "partial event fetch");
        }

        Ok(out)
    }

    async fn fetch_by_prefix(&self, prefix: &str) -> Result<Vec<InstrumentQuote>, FetchError> {
        let mut out: Vec<InstrumentQuote> = vec![];
        let mut dropped = 0usize;
        let mut cursor: Option<String> = None;

        for _ in 0..self.max_pages {
            let mut query = vec![("limit", self.page_limit.to_string())];
            if let Some(ref c) = cursor {
                query.push(("cursor", c.clone()));
            }

            let page: MarketsPage = self.get_json("/markets", &query).await?;
            let items = page.markets.ok_or(FetchError::MissingField {
                endpoint: "/markets".to_string(),
                field: "markets",
            })?;

            for item in &items {
                match parse_quote(item) {
                    Some(q) if q.ticker.starts_with(prefix) => out.push(q),
                    Some(_) => {}
                    None => dropped += 1,
                }
            }

            cursor = Some(page.cursor).filter(|c| !c.is_empty());
            if cursor.is_none() {
                break;
            }
        }

        if cursor.is_some() {
            tracing::warn!(
                max_pages = self.max_pages,
                matched = out.len(),
                "page budget exhausted before end of market listing"
            );
        }
        if dropped > 0 {
            tracing::debug!(dropped, "dropped malformed market entries");
        }

        Ok(out)
    }
}

#[async_trait]
impl QuoteSource for KalshiMarketData {
    async fn fetch_quotes(&self) -> Result<Vec<InstrumentQuote>, FetchError> {
        match &self.strategy {
            FetchStrategy::ByEvent(event) => self.fetch_by_event(event).await,
            FetchStrategy::ByPrefix(prefix) => self.fetch_by_prefix(prefix).await,
        }
    }
}

fn snippet(body: &str, max: usize) -> String {
    body.chars().take(max).collect()
}
