use rust_decimal::Decimal;
use serde::de::Deserializer;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::str::FromStr;

use crate::types::InstrumentQuote;

fn string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// `GET /events/{event_ticker}`
///
/// Member markets show up either nested under `event.markets` (as bare tickers)
/// or at the top level (as full market objects) depending on API version.
#[derive(Debug, Deserialize)]
pub struct EventResponse {
    #[serde(default)]
    pub event: Option<EventBody>,
    #[serde(default)]
    pub markets: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
pub struct EventBody {
    #[serde(default)]
    pub markets: Option<Vec<Value>>,
}

impl EventResponse {
    /// Member tickers in listing order, duplicates removed. `None` when neither
    /// list is present.
    pub fn member_tickers(&self) -> Option<Vec<String>> {
        let entries = self
            .event
            .as_ref()
            .and_then(|e| e.markets.as_ref())
            .or(self.markets.as_ref())?;

        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let ticker = match entry {
                Value::String(s) => Some(s.as_str()),
                Value::Object(m) => m.get("ticker").and_then(Value::as_str),
                _ => None,
            };
            match ticker.map(str::trim).filter(|t| !t.is_empty()) {
                Some(t) if seen.insert(t.to_string()) => out.push(t.to_string()),
                Some(_) => {}
                None => tracing::debug!(entry = %entry, "skipping event member without ticker"),
            }
        }
        Some(out)
    }
}

/// `GET /markets/{ticker}`
#[derive(Debug, Deserialize)]
pub struct MarketResponse {
    #[serde(default)]
    pub market: Option<Value>,
}

/// `GET /markets?limit=..&cursor=..`
#[derive(Debug, Deserialize)]
pub struct MarketsPage {
    #[serde(default)]
    pub markets: Option<Vec<Value>>,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub cursor: String,
}

/// Normalizes one raw market entry. Entries that are not objects or carry no
/// string `ticker` are rejected.
pub fn parse_quote(entry: &Value) -> Option<InstrumentQuote> {
    let obj = entry.as_object()?;
    let ticker = obj
        .get("ticker")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())?
        .to_string();

    let display_name = obj
        .get("title")
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| ticker.clone());

    Some(InstrumentQuote {
        display_name,
        yes_price: number_field(obj, "yes_price"),
        no_price: number_field(obj, "no_price"),
        volume: number_field(obj, "volume"),
        ticker,
    })
}

fn number_field(obj: &Map<String, Value>, key: &str) -> Option<Decimal> {
    match obj.get(key)? {
        Value::Number(n) => parse_dec(&n.to_string()),
        Value::String(s) => parse_dec(s.trim()),
        _ => None,
    }
}

fn parse_dec(s: &str) -> Option<Decimal> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn parses_full_entry() {
        let q = parse_quote(&json!({
            "ticker": "KXNCAAFPLAYOFF-25-OSU",
            "title": "Ohio State",
            "yes_price": 53,
            "no_price": 47,
            "volume": 12034
        }))
        .unwrap();
        assert_eq!(q.ticker, "KXNCAAFPLAYOFF-25-OSU");
        assert_eq!(q.display_name, "Ohio State");
        assert_eq!(q.yes_price, Some(dec!(53)));
        assert_eq!(q.no_price, Some(dec!(47)));
        assert_eq!(q.volume, Some(dec!(12034)));
    }

    #[test]
    fn display_name_falls_back_to_ticker() {
        let q = parse_quote(&json!({"ticker": "A", "yes_price": 10.5})).unwrap();
        assert_eq!(q.display_name, "A");
        assert_eq!(q.yes_price, Some(dec!(10.5)));
        assert_eq!(q.no_price, None);
        assert_eq!(q.volume, None);
    }

    #[test]
    fn rejects_entries_without_ticker() {
        assert!(parse_quote(&json!({"title": "no ticker", "yes_price": 5})).is_none());
        assert!(parse_quote(&json!({"ticker": "", "yes_price": 5})).is_none());
        assert!(parse_quote(&json!({"ticker": 42})).is_none());
        assert!(parse_quote(&json!("A")).is_none());
        assert!(parse_quote(&Value::Null).is_none());
    }

    #[test]
    fn null_and_garbage_prices_are_absent() {
        let q = parse_quote(&json!({"ticker": "A", "yes_price": null, "no_price": "abc"})).unwrap();
        assert_eq!(q.yes_price, None);
        assert_eq!(q.no_price, None);
    }

    #[test]
    fn event_members_prefer_nested_list() {
        let resp: EventResponse = serde_json::from_value(json!({
            "event": {"markets": ["A", "B", "A", "", 7]},
            "markets": [{"ticker": "Z"}]
        }))
        .unwrap();
        assert_eq!(resp.member_tickers().unwrap(), vec!["A", "B"]);
    }

    #[test]
    fn event_members_fall_back_to_top_level_objects() {
        let resp: EventResponse = serde_json::from_value(json!({
            "event": {"event_ticker": "E"},
            "markets": [{"ticker": "X"}, {"title": "missing"}, {"ticker": "Y"}]
        }))
        .unwrap();
        assert_eq!(resp.member_tickers().unwrap(), vec!["X", "Y"]);
    }

    #[test]
    fn event_without_members_is_none() {
        let resp: EventResponse = serde_json::from_value(json!({"event": {}})).unwrap();
        assert!(resp.member_tickers().is_none());
    }

    #[test]
    fn markets_page_null_cursor() {
        let page: MarketsPage =
            serde_json::from_value(json!({"markets": [], "cursor": null})).unwrap();
        assert!(page.cursor.is_empty());
        assert_eq!(page.markets.unwrap().len(), 0);
    }
}
