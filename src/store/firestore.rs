use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::StatusCode;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::auth::{ServiceAccount, TokenProvider};
use super::{Document, DocumentStore, FieldValue, StoreError};

pub const DEFAULT_FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";

/// Firestore's per-commit write limit.
const MAX_WRITES_PER_COMMIT: usize = 500;

/// Firestore REST client for the `(default)` database.
pub struct FirestoreStore {
    base_url: String,
    http: reqwest::Client,
    tokens: TokenProvider,
}

impl FirestoreStore {
    pub fn new(base_url: &str, account: ServiceAccount, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build reqwest client")?;
        let tokens = TokenProvider::new(account, http.clone())?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            tokens,
        })
    }

    pub fn project_id(&self) -> &str {
        self.tokens.project_id()
    }

    fn database_path(&self) -> String {
        format!("projects/{}/databases/(default)", self.tokens.project_id())
    }

    fn document_name(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/documents/{}/{}", self.database_path(), collection, doc_id)
    }

    async fn post(&self, url: String, body: &Value) -> Result<Value, StoreError> {
        let token = self.tokens.access_token().await?;
        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|source| StoreError::Transport {
                target: url.clone(),
                source,
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|source| StoreError::Transport {
            target: url.clone(),
            source,
        })?;

        if status == StatusCode::CONFLICT {
            return Err(StoreError::AlreadyExists(url));
        }
        if !status.is_success() {
            return Err(StoreError::Rejected {
                target: url,
                status: status.as_u16(),
                body: text.chars().take(512).collect(),
            });
        }

        serde_json::from_str(&text)
            .map_err(|e| StoreError::Protocol(format!("decode response from {}: {}", url, e)))
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn commit_merge(
        &self,
        collection: &str,
        docs: Vec<(String, Document)>,
    ) -> Result<(), StoreError> {
        if docs.is_empty() {
            return Ok(());
        }
        let url = format!("{}/{}/documents:commit", self.base_url, self.database_path());

        // Each commit is atomic; batches beyond the write limit land as
        // consecutive commits.
        for chunk in docs.chunks(MAX_WRITES_PER_COMMIT) {
            let writes: Vec<Value> = chunk
                .iter()
                .map(|(id, fields)| merge_write(&self.document_name(collection, id), fields))
                .collect();
            self.post(url.clone(), &json!({ "writes": writes })).await?;
        }

        tracing::debug!(collection, docs = docs.len(), "firestore commit ok");
        Ok(())
    }

    async fn append(&self, collection: &str, doc: Document) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let url = format!(
            "{}/{}/documents/{}?documentId={}",
            self.base_url,
            self.database_path(),
            collection,
            id
        );
        self.post(url, &json!({ "fields": encode_fields(&doc) })).await?;
        Ok(id)
    }
}

fn merge_write(name: &str, fields: &Document) -> Value {
    json!({
        "update": {
            "name": name,
            "fields": encode_fields(fields),
        },
        "updateMask": {
            "fieldPaths": fields.keys().collect::<Vec<_>>(),
        },
    })
}

fn encode_fields(doc: &Document) -> Value {
    let map: Map<String, Value> = doc
        .iter()
        .map(|(k, v)| (k.clone(), encode_value(v)))
        .collect();
    Value::Object(map)
}

fn encode_value(v: &FieldValue) -> Value {
    match v {
        FieldValue::Null => json!({ "nullValue": null }),
        FieldValue::Bool(b) => json!({ "booleanValue": b }),
        // int64 travels as a decimal string in the REST encoding.
        FieldValue::Integer(i) => json!({ "integerValue": i.to_string() }),
        FieldValue::Double(d) => json!({ "doubleValue": d }),
        FieldValue::String(s) => json!({ "stringValue": s }),
        FieldValue::Timestamp(t) => {
            json!({ "timestampValue": t.to_rfc3339_opts(SecondsFormat::Micros, true) })
        }
    }
}
