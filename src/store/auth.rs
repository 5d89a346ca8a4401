use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::StoreError;

const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The fields of a Google service-account key file that the store needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .finish_non_exhaustive()
    }
}

impl ServiceAccount {
    pub fn from_json(raw: &str) -> Result<Self> {
        let sa: ServiceAccount =
            serde_json::from_str(raw.trim()).context("parse service account json")?;
        anyhow::ensure!(!sa.project_id.trim().is_empty(), "service account has empty project_id");
        anyhow::ensure!(!sa.client_email.trim().is_empty(), "service account has empty client_email");
        Ok(sa)
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

struct CachedToken {
    token: String,
    refresh_at: DateTime<Utc>,
}

/// OAuth2 JWT-bearer token source for a service account. Tokens are cached and
/// refreshed a minute before they expire.
pub struct TokenProvider {
    account: ServiceAccount,
    key: EncodingKey,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(account: ServiceAccount, http: reqwest::Client) -> Result<Self> {
        let pem = account.private_key.replace("\\n", "\n");
        let key = EncodingKey::from_rsa_pem(pem.as_bytes())
            .context("parse service account private key")?;
        Ok(Self {
            account,
            key,
            http,
            cached: Mutex::new(None),
        })
    }

    pub fn project_id(&self) -> &str {
        &self.account.project_id
    }

    pub async fn access_token(&self) -> Result<String, StoreError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some(c) = cached.as_ref().filter(|c| now < c.refresh_at) {
            return Ok(c.token.clone());
        }

        let fresh = self.exchange(now).await?;
        let token = fresh.access_token.clone();
        *cached = Some(CachedToken {
            token: fresh.access_token,
            refresh_at: now + Duration::seconds((fresh.expires_in - 60).max(0)),
        });
        tracing::debug!(expires_in = fresh.expires_in, "store access token refreshed");
        Ok(token)
    }

    fn assertion(&self, now: DateTime<Utc>) -> Result<String, StoreError> {
        let claims = Claims {
            iss: &self.account.client_email,
            scope: DATASTORE_SCOPE,
            aud: &self.account.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + 3600,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.account.private_key_id.clone();
        jsonwebtoken::encode(&header, &claims, &self.key)
            .map_err(|e| StoreError::Auth(format!("sign assertion: {}", e)))
    }

    async fn exchange(&self, now: DateTime<Utc>) -> Result<TokenResponse, StoreError> {
        let assertion = self.assertion(now)?;
        let target = self.account.token_uri.clone();

        let resp = self
            .http
            .post(&target)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|source| StoreError::Transport {
                target: target.clone(),
                source,
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|source| StoreError::Transport {
            target: target.clone(),
            source,
        })?;
        if !status.is_success() {
            let snippet: String = body.chars().take(512).collect();
            return Err(StoreError::Auth(format!(
                "token exchange returned {}: {}",
                status, snippet
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| StoreError::Auth(format!("decode token response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::service_account_json;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn account(token_uri: &str) -> ServiceAccount {
        ServiceAccount::from_json(&service_account_json(token_uri)).unwrap()
    }

    #[test]
    fn rejects_incomplete_service_account() {
        assert!(ServiceAccount::from_json("{}").is_err());
        assert!(ServiceAccount::from_json("not json").is_err());
        assert!(ServiceAccount::from_json(
            r#"{"project_id":"","client_email":"a@b","private_key":"x"}"#
        )
        .is_err());
    }

    #[test]
    fn token_uri_defaults_to_google() {
        let sa = ServiceAccount::from_json(
            r#"{"project_id":"p","client_email":"a@b","private_key":"x"}"#,
        )
        .unwrap();
        assert_eq!(sa.token_uri, DEFAULT_TOKEN_URI);
    }

    #[test]
    fn bad_private_key_is_rejected() {
        let sa = ServiceAccount::from_json(
            r#"{"project_id":"p","client_email":"a@b","private_key":"nope"}"#,
        )
        .unwrap();
        assert!(TokenProvider::new(sa, reqwest::Client::new()).is_err());
    }

    #[tokio::test]
    async fn token_is_exchanged_once_and_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok-1",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tp = TokenProvider::new(account(&format!("{}/token", server.uri())), reqwest::Client::new())
            .unwrap();
        assert_eq!(tp.access_token().await.unwrap(), "tok-1");
        assert_eq!(tp.access_token().await.unwrap(), "tok-1");
    }

    #[tokio::test]
    async fn failed_exchange_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let tp = TokenProvider::new(account(&format!("{}/token", server.uri())), reqwest::Client::new())
            .unwrap();
        assert!(matches!(tp.access_token().await, Err(StoreError::Auth(_))));
    }
}
