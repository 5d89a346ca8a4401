use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::pss::SigningKey;
use rsa::sha2::Sha256;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::RsaPrivateKey;

#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("invalid private key: {0}")]
    InvalidKey(String),
    #[error("signing failed: {0}")]
    Signing(String),
}

/// Auth material for one outbound request. Single use: the API rejects it once
/// the timestamp falls outside its clock-skew window.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub timestamp: String,
    pub signature: String,
}

/// RSA-PSS (SHA-256, MGF1-SHA-256) request signer.
pub struct Signer {
    signing_key: SigningKey<Sha256>,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer").finish_non_exhaustive()
    }
}

impl Signer {
    /// Accepts PKCS#8 or PKCS#1 PEM. Literal `\n` sequences (common when the
    /// key is pasted into a single env line) are unescaped first.
    pub fn from_pem(pem: &str) -> Result<Self, SignError> {
        let pem = pem.trim().replace("\\n", "\n");
        let key = RsaPrivateKey::from_pkcs8_pem(&pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(&pem))
            .map_err(|e| SignError::InvalidKey(e.to_string()))?;
        Ok(Self {
            signing_key: SigningKey::<Sha256>::new(key),
        })
    }

    pub fn sign(&self, method: &str, path: &str) -> Result<SignedHeaders, SignError> {
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let signature = self.sign_at(&timestamp, method, path)?;
        Ok(SignedHeaders { timestamp, signature })
    }

    /// Signs `timestamp + METHOD + path`; the path must not carry a query string.
    pub fn sign_at(&self, timestamp: &str, method: &str, path: &str) -> Result<String, SignError> {
        let message = format!("{}{}{}", timestamp, method.to_ascii_uppercase(), path);
        let mut rng = rand::thread_rng();
        let sig = self
            .signing_key
            .try_sign_with_rng(&mut rng, message.as_bytes())
            .map_err(|e| SignError::Signing(e.to_string()))?;
        Ok(BASE64.encode(sig.to_bytes()))
    }
}
