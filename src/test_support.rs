use std::sync::OnceLock;

use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;

/// Process-wide throwaway RSA key and its PKCS#8 PEM. Generated once; 2048 bits
/// is the minimum jsonwebtoken accepts for RS256.
pub fn test_key() -> &'static (RsaPrivateKey, String) {
    static KEY: OnceLock<(RsaPrivateKey, String)> = OnceLock::new();
    KEY.get_or_init(|| {
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, 2048).expect("generate rsa key");
        let pem = key
            .to_pkcs8_pem(LineEnding::LF)
            .expect("encode pem")
            .as_str()
            .to_owned();
        (key, pem)
    })
}

/// Service-account key JSON backed by [`test_key`].
pub fn service_account_json(token_uri: &str) -> String {
    let (_, pem) = test_key();
    serde_json::json!({
        "type": "service_account",
        "project_id": "proj",
        "client_email": "poller@proj.iam.gserviceaccount.com",
        "private_key": pem,
        "private_key_id": "kid-1",
        "token_uri": token_uri,
    })
    .to_string()
}
