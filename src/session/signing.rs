//! HMAC-SHA256 request signing for the user-data-stream endpoints.
//!
//! The exchange signs the raw query string:
//! `signature = hex(HMAC-SHA256(secret, query))`, lower-case.
//! Secrets are never logged or included in error messages.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// API key + secret pair.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    secret_key: String,
}

impl Credentials {
    pub fn new(api_key: String, secret_key: String) -> Result<Self, AuthError> {
        if api_key.is_empty() {
            return Err(AuthError::MissingCredentials("api key is empty".into()));
        }
        if secret_key.is_empty() {
            return Err(AuthError::MissingCredentials("secret key is empty".into()));
        }
        Ok(Self { api_key, secret_key })
    }

    /// Reads both halves from the named environment variables.
    pub fn from_env(api_key_var: &str, secret_key_var: &str) -> Result<Self, AuthError> {
        let api_key = std::env::var(api_key_var)
            .map_err(|_| AuthError::MissingCredentials(api_key_var.to_string()))?;
        let secret_key = std::env::var(secret_key_var)
            .map_err(|_| AuthError::MissingCredentials(secret_key_var.to_string()))?;
        Self::new(api_key, secret_key)
    }

    pub fn sign(&self, query: &str) -> Result<String, AuthError> {
        sign_query(&self.secret_key, query)
    }
}

// Keep the secret out of `{:?}` output.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

pub fn sign_query(secret: &str, query: &str) -> Result<String, AuthError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AuthError::Signing(format!("HMAC setup failed: {e}")))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Canonical query: `timestamp=<ms>` followed by the extra params in
/// the given order. Values are sent verbatim (listen keys and
/// timestamps are URL-safe).
pub fn canonical_query(timestamp_ms: i64, params: &[(&str, &str)]) -> String {
    let mut query = format!("timestamp={}", timestamp_ms);
    for (k, v) in params {
        query.push('&');
        query.push_str(k);
        query.push('=');
        query.push_str(v);
    }
    query
}

/// Canonical query with `&signature=<hex>` appended.
pub fn signed_query(
    credentials: &Credentials,
    timestamp_ms: i64,
    params: &[(&str, &str)],
) -> Result<String, AuthError> {
    let query = canonical_query(timestamp_ms, params);
    let signature = credentials.sign(&query)?;
    Ok(format!("{}&signature={}", query, signature))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector_from_binance_style_docs() {
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";

        assert_eq!(
            sign_query(secret, query).unwrap(),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn canonical_query_puts_timestamp_first() {
        assert_eq!(canonical_query(1000, &[]), "timestamp=1000");
        assert_eq!(
            canonical_query(1000, &[("listenKey", "abc")]),
            "timestamp=1000&listenKey=abc"
        );
    }

    #[test]
    fn signed_query_appends_signature_of_canonical_part() {
        let creds = Credentials::new("key".into(), "secret".into()).unwrap();
        let signed = signed_query(&creds, 1000, &[("listenKey", "abc")]).unwrap();

        let (query, signature) = signed.split_once("&signature=").unwrap();
        assert_eq!(query, "timestamp=1000&listenKey=abc");
        assert_eq!(signature, sign_query("secret", query).unwrap());
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn empty_credentials_are_rejected() {
        assert!(Credentials::new(String::new(), "s".into()).is_err());
        assert!(Credentials::new("k".into(), String::new()).is_err());
    }

    #[test]
    fn debug_output_redacts_secret() {
        let creds = Credentials::new("key".into(), "top-secret".into()).unwrap();
        let out = format!("{:?}", creds);
        assert!(out.contains("key"));
        assert!(!out.contains("top-secret"));
    }
}
