use std::time::Duration;

use log::{info, warn};
use reqwest::Method;
use serde_json::Value;

use crate::error::AuthError;
use crate::util;

use super::signing::{Credentials, signed_query};
use super::{SessionProvisioner, SessionToken};

const USER_DATA_STREAM_PATH: &str = "/api/v3/userDataStream";
const API_KEY_HEADER: &str = "X-MEXC-APIKEY";

/// MEXC spot user-data-stream (listen key) provisioner.
///
/// REST:
/// - POST   /api/v3/userDataStream            → create
/// - PUT    /api/v3/userDataStream?listenKey= → keep alive
/// - DELETE /api/v3/userDataStream?listenKey= → delete
///
/// Every request carries `timestamp` + `signature` query params and
/// the API key header. Listen keys expire 60 minutes after creation
/// or the last keep-alive.
pub struct MexcUserDataStream {
    client: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    timeout: Duration,
}

impl MexcUserDataStream {
    pub fn new(
        base_url: String,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder().build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            timeout,
        })
    }

    /// Signs, sends and decodes one request.
    ///
    /// A 2xx with an empty body decodes to `Value::Null`.
    async fn send(&self, method: Method, params: &[(&str, &str)]) -> Result<Value, AuthError> {
        let query = signed_query(&self.credentials, util::now_ms(), params)?;
        let url = format!("{}{}?{}", self.base_url, USER_DATA_STREAM_PATH, query);

        let request = async {
            let response = self
                .client
                .request(method, &url)
                .header(API_KEY_HEADER, &self.credentials.api_key)
                .send()
                .await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, AuthError>((status, body))
        };

        let (status, body) = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| AuthError::Timeout(self.timeout.as_secs()))??;

        if !status.is_success() {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).map_err(|e| AuthError::MalformedResponse(e.to_string()))
    }
}

fn listen_key(body: &Value) -> Option<&str> {
    body.get("listenKey")
        .and_then(Value::as_str)
        .filter(|k| !k.is_empty())
}

#[async_trait::async_trait]
impl SessionProvisioner for MexcUserDataStream {
    async fn acquire(&self) -> Result<SessionToken, AuthError> {
        let body = self.send(Method::POST, &[]).await?;

        let key = listen_key(&body)
            .ok_or_else(|| AuthError::MalformedResponse(format!("no listenKey in {}", body)))?;

        let token = SessionToken::new(key);
        info!("[mexc] listen key created: {}", token.redacted());
        Ok(token)
    }

    async fn renew(&self, token: &SessionToken) -> Result<SessionToken, AuthError> {
        let body = self
            .send(Method::PUT, &[("listenKey", token.as_str())])
            .await?;

        // The keep-alive answer echoes the key; fall back to ours if not.
        let renewed = match listen_key(&body) {
            Some(key) => SessionToken::new(key),
            None => token.duplicate(),
        };

        info!("[mexc] listen key kept alive: {}", renewed.redacted());
        Ok(renewed)
    }

    async fn revoke(&self, token: SessionToken) {
        match self
            .send(Method::DELETE, &[("listenKey", token.as_str())])
            .await
        {
            Ok(_) => info!("[mexc] listen key deleted: {}", token.redacted()),
            Err(e) => warn!("[mexc] failed to delete listen key {}: {}", token.redacted(), e),
        }
    }
}
