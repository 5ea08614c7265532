//! Session provisioning for private streams.
//!
//! Some exchanges scope a private WebSocket stream to a server-side
//! session token (a "listen key"). This module owns the three REST
//! operations on that token:
//! - `acquire`: create a fresh token
//! - `renew`:   extend its server-side expiry
//! - `revoke`:  delete it (best-effort)
//!
//! The listener runtime decides WHEN these happen; implementations
//! here only know HOW.

pub mod mexc;
pub mod signing;

use std::fmt;
use std::sync::Arc;

use crate::config::ListenerConfig;
use crate::error::AuthError;
use crate::exchanges::adapter::ExchangeAdapter;

use signing::Credentials;

/// Opaque session token issued by the exchange.
///
/// Not `Clone` outside this crate's control flow: `revoke` takes it
/// by value so a revoked token cannot be reused.
#[derive(PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for logs.
    pub fn redacted(&self) -> String {
        let head: String = self.0.chars().take(6).collect();
        format!("{}…", head)
    }

    /// Copy handed to the renewal task; the session keeps the original.
    pub(crate) fn duplicate(&self) -> Self {
        Self(self.0.clone())
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionToken").field(&self.redacted()).finish()
    }
}

/// Contract every session backend implements.
///
/// THREADING:
/// - Shared behind `Arc`; renewal runs on a spawned task
#[async_trait::async_trait]
pub trait SessionProvisioner: Send + Sync {
    async fn acquire(&self) -> Result<SessionToken, AuthError>;

    /// Extends the token's expiry; returns the token the server
    /// now considers valid.
    async fn renew(&self, token: &SessionToken) -> Result<SessionToken, AuthError>;

    /// Best-effort delete. Errors are logged, never raised.
    async fn revoke(&self, token: SessionToken);
}

/// Builds the provisioner for a listener, if its exchange needs one.
///
/// Fails when the exchange requires a session but credentials are
/// not configured or not present in the environment.
pub fn build_provisioner(
    adapter: &dyn ExchangeAdapter,
    cfg: &ListenerConfig,
) -> anyhow::Result<Option<Arc<dyn SessionProvisioner>>> {
    if !adapter.requires_session() {
        return Ok(None);
    }

    let creds_cfg = cfg.credentials.as_ref().ok_or_else(|| {
        anyhow::anyhow!("`{}` needs a session token but has no credentials", cfg.name)
    })?;

    let credentials = Credentials::from_env(&creds_cfg.api_key_env, &creds_cfg.secret_key_env)?;

    let rest_url = cfg
        .rest_url
        .clone()
        .or_else(|| adapter.rest_url().map(str::to_string))
        .ok_or_else(|| anyhow::anyhow!("`{}` has no REST base url", cfg.name))?;

    match adapter.name() {
        "mexc" => Ok(Some(Arc::new(mexc::MexcUserDataStream::new(
            rest_url,
            credentials,
            cfg.timing.request_timeout(),
        )?))),
        other => anyhow::bail!("no session provisioner for `{}`", other),
    }
}
