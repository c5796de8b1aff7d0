use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{info, warn};

use hrbridge_core::config::{ServiceAccountConfig, UpstreamConfig};
use hrbridge_core::{CallSpec, SessionDescriptor, UpstreamError};

use crate::rpc::{authenticate_body, call_kw_body, classify_reply, AUTHENTICATE_PATH, CALL_KW_PATH};
use crate::transport::RpcTransport;
use crate::vault::CredentialVault;

/// Result of one executed call. `renewed_session` is set when the session
/// had to be rebuilt mid-call; the caller must persist it.
#[derive(Clone, Debug)]
pub struct CallOutcome {
    pub value: Value,
    pub renewed_session: Option<SessionDescriptor>,
}

/// Session-resilient request executor. Stateless by design: every call
/// carries its own `SessionDescriptor`, so concurrent requests for
/// different end users can never bleed into each other's sessions.
pub struct Executor {
    transport: Arc<dyn RpcTransport>,
    vault: Arc<dyn CredentialVault>,
    upstream: UpstreamConfig,
    call_id: AtomicU64,
}

impl Executor {
    pub fn new(
        transport: Arc<dyn RpcTransport>,
        vault: Arc<dyn CredentialVault>,
        upstream: UpstreamConfig,
    ) -> Self {
        Self { transport, vault, upstream, call_id: AtomicU64::new(1) }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.call_timeout_secs)
    }

    pub fn report_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.report_timeout_secs)
    }

    /// Fresh login against the upstream authentication endpoint.
    pub async fn authenticate(
        &self,
        login: &str,
        password: &SecretString,
    ) -> Result<SessionDescriptor, UpstreamError> {
        let body = authenticate_body(&self.upstream.database, login, password.expose_secret());
        let response = self
            .transport
            .post_json(
                AUTHENTICATE_PATH,
                &body,
                None,
                Duration::from_secs(self.upstream.auth_timeout_secs),
            )
            .await?;

        let result = classify_reply(&response)?;
        let user_id = result
            .get("uid")
            .and_then(Value::as_i64)
            .filter(|uid| *uid > 0)
            .ok_or_else(|| UpstreamError::validation("invalid username or password"))?;
        let session_id = response
            .session_cookie
            .ok_or_else(|| UpstreamError::upstream_fault("login reply carried no session cookie"))?;

        Ok(SessionDescriptor::new(session_id, user_id)
            .with_credentials(login, password.clone()))
    }

    /// Cheap validity probe: read the session's own user record. Used by
    /// preflight checks; a `SessionExpired` result means the cookie is dead.
    pub async fn probe_session(&self, session: &SessionDescriptor) -> Result<bool, UpstreamError> {
        let spec = CallSpec::read("res.users", &[session.user_id], &["name", "login"]);
        let body = call_kw_body(&spec, self.next_call_id());
        let response = self
            .transport
            .post_json(CALL_KW_PATH, &body, Some(&session.session_id), self.call_timeout())
            .await?;

        match classify_reply(&response) {
            Ok(_) => Ok(true),
            Err(error) if error.is_session_expired() => Ok(false),
            Err(error) => Err(error),
        }
    }

    /// Execute one call with the standard timeout.
    pub async fn execute(
        &self,
        spec: &CallSpec,
        session: &SessionDescriptor,
        refresh_token: Option<&str>,
    ) -> Result<CallOutcome, UpstreamError> {
        self.execute_with_timeout(spec, session, refresh_token, self.call_timeout()).await
    }

    /// Execute one call; on `SessionExpired` renew the session once and
    /// retry exactly once. A second expiry, or a failed renewal, surfaces
    /// as `SessionExpired` with no further attempts.
    pub async fn execute_with_timeout(
        &self,
        spec: &CallSpec,
        session: &SessionDescriptor,
        refresh_token: Option<&str>,
        timeout: Duration,
    ) -> Result<CallOutcome, UpstreamError> {
        let body = call_kw_body(spec, self.next_call_id());

        let response = self
            .transport
            .post_json(CALL_KW_PATH, &body, Some(&session.session_id), timeout)
            .await?;
        let first_error = match classify_reply(&response) {
            Ok(value) => return Ok(CallOutcome { value, renewed_session: None }),
            Err(error) if error.is_session_expired() => error,
            Err(error) => return Err(error),
        };

        info!(model = %spec.model, method = %spec.method, "session expired, renewing");
        let renewed = match self.renew_session(session, refresh_token).await {
            Ok(renewed) => renewed,
            Err(error) => {
                warn!(%error, "session renewal failed");
                return Err(UpstreamError::session_expired(format!(
                    "session renewal failed: {error}"
                )));
            }
        };

        let response = self
            .transport
            .post_json(CALL_KW_PATH, &body, Some(&renewed.session_id), timeout)
            .await?;
        match classify_reply(&response) {
            Ok(value) => Ok(CallOutcome { value, renewed_session: Some(renewed) }),
            Err(error) if error.is_session_expired() => {
                // One renewal per logical call; a broken credential must not
                // loop.
                warn!("session still rejected after renewal: {first_error}");
                Err(error)
            }
            Err(error) => Err(error),
        }
    }

    async fn renew_session(
        &self,
        session: &SessionDescriptor,
        refresh_token: Option<&str>,
    ) -> Result<SessionDescriptor, UpstreamError> {
        if let (Some(username), Some(password)) = (&session.username, &session.password) {
            return self.authenticate(username, password).await;
        }

        let token = refresh_token.ok_or_else(|| {
            UpstreamError::session_expired(
                "no cached credentials and no refresh token to renew with",
            )
        })?;
        let credentials = self
            .vault
            .decrypt(token)
            .await
            .map_err(|err| UpstreamError::session_expired(err.to_string()))?;
        self.authenticate(&credentials.username, &credentials.password).await
    }

    fn next_call_id(&self) -> u64 {
        self.call_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Stateful convenience wrapper around one process-wide service-account
/// session. Only suitable for background and single-tenant work; saga entry
/// points deliberately do not accept it.
pub struct SharedSessionExecutor {
    executor: Arc<Executor>,
    account: ServiceAccountConfig,
    session: tokio::sync::Mutex<Option<SessionDescriptor>>,
}

impl SharedSessionExecutor {
    pub fn new(executor: Arc<Executor>, account: ServiceAccountConfig) -> Self {
        Self { executor, account, session: tokio::sync::Mutex::new(None) }
    }

    pub async fn call(&self, spec: &CallSpec) -> Result<Value, UpstreamError> {
        let mut guard = self.session.lock().await;
        let session = match guard.as_ref() {
            Some(session) => session.clone(),
            None => {
                let session =
                    self.executor.authenticate(&self.account.login, &self.account.password).await?;
                *guard = Some(session.clone());
                session
            }
        };

        let outcome = self.executor.execute(spec, &session, None).await?;
        if let Some(renewed) = outcome.renewed_session {
            *guard = Some(renewed);
        }
        Ok(outcome.value)
    }
}
