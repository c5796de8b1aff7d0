//! Multi-step submission sagas. Each saga drives one of the flow state
//! machines in `hrbridge_core::flows`, translating upstream call results
//! into flow events and flow actions into upstream calls.

pub mod expense;
pub mod leave;

use std::time::Duration;

use serde_json::Value;

use hrbridge_core::{CallSpec, SessionDescriptor, UpstreamError};

use crate::executor::Executor;

/// Threads one session through a saga's calls. When the executor renews the
/// session mid-saga, every later call uses the renewed descriptor and the
/// saga surfaces it in its outcome for the caller to persist.
pub(crate) struct SessionTracker<'a> {
    executor: &'a Executor,
    refresh_token: Option<&'a str>,
    current: SessionDescriptor,
    renewed: Option<SessionDescriptor>,
}

impl<'a> SessionTracker<'a> {
    pub(crate) fn new(
        executor: &'a Executor,
        session: &SessionDescriptor,
        refresh_token: Option<&'a str>,
    ) -> Self {
        Self { executor, refresh_token, current: session.clone(), renewed: None }
    }

    pub(crate) async fn call(&mut self, spec: &CallSpec) -> Result<Value, UpstreamError> {
        self.call_with_timeout(spec, self.executor.call_timeout()).await
    }

    pub(crate) async fn call_with_timeout(
        &mut self,
        spec: &CallSpec,
        timeout: Duration,
    ) -> Result<Value, UpstreamError> {
        let outcome = self
            .executor
            .execute_with_timeout(spec, &self.current, self.refresh_token, timeout)
            .await?;
        if let Some(renewed) = outcome.renewed_session {
            self.current = renewed.clone();
            self.renewed = Some(renewed);
        }
        Ok(outcome.value)
    }

    pub(crate) fn session(&self) -> &SessionDescriptor {
        &self.current
    }

    /// Adopt a renewal produced outside this tracker (e.g. by the policy
    /// gate's own balance fetch).
    pub(crate) fn adopt(&mut self, renewed: Option<SessionDescriptor>) {
        if let Some(renewed) = renewed {
            self.current = renewed.clone();
            self.renewed = Some(renewed);
        }
    }

    pub(crate) fn renewed(&self) -> Option<SessionDescriptor> {
        self.renewed.clone()
    }
}
