//! Unpaid-leave gate: unpaid time off is only allowed while the employee's
//! Annual Leave balance is effectively spent.
//!
//! The gate fails closed. If the balance cannot be fetched the request is
//! denied, because allowing unpaid leave against an unknown balance is the
//! exact mistake the policy exists to prevent.

use std::sync::Arc;

use tracing::warn;

use hrbridge_core::{unpaid_leave_allowed, SessionDescriptor, UpstreamError};

use crate::balance::BalanceService;
use crate::executor::Executor;

const ANNUAL_LEAVE: &str = "Annual Leave";

#[derive(Clone, Debug)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub renewed_session: Option<SessionDescriptor>,
}

pub struct PolicyGate {
    balance: BalanceService,
}

impl PolicyGate {
    pub fn new(executor: Arc<Executor>) -> Self {
        Self { balance: BalanceService::new(executor) }
    }

    /// May this employee request unpaid leave right now?
    pub async fn is_unpaid_leave_allowed(
        &self,
        session: &SessionDescriptor,
        refresh_token: Option<&str>,
        employee_id: i64,
        year: i32,
    ) -> PolicyDecision {
        self.decide(session, refresh_token, employee_id, year, 0.0).await
    }

    /// Same check, but with `credit_days` added back to the fetched balance.
    /// Used when replacing an existing Annual Leave request with an unpaid
    /// one: the original's days return to the balance when it is deleted, so
    /// they count as still available here.
    pub async fn is_unpaid_leave_allowed_with_credit(
        &self,
        session: &SessionDescriptor,
        refresh_token: Option<&str>,
        employee_id: i64,
        year: i32,
        credit_days: f64,
    ) -> PolicyDecision {
        self.decide(session, refresh_token, employee_id, year, credit_days).await
    }

    async fn decide(
        &self,
        session: &SessionDescriptor,
        refresh_token: Option<&str>,
        employee_id: i64,
        year: i32,
        credit_days: f64,
    ) -> PolicyDecision {
        match self
            .balance
            .remaining_for_year(session, refresh_token, employee_id, year, Some(ANNUAL_LEAVE))
            .await
        {
            Ok(outcome) => {
                let remaining = outcome
                    .balances
                    .get(ANNUAL_LEAVE)
                    .copied()
                    .map(|days| days + credit_days);
                PolicyDecision {
                    allowed: unpaid_leave_allowed(remaining),
                    renewed_session: outcome.renewed_session,
                }
            }
            Err(error) => {
                warn_denied(employee_id, &error);
                PolicyDecision { allowed: false, renewed_session: None }
            }
        }
    }
}

fn warn_denied(employee_id: i64, error: &UpstreamError) {
    warn!(employee_id, %error, "balance fetch failed, denying unpaid leave");
}
