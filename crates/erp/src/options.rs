//! Read-only dropdown data for the expense form: currencies, per-diem
//! destinations, and the three analytic account lists.
//!
//! These lists are decoration, not gatekeeping, so each fetch fails open to
//! an empty list with a warning instead of blocking the form.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tracing::warn;

use hrbridge_core::{CallSpec, LinkedRecord, SessionDescriptor};

use crate::executor::Executor;

/// Upstream caps the state list well below this in practice.
const OPTION_LIMIT: i64 = 2000;

/// At most this many option fetches hit the upstream at once.
const CONCURRENT_FETCHES: usize = 3;

#[derive(Clone, Debug, Default)]
pub struct ExpenseFormOptions {
    pub currencies: Vec<LinkedRecord>,
    pub destinations: Vec<LinkedRecord>,
    pub projects: Vec<LinkedRecord>,
    pub markets: Vec<LinkedRecord>,
    pub pools: Vec<LinkedRecord>,
}

pub struct OptionsService {
    executor: Arc<Executor>,
    permits: Arc<Semaphore>,
}

impl OptionsService {
    pub fn new(executor: Arc<Executor>) -> Self {
        Self { executor, permits: Arc::new(Semaphore::new(CONCURRENT_FETCHES)) }
    }

    pub async fn fetch(
        &self,
        session: &SessionDescriptor,
        refresh_token: Option<&str>,
    ) -> ExpenseFormOptions {
        let currencies = self.fetch_list(
            session,
            refresh_token,
            "currencies",
            CallSpec::search_read("res.currency", json!([["active", "=", true]]), &["name"])
                .kwarg("order", json!("name asc"))
                .kwarg("limit", json!(OPTION_LIMIT)),
        );
        let destinations = self.fetch_list(
            session,
            refresh_token,
            "destinations",
            CallSpec::search_read("res.country.state", json!([]), &["name"])
                .kwarg("order", json!("name asc"))
                .kwarg("limit", json!(OPTION_LIMIT)),
        );
        let projects =
            self.fetch_list(session, refresh_token, "projects", analytic_spec("Project"));
        let markets = self.fetch_list(session, refresh_token, "markets", analytic_spec("Market"));
        let pools = self.fetch_list(session, refresh_token, "pools", analytic_spec("Pool"));

        let (currencies, destinations, projects, markets, pools) =
            tokio::join!(currencies, destinations, projects, markets, pools);

        ExpenseFormOptions { currencies, destinations, projects, markets, pools }
    }

    async fn fetch_list(
        &self,
        session: &SessionDescriptor,
        refresh_token: Option<&str>,
        label: &str,
        spec: CallSpec,
    ) -> Vec<LinkedRecord> {
        let Ok(_permit) = self.permits.acquire().await else {
            return Vec::new();
        };
        match self.executor.execute(&spec, session, refresh_token).await {
            Ok(outcome) => parse_options(&outcome.value),
            Err(error) => {
                warn!(list = label, %error, "option fetch failed, returning empty list");
                Vec::new()
            }
        }
    }
}

fn analytic_spec(plan: &str) -> CallSpec {
    CallSpec::search_read(
        "account.analytic.account",
        json!([["plan_id.name", "ilike", plan]]),
        &["name"],
    )
    .kwarg("order", json!("name asc"))
    .kwarg("limit", json!(OPTION_LIMIT))
}

fn parse_options(value: &Value) -> Vec<LinkedRecord> {
    let Some(records) = value.as_array() else {
        return Vec::new();
    };
    records
        .iter()
        .filter_map(|record| {
            let id = record.get("id").and_then(Value::as_i64)?;
            let name = record.get("name").and_then(Value::as_str).unwrap_or_default();
            Some(LinkedRecord::new(id, name))
        })
        .collect()
}
