//! Balance fetching: pulls validated allocations and approved leave for an
//! employee and folds them through the pure arithmetic in `hrbridge_core`.
//!
//! Fail-closed: any upstream failure propagates as an error. Callers that
//! gate a decision on a balance must treat an error as "balance unknown",
//! never as zero.

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::{json, Value};
use tracing::debug;

use hrbridge_core::balance::{remaining_for_display, remaining_for_year, RemainingBalance};
use hrbridge_core::{
    CallSpec, LeaveAllocation, LeaveTaken, LinkedRecord, SessionDescriptor, UpstreamError,
};

use crate::executor::Executor;

/// Record cap per fetch; no employee has anywhere near this many rows.
const FETCH_LIMIT: i64 = 500;

#[derive(Clone, Debug)]
pub struct BalanceOutcome {
    pub balances: RemainingBalance,
    pub renewed_session: Option<SessionDescriptor>,
}

pub struct BalanceService {
    executor: Arc<Executor>,
}

impl BalanceService {
    pub fn new(executor: Arc<Executor>) -> Self {
        Self { executor }
    }

    /// Remaining balance per leave type for one calendar year. When
    /// `requested_type` is given it is always present in the result, so a
    /// caller checking a specific type sees 0 rather than a missing key.
    pub async fn remaining_for_year(
        &self,
        session: &SessionDescriptor,
        refresh_token: Option<&str>,
        employee_id: i64,
        year: i32,
        requested_type: Option<&str>,
    ) -> Result<BalanceOutcome, UpstreamError> {
        let (allocations, taken, renewed) =
            self.fetch_records(session, refresh_token, employee_id).await?;
        Ok(BalanceOutcome {
            balances: remaining_for_year(&allocations, &taken, year, requested_type),
            renewed_session: renewed,
        })
    }

    /// Display balances with per-type lookback windows, suitable for the
    /// "what do I have left" summary.
    pub async fn remaining_for_display(
        &self,
        session: &SessionDescriptor,
        refresh_token: Option<&str>,
        employee_id: i64,
        current_year: i32,
    ) -> Result<BalanceOutcome, UpstreamError> {
        let (allocations, taken, renewed) =
            self.fetch_records(session, refresh_token, employee_id).await?;
        Ok(BalanceOutcome {
            balances: remaining_for_display(&allocations, &taken, current_year),
            renewed_session: renewed,
        })
    }

    async fn fetch_records(
        &self,
        session: &SessionDescriptor,
        refresh_token: Option<&str>,
        employee_id: i64,
    ) -> Result<(Vec<LeaveAllocation>, Vec<LeaveTaken>, Option<SessionDescriptor>), UpstreamError>
    {
        let allocation_spec = CallSpec::search_read(
            "hr.leave.allocation",
            json!([["employee_id", "=", employee_id], ["state", "=", "validate"]]),
            &["holiday_status_id", "number_of_days", "date_from", "date_to"],
        )
        .kwarg("limit", json!(FETCH_LIMIT));

        let first = self.executor.execute(&allocation_spec, session, refresh_token).await?;
        let mut renewed = first.renewed_session;
        let allocations = parse_allocations(&first.value);

        // Pending requests count as taken so the balance cannot be spent
        // twice while approval is in flight.
        let taken_spec = CallSpec::search_read(
            "hr.leave",
            json!([
                ["employee_id", "=", employee_id],
                ["state", "in", ["validate", "validate1", "confirm"]]
            ]),
            &["holiday_status_id", "number_of_days", "request_date_from", "request_date_to"],
        )
        .kwarg("limit", json!(FETCH_LIMIT));

        let active_session = renewed.as_ref().unwrap_or(session).clone();
        let second = self.executor.execute(&taken_spec, &active_session, refresh_token).await?;
        if second.renewed_session.is_some() {
            renewed = second.renewed_session;
        }
        let taken = parse_taken(&second.value);

        debug!(
            employee_id,
            allocations = allocations.len(),
            taken = taken.len(),
            "fetched balance records"
        );
        Ok((allocations, taken, renewed))
    }
}

fn parse_allocations(value: &Value) -> Vec<LeaveAllocation> {
    records(value)
        .map(|record| LeaveAllocation {
            leave_type: record.get("holiday_status_id").and_then(LinkedRecord::from_value),
            days: number_field(record, "number_of_days"),
            date_from: date_field(record, "date_from"),
            date_to: date_field(record, "date_to"),
        })
        .collect()
}

fn parse_taken(value: &Value) -> Vec<LeaveTaken> {
    records(value)
        .map(|record| LeaveTaken {
            leave_type: record.get("holiday_status_id").and_then(LinkedRecord::from_value),
            days: number_field(record, "number_of_days"),
            date_from: date_field(record, "request_date_from"),
            date_to: date_field(record, "request_date_to"),
        })
        .collect()
}

fn records(value: &Value) -> impl Iterator<Item = &Value> {
    value.as_array().map(Vec::as_slice).unwrap_or_default().iter()
}

fn number_field(record: &Value, key: &str) -> f64 {
    record.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

/// Parse a date field that may arrive as `YYYY-MM-DD`, a full datetime, or
/// the upstream's `false` placeholder.
fn date_field(record: &Value, key: &str) -> Option<NaiveDate> {
    let text = record.get(key)?.as_str()?;
    let prefix = text.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::{date_field, parse_allocations, parse_taken};

    #[test]
    fn allocation_records_parse_linked_type_and_dates() {
        let value = json!([
            {
                "id": 11,
                "holiday_status_id": [3, "Annual Leave"],
                "number_of_days": 21.0,
                "date_from": "2025-01-01 00:00:00",
                "date_to": "2025-12-31"
            },
            {
                "id": 12,
                "holiday_status_id": false,
                "number_of_days": 4.0,
                "date_from": false,
                "date_to": false
            }
        ]);

        let allocations = parse_allocations(&value);
        assert_eq!(allocations.len(), 2);
        assert_eq!(allocations[0].leave_type.as_ref().map(|t| t.name.as_str()), Some("Annual Leave"));
        assert_eq!(allocations[0].days, 21.0);
        assert_eq!(allocations[0].date_from, NaiveDate::from_ymd_opt(2025, 1, 1));
        assert_eq!(allocations[0].date_to, NaiveDate::from_ymd_opt(2025, 12, 31));
        assert!(allocations[1].leave_type.is_none());
        assert!(allocations[1].date_from.is_none());
    }

    #[test]
    fn taken_records_use_request_date_fields() {
        let value = json!([{
            "id": 44,
            "holiday_status_id": [3, "Annual Leave"],
            "number_of_days": 5.0,
            "request_date_from": "2025-12-28",
            "request_date_to": "2026-01-03"
        }]);

        let taken = parse_taken(&value);
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].days, 5.0);
        assert_eq!(taken[0].date_from, NaiveDate::from_ymd_opt(2025, 12, 28));
        assert_eq!(taken[0].date_to, NaiveDate::from_ymd_opt(2026, 1, 3));
    }

    #[test]
    fn non_array_reply_parses_as_empty() {
        assert!(parse_allocations(&json!({"unexpected": true})).is_empty());
        assert!(parse_taken(&json!(null)).is_empty());
    }

    #[test]
    fn malformed_dates_parse_as_none() {
        let record = json!({"date_from": "soon", "date_to": 7});
        assert!(date_field(&record, "date_from").is_none());
        assert!(date_field(&record, "date_to").is_none());
        assert!(date_field(&record, "absent").is_none());
    }
}
