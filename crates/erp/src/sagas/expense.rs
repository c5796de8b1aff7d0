//! Expense reimbursement saga: category validation, catalog product
//! resolution, per-diem two-phase creation, and the two-call submit
//! transition with state verification after each call.

use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use hrbridge_core::audit::{AuditContext, AuditSink};
use hrbridge_core::{
    CallSpec, ExpenseCategory, ExpenseDraft, ExpenseSubmitFlow, FlowContext, FlowEngine,
    FlowEvent, FlowState, LinkedRecord, SagaOutcome, SessionDescriptor,
};

use crate::executor::Executor;
use crate::sagas::leave::{created_id, first_record, transition_failure};
use crate::sagas::SessionTracker;

const PRODUCT_UNRESOLVED_MESSAGE: &str =
    "I couldn't find the configured expense category product. Please ensure the product exists \
     with the correct internal reference and is allowed to be expensed.";

/// Line states that count as submitted after `action_submit_expenses`.
const SUBMITTED_LINE_STATES: [&str; 4] = ["reported", "submitted", "approved", "done"];

/// Report states that count as submitted after `action_submit_sheet`.
const SUBMITTED_REPORT_STATES: [&str; 4] = ["submit", "submitted", "approve", "done"];

pub struct ExpenseSaga {
    executor: Arc<Executor>,
    audit: Arc<dyn AuditSink>,
}

impl ExpenseSaga {
    pub fn new(executor: Arc<Executor>, audit: Arc<dyn AuditSink>) -> Self {
        Self { executor, audit }
    }

    pub async fn submit(
        &self,
        session: &SessionDescriptor,
        refresh_token: Option<&str>,
        employee_id: i64,
        draft: &ExpenseDraft,
        correlation_id: &str,
    ) -> SagaOutcome {
        let engine = FlowEngine::new(ExpenseSubmitFlow);
        let audit_ctx = AuditContext::new(None, Some(employee_id), correlation_id, "expense-saga");
        let context = FlowContext {
            missing_required_fields: draft.missing_fields(),
            has_attachments: false,
        };
        let mut tracker = SessionTracker::new(&self.executor, session, refresh_token);
        let mut state = engine.initial_state();

        // Never guess a product: spend booked against the wrong category is
        // worse than a rejected request.
        let product_id = match self.resolve_product(&mut tracker, draft.category).await {
            Some(id) => id,
            None => {
                let _ = engine.apply_with_audit(
                    &state,
                    &FlowEvent::ProductUnresolved,
                    &context,
                    &self.audit,
                    &audit_ctx,
                );
                return SagaOutcome::rejected(PRODUCT_UNRESOLVED_MESSAGE)
                    .with_renewed_session(tracker.renewed());
            }
        };

        state = match engine.apply_with_audit(
            &state,
            &FlowEvent::PolicyCleared,
            &context,
            &self.audit,
            &audit_ctx,
        ) {
            Ok(outcome) => outcome.to,
            Err(error) => {
                return transition_failure(error).with_renewed_session(tracker.renewed())
            }
        };

        let record_id = match self.create_record(&mut tracker, employee_id, draft, product_id).await
        {
            Ok(id) => id,
            Err(outcome) => {
                let _ = engine.apply_with_audit(
                    &state,
                    &FlowEvent::UpstreamRejected,
                    &context,
                    &self.audit,
                    &audit_ctx,
                );
                return outcome.with_renewed_session(tracker.renewed());
            }
        };
        info!(record_id, employee_id, category = ?draft.category, "expense record created");

        state = match engine.apply_with_audit(
            &state,
            &FlowEvent::RecordCreated,
            &context,
            &self.audit,
            &audit_ctx,
        ) {
            Ok(outcome) => outcome.to,
            Err(error) => {
                return transition_failure(error)
                    .with_created_id(record_id)
                    .with_renewed_session(tracker.renewed())
            }
        };

        // Submit the expense line, then verify what state it actually
        // reached. Anything short of a submitted state is partial success:
        // the record exists but would otherwise sit invisible in a draft
        // queue.
        let submit_line =
            CallSpec::invoke("hr.expense", "action_submit_expenses", &[record_id]);
        if let Err(error) =
            tracker.call_with_timeout(&submit_line, self.executor.report_timeout()).await
        {
            let _ = engine.apply_with_audit(
                &state,
                &FlowEvent::UpstreamRejected,
                &context,
                &self.audit,
                &audit_ctx,
            );
            return SagaOutcome::failed(format!(
                "Expense record #{record_id} was created but could not be submitted: {}",
                error.message
            ))
            .with_created_id(record_id)
            .with_renewed_session(tracker.renewed());
        }

        let (line_state, sheet_id) = self.verify_line(&mut tracker, record_id).await;
        let line_submitted = line_state
            .as_deref()
            .is_some_and(|observed| SUBMITTED_LINE_STATES.contains(&observed));
        if !line_submitted || sheet_id.is_none() {
            let _ = engine.apply_with_audit(
                &state,
                &FlowEvent::SubmitStateUnverified,
                &context,
                &self.audit,
                &audit_ctx,
            );
            return partial_success(record_id, line_state)
                .with_renewed_session(tracker.renewed());
        }

        state = match engine.apply_with_audit(
            &state,
            &FlowEvent::LineSubmitted,
            &context,
            &self.audit,
            &audit_ctx,
        ) {
            Ok(outcome) => outcome.to,
            Err(error) => {
                return transition_failure(error)
                    .with_created_id(record_id)
                    .with_renewed_session(tracker.renewed())
            }
        };

        let sheet_id = sheet_id.unwrap_or_default();
        let submit_sheet = CallSpec::invoke("hr.expense.sheet", "action_submit_sheet", &[sheet_id]);
        if let Err(error) =
            tracker.call_with_timeout(&submit_sheet, self.executor.report_timeout()).await
        {
            let _ = engine.apply_with_audit(
                &state,
                &FlowEvent::UpstreamRejected,
                &context,
                &self.audit,
                &audit_ctx,
            );
            return SagaOutcome::failed(format!(
                "Expense record #{record_id} was created but its report could not be \
                 submitted: {}",
                error.message
            ))
            .with_created_id(record_id)
            .with_renewed_session(tracker.renewed());
        }

        let report_state = self.verify_sheet(&mut tracker, sheet_id).await;
        let report_submitted = report_state
            .as_deref()
            .is_some_and(|observed| SUBMITTED_REPORT_STATES.contains(&observed));
        if !report_submitted {
            let _ = engine.apply_with_audit(
                &state,
                &FlowEvent::SubmitStateUnverified,
                &context,
                &self.audit,
                &audit_ctx,
            );
            return partial_success(record_id, report_state)
                .with_renewed_session(tracker.renewed());
        }

        let _ = engine.apply_with_audit(
            &state,
            &FlowEvent::ReportSubmitted,
            &context,
            &self.audit,
            &audit_ctx,
        );
        SagaOutcome::committed(format!(
            "Expense record #{record_id} was created and submitted for approval."
        ))
        .with_final_state(FlowState::Submitted)
        .with_created_id(record_id)
        .with_upstream_state(report_state.unwrap_or_default())
        .with_renewed_session(tracker.renewed())
    }

    /// Resolve a category to its catalog product: stable internal code
    /// first, exact bare name second, fuzzy display-name match last.
    async fn resolve_product(
        &self,
        tracker: &mut SessionTracker<'_>,
        category: ExpenseCategory,
    ) -> Option<i64> {
        let lookups = [
            json!([["default_code", "=", category.default_code()], ["can_be_expensed", "=", true]]),
            json!([["name", "=", category.bare_name()], ["can_be_expensed", "=", true]]),
            json!([["name", "ilike", category.display_name()], ["can_be_expensed", "=", true]]),
        ];
        for domain in lookups {
            let spec = CallSpec::new("product.product", "search")
                .arg(domain)
                .kwarg("limit", json!(1));
            match tracker.call(&spec).await {
                Ok(value) => {
                    if let Some(id) = value.as_array().and_then(|ids| ids.first()?.as_i64()) {
                        return Some(id);
                    }
                }
                Err(error) => {
                    warn!(category = ?category, %error, "product lookup failed");
                }
            }
        }
        None
    }

    /// Create the `hr.expense` record. Per-diem uses a two-phase fallback:
    /// date/product fields set together trip automation on the remote side,
    /// so after a failed all-fields create the record is built with a
    /// neutral product first and the per-diem fields written separately,
    /// with the product switch as a final isolated write.
    async fn create_record(
        &self,
        tracker: &mut SessionTracker<'_>,
        employee_id: i64,
        draft: &ExpenseDraft,
        product_id: i64,
    ) -> Result<i64, SagaOutcome> {
        let values = expense_values(employee_id, draft, product_id);

        let create = CallSpec::create("hr.expense", Value::Object(values.clone()));
        let first_attempt = tracker.call(&create).await;
        match first_attempt {
            Ok(value) => {
                return created_id(&value).ok_or_else(|| {
                    SagaOutcome::failed("upstream create reply carried no record id")
                })
            }
            Err(error) if draft.category != ExpenseCategory::PerDiem => {
                return Err(SagaOutcome::failed(error.message))
            }
            Err(error) => {
                warn!(%error, "all-fields per-diem create failed, trying two-phase");
            }
        }

        // Phase one: neutral product, no per-diem trigger fields.
        let mut safe_values = base_values(employee_id, draft);
        let safe_product =
            self.resolve_product(tracker, ExpenseCategory::Miscellaneous).await.unwrap_or(product_id);
        safe_values.insert("product_id".to_owned(), json!(safe_product));
        let safe_create = CallSpec::create("hr.expense", Value::Object(safe_values));
        let record_id = match tracker.call(&safe_create).await {
            Ok(value) => created_id(&value).ok_or_else(|| {
                SagaOutcome::failed("upstream create reply carried no record id")
            })?,
            Err(error) => return Err(SagaOutcome::failed(error.message)),
        };

        // Phase two: per-diem fields, product untouched.
        let mut stay_fields = per_diem_values(draft);
        stay_fields.insert("unit_amount".to_owned(), json!(1));
        let stay_write =
            CallSpec::write("hr.expense", &[record_id], Value::Object(stay_fields.clone()));
        if let Err(error) = tracker.call(&stay_write).await {
            return Err(SagaOutcome::failed(format!(
                "Expense record #{record_id} was created but its per-diem details could not \
                 be written: {}",
                error.message
            ))
            .with_created_id(record_id));
        }

        // Phase three: isolated product switch, with one combined retry.
        let switch = CallSpec::write("hr.expense", &[record_id], json!({"product_id": product_id}));
        if let Err(switch_error) = tracker.call(&switch).await {
            warn!(record_id, error = %switch_error, "product switch failed, retrying combined");
            let mut combined = stay_fields;
            combined.insert("product_id".to_owned(), json!(product_id));
            let combined_write =
                CallSpec::write("hr.expense", &[record_id], Value::Object(combined));
            if tracker.call(&combined_write).await.is_err() {
                return Err(SagaOutcome::failed(format!(
                    "Expense record #{record_id} was created but could not be switched to the \
                     per-diem product: {}",
                    switch_error.message
                ))
                .with_created_id(record_id));
            }
        }

        Ok(record_id)
    }

    async fn verify_line(
        &self,
        tracker: &mut SessionTracker<'_>,
        record_id: i64,
    ) -> (Option<String>, Option<i64>) {
        let spec = CallSpec::read("hr.expense", &[record_id], &["state", "sheet_id"]);
        match tracker.call(&spec).await {
            Ok(value) => {
                let Some(record) = first_record(&value) else {
                    return (None, None);
                };
                let state =
                    record.get("state").and_then(Value::as_str).map(str::to_owned);
                let sheet_id = record
                    .get("sheet_id")
                    .and_then(LinkedRecord::from_value)
                    .map(|link| link.id);
                (state, sheet_id)
            }
            Err(error) => {
                warn!(record_id, %error, "could not verify expense line state");
                (None, None)
            }
        }
    }

    async fn verify_sheet(
        &self,
        tracker: &mut SessionTracker<'_>,
        sheet_id: i64,
    ) -> Option<String> {
        let spec = CallSpec::read("hr.expense.sheet", &[sheet_id], &["state"]);
        match tracker.call(&spec).await {
            Ok(value) => {
                first_record(&value)?.get("state").and_then(Value::as_str).map(str::to_owned)
            }
            Err(error) => {
                warn!(sheet_id, %error, "could not verify expense report state");
                None
            }
        }
    }
}

fn partial_success(record_id: i64, observed_state: Option<String>) -> SagaOutcome {
    let mut outcome = SagaOutcome::committed(format!(
        "Expense record #{record_id} was created, but it could not be confirmed as submitted \
         for approval. Please verify it in the expenses app."
    ))
    .with_final_state(FlowState::PartiallySubmitted)
    .with_created_id(record_id);
    if let Some(observed) = observed_state {
        outcome = outcome.with_upstream_state(observed);
    }
    outcome
}

/// Category-independent create fields.
fn base_values(employee_id: i64, draft: &ExpenseDraft) -> Map<String, Value> {
    let mut values = Map::new();
    values.insert(
        "name".to_owned(),
        json!(draft
            .description
            .clone()
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| draft.category.display_name().to_owned())),
    );
    values.insert("employee_id".to_owned(), json!(employee_id));
    values.insert("state".to_owned(), json!("draft"));
    if let Some(amount) = draft.amount {
        values.insert(
            "total_amount_currency".to_owned(),
            json!(amount.to_f64().unwrap_or_default()),
        );
    }
    if let Some(currency_id) = draft.currency_id {
        values.insert("currency_id".to_owned(), json!(currency_id));
    }
    if let Some(date) = draft.date {
        values.insert("date".to_owned(), json!(date.to_string()));
    }
    if let Some(link) = &draft.attached_link {
        values.insert("x_studio_attached_link".to_owned(), json!(link));
    }
    if !draft.analytic.is_empty() {
        let mut distribution = Map::new();
        for line in &draft.analytic {
            let key = format!("{},{},{}", line.project_id, line.market_id, line.pool_id);
            distribution.insert(key, json!(100));
        }
        values.insert("analytic_distribution".to_owned(), Value::Object(distribution));
    }
    values
}

/// Per-diem stay fields. The written date range is the corrected span; the
/// day count is computed over the span the user supplied, so a same-day
/// stay still counts as one day.
fn per_diem_values(draft: &ExpenseDraft) -> Map<String, Value> {
    let mut values = Map::new();
    if let Some((from, to)) = draft.corrected_per_diem_range() {
        values.insert("x_studio_from".to_owned(), json!(from.to_string()));
        values.insert("x_studio_to".to_owned(), json!(to.to_string()));
    }
    if let Some(days) = draft.days_abroad() {
        values.insert("x_studio_days_abroad".to_owned(), json!(days));
        values.insert("quantity".to_owned(), json!(days));
    }
    if let Some(destination_id) = draft.destination_id {
        values.insert("x_studio_destination".to_owned(), json!(destination_id));
    }
    values
}

fn expense_values(employee_id: i64, draft: &ExpenseDraft, product_id: i64) -> Map<String, Value> {
    let mut values = base_values(employee_id, draft);
    values.insert("product_id".to_owned(), json!(product_id));
    if draft.category == ExpenseCategory::PerDiem {
        values.extend(per_diem_values(draft));
    }
    values
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use serde_json::json;

    use hrbridge_core::{AnalyticLine, ExpenseCategory, ExpenseDraft};

    use super::{base_values, expense_values, per_diem_values};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn misc_draft() -> ExpenseDraft {
        let mut draft = ExpenseDraft::new(ExpenseCategory::Miscellaneous);
        draft.description = Some("Team lunch".to_owned());
        draft.amount = Some(Decimal::new(4550, 2));
        draft.currency_id = Some(1);
        draft.date = Some(date(2025, 9, 28));
        draft.analytic = vec![AnalyticLine { project_id: 10, market_id: 20, pool_id: 30 }];
        draft
    }

    #[test]
    fn analytic_distribution_encodes_one_full_weight_line() {
        let values = base_values(42, &misc_draft());
        assert_eq!(values["analytic_distribution"], json!({"10,20,30": 100}));
        assert_eq!(values["total_amount_currency"], json!(45.5));
        assert_eq!(values["date"], json!("2025-09-28"));
        assert_eq!(values["state"], json!("draft"));
    }

    #[test]
    fn missing_description_falls_back_to_the_category_display_name() {
        let mut draft = misc_draft();
        draft.description = None;
        let values = base_values(42, &draft);
        assert_eq!(values["name"], json!("[EXP_GEN] Miscellaneous"));
    }

    #[test]
    fn same_day_per_diem_writes_corrected_span_with_one_day_count() {
        let mut draft = ExpenseDraft::new(ExpenseCategory::PerDiem);
        draft.per_diem_from = Some(date(2025, 9, 28));
        draft.per_diem_to = Some(date(2025, 9, 28));
        draft.destination_id = Some(55);

        let values = per_diem_values(&draft);
        assert_eq!(values["x_studio_from"], json!("2025-09-28"));
        assert_eq!(values["x_studio_to"], json!("2025-09-29"));
        assert_eq!(values["x_studio_days_abroad"], json!(1));
        assert_eq!(values["quantity"], json!(1));
        assert_eq!(values["x_studio_destination"], json!(55));
    }

    #[test]
    fn multi_day_per_diem_counts_inclusive_days() {
        let mut draft = ExpenseDraft::new(ExpenseCategory::PerDiem);
        draft.per_diem_from = Some(date(2025, 9, 28));
        draft.per_diem_to = Some(date(2025, 9, 30));
        let values = per_diem_values(&draft);
        assert_eq!(values["x_studio_days_abroad"], json!(3));
    }

    #[test]
    fn per_diem_create_payload_includes_stay_fields_and_product() {
        let mut draft = ExpenseDraft::new(ExpenseCategory::PerDiem);
        draft.per_diem_from = Some(date(2025, 9, 28));
        draft.per_diem_to = Some(date(2025, 10, 1));
        draft.destination_id = Some(55);
        draft.analytic = vec![AnalyticLine { project_id: 1, market_id: 2, pool_id: 3 }];

        let values = expense_values(42, &draft, 77);
        assert_eq!(values["product_id"], json!(77));
        assert_eq!(values["x_studio_days_abroad"], json!(4));
        assert_eq!(values["name"], json!("[PER_DIEM] Per Diem"));
    }
}
