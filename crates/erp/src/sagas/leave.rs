//! Leave request sagas: submission, replace-based update, and cancellation.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use hrbridge_core::audit::{AuditContext, AuditSink};
use hrbridge_core::{
    AttachmentPayload, CallSpec, FlowContext, FlowEngine, FlowEvent, FlowTransitionError,
    LeaveCancelFlow, LeaveRequestDraft, LeaveSubmitFlow, LeaveUpdateFlow, LinkedRecord,
    SagaOutcome, SessionDescriptor, UNPAID_LEAVE_DENIAL_MESSAGE,
};

use crate::executor::Executor;
use crate::policy::PolicyGate;
use crate::sagas::SessionTracker;

const DEFAULT_DESCRIPTION: &str = "Time off request via chat assistant";

const UNPAID_LEAVE_TYPE: &str = "Unpaid Leave";

/// Upstream states in which a leave request may no longer be replaced.
const TERMINAL_LEAVE_STATES: [&str; 3] = ["validate", "validate1", "refuse"];

const NOT_FOUND_MESSAGE: &str = "Time off request not found.";

const ALREADY_PROCESSED_MESSAGE: &str =
    "This time off request has already been approved or refused and can no longer be updated. \
     Please contact a Time Off Manager.";

const CANCEL_STARTED_MESSAGE: &str = "Cannot cancel a time off request that has already started. \
     Please contact a Time Off Manager to cancel this request.";

/// Replace-based update request: the original record is deleted and a new
/// one created from the draft, because end users hold create and delete
/// permission but not edit permission on existing records.
#[derive(Clone, Debug)]
pub struct LeaveUpdateRequest {
    pub record_id: i64,
    pub employee_id: i64,
    pub draft: LeaveRequestDraft,
}

#[derive(Clone, Debug)]
pub struct LeaveCancelRequest {
    pub record_id: i64,
    pub employee_id: i64,
}

pub struct LeaveSaga {
    executor: Arc<Executor>,
    policy: PolicyGate,
    audit: Arc<dyn AuditSink>,
}

impl LeaveSaga {
    pub fn new(executor: Arc<Executor>, audit: Arc<dyn AuditSink>) -> Self {
        let policy = PolicyGate::new(executor.clone());
        Self { executor, policy, audit }
    }

    /// Submit a new leave request. The unpaid-leave gate runs here, at the
    /// point of commit, not only at form-render time.
    pub async fn submit(
        &self,
        session: &SessionDescriptor,
        refresh_token: Option<&str>,
        employee_id: i64,
        draft: &LeaveRequestDraft,
        today: NaiveDate,
        correlation_id: &str,
    ) -> SagaOutcome {
        let engine = FlowEngine::new(LeaveSubmitFlow);
        let audit_ctx = AuditContext::new(None, Some(employee_id), correlation_id, "leave-saga");
        let context = FlowContext {
            missing_required_fields: draft.missing_fields(),
            has_attachments: !draft.attachments.is_empty(),
        };
        let mut tracker = SessionTracker::new(&self.executor, session, refresh_token);
        let mut state = engine.initial_state();

        if draft.leave_type_name == UNPAID_LEAVE_TYPE {
            let decision = self
                .policy
                .is_unpaid_leave_allowed(
                    tracker.session(),
                    refresh_token,
                    employee_id,
                    today.year(),
                )
                .await;
            tracker.adopt(decision.renewed_session);
            if !decision.allowed {
                let _ = engine.apply_with_audit(
                    &state,
                    &FlowEvent::PolicyDenied,
                    &context,
                    &self.audit,
                    &audit_ctx,
                );
                return SagaOutcome::rejected(UNPAID_LEAVE_DENIAL_MESSAGE)
                    .with_renewed_session(tracker.renewed());
            }
        }

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

        let create_spec = CallSpec::create("hr.leave", leave_values(employee_id, draft));
        let record_id = match tracker.call(&create_spec).await {
            Ok(value) => match created_id(&value) {
                Some(id) => id,
                None => {
                    let _ = engine.apply_with_audit(
                        &state,
                        &FlowEvent::UpstreamRejected,
                        &context,
                        &self.audit,
                        &audit_ctx,
                    );
                    return SagaOutcome::failed("upstream create reply carried no record id")
                        .with_renewed_session(tracker.renewed());
                }
            },
            Err(error) => {
                let _ = engine.apply_with_audit(
                    &state,
                    &FlowEvent::UpstreamRejected,
                    &context,
                    &self.audit,
                    &audit_ctx,
                );
                return SagaOutcome::failed(error.message)
                    .with_renewed_session(tracker.renewed());
            }
        };
        info!(record_id, employee_id, "leave request created");

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

        if context.has_attachments {
            let event =
                self.upload_attachments(&mut tracker, record_id, &draft.attachments).await;
            let _ = engine.apply_with_audit(&state, &event, &context, &self.audit, &audit_ctx);
        }

        SagaOutcome::committed(format!(
            "Time off request #{record_id} submitted successfully and is pending approval."
        ))
        .with_created_id(record_id)
        .with_upstream_state("confirm")
        .with_renewed_session(tracker.renewed())
    }

    /// Replace an existing leave request with a new one built from the
    /// draft. The delete is irreversible: if the replacement create fails
    /// the outcome says so explicitly rather than hiding the loss.
    pub async fn update(
        &self,
        session: &SessionDescriptor,
        refresh_token: Option<&str>,
        request: &LeaveUpdateRequest,
        today: NaiveDate,
        correlation_id: &str,
    ) -> SagaOutcome {
        let engine = FlowEngine::new(LeaveUpdateFlow);
        let audit_ctx = AuditContext::new(
            Some(request.record_id),
            Some(request.employee_id),
            correlation_id,
            "leave-saga",
        );
        let draft = &request.draft;
        let context = FlowContext {
            missing_required_fields: draft.missing_fields(),
            has_attachments: !draft.attachments.is_empty(),
        };
        let mut tracker = SessionTracker::new(&self.executor, session, refresh_token);
        let mut state = engine.initial_state();

        let read_spec = CallSpec::read(
            "hr.leave",
            &[request.record_id],
            &[
                "employee_id",
                "holiday_status_id",
                "request_date_from",
                "request_date_to",
                "state",
                "number_of_days",
                "supported_attachment_ids",
            ],
        );
        let record = match tracker.call(&read_spec).await {
            Ok(value) => first_record(&value),
            Err(error) => {
                let _ = engine.apply_with_audit(
                    &state,
                    &FlowEvent::UpstreamRejected,
                    &context,
                    &self.audit,
                    &audit_ctx,
                );
                return SagaOutcome::failed(error.message)
                    .with_renewed_session(tracker.renewed());
            }
        };
        // A record owned by someone else reads the same as a missing one.
        let record = match record.filter(|record| owned_by(record, request.employee_id)) {
            Some(record) => record,
            None => {
                let _ = engine.apply_with_audit(
                    &state,
                    &FlowEvent::UpstreamRejected,
                    &context,
                    &self.audit,
                    &audit_ctx,
                );
                return SagaOutcome::failed(NOT_FOUND_MESSAGE)
                    .with_renewed_session(tracker.renewed());
            }
        };

        state = match engine.apply_with_audit(
            &state,
            &FlowEvent::RecordLoaded,
            &context,
            &self.audit,
            &audit_ctx,
        ) {
            Ok(outcome) => outcome.to,
            Err(error) => {
                return transition_failure(error).with_renewed_session(tracker.renewed())
            }
        };

        let upstream_state =
            record.get("state").and_then(Value::as_str).unwrap_or_default().to_owned();
        if TERMINAL_LEAVE_STATES.contains(&upstream_state.as_str()) {
            let _ = engine.apply_with_audit(
                &state,
                &FlowEvent::TerminalStateDetected,
                &context,
                &self.audit,
                &audit_ctx,
            );
            return SagaOutcome::rejected(ALREADY_PROCESSED_MESSAGE)
                .with_upstream_state(upstream_state)
                .with_renewed_session(tracker.renewed());
        }

        if draft.leave_type_name == UNPAID_LEAVE_TYPE {
            // Days held by the original request return to the balance once
            // it is deleted, so they are credited back before the check.
            let original_type = record.get("holiday_status_id").and_then(LinkedRecord::from_value);
            let credit = match original_type {
                Some(link) if link.name == "Annual Leave" => {
                    record.get("number_of_days").and_then(Value::as_f64).unwrap_or(0.0)
                }
                _ => 0.0,
            };
            let decision = self
                .policy
                .is_unpaid_leave_allowed_with_credit(
                    tracker.session(),
                    refresh_token,
                    request.employee_id,
                    today.year(),
                    credit,
                )
                .await;
            tracker.adopt(decision.renewed_session);
            if !decision.allowed {
                let _ = engine.apply_with_audit(
                    &state,
                    &FlowEvent::PolicyDenied,
                    &context,
                    &self.audit,
                    &audit_ctx,
                );
                return SagaOutcome::rejected(UNPAID_LEAVE_DENIAL_MESSAGE)
                    .with_renewed_session(tracker.renewed());
            }
        }

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

        // Attachments die with the parent record, so their payloads are
        // cached before the delete. Best-effort: a failed read only costs
        // the attachments, never the update.
        let cached = self.cache_attachments(&mut tracker, &record).await;
        state = match engine.apply_with_audit(
            &state,
            &FlowEvent::AttachmentsCached,
            &context,
            &self.audit,
            &audit_ctx,
        ) {
            Ok(outcome) => outcome.to,
            Err(error) => {
                return transition_failure(error).with_renewed_session(tracker.renewed())
            }
        };

        let delete_spec = CallSpec::unlink("hr.leave", &[request.record_id]);
        if let Err(error) = tracker.call(&delete_spec).await {
            let _ = engine.apply_with_audit(
                &state,
                &FlowEvent::DeleteRefused,
                &context,
                &self.audit,
                &audit_ctx,
            );
            return SagaOutcome::failed(format!(
                "Failed to delete the existing request: {}",
                error.message
            ))
            .with_renewed_session(tracker.renewed());
        }
        state = match engine.apply_with_audit(
            &state,
            &FlowEvent::OriginalDeleted,
            &context,
            &self.audit,
            &audit_ctx,
        ) {
            Ok(outcome) => outcome.to,
            Err(error) => {
                return transition_failure(error).with_renewed_session(tracker.renewed())
            }
        };

        let create_spec = CallSpec::create("hr.leave", leave_values(request.employee_id, draft));
        let new_id = match tracker.call(&create_spec).await {
            Ok(value) => created_id(&value),
            Err(error) => {
                let _ = engine.apply_with_audit(
                    &state,
                    &FlowEvent::CreateFailedAfterDelete,
                    &context,
                    &self.audit,
                    &audit_ctx,
                );
                return SagaOutcome::failed(format!(
                    "Failed to create new request: {} The old request has been deleted.",
                    error.message
                ))
                .with_renewed_session(tracker.renewed());
            }
        };
        let Some(new_id) = new_id else {
            let _ = engine.apply_with_audit(
                &state,
                &FlowEvent::CreateFailedAfterDelete,
                &context,
                &self.audit,
                &audit_ctx,
            );
            return SagaOutcome::failed(
                "Failed to create new request: the upstream reply carried no record id. \
                 The old request has been deleted.",
            )
            .with_renewed_session(tracker.renewed());
        };
        info!(original_id = request.record_id, new_id, "leave request replaced");

        let mut attachments = cached;
        attachments.extend(draft.attachments.iter().cloned());
        let create_context =
            FlowContext { has_attachments: !attachments.is_empty(), ..context.clone() };
        state = match engine.apply_with_audit(
            &state,
            &FlowEvent::RecordCreated,
            &create_context,
            &self.audit,
            &audit_ctx,
        ) {
            Ok(outcome) => outcome.to,
            Err(error) => {
                return transition_failure(error)
                    .with_created_id(new_id)
                    .with_renewed_session(tracker.renewed())
            }
        };

        if create_context.has_attachments {
            let event = self.upload_attachments(&mut tracker, new_id, &attachments).await;
            let _ =
                engine.apply_with_audit(&state, &event, &create_context, &self.audit, &audit_ctx);
        }

        SagaOutcome::committed(format!(
            "Time off request updated successfully. New request #{new_id} is pending approval."
        ))
        .with_created_id(new_id)
        .with_upstream_state("confirm")
        .with_renewed_session(tracker.renewed())
    }

    /// Cancel a pending leave request: delete when permitted, fall back to
    /// forcing the record back to draft. A request whose start date is today
    /// or earlier is never touched.
    pub async fn cancel(
        &self,
        session: &SessionDescriptor,
        refresh_token: Option<&str>,
        request: &LeaveCancelRequest,
        today: NaiveDate,
        correlation_id: &str,
    ) -> SagaOutcome {
        let engine = FlowEngine::new(LeaveCancelFlow);
        let audit_ctx = AuditContext::new(
            Some(request.record_id),
            Some(request.employee_id),
            correlation_id,
            "leave-saga",
        );
        let context = FlowContext::default();
        let mut tracker = SessionTracker::new(&self.executor, session, refresh_token);
        let mut state = engine.initial_state();

        let read_spec = CallSpec::read(
            "hr.leave",
            &[request.record_id],
            &["employee_id", "request_date_from", "state"],
        );
        let record = match tracker.call(&read_spec).await {
            Ok(value) => first_record(&value),
            Err(error) => {
                let _ = engine.apply_with_audit(
                    &state,
                    &FlowEvent::UpstreamRejected,
                    &context,
                    &self.audit,
                    &audit_ctx,
                );
                return SagaOutcome::failed(error.message)
                    .with_renewed_session(tracker.renewed());
            }
        };
        let record = match record.filter(|record| owned_by(record, request.employee_id)) {
            Some(record) => record,
            None => {
                let _ = engine.apply_with_audit(
                    &state,
                    &FlowEvent::UpstreamRejected,
                    &context,
                    &self.audit,
                    &audit_ctx,
                );
                return SagaOutcome::failed(NOT_FOUND_MESSAGE)
                    .with_renewed_session(tracker.renewed());
            }
        };

        if let Some(start) = date_field(&record, "request_date_from") {
            if start <= today {
                let _ = engine.apply_with_audit(
                    &state,
                    &FlowEvent::LeaveAlreadyStarted,
                    &context,
                    &self.audit,
                    &audit_ctx,
                );
                return SagaOutcome::rejected(CANCEL_STARTED_MESSAGE)
                    .with_renewed_session(tracker.renewed());
            }
        }

        state = match engine.apply_with_audit(
            &state,
            &FlowEvent::CancelAuthorized,
            &context,
            &self.audit,
            &audit_ctx,
        ) {
            Ok(outcome) => outcome.to,
            Err(error) => {
                return transition_failure(error).with_renewed_session(tracker.renewed())
            }
        };

        let delete_spec = CallSpec::unlink("hr.leave", &[request.record_id]);
        match tracker.call(&delete_spec).await {
            Ok(_) => {
                let _ = engine.apply_with_audit(
                    &state,
                    &FlowEvent::OriginalDeleted,
                    &context,
                    &self.audit,
                    &audit_ctx,
                );
                SagaOutcome::committed("Your time off request has been cancelled.")
                    .with_renewed_session(tracker.renewed())
            }
            Err(delete_error) => {
                warn!(record_id = request.record_id, error = %delete_error,
                    "delete refused, reverting leave to draft");
                state = match engine.apply_with_audit(
                    &state,
                    &FlowEvent::DeleteRefused,
                    &context,
                    &self.audit,
                    &audit_ctx,
                ) {
                    Ok(outcome) => outcome.to,
                    Err(error) => {
                        return transition_failure(error)
                            .with_renewed_session(tracker.renewed())
                    }
                };

                let revert_spec = CallSpec::write(
                    "hr.leave",
                    &[request.record_id],
                    json!({"state": "draft"}),
                );
                match tracker.call(&revert_spec).await {
                    Ok(_) => {
                        let _ = engine.apply_with_audit(
                            &state,
                            &FlowEvent::RevertedToDraft,
                            &context,
                            &self.audit,
                            &audit_ctx,
                        );
                        SagaOutcome::committed(
                            "Your time off request could not be deleted, so it was moved back \
                             to draft and will not be submitted for approval.",
                        )
                        .with_upstream_state("draft")
                        .with_renewed_session(tracker.renewed())
                    }
                    Err(revert_error) => {
                        let _ = engine.apply_with_audit(
                            &state,
                            &FlowEvent::UpstreamRejected,
                            &context,
                            &self.audit,
                            &audit_ctx,
                        );
                        SagaOutcome::failed(format!(
                            "Failed to cancel the request: {}",
                            revert_error.message
                        ))
                        .with_renewed_session(tracker.renewed())
                    }
                }
            }
        }
    }

    /// Upload attachments and link them in one batch write. Fails open: a
    /// broken attachment is skipped with a warning, the request stands.
    async fn upload_attachments(
        &self,
        tracker: &mut SessionTracker<'_>,
        record_id: i64,
        attachments: &[AttachmentPayload],
    ) -> FlowEvent {
        let mut ids = Vec::new();
        for attachment in attachments {
            let spec = CallSpec::create(
                "ir.attachment",
                json!({
                    "name": attachment.name,
                    "datas": attachment.base64_data,
                    "mimetype": attachment.mime_type,
                    "res_model": "hr.leave",
                    "res_id": record_id,
                    "type": "binary",
                }),
            );
            match tracker.call(&spec).await {
                Ok(value) => match created_id(&value) {
                    Some(id) => ids.push(id),
                    None => warn!(name = %attachment.name, "attachment create reply had no id"),
                },
                Err(error) => {
                    warn!(name = %attachment.name, %error, "attachment upload failed, skipping");
                }
            }
        }
        if ids.is_empty() {
            return FlowEvent::AttachmentsSkipped;
        }

        let link_spec = CallSpec::write(
            "hr.leave",
            &[record_id],
            json!({"supported_attachment_ids": [[6, 0, ids]]}),
        );
        match tracker.call(&link_spec).await {
            Ok(_) => FlowEvent::AttachmentsLinked,
            Err(error) => {
                warn!(record_id, %error, "attachment link write failed");
                FlowEvent::AttachmentsSkipped
            }
        }
    }

    /// Read the payloads of the record's existing attachments so they can be
    /// recreated against the replacement record.
    async fn cache_attachments(
        &self,
        tracker: &mut SessionTracker<'_>,
        record: &Map<String, Value>,
    ) -> Vec<AttachmentPayload> {
        let ids: Vec<i64> = record
            .get("supported_attachment_ids")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_i64).collect())
            .unwrap_or_default();
        if ids.is_empty() {
            return Vec::new();
        }

        let spec = CallSpec::read("ir.attachment", &ids, &["name", "datas", "mimetype", "type"]);
        let value = match tracker.call(&spec).await {
            Ok(value) => value,
            Err(error) => {
                warn!(%error, "failed to cache existing attachments, proceeding without them");
                return Vec::new();
            }
        };

        value
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .filter_map(|item| {
                let record = item.as_object()?;
                if record.get("type").and_then(Value::as_str) != Some("binary") {
                    return None;
                }
                let data = record.get("datas").and_then(Value::as_str)?;
                if data.is_empty() {
                    return None;
                }
                Some(AttachmentPayload {
                    name: record
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or("supporting-document")
                        .to_owned(),
                    base64_data: data.to_owned(),
                    mime_type: record
                        .get("mimetype")
                        .and_then(Value::as_str)
                        .unwrap_or("application/octet-stream")
                        .to_owned(),
                })
            })
            .collect()
    }
}

/// Build the `hr.leave` create payload from a validated draft.
fn leave_values(employee_id: i64, draft: &LeaveRequestDraft) -> Value {
    let mut values = Map::new();
    values.insert("employee_id".to_owned(), json!(employee_id));
    values.insert("holiday_status_id".to_owned(), json!(draft.leave_type_id));
    values.insert("request_date_from".to_owned(), json!(draft.date_from.to_string()));
    values.insert(
        "name".to_owned(),
        json!(draft.description.clone().unwrap_or_else(|| DEFAULT_DESCRIPTION.to_owned())),
    );
    values.insert("state".to_owned(), json!("confirm"));

    match &draft.custom_hours {
        Some(hours) => {
            // A custom-hour request is always a single day.
            values.insert("request_date_to".to_owned(), json!(draft.date_from.to_string()));
            values.insert("request_unit_hours".to_owned(), json!(true));
            values.insert(
                "request_hour_from".to_owned(),
                json!(hrbridge_core::decimal_hour_field(hours.from)),
            );
            values.insert(
                "request_hour_to".to_owned(),
                json!(hrbridge_core::decimal_hour_field(hours.to)),
            );
        }
        None => {
            values.insert("request_date_to".to_owned(), json!(draft.date_to.to_string()));
        }
    }

    if let Some(relation) = &draft.relation {
        values.insert("x_studio_relation".to_owned(), json!(relation));
    }

    Value::Object(values)
}

/// Create replies arrive as a bare id or a one-element id list.
pub(crate) fn created_id(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| value.as_array()?.first()?.as_i64())
}

/// The first record of a `read` reply, which answers with a list.
pub(crate) fn first_record(value: &Value) -> Option<Map<String, Value>> {
    match value {
        Value::Array(items) => items.first()?.as_object().cloned(),
        Value::Object(map) => Some(map.clone()),
        _ => None,
    }
}

fn owned_by(record: &Map<String, Value>, employee_id: i64) -> bool {
    record
        .get("employee_id")
        .and_then(LinkedRecord::from_value)
        .is_some_and(|link| link.id == employee_id)
}

fn date_field(record: &Map<String, Value>, key: &str) -> Option<NaiveDate> {
    let text = record.get(key)?.as_str()?;
    NaiveDate::parse_from_str(text.get(..10)?, "%Y-%m-%d").ok()
}

pub(crate) fn transition_failure(error: FlowTransitionError) -> SagaOutcome {
    match error {
        FlowTransitionError::MissingRequiredFields { missing_fields, .. } => {
            SagaOutcome::rejected(format!(
                "Missing required fields: {}",
                missing_fields.join(", ")
            ))
        }
        FlowTransitionError::InvalidTransition { .. } => {
            SagaOutcome::failed("the request workflow reached an unexpected state")
        }
    }
}
