use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::states::{FlowAction, FlowContext, FlowEvent, FlowState, FlowType, TransitionOutcome};

pub trait FlowDefinition {
    fn flow_type(&self) -> FlowType;
    fn initial_state(&self) -> FlowState;
    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("missing required fields before transition from {state:?}: {missing_fields:?}")]
    MissingRequiredFields { state: FlowState, missing_fields: Vec<String> },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: FlowState, event: FlowEvent },
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn flow_type(&self) -> FlowType {
        self.flow.flow_type()
    }

    pub fn initial_state(&self) -> FlowState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit.record_id,
                        audit.employee_id,
                        audit.correlation_id.clone(),
                        "flow.transition_applied",
                        AuditCategory::Flow,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", format!("{:?}", outcome.from))
                    .with_metadata("to", format!("{:?}", outcome.to))
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.record_id,
                        audit.employee_id,
                        audit.correlation_id.clone(),
                        "flow.transition_rejected",
                        AuditCategory::Flow,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

/// Leave-request submission: policy check, create, best-effort attachments.
#[derive(Clone, Debug, Default)]
pub struct LeaveSubmitFlow;

impl FlowDefinition for LeaveSubmitFlow {
    fn flow_type(&self) -> FlowType {
        FlowType::LeaveSubmit
    }

    fn initial_state(&self) -> FlowState {
        FlowState::Validating
    }

    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        use FlowAction::{CreateLeaveRecord, LinkAttachments, UploadAttachments};
        use FlowEvent::{
            AttachmentsLinked, AttachmentsSkipped, PolicyCleared, PolicyDenied, RecordCreated,
            UpstreamRejected,
        };
        use FlowState::{AttachingDocuments, Committed, Creating, Failed, Rejected, Validating};

        let (to, actions) = match (current, event) {
            (Validating, PolicyCleared) => {
                require_complete(current, context)?;
                (Creating, vec![CreateLeaveRecord])
            }
            (Validating, PolicyDenied) => (Rejected, Vec::new()),
            (Creating, RecordCreated) if context.has_attachments => {
                (AttachingDocuments, vec![UploadAttachments, LinkAttachments])
            }
            (Creating, RecordCreated) => (Committed, Vec::new()),
            (Creating, UpstreamRejected) => (Failed, Vec::new()),
            // Attachment failures fail open: the leave request is the unit
            // of success.
            (AttachingDocuments, AttachmentsLinked) | (AttachingDocuments, AttachmentsSkipped) => {
                (Committed, Vec::new())
            }
            _ => return Err(invalid(current, event)),
        };

        Ok(TransitionOutcome { from: current.clone(), to, event: event.clone(), actions })
    }
}

/// Replace-based leave update: read, validate, cache attachments, delete the
/// original, recreate. Create failure after the delete is a distinct typed
/// outcome so the irreversible loss is disclosed, never inferred.
#[derive(Clone, Debug, Default)]
pub struct LeaveUpdateFlow;

impl FlowDefinition for LeaveUpdateFlow {
    fn flow_type(&self) -> FlowType {
        FlowType::LeaveUpdate
    }

    fn initial_state(&self) -> FlowState {
        FlowState::Reading
    }

    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        use FlowAction::{
            CreateLeaveRecord, DeleteOriginal, DiscloseOriginalDeleted, FetchAttachmentPayloads,
            LinkAttachments, UploadAttachments,
        };
        use FlowEvent::{
            AttachmentsCached, AttachmentsLinked, AttachmentsSkipped, CreateFailedAfterDelete,
            DeleteRefused, OriginalDeleted, PolicyCleared, PolicyDenied, RecordCreated,
            RecordLoaded, TerminalStateDetected, UpstreamRejected,
        };
        use FlowState::{
            AttachingDocuments, CachingAttachments, Committed, Creating, Deleting, Failed,
            Reading, Rejected, Validating,
        };

        let (to, actions) = match (current, event) {
            (Reading, RecordLoaded) => (Validating, Vec::new()),
            (Reading, UpstreamRejected) => (Failed, Vec::new()),
            (Validating, TerminalStateDetected) | (Validating, PolicyDenied) => {
                (Rejected, Vec::new())
            }
            (Validating, PolicyCleared) => {
                require_complete(current, context)?;
                (CachingAttachments, vec![FetchAttachmentPayloads])
            }
            (CachingAttachments, AttachmentsCached) => (Deleting, vec![DeleteOriginal]),
            (Deleting, OriginalDeleted) => (Creating, vec![CreateLeaveRecord]),
            (Deleting, DeleteRefused) => (Failed, Vec::new()),
            (Creating, RecordCreated) if context.has_attachments => {
                (AttachingDocuments, vec![UploadAttachments, LinkAttachments])
            }
            (Creating, RecordCreated) => (Committed, Vec::new()),
            (Creating, CreateFailedAfterDelete) => (Failed, vec![DiscloseOriginalDeleted]),
            (AttachingDocuments, AttachmentsLinked) | (AttachingDocuments, AttachmentsSkipped) => {
                (Committed, Vec::new())
            }
            _ => return Err(invalid(current, event)),
        };

        Ok(TransitionOutcome { from: current.clone(), to, event: event.clone(), actions })
    }
}

/// Cancellation: delete when possible, fall back to forcing the record back
/// to draft; an already-started leave is rejected outright.
#[derive(Clone, Debug, Default)]
pub struct LeaveCancelFlow;

impl FlowDefinition for LeaveCancelFlow {
    fn flow_type(&self) -> FlowType {
        FlowType::LeaveCancel
    }

    fn initial_state(&self) -> FlowState {
        FlowState::Validating
    }

    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        _context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        use FlowAction::{DeleteOriginal, ForceDraftState};
        use FlowEvent::{
            CancelAuthorized, DeleteRefused, LeaveAlreadyStarted, OriginalDeleted,
            RevertedToDraft, UpstreamRejected,
        };
        use FlowState::{Committed, Deleting, Failed, Rejected, Reverting, Validating};

        let (to, actions) = match (current, event) {
            (Validating, LeaveAlreadyStarted) => (Rejected, Vec::new()),
            (Validating, CancelAuthorized) => (Deleting, vec![DeleteOriginal]),
            (Validating, UpstreamRejected) => (Failed, Vec::new()),
            (Deleting, OriginalDeleted) => (Committed, Vec::new()),
            (Deleting, DeleteRefused) => (Reverting, vec![ForceDraftState]),
            (Reverting, RevertedToDraft) => (Committed, Vec::new()),
            (Reverting, UpstreamRejected) => (Failed, Vec::new()),
            _ => return Err(invalid(current, event)),
        };

        Ok(TransitionOutcome { from: current.clone(), to, event: event.clone(), actions })
    }
}

/// Expense submission: validate and resolve the product, create, then the
/// two-call submit transition with state verification after each call.
#[derive(Clone, Debug, Default)]
pub struct ExpenseSubmitFlow;

impl FlowDefinition for ExpenseSubmitFlow {
    fn flow_type(&self) -> FlowType {
        FlowType::ExpenseSubmit
    }

    fn initial_state(&self) -> FlowState {
        FlowState::Validating
    }

    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        use FlowAction::{
            CreateExpenseRecord, ReportPartialSuccess, SubmitExpenseLine, SubmitExpenseReport,
            VerifySubmissionState,
        };
        use FlowEvent::{
            LineSubmitted, PolicyCleared, PolicyDenied, ProductUnresolved, RecordCreated,
            ReportSubmitted, SubmitStateUnverified, UpstreamRejected,
        };
        use FlowState::{
            Created, Creating, Failed, PartiallySubmitted, Rejected, ReportPending, Submitted,
            Validating,
        };

        let (to, actions) = match (current, event) {
            (Validating, ProductUnresolved) | (Validating, PolicyDenied) => {
                (Rejected, Vec::new())
            }
            (Validating, PolicyCleared) => {
                require_complete(current, context)?;
                (Creating, vec![CreateExpenseRecord])
            }
            (Creating, RecordCreated) => {
                (Created, vec![SubmitExpenseLine, VerifySubmissionState])
            }
            (Creating, UpstreamRejected) => (Failed, Vec::new()),
            (Created, LineSubmitted) => {
                (ReportPending, vec![SubmitExpenseReport, VerifySubmissionState])
            }
            (Created, SubmitStateUnverified) => {
                (PartiallySubmitted, vec![ReportPartialSuccess])
            }
            (Created, UpstreamRejected) => (Failed, Vec::new()),
            (ReportPending, ReportSubmitted) => (Submitted, Vec::new()),
            (ReportPending, SubmitStateUnverified) => {
                (PartiallySubmitted, vec![ReportPartialSuccess])
            }
            (ReportPending, UpstreamRejected) => (Failed, Vec::new()),
            _ => return Err(invalid(current, event)),
        };

        Ok(TransitionOutcome { from: current.clone(), to, event: event.clone(), actions })
    }
}

fn require_complete(state: &FlowState, context: &FlowContext) -> Result<(), FlowTransitionError> {
    if context.missing_required_fields.is_empty() {
        Ok(())
    } else {
        Err(FlowTransitionError::MissingRequiredFields {
            state: state.clone(),
            missing_fields: context.missing_required_fields.clone(),
        })
    }
}

fn invalid(state: &FlowState, event: &FlowEvent) -> FlowTransitionError {
    FlowTransitionError::InvalidTransition { state: state.clone(), event: event.clone() }
}

#[cfg(test)]
mod tests {
    use crate::audit::InMemoryAuditSink;
    use crate::flows::engine::{
        ExpenseSubmitFlow, FlowDefinition, FlowEngine, FlowTransitionError, LeaveCancelFlow,
        LeaveSubmitFlow, LeaveUpdateFlow,
    };
    use crate::flows::states::{FlowAction, FlowContext, FlowEvent, FlowState, FlowType};

    #[test]
    fn leave_submit_happy_path_without_attachments() {
        let engine = FlowEngine::new(LeaveSubmitFlow);
        let context = FlowContext::default();
        let mut state = engine.initial_state();

        state = engine
            .apply(&state, &FlowEvent::PolicyCleared, &context)
            .expect("validating -> creating")
            .to;
        let committed = engine
            .apply(&state, &FlowEvent::RecordCreated, &context)
            .expect("creating -> committed");

        assert_eq!(committed.to, FlowState::Committed);
        assert!(committed.actions.is_empty());
    }

    #[test]
    fn leave_submit_routes_through_attachments_when_present() {
        let engine = FlowEngine::new(LeaveSubmitFlow);
        let context = FlowContext { has_attachments: true, ..FlowContext::default() };

        let creating = engine
            .apply(&FlowState::Validating, &FlowEvent::PolicyCleared, &context)
            .expect("validating -> creating")
            .to;
        let attaching = engine
            .apply(&creating, &FlowEvent::RecordCreated, &context)
            .expect("creating -> attaching");
        assert_eq!(attaching.to, FlowState::AttachingDocuments);
        assert!(attaching.actions.contains(&FlowAction::UploadAttachments));

        // Skipped uploads still commit: attachments are best-effort.
        let committed = engine
            .apply(&attaching.to, &FlowEvent::AttachmentsSkipped, &context)
            .expect("attaching -> committed");
        assert_eq!(committed.to, FlowState::Committed);
    }

    #[test]
    fn leave_submit_policy_denial_is_terminal() {
        let engine = FlowEngine::new(LeaveSubmitFlow);
        let rejected = engine
            .apply(&FlowState::Validating, &FlowEvent::PolicyDenied, &FlowContext::default())
            .expect("validating -> rejected");
        assert_eq!(rejected.to, FlowState::Rejected);
        assert!(rejected.to.is_terminal());
    }

    #[test]
    fn leave_submit_missing_fields_are_rejected() {
        let engine = FlowEngine::new(LeaveSubmitFlow);
        let error = engine
            .apply(
                &FlowState::Validating,
                &FlowEvent::PolicyCleared,
                &FlowContext {
                    missing_required_fields: vec!["date_to".to_owned()],
                    ..FlowContext::default()
                },
            )
            .expect_err("must reject missing fields");
        assert!(matches!(error, FlowTransitionError::MissingRequiredFields { .. }));
    }

    #[test]
    fn leave_update_walks_the_replace_sequence() {
        let engine = FlowEngine::new(LeaveUpdateFlow);
        let context = FlowContext::default();
        let events = [
            FlowEvent::RecordLoaded,
            FlowEvent::PolicyCleared,
            FlowEvent::AttachmentsCached,
            FlowEvent::OriginalDeleted,
            FlowEvent::RecordCreated,
        ];

        let mut state = engine.initial_state();
        assert_eq!(state, FlowState::Reading);
        for event in &events {
            state = engine.apply(&state, event, &context).expect("replace sequence").to;
        }
        assert_eq!(state, FlowState::Committed);
    }

    #[test]
    fn leave_update_create_failure_after_delete_discloses_the_loss() {
        let engine = FlowEngine::new(LeaveUpdateFlow);
        let outcome = engine
            .apply(
                &FlowState::Creating,
                &FlowEvent::CreateFailedAfterDelete,
                &FlowContext::default(),
            )
            .expect("creating -> failed");

        assert_eq!(outcome.to, FlowState::Failed);
        assert_eq!(outcome.actions, vec![FlowAction::DiscloseOriginalDeleted]);
    }

    #[test]
    fn leave_update_rejects_terminal_upstream_states() {
        let engine = FlowEngine::new(LeaveUpdateFlow);
        let outcome = engine
            .apply(
                &FlowState::Validating,
                &FlowEvent::TerminalStateDetected,
                &FlowContext::default(),
            )
            .expect("validating -> rejected");
        assert_eq!(outcome.to, FlowState::Rejected);
    }

    #[test]
    fn cancel_falls_back_to_draft_revert_when_delete_is_refused() {
        let engine = FlowEngine::new(LeaveCancelFlow);
        let context = FlowContext::default();

        let deleting = engine
            .apply(&FlowState::Validating, &FlowEvent::CancelAuthorized, &context)
            .expect("validating -> deleting")
            .to;
        let reverting = engine
            .apply(&deleting, &FlowEvent::DeleteRefused, &context)
            .expect("deleting -> reverting");
        assert_eq!(reverting.actions, vec![FlowAction::ForceDraftState]);

        let committed = engine
            .apply(&reverting.to, &FlowEvent::RevertedToDraft, &context)
            .expect("reverting -> committed");
        assert_eq!(committed.to, FlowState::Committed);
    }

    #[test]
    fn cancel_rejects_started_leave_before_touching_upstream() {
        let engine = FlowEngine::new(LeaveCancelFlow);
        let outcome = engine
            .apply(&FlowState::Validating, &FlowEvent::LeaveAlreadyStarted, &FlowContext::default())
            .expect("validating -> rejected");
        assert_eq!(outcome.to, FlowState::Rejected);
    }

    #[test]
    fn expense_flow_reaches_submitted_through_both_calls() {
        let engine = FlowEngine::new(ExpenseSubmitFlow);
        let context = FlowContext::default();
        let mut state = engine.initial_state();

        for event in [
            FlowEvent::PolicyCleared,
            FlowEvent::RecordCreated,
            FlowEvent::LineSubmitted,
            FlowEvent::ReportSubmitted,
        ] {
            state = engine.apply(&state, &event, &context).expect("submit sequence").to;
        }
        assert_eq!(state, FlowState::Submitted);
    }

    #[test]
    fn expense_flow_unverified_state_is_partial_success_not_failure() {
        let engine = FlowEngine::new(ExpenseSubmitFlow);
        let outcome = engine
            .apply(&FlowState::ReportPending, &FlowEvent::SubmitStateUnverified, &FlowContext::default())
            .expect("report-pending -> partially-submitted");
        assert_eq!(outcome.to, FlowState::PartiallySubmitted);
        assert_eq!(outcome.actions, vec![FlowAction::ReportPartialSuccess]);
        assert!(outcome.to.is_terminal());
    }

    #[test]
    fn expense_flow_unresolvable_product_rejects_before_create() {
        let engine = FlowEngine::new(ExpenseSubmitFlow);
        let outcome = engine
            .apply(&FlowState::Validating, &FlowEvent::ProductUnresolved, &FlowContext::default())
            .expect("validating -> rejected");
        assert_eq!(outcome.to, FlowState::Rejected);
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let engine = FlowEngine::new(ExpenseSubmitFlow);
        let error = engine
            .apply(&FlowState::Validating, &FlowEvent::ReportSubmitted, &FlowContext::default())
            .expect_err("cannot submit a report before creating");
        assert!(matches!(error, FlowTransitionError::InvalidTransition { .. }));
    }

    #[test]
    fn replay_is_deterministic_for_same_event_sequence() {
        let engine = FlowEngine::new(LeaveUpdateFlow);
        let events = [
            FlowEvent::RecordLoaded,
            FlowEvent::PolicyCleared,
            FlowEvent::AttachmentsCached,
            FlowEvent::OriginalDeleted,
            FlowEvent::RecordCreated,
        ];

        let run = |engine: &FlowEngine<LeaveUpdateFlow>| {
            let mut state = engine.initial_state();
            let mut actions = Vec::new();
            for event in &events {
                let outcome =
                    engine.apply(&state, event, &FlowContext::default()).expect("deterministic");
                actions.push(outcome.actions);
                state = outcome.to;
            }
            (state, actions)
        };

        assert_eq!(run(&engine), run(&engine));
        assert_eq!(engine.flow_type(), FlowType::LeaveUpdate);
        assert_eq!(LeaveUpdateFlow.flow_type(), FlowType::LeaveUpdate);
    }

    #[test]
    fn flow_transition_emits_audit_event() {
        let engine = FlowEngine::new(LeaveSubmitFlow);
        let sink = InMemoryAuditSink::default();

        let _ = engine
            .apply_with_audit(
                &FlowState::Validating,
                &FlowEvent::PolicyCleared,
                &FlowContext::default(),
                &sink,
                &crate::audit::AuditContext::new(None, Some(42), "req-7", "leave-saga"),
            )
            .expect("transition should succeed");

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].correlation_id, "req-7");
        assert_eq!(events[0].event_type, "flow.transition_applied");
    }
}
