use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowType {
    LeaveSubmit,
    LeaveUpdate,
    LeaveCancel,
    ExpenseSubmit,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowState {
    // Shared
    Validating,
    Creating,
    AttachingDocuments,
    Committed,
    Rejected,
    Failed,
    // Replace-based update
    Reading,
    CachingAttachments,
    Deleting,
    // Cancellation fallback
    Reverting,
    // Expense submission
    Created,
    ReportPending,
    Submitted,
    PartiallySubmitted,
}

impl FlowState {
    /// Terminal states end a saga run; no further events are applied.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Committed | Self::Rejected | Self::Failed | Self::Submitted
                | Self::PartiallySubmitted
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    RecordLoaded,
    PolicyCleared,
    PolicyDenied,
    TerminalStateDetected,
    LeaveAlreadyStarted,
    CancelAuthorized,
    AttachmentsCached,
    OriginalDeleted,
    DeleteRefused,
    RevertedToDraft,
    RecordCreated,
    CreateFailedAfterDelete,
    AttachmentsLinked,
    AttachmentsSkipped,
    ProductUnresolved,
    LineSubmitted,
    ReportSubmitted,
    SubmitStateUnverified,
    UpstreamRejected,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    pub missing_required_fields: Vec<String>,
    pub has_attachments: bool,
}

/// Work the saga driver performs on entering the transition's target state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    CreateLeaveRecord,
    UploadAttachments,
    LinkAttachments,
    FetchAttachmentPayloads,
    DeleteOriginal,
    DiscloseOriginalDeleted,
    ForceDraftState,
    CreateExpenseRecord,
    SubmitExpenseLine,
    SubmitExpenseReport,
    VerifySubmissionState,
    ReportPartialSuccess,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: FlowState,
    pub to: FlowState,
    pub event: FlowEvent,
    pub actions: Vec<FlowAction>,
}
