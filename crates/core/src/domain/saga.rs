use crate::domain::session::SessionDescriptor;
use crate::flows::FlowState;

/// Terminal result of a saga run, handed back to the conversation layer.
/// `message` is user-facing; `renewed_session` must be persisted by the
/// caller when present.
#[derive(Clone, Debug)]
pub struct SagaOutcome {
    pub success: bool,
    pub created_id: Option<i64>,
    pub final_state: FlowState,
    /// Upstream record state as last observed, when the saga read one.
    pub upstream_state: Option<String>,
    pub renewed_session: Option<SessionDescriptor>,
    pub message: String,
}

impl SagaOutcome {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            created_id: None,
            final_state: FlowState::Rejected,
            upstream_state: None,
            renewed_session: None,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            created_id: None,
            final_state: FlowState::Failed,
            upstream_state: None,
            renewed_session: None,
            message: message.into(),
        }
    }

    pub fn committed(message: impl Into<String>) -> Self {
        Self {
            success: true,
            created_id: None,
            final_state: FlowState::Committed,
            upstream_state: None,
            renewed_session: None,
            message: message.into(),
        }
    }

    pub fn with_created_id(mut self, id: i64) -> Self {
        self.created_id = Some(id);
        self
    }

    pub fn with_upstream_state(mut self, state: impl Into<String>) -> Self {
        self.upstream_state = Some(state.into());
        self
    }

    pub fn with_final_state(mut self, state: FlowState) -> Self {
        self.final_state = state;
        self
    }

    pub fn with_renewed_session(mut self, session: Option<SessionDescriptor>) -> Self {
        self.renewed_session = session;
        self
    }
}
