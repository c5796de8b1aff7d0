pub mod audit;
pub mod balance;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod policy;

pub use balance::{
    allocated_by_type, apportioned_days, days_to_hours_minutes, format_remaining_message,
    overlap_days, remaining_for_display, remaining_for_year, remaining_over_window, taken_by_type,
    RemainingBalance,
};
pub use domain::expense::{days_abroad, AnalyticLine, ExpenseCategory, ExpenseDraft};
pub use domain::leave::{
    decimal_hour_field, hour_to_decimal, AttachmentPayload, CustomHours, LeaveAllocation,
    LeaveRequestDraft, LeaveTaken,
};
pub use domain::record::LinkedRecord;
pub use domain::rpc::CallSpec;
pub use domain::saga::SagaOutcome;
pub use domain::session::{SessionDescriptor, VaultCredentials};
pub use errors::{DomainError, UpstreamError, UpstreamErrorKind};
pub use flows::{
    ExpenseSubmitFlow, FlowAction, FlowContext, FlowDefinition, FlowEngine, FlowEvent, FlowState,
    FlowTransitionError, FlowType, LeaveCancelFlow, LeaveSubmitFlow, LeaveUpdateFlow,
    TransitionOutcome,
};
pub use policy::{unpaid_leave_allowed, UNPAID_LEAVE_DENIAL_MESSAGE, UNPAID_LEAVE_THRESHOLD_DAYS};
