pub mod engine;
pub mod states;

pub use engine::{
    ExpenseSubmitFlow, FlowDefinition, FlowEngine, FlowTransitionError, LeaveCancelFlow,
    LeaveSubmitFlow, LeaveUpdateFlow,
};
pub use states::{FlowAction, FlowContext, FlowEvent, FlowState, FlowType, TransitionOutcome};
