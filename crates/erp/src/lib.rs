pub mod balance;
pub mod executor;
pub mod options;
pub mod policy;
pub mod rpc;
pub mod sagas;
pub mod transport;
pub mod vault;

pub use balance::{BalanceOutcome, BalanceService};
pub use executor::{CallOutcome, Executor, SharedSessionExecutor};
pub use options::{ExpenseFormOptions, OptionsService};
pub use policy::{PolicyDecision, PolicyGate};
pub use rpc::{authenticate_body, call_kw_body, classify_reply, RawResponse};
pub use sagas::expense::ExpenseSaga;
pub use sagas::leave::{LeaveCancelRequest, LeaveSaga, LeaveUpdateRequest};
pub use transport::{HttpTransport, RpcTransport};
pub use vault::{CredentialVault, InMemoryVault, VaultError};
