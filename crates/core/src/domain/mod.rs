pub mod expense;
pub mod leave;
pub mod record;
pub mod rpc;
pub mod saga;
pub mod session;
