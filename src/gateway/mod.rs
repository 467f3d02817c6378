// Tollgate — Gateway Module
//
// Unix Domain Socket (UDS) server through which the host dispatches
// config, role, and token operations as JSON-RPC 2.0.

mod protocol;
mod uds;

pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use uds::UdsServer;
