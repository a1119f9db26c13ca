//! LSP client communication and protocol handling

pub mod capabilities;
pub mod connection;
pub mod protocol;
pub mod transport;

pub use capabilities::{initialize_params, FeatureRegistry, EDITS_NEAR_CURSOR, SEMANTIC_TOKENS};
pub use connection::LspConnection;
pub use protocol::{
    IncomingMessage, JsonRpcError, JsonRpcHandler, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, RequestId, ServerRequest,
};
