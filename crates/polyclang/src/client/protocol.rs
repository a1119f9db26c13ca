//! JSON-RPC 2.0 message types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{ClientError, Result};

/// Id of a request this client sent
pub type RequestId = u64;

pub const METHOD_NOT_FOUND: i32 = -32601;
pub const REQUEST_CANCELLED: i32 = -32800;

/// Outgoing request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Notification in either direction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Request the server sent to us; its id may be a number or a string
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Response in either direction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Successful reply to a server request
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Error reply to a server request
    pub fn failure(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Numeric id, when this answers one of our requests
    pub fn request_id(&self) -> Option<RequestId> {
        self.id.as_u64()
    }

    /// Convert into the request outcome
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(error) => Err(ClientError::ResponseError {
                code: error.code,
                message: error.message,
            }),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Any message read from the server
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    Response(JsonRpcResponse),
    Request(ServerRequest),
    Notification(JsonRpcNotification),
}

impl IncomingMessage {
    /// Classify and parse a raw message body
    pub fn parse(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| ClientError::ProtocolError(format!("Failed to parse message: {e}")))?;

        let has_method = value.get("method").is_some();
        let has_id = value.get("id").is_some();

        let message = match (has_method, has_id) {
            (true, true) => IncomingMessage::Request(serde_json::from_value(value)?),
            (true, false) => IncomingMessage::Notification(serde_json::from_value(value)?),
            (false, true) => IncomingMessage::Response(serde_json::from_value(value)?),
            (false, false) => {
                return Err(ClientError::ProtocolError(
                    "Message has neither method nor id".to_string(),
                ))
            }
        };
        Ok(message)
    }
}

/// Allocates request ids and builds outgoing messages
pub struct JsonRpcHandler {
    next_id: AtomicU64,
}

impl JsonRpcHandler {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }

    pub fn next_request_id(&self) -> RequestId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn create_request(&self, method: impl Into<String>, params: Option<Value>) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: self.next_request_id(),
            method: method.into(),
            params,
        }
    }

    pub fn create_notification(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
    ) -> JsonRpcNotification {
        JsonRpcNotification {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
        }
    }
}

impl Default for JsonRpcHandler {
    fn default() -> Self {
        Self::new()
    }
}
