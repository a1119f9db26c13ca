//! JSON-RPC connection to one server process

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{broadcast, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::protocol::{
    IncomingMessage, JsonRpcHandler, JsonRpcResponse, RequestId, ServerRequest, METHOD_NOT_FOUND,
};
use super::transport::{read_message, write_message};
use crate::error::{ClientError, Result};

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A request awaiting its response
struct PendingRequest {
    method: String,
    response_tx: oneshot::Sender<Result<Value>>,
}

/// Shared between the connection and its reader task
struct Shared {
    pending: RwLock<HashMap<RequestId, PendingRequest>>,
    writer: Mutex<BoxedWriter>,
    notification_tx: broadcast::Sender<(String, Option<Value>)>,
    closed: AtomicBool,
}

impl Shared {
    async fn send(&self, message: &impl serde::Serialize) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::ConnectionClosed);
        }
        let body = serde_json::to_vec(message)?;
        let mut writer = self.writer.lock().await;
        write_message(&mut *writer, &body).await
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut pending = self.pending.write().await;
        for (id, request) in pending.drain() {
            trace!(id, method = %request.method, "Failing request on closed connection");
            let _ = request.response_tx.send(Err(ClientError::ConnectionClosed));
        }
    }
}

/// Request/response correlation and notification fan-out over a framed
/// byte stream.
///
/// A background task reads the server's output; dropping the connection
/// or calling [`LspConnection::close`] stops it.
pub struct LspConnection {
    handler: JsonRpcHandler,
    shared: Arc<Shared>,
    request_timeout: Duration,
    reader_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl LspConnection {
    /// Start a connection over `reader` (server output) and `writer`
    /// (server input).
    pub fn start<R, W>(reader: R, writer: W, request_timeout: Duration) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (notification_tx, _) = broadcast::channel(100);
        let shared = Arc::new(Shared {
            pending: RwLock::new(HashMap::new()),
            writer: Mutex::new(Box::new(writer)),
            notification_tx,
            closed: AtomicBool::new(false),
        });

        let task = tokio::spawn(read_loop(BufReader::new(reader), shared.clone()));

        Self {
            handler: JsonRpcHandler::new(),
            shared,
            request_timeout,
            reader_task: parking_lot::Mutex::new(Some(task)),
        }
    }

    /// Send a request and wait for its response
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let request = self.handler.create_request(method, params);
        let id = request.id;
        let (tx, rx) = oneshot::channel();

        self.shared.pending.write().await.insert(
            id,
            PendingRequest {
                method: method.to_string(),
                response_tx: tx,
            },
        );

        if let Err(e) = self.shared.send(&request).await {
            self.shared.pending.write().await.remove(&id);
            return Err(e);
        }
        trace!(id, method, "Request sent");

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => {
                self.shared.pending.write().await.remove(&id);
                let _ = self.notify("$/cancelRequest", Some(json!({ "id": id }))).await;
                warn!(id, method, "Request timed out");
                Err(ClientError::Timeout {
                    timeout_ms: self.request_timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Send a notification
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let notification = self.handler.create_notification(method, params);
        self.shared.send(&notification).await
    }

    /// Subscribe to server notifications
    pub fn subscribe_notifications(&self) -> broadcast::Receiver<(String, Option<Value>)> {
        self.shared.notification_tx.subscribe()
    }

    /// Number of requests still awaiting a response
    pub async fn pending_request_count(&self) -> usize {
        self.shared.pending.read().await.len()
    }

    /// Whether the server side has gone away
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Stop reading and fail every outstanding request
    pub async fn close(&self) {
        if let Some(task) = self.reader_task.lock().take() {
            task.abort();
        }
        self.shared.close().await;
    }
}

impl Drop for LspConnection {
    fn drop(&mut self) {
        if let Some(task) = self.reader_task.lock().take() {
            task.abort();
        }
    }
}

async fn read_loop<R>(mut reader: BufReader<R>, shared: Arc<Shared>)
where
    R: AsyncRead + Unpin,
{
    loop {
        let body = match read_message(&mut reader).await {
            Ok(Some(body)) => body,
            Ok(None) => {
                debug!("Server closed its output");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read from server");
                break;
            }
        };

        match IncomingMessage::parse(&body) {
            Ok(IncomingMessage::Response(response)) => dispatch_response(&shared, response).await,
            Ok(IncomingMessage::Request(request)) => {
                let reply = answer_server_request(&request);
                if let Err(e) = shared.send(&reply).await {
                    warn!(method = %request.method, error = %e, "Failed to answer server request");
                }
            }
            Ok(IncomingMessage::Notification(notification)) => {
                trace!(method = %notification.method, "Notification received");
                let _ = shared
                    .notification_tx
                    .send((notification.method, notification.params));
            }
            Err(e) => warn!(error = %e, "Dropping malformed message from server"),
        }
    }

    shared.close().await;
}

async fn dispatch_response(shared: &Shared, response: JsonRpcResponse) {
    let Some(id) = response.request_id() else {
        warn!(id = %response.id, "Response with non-numeric id");
        return;
    };

    match shared.pending.write().await.remove(&id) {
        Some(pending) => {
            trace!(id, method = %pending.method, "Response received");
            let _ = pending.response_tx.send(response.into_result());
        }
        None => debug!(id, "Response for unknown or timed-out request"),
    }
}

/// Replies for the few server-to-client requests a minimal client handles
fn answer_server_request(request: &ServerRequest) -> JsonRpcResponse {
    match request.method.as_str() {
        "workspace/configuration" => {
            let count = request
                .params
                .as_ref()
                .and_then(|p| p.get("items"))
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            JsonRpcResponse::success(request.id.clone(), Value::Array(vec![Value::Null; count]))
        }
        "window/workDoneProgress/create" | "client/registerCapability" => {
            JsonRpcResponse::success(request.id.clone(), Value::Null)
        }
        other => {
            debug!(method = other, "Unsupported server request");
            JsonRpcResponse::failure(
                request.id.clone(),
                METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            )
        }
    }
}
