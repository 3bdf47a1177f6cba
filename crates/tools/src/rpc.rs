//! Line-delimited JSON-RPC client over any async byte stream pair.
//!
//! One lock covers the write of a request and the read of its response, so
//! concurrent callers are serialized and their lines never interleave.
//! Each exchange runs on its own task: a caller that gives up waiting does
//! not abandon a half-written line or an unread response.
//! Ids start at 1 and increase by one per request.

use std::sync::Arc;

use crate::protocol::{RpcMessage, RpcRequest, encode_line};
use serde_json::Value;
use shopdesk_core::error::ToolError;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

struct Connection<W, R> {
    writer: W,
    reader: R,
    next_id: u64,
    closed: bool,
}

impl<W, R> Connection<W, R>
where
    W: AsyncWrite + Unpin,
    R: AsyncBufRead + Unpin,
{
    async fn send(&mut self, request: &RpcRequest) -> Result<(), ToolError> {
        if self.closed {
            return Err(ToolError::Transport("connection is closed".into()));
        }
        let line = encode_line(request)?;
        self.writer
            .write_all(&line)
            .await
            .map_err(|e| ToolError::Transport(format!("write: {e}")))?;
        self.writer
            .flush()
            .await
            .map_err(|e| ToolError::Transport(format!("flush: {e}")))
    }

    /// Read the next non-blank line and decode it.
    async fn receive(&mut self) -> Result<RpcMessage, ToolError> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = self
                .reader
                .read_line(&mut line)
                .await
                .map_err(|e| ToolError::Transport(format!("read: {e}")))?;
            if read == 0 {
                return Err(ToolError::Transport("peer closed its output".into()));
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            trace!(line = %trimmed, "rpc <-");
            return serde_json::from_str(trimmed)
                .map_err(|e| ToolError::Protocol(format!("invalid message {trimmed:?}: {e}")));
        }
    }

    async fn exchange(&mut self, method: &str, params: Option<Value>) -> Result<Value, ToolError> {
        let id = self.next_id;
        self.next_id += 1;

        debug!(id, method, "rpc ->");
        self.send(&RpcRequest::request(id, method, params)).await?;

        let message = loop {
            let message = self.receive().await?;
            if !message.is_response() {
                debug!(method = message.method.as_deref().unwrap_or("-"), "Skipping peer message");
                continue;
            }
            if message.response_to(id) {
                break message;
            }
            match message.id.as_ref().and_then(Value::as_u64) {
                Some(stale) if stale < id => {
                    warn!(id, stale, "Skipping stale response");
                }
                _ => {
                    return Err(ToolError::Protocol(format!(
                        "expected response to id {id}, got {}",
                        message.id.unwrap_or(Value::Null)
                    )));
                }
            }
        };

        if let Some(error) = message.error {
            return Err(error.into());
        }
        Ok(message.result.unwrap_or(Value::Null))
    }
}

pub struct RpcClient<W, R> {
    conn: Arc<Mutex<Connection<W, R>>>,
}

impl<W, R> RpcClient<W, R>
where
    W: AsyncWrite + Unpin + Send + 'static,
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(writer: W, reader: R) -> Self {
        Self {
            conn: Arc::new(Mutex::new(Connection {
                writer,
                reader,
                next_id: 1,
                closed: false,
            })),
        }
    }

    /// Send a request and wait for its response.
    ///
    /// Peer notifications and peer-initiated requests arriving in between
    /// are skipped, as are responses to earlier ids. A response carrying a
    /// later or unknown id is a protocol error.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, ToolError> {
        let conn = self.conn.clone();
        let method = method.to_string();
        let exchange = tokio::spawn(async move {
            let mut conn = conn.lock_owned().await;
            conn.exchange(&method, params).await
        });
        exchange
            .await
            .map_err(|e| ToolError::Transport(format!("rpc task failed: {e}")))?
    }

    /// Send a notification. No response is read.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ToolError> {
        let conn = self.conn.clone();
        let notification = RpcRequest::notification(method, params);
        let method = method.to_string();
        let send = tokio::spawn(async move {
            let mut conn = conn.lock_owned().await;
            debug!(method = %method, "rpc -> (notification)");
            conn.send(&notification).await
        });
        send.await
            .map_err(|e| ToolError::Transport(format!("rpc task failed: {e}")))?
    }

    /// Close the write half. Subsequent requests fail with a transport error.
    pub async fn close(&self) -> Result<(), ToolError> {
        let mut conn = self.conn.lock().await;
        if conn.closed {
            return Ok(());
        }
        conn.closed = true;
        conn.writer
            .shutdown()
            .await
            .map_err(|e| ToolError::Transport(format!("close: {e}")))
    }
}
