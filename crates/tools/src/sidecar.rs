//! Sidecar process lifecycle.
//!
//! The order-operations server runs as a child process speaking MCP over its
//! stdin/stdout. Its stderr is diagnostic only and is forwarded to the log.

use crate::rpc::RpcClient;
use crate::session::{ClientIdentity, McpSession};
use async_trait::async_trait;
use serde_json::{Map, Value};
use shopdesk_config::SidecarConfig;
use shopdesk_core::error::ToolError;
use shopdesk_core::provider::ToolDefinition;
use shopdesk_core::tool::ToolGateway;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type StdioSession = McpSession<ChildStdin, BufReader<ChildStdout>>;

/// A running, initialized tool sidecar.
pub struct Sidecar {
    session: StdioSession,
    child: Mutex<Child>,
    stderr_drain: Mutex<Option<JoinHandle<()>>>,
    shutdown_timeout: Duration,
}

impl Sidecar {
    /// Launch the sidecar and complete the handshake.
    ///
    /// Any failure here is [`ToolError::Unavailable`]; the service must not
    /// start without its tools.
    pub async fn spawn(config: &SidecarConfig) -> Result<Self, ToolError> {
        let args = config.program_args();
        info!(command = %config.command, ?args, "Starting tool sidecar");

        let mut child = Command::new(&config.command)
            .args(&args)
            .env("JAVA_SHOP_URL", &config.shop_url)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::Unavailable(format!("failed to start {}: {e}", config.command)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ToolError::Unavailable("sidecar stdin was not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ToolError::Unavailable("sidecar stdout was not captured".into()))?;
        let stderr_drain = child.stderr.take().map(|stderr| tokio::spawn(drain_stderr(stderr)));

        let sidecar = Self {
            session: McpSession::new(RpcClient::new(stdin, BufReader::new(stdout))),
            child: Mutex::new(child),
            stderr_drain: Mutex::new(stderr_drain),
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
        };

        if let Err(e) = sidecar.session.initialize(&ClientIdentity::from(config)).await {
            sidecar.shutdown().await;
            return Err(ToolError::Unavailable(format!("handshake failed: {e}")));
        }

        Ok(sidecar)
    }

    /// Close the sidecar's input and wait for it to exit, killing it if it
    /// outlives the shutdown timeout. Exit problems are logged, not returned.
    pub async fn shutdown(&self) {
        if let Err(e) = self.session.close().await {
            debug!(error = %e, "Closing sidecar input failed");
        }

        let mut child = self.child.lock().await;
        match tokio::time::timeout(self.shutdown_timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => info!("Tool sidecar exited"),
            Ok(Ok(status)) => warn!(%status, "Tool sidecar exited abnormally"),
            Ok(Err(e)) => warn!(error = %e, "Waiting for tool sidecar failed"),
            Err(_) => {
                warn!(
                    timeout_secs = self.shutdown_timeout.as_secs(),
                    "Tool sidecar did not exit in time, killing it"
                );
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Killing tool sidecar failed");
                }
            }
        }
        drop(child);

        if let Some(drain) = self.stderr_drain.lock().await.take() {
            if tokio::time::timeout(Duration::from_secs(1), drain).await.is_err() {
                debug!("Sidecar stderr still open after exit");
            }
        }
    }
}

#[async_trait]
impl ToolGateway for Sidecar {
    async fn call_tool(&self, name: &str, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        self.session.call_tool(name, arguments).await
    }

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ToolError> {
        self.session.list_tools().await
    }
}

async fn drain_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => info!(target: "sidecar", "{line}"),
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "Stopped reading sidecar stderr");
                break;
            }
        }
    }
}
