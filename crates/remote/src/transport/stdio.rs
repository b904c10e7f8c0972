//! Child-process transport: newline-delimited JSON-RPC over stdin/stdout.

use super::{Pending, RemoteTransport, Result, protocol_error};
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use agentexec_core::error::RemoteToolError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct StdioTransport {
    alias: String,
    outgoing: mpsc::Sender<String>,
    pending: Pending,
    child: Mutex<Option<Child>>,
    request_timeout: Duration,
    shutdown: CancellationToken,
}

/// How to launch the server process.
#[derive(Debug, Clone)]
pub struct StdioCommand {
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
}

impl StdioTransport {
    pub fn spawn(alias: &str, launch: &StdioCommand, request_timeout: Duration) -> Result<Self> {
        let mut cmd = Command::new(&launch.command);
        cmd.args(&launch.args)
            .envs(&launch.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &launch.cwd {
            cmd.current_dir(cwd);
        }

        let connection = |cause: String| RemoteToolError::Connection {
            alias: alias.to_string(),
            cause,
        };
        let mut child = cmd
            .spawn()
            .map_err(|e| connection(format!("failed to start '{}': {e}", launch.command)))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| connection("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| connection("child stdout unavailable".into()))?;
        let stderr = child.stderr.take();

        let pending = Pending::default();
        let shutdown = CancellationToken::new();
        let (outgoing, mut rx) = mpsc::channel::<String>(64);

        // --- Writer ---
        let writer_alias = alias.to_string();
        tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                if let Err(e) = stdin.write_all(line.as_bytes()).await {
                    warn!(alias = %writer_alias, error = %e, "Failed to write to remote tool server");
                    break;
                }
                if let Err(e) = stdin.write_all(b"\n").await {
                    warn!(alias = %writer_alias, error = %e, "Failed to write to remote tool server");
                    break;
                }
                if stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        // --- Reader ---
        let reader_alias = alias.to_string();
        let reader_pending = pending.clone();
        let reader_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                let line = tokio::select! {
                    _ = reader_shutdown.cancelled() => break,
                    line = lines.next_line() => line,
                };
                match line {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => match serde_json::from_str::<JsonRpcResponse>(&line) {
                        Ok(response) => reader_pending.resolve(response).await,
                        Err(e) => {
                            debug!(alias = %reader_alias, error = %e, "Skipping non-response line")
                        }
                    },
                    Ok(None) | Err(_) => break,
                }
            }
            reader_pending.fail_all().await;
        });

        if let Some(stderr) = stderr {
            let stderr_alias = alias.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(alias = %stderr_alias, line = %line, "Remote tool server stderr");
                }
            });
        }

        Ok(Self {
            alias: alias.to_string(),
            outgoing,
            pending,
            child: Mutex::new(Some(child)),
            request_timeout,
            shutdown,
        })
    }

    fn closed(&self) -> RemoteToolError {
        RemoteToolError::Connection {
            alias: self.alias.clone(),
            cause: "server process closed the connection".into(),
        }
    }

    async fn send_line(&self, line: String) -> Result<()> {
        self.outgoing.send(line).await.map_err(|_| self.closed())
    }
}

#[async_trait]
impl RemoteTransport for StdioTransport {
    async fn request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        let id = request.id;
        let line = serde_json::to_string(&request)
            .map_err(|e| protocol_error(&self.alias, e.to_string()))?;
        let rx = self.pending.register(id).await;
        if let Err(e) = self.send_line(line).await {
            self.pending.forget(id).await;
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(self.closed()),
            Err(_) => {
                self.pending.forget(id).await;
                Err(RemoteToolError::Timeout {
                    alias: self.alias.clone(),
                })
            }
        }
    }

    async fn notify(&self, notification: JsonRpcNotification) -> Result<()> {
        let line = serde_json::to_string(&notification)
            .map_err(|e| protocol_error(&self.alias, e.to_string()))?;
        self.send_line(line).await
    }

    async fn close(&self) {
        self.shutdown.cancel();
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                debug!(alias = %self.alias, error = %e, "Remote tool server already exited");
            }
        }
        self.pending.fail_all().await;
    }
}
