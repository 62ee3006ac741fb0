//! Background indexer bridge.
//!
//! The scan worker is this same binary re-executed with `--scan-worker`,
//! started once at process startup. Requests are fire-and-forget; replies
//! arrive asynchronously and never block the foreground pipeline. A worker
//! fault disables background indexing for the rest of the process: the
//! worker is not restarted and dropped requests are not retried.

use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_stream::wrappers::LinesStream;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::scan::{ScanRequest, WorkerLogLevel, WorkerMessage};
use crate::workspace::Workspace;

#[derive(Debug, Clone)]
pub struct BackgroundIndexer {
    requests: mpsc::UnboundedSender<ScanRequest>,
}

impl BackgroundIndexer {
    /// A handle plus the raw request stream it feeds. `spawn` wires the
    /// stream to a worker process; embedders can consume it directly instead.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ScanRequest>) {
        let (requests, rx) = mpsc::unbounded_channel();
        (BackgroundIndexer { requests }, rx)
    }

    /// Starts the scan worker process and the two bridge tasks: one writing
    /// request lines to the child's stdin, one applying reply lines from its
    /// stdout to the workspace.
    pub fn spawn(workspace: Arc<Workspace>) -> Result<Self> {
        let exe = std::env::current_exe().context("locating server executable")?;
        let mut child = Command::new(&exe)
            .arg("--scan-worker")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning scan worker {:?}", exe))?;
        let mut stdin = child
            .stdin
            .take()
            .context("scan worker stdin unavailable")?;
        let stdout = child
            .stdout
            .take()
            .context("scan worker stdout unavailable")?;
        let (handle, mut requests) = Self::channel();

        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                let mut line = match serde_json::to_string(&request) {
                    Ok(line) => line,
                    Err(e) => {
                        error!("could not encode scan request: {}", e);
                        continue;
                    }
                };
                line.push('\n');
                if let Err(e) = stdin.write_all(line.as_bytes()).await {
                    error!("scan worker stdin closed: {}", e);
                    break;
                }
            }
        });

        tokio::spawn(async move {
            let mut lines = LinesStream::new(BufReader::new(stdout).lines());
            while let Some(line) = lines.next().await {
                match line {
                    Ok(line) if line.trim().is_empty() => continue,
                    Ok(line) => match serde_json::from_str::<WorkerMessage>(&line) {
                        Ok(message) => apply_worker_message(&workspace, message),
                        Err(e) => warn!("malformed scan worker message: {}", e),
                    },
                    Err(e) => {
                        error!("scan worker pipe error: {}", e);
                        break;
                    }
                }
            }
            match child.wait().await {
                Ok(status) => error!(
                    "scan worker exited ({}); background indexing disabled",
                    status
                ),
                Err(e) => error!("scan worker wait failed: {}", e),
            }
        });

        info!("scan worker started");
        Ok(handle)
    }

    /// Fire-and-forget. With the worker gone the request is dropped with a
    /// warning; the foreground keeps running.
    pub fn request_scan(&self, uri: &Url) {
        let request = ScanRequest { uri: uri.clone() };
        if self.requests.send(request).is_err() {
            warn!(
                "background indexing unavailable; dropping scan request for {}",
                uri
            );
        }
    }
}

/// Applies one inbound worker message. Symbol data fills empty workspace
/// slots only; a foreground parse that got there first wins. Log records
/// are re-emitted through the server's own subscriber.
pub fn apply_worker_message(workspace: &Workspace, message: WorkerMessage) {
    if let Some(data) = message.data {
        if workspace.install_if_absent(data.uri.clone(), data.node) {
            debug!("installed background symbols for {}", data.uri);
        } else {
            debug!("foreground state already present for {}", data.uri);
        }
    }
    if let Some(log) = message.log {
        match log.level {
            WorkerLogLevel::Info => info!("scan worker: {}", log.message),
            WorkerLogLevel::Warn => warn!("scan worker: {}", log.message),
            WorkerLogLevel::Error => error!("scan worker: {}", log.message),
        }
    }
}
