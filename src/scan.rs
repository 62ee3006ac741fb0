//! Out-of-process project scanner.
//!
//! The server re-executes its own binary with `--scan-worker` and speaks a
//! line-delimited JSON protocol over the child's stdio: one `ScanRequest` per
//! line inbound, `WorkerMessage` lines outbound. The worker never writes
//! tracing output to stdout; its log lines travel inside the protocol and are
//! re-emitted by the foreground process.

use std::collections::HashSet;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use walkdir::WalkDir;

use crate::parser::SyntaxEngine;
use crate::symbols::SymbolNode;

/// Fire-and-forget scan request: scan the project containing this document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    pub uri: Url,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanData {
    pub uri: Url,
    pub node: SymbolNode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerLogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerLog {
    pub level: WorkerLogLevel,
    pub message: String,
}

/// One worker reply line: symbol data, a log record, or both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ScanData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<WorkerLog>,
}

impl WorkerMessage {
    pub fn data(uri: Url, node: SymbolNode) -> Self {
        WorkerMessage {
            data: Some(ScanData { uri, node }),
            log: None,
        }
    }

    pub fn log(level: WorkerLogLevel, message: impl Into<String>) -> Self {
        WorkerMessage {
            data: None,
            log: Some(WorkerLog {
                level,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("could not encode worker message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Blocking request loop for the worker process. Returns when stdin closes,
/// i.e. when the parent exits or drops the channel.
pub fn run_worker(engine: &dyn SyntaxEngine) -> Result<(), WorkerError> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut scanned_roots: HashSet<PathBuf> = HashSet::new();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let request: ScanRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                emit(
                    &mut out,
                    &WorkerMessage::log(
                        WorkerLogLevel::Warn,
                        format!("dropping malformed scan request: {}", e),
                    ),
                )?;
                continue;
            }
        };
        handle_request(engine, &request, &mut scanned_roots, &mut out)?;
    }
    Ok(())
}

fn handle_request(
    engine: &dyn SyntaxEngine,
    request: &ScanRequest,
    scanned_roots: &mut HashSet<PathBuf>,
    out: &mut impl Write,
) -> Result<(), WorkerError> {
    let Ok(path) = request.uri.to_file_path() else {
        emit(
            out,
            &WorkerMessage::log(
                WorkerLogLevel::Warn,
                format!("not a file uri, skipping scan: {}", request.uri),
            ),
        )?;
        return Ok(());
    };

    let root = project_root(&path);
    // One scan per project root per worker lifetime; repeat anchors are cheap no-ops.
    if !scanned_roots.insert(root.clone()) {
        return Ok(());
    }

    emit(
        out,
        &WorkerMessage::log(WorkerLogLevel::Info, format!("scanning {}", root.display())),
    )?;
    let results = scan_project(engine, &root);
    let file_count = results.len();
    for message in results {
        emit(out, &message)?;
    }
    emit(
        out,
        &WorkerMessage::log(
            WorkerLogLevel::Info,
            format!("scanned {} files under {}", file_count, root.display()),
        ),
    )?;
    Ok(())
}

/// Nearest ancestor holding a `.git` marker, else the file's own directory.
pub fn project_root(path: &Path) -> PathBuf {
    let start = if path.is_dir() {
        path
    } else {
        path.parent().unwrap_or(path)
    };
    for dir in start.ancestors() {
        if dir.join(".git").exists() {
            return dir.to_path_buf();
        }
    }
    start.to_path_buf()
}

/// Parses every `*.vim` file under `root` into one data message each.
/// Unreadable or unparsable files become log messages, not failures.
pub fn scan_project(engine: &dyn SyntaxEngine, root: &Path) -> Vec<WorkerMessage> {
    let mut messages = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().is_file() || !path.extension().map_or(false, |ext| ext == "vim") {
            continue;
        }
        let Ok(uri) = Url::from_file_path(path) else {
            continue;
        };
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                messages.push(WorkerMessage::log(
                    WorkerLogLevel::Warn,
                    format!("could not read {}: {}", path.display(), e),
                ));
                continue;
            }
        };
        match engine.parse(&uri, &text) {
            Ok(outcome) => messages.push(WorkerMessage::data(uri, outcome.root)),
            Err(e) => messages.push(WorkerMessage::log(
                WorkerLogLevel::Warn,
                format!("could not parse {}: {:#}", path.display(), e),
            )),
        }
    }
    messages
}

fn emit(out: &mut impl Write, message: &WorkerMessage) -> Result<(), WorkerError> {
    serde_json::to_writer(&mut *out, message)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}
