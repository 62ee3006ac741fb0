//! Backend state.
//!
//! The `Backend` is cheaply cloneable; every field the spawned pipeline tasks
//! touch sits behind an `Arc`. Per-URI state (documents, pipelines, the
//! indexed-once flags) lives in concurrent maps owned here, not in
//! free-standing globals, so document close can tear its slots down.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tower_lsp::Client;
use tower_lsp::lsp_types::Url;

use crate::config::ServerConfig;
use crate::document::LspDocument;
use crate::lsp::backend::indexing::BackgroundIndexer;
use crate::lsp::features::completion::ProviderRegistry;
use crate::parser::SyntaxEngine;
use crate::workspace::Workspace;

/// One document-changed event. Consumed exactly once by the pipeline for its
/// URI; only the latest event of a burst survives to the parse.
#[derive(Debug, Clone)]
pub(super) struct ChangeEvent {
    pub(super) uri: Url,
    pub(super) version: i32,
    pub(super) text: Arc<String>,
    pub(super) received_at: Instant,
}

/// Collaborators handed to the backend at construction time.
pub struct BackendOptions {
    pub workspace: Arc<Workspace>,
    pub indexer: BackgroundIndexer,
    pub engine: Arc<dyn SyntaxEngine>,
    pub registry: Arc<ProviderRegistry>,
}

#[derive(Clone)]
pub struct Backend {
    pub(super) client: Client,
    pub(super) documents: Arc<DashMap<Url, Arc<LspDocument>>>,
    pub(super) serial_document_id: Arc<AtomicU32>,
    /// Live per-URI pipelines; removing a slot drops the sender and ends the
    /// pipeline task.
    pub(super) pipelines: Arc<DashMap<Url, mpsc::UnboundedSender<ChangeEvent>>>,
    /// URIs whose background index request has been sent. Never reset within
    /// a process lifetime.
    pub(super) index_requested: Arc<DashMap<Url, ()>>,
    pub(super) workspace: Arc<Workspace>,
    pub(super) indexer: BackgroundIndexer,
    pub(super) engine: Arc<dyn SyntaxEngine>,
    pub(super) registry: Arc<ProviderRegistry>,
    pub(super) config: Arc<RwLock<ServerConfig>>,
}

impl Backend {
    pub fn new(client: Client, options: BackendOptions) -> Self {
        Backend {
            client,
            documents: Arc::new(DashMap::new()),
            serial_document_id: Arc::new(AtomicU32::new(0)),
            pipelines: Arc::new(DashMap::new()),
            index_requested: Arc::new(DashMap::new()),
            workspace: options.workspace,
            indexer: options.indexer,
            engine: options.engine,
            registry: options.registry,
            config: Arc::new(RwLock::new(ServerConfig::default())),
        }
    }

    pub(super) fn next_document_id(&self) -> u32 {
        self.serial_document_id.fetch_add(1, Ordering::SeqCst)
    }
}

// Manual Debug since the engine trait object does not implement it.
impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("documents", &self.documents.len())
            .field("pipelines", &self.pipelines.len())
            .field("registry", &self.registry)
            .finish()
    }
}
