//! LSP protocol handlers.
//!
//! Lifecycle, document synchronization and completion. Document open/change
//! feed the per-URI debounce pipeline; close tears it down; completion runs
//! against the latest document snapshot and the provider registry.

use std::sync::Arc;

use tower_lsp::lsp_types::{
    CompletionList, CompletionOptions, CompletionParams, CompletionResponse,
    DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    DidSaveTextDocumentParams, InitializeParams, InitializeResult, InitializedParams,
    ServerCapabilities, ServerInfo, TextDocumentSyncCapability, TextDocumentSyncKind,
};
use tower_lsp::{LanguageServer, jsonrpc};
use tracing::{debug, info, warn};

use super::state::Backend;
use crate::config::ServerConfig;
use crate::document::LspDocument;
use crate::lsp::features::completion::{CompletionContext, remove_snippets};

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> jsonrpc::Result<InitializeResult> {
        info!("Received initialize: client={:?}", params.client_info);
        *self.config.write() = ServerConfig::from_initialize(&params);

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::INCREMENTAL,
                )),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(
                        [".", ":", "&", "#"].iter().map(|s| s.to_string()).collect(),
                    ),
                    resolve_provider: Some(false),
                    ..Default::default()
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            ..Default::default()
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        info!("initialized");
    }

    async fn shutdown(&self) -> jsonrpc::Result<()> {
        info!("Received shutdown request");
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = params.text_document.version;
        let text = params.text_document.text;
        let id = self.next_document_id();
        let document = Arc::new(LspDocument::new(id, uri.clone(), &text, version));
        self.documents.insert(uri.clone(), document);
        info!("Opened document: URI={}, id={}, version={}", uri, id, version);
        self.enqueue_change(&uri, version, text);
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = params.text_document.version;
        let Some(document) = self.documents.get(&uri).map(|entry| Arc::clone(entry.value()))
        else {
            warn!("Change notification for unknown document: URI={}", uri);
            return;
        };
        match document.apply(params.content_changes, version).await {
            Some(text) => self.enqueue_change(&uri, version, text),
            None => warn!("Failed to apply changes to document with URI={}", uri),
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        // The document was re-parsed on every change; nothing left to do.
        debug!("textDocument/didSave: URI={}", params.text_document.uri);
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.teardown_pipeline(&uri);
        if self.documents.remove(&uri).is_some() {
            info!("Closed document: URI={}", uri);
        } else {
            warn!("Close notification for unknown document: URI={}", uri);
        }
        // Diagnostics keyed by a closed URI are stale for the client.
        self.client.publish_diagnostics(uri, Vec::new(), None).await;
    }

    async fn completion(
        &self,
        params: CompletionParams,
    ) -> jsonrpc::Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;

        // A document close can race an in-flight completion request; answer
        // with an empty list rather than an error.
        let Some(document) = self.documents.get(&uri).map(|entry| Arc::clone(entry.value()))
        else {
            debug!("completion for unknown document: URI={}", uri);
            return Ok(Some(CompletionResponse::Array(Vec::new())));
        };

        let line = document.line_text(position.line).await;
        let line_prefix = document.line_prefix(&position).await;
        let context = CompletionContext::build(uri.clone(), position, line_prefix, &line);

        let items = self.registry.invoke_all(&context, &self.workspace);
        let snippet_support = self.config.read().snippet_support;
        let items = if snippet_support {
            items
        } else {
            remove_snippets(items)
        };
        debug!("Returning {} completion items for {}", items.len(), uri);

        // The list narrows as the user types; clients must re-query rather
        // than treat it as exhaustive.
        Ok(Some(CompletionResponse::List(CompletionList {
            is_incomplete: true,
            items,
        })))
    }
}
