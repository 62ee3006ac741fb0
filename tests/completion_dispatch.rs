//! End-to-end behaviour of the backend: completion dispatch, the debounced
//! re-parse pipeline, indexed-once triggering, and document lifecycle.
//!
//! The backend is driven in-process through `LspService`; the client socket
//! is dropped up front so outbound notifications fail fast instead of
//! buffering.

use std::sync::Arc;
use std::time::Duration;

use indoc::indoc;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tower_lsp::lsp_types::{
    CompletionItem, CompletionParams, CompletionResponse, DidChangeTextDocumentParams,
    DidCloseTextDocumentParams, DidOpenTextDocumentParams, InitializeParams, InsertTextFormat,
    PartialResultParams, Position, TextDocumentContentChangeEvent, TextDocumentIdentifier,
    TextDocumentItem, TextDocumentPositionParams, Url, VersionedTextDocumentIdentifier,
    WorkDoneProgressParams,
};
use tower_lsp::{LanguageServer, LspService};

use vimscript_language_server::lsp::backend::{Backend, BackendOptions, BackgroundIndexer};
use vimscript_language_server::lsp::features::completion::ProviderRegistry;
use vimscript_language_server::parser::VimscriptEngine;
use vimscript_language_server::scan::ScanRequest;
use vimscript_language_server::workspace::Workspace;

struct Harness {
    service: LspService<Backend>,
    workspace: Arc<Workspace>,
    scan_requests: mpsc::UnboundedReceiver<ScanRequest>,
}

impl Harness {
    fn new() -> Self {
        let workspace = Arc::new(Workspace::new());
        let (indexer, scan_requests) = BackgroundIndexer::channel();
        let options = BackendOptions {
            workspace: Arc::clone(&workspace),
            indexer,
            engine: Arc::new(VimscriptEngine::new()),
            registry: Arc::new(ProviderRegistry::with_builtins()),
        };
        let (service, socket) = LspService::new(move |client| Backend::new(client, options));
        drop(socket);
        Harness {
            service,
            workspace,
            scan_requests,
        }
    }

    fn backend(&self) -> &Backend {
        self.service.inner()
    }

    async fn initialize(&self, options: serde_json::Value) {
        let params = InitializeParams {
            initialization_options: Some(options),
            ..Default::default()
        };
        self.backend().initialize(params).await.unwrap();
    }

    async fn open(&self, uri: &Url, text: &str, version: i32) {
        self.backend()
            .did_open(DidOpenTextDocumentParams {
                text_document: TextDocumentItem {
                    uri: uri.clone(),
                    language_id: "vim".to_string(),
                    version,
                    text: text.to_string(),
                },
            })
            .await;
    }

    async fn change_all(&self, uri: &Url, text: &str, version: i32) {
        self.backend()
            .did_change(DidChangeTextDocumentParams {
                text_document: VersionedTextDocumentIdentifier {
                    uri: uri.clone(),
                    version,
                },
                content_changes: vec![TextDocumentContentChangeEvent {
                    range: None,
                    range_length: None,
                    text: text.to_string(),
                }],
            })
            .await;
    }

    async fn close(&self, uri: &Url) {
        self.backend()
            .did_close(DidCloseTextDocumentParams {
                text_document: TextDocumentIdentifier { uri: uri.clone() },
            })
            .await;
    }

    async fn complete(&self, uri: &Url, line: u32, character: u32) -> CompletionResponse {
        self.backend()
            .completion(CompletionParams {
                text_document_position: TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier { uri: uri.clone() },
                    position: Position::new(line, character),
                },
                work_done_progress_params: WorkDoneProgressParams::default(),
                partial_result_params: PartialResultParams::default(),
                context: None,
            })
            .await
            .unwrap()
            .expect("completion always answers")
    }

    async fn complete_items(&self, uri: &Url, line: u32, character: u32) -> Vec<CompletionItem> {
        match self.complete(uri, line, character).await {
            CompletionResponse::List(list) => list.items,
            CompletionResponse::Array(items) => items,
        }
    }

    /// Polls until the workspace holds a buffer for `uri` containing the
    /// named symbol.
    async fn wait_for_symbol(&self, uri: &Url, name: &str) {
        for _ in 0..100 {
            if let Some(buffer) = self.workspace.buffer(uri) {
                if buffer.named_symbols().any(|s| s.name == name) {
                    return;
                }
            }
            sleep(Duration::from_millis(20)).await;
        }
        panic!("symbol {} never appeared for {}", name, uri);
    }
}

fn uri(path: &str) -> Url {
    Url::parse(&format!("file:///plugin/{}", path)).unwrap()
}

fn fast_options() -> serde_json::Value {
    json!({ "quietPeriodMs": 10 })
}

#[tokio::test]
async fn unknown_document_yields_empty_list_not_error() {
    let harness = Harness::new();
    harness.initialize(fast_options()).await;

    let items = harness.complete_items(&uri("ghost.vim"), 0, 0).await;
    assert!(items.is_empty());
}

#[tokio::test]
async fn completion_list_is_always_incomplete() {
    let harness = Harness::new();
    harness.initialize(fast_options()).await;
    let doc = uri("list.vim");
    harness.open(&doc, "fun", 1).await;

    match harness.complete(&doc, 0, 3).await {
        CompletionResponse::List(list) => {
            assert!(list.is_incomplete);
            assert!(!list.items.is_empty());
        }
        CompletionResponse::Array(_) => panic!("expected a list response"),
    }
}

#[tokio::test]
async fn snippet_items_follow_the_configuration_flag() {
    let is_snippet = |item: &CompletionItem| {
        item.insert_text_format == Some(InsertTextFormat::SNIPPET)
    };

    let harness = Harness::new();
    harness
        .initialize(json!({ "snippetSupport": false, "quietPeriodMs": 10 }))
        .await;
    let doc = uri("nosnippets.vim");
    harness.open(&doc, "fun", 1).await;
    let items = harness.complete_items(&doc, 0, 3).await;
    assert!(!items.is_empty());
    assert!(items.iter().all(|item| !is_snippet(item)));

    let harness = Harness::new();
    harness
        .initialize(json!({ "snippetSupport": true, "quietPeriodMs": 10 }))
        .await;
    let doc = uri("snippets.vim");
    harness.open(&doc, "fun", 1).await;
    let items = harness.complete_items(&doc, 0, 3).await;
    assert!(items.iter().any(is_snippet));
}

#[tokio::test]
async fn completion_sees_symbols_from_the_reparse_pipeline() {
    let harness = Harness::new();
    harness.initialize(fast_options()).await;
    let doc = uri("symbols.vim");
    let text = indoc! {r#"
        function! s:greet() abort
          return 'hi'
        endfunction
        call s:gr
    "#};
    harness.open(&doc, text, 1).await;
    harness.wait_for_symbol(&doc, "s:greet").await;

    let items = harness.complete_items(&doc, 3, 9).await;
    assert!(items.iter().any(|item| item.label == "s:greet"));
}

#[tokio::test]
async fn background_index_is_requested_once_per_uri() {
    let mut harness = Harness::new();
    harness.initialize(fast_options()).await;
    let doc = uri("indexed.vim");

    harness.open(&doc, "let g:one = 1\n", 1).await;
    harness.wait_for_symbol(&doc, "g:one").await;
    harness.change_all(&doc, "let g:two = 2\n", 2).await;
    harness.wait_for_symbol(&doc, "g:two").await;
    harness.change_all(&doc, "let g:three = 3\n", 3).await;
    harness.wait_for_symbol(&doc, "g:three").await;

    let first = tokio::time::timeout(Duration::from_secs(2), harness.scan_requests.recv())
        .await
        .expect("scan request within deadline")
        .expect("channel open");
    assert_eq!(first.uri, doc);
    sleep(Duration::from_millis(100)).await;
    assert!(
        harness.scan_requests.try_recv().is_err(),
        "repeat parses must not re-request indexing"
    );
}

#[tokio::test]
async fn close_mid_flight_then_reopen_starts_a_fresh_pipeline() {
    let mut harness = Harness::new();
    harness.initialize(fast_options()).await;
    let doc = uri("lifecycle.vim");

    // Close while the first parse is still pending inside the quiet period.
    harness.open(&doc, "let g:first = 1\n", 1).await;
    harness.close(&doc).await;

    harness.open(&doc, "let g:second = 2\n", 1).await;
    harness.wait_for_symbol(&doc, "g:second").await;

    // The reopened document answers completion from its fresh parse.
    let items = harness.complete_items(&doc, 0, 9).await;
    assert!(items.iter().any(|item| item.label == "g:second"));

    // The indexed-once flag spans close/reopen: one request in total.
    let first = tokio::time::timeout(Duration::from_secs(2), harness.scan_requests.recv())
        .await
        .expect("scan request within deadline")
        .expect("channel open");
    assert_eq!(first.uri, doc);
    sleep(Duration::from_millis(100)).await;
    assert!(harness.scan_requests.try_recv().is_err());
}
