//! Completion dispatch building blocks: word/context extraction, the
//! provider registry, and the built-in providers.

pub mod context;
pub mod providers;
pub mod registry;

pub use context::{CompletionContext, ExtractedWord, OPTION_SIGIL, word_at};
pub use registry::{CompletionProvider, ProviderRegistry};

use tower_lsp::lsp_types::{CompletionItem, CompletionItemKind, InsertTextFormat};

/// Drops snippet-style items for clients without snippet support.
pub fn remove_snippets(items: Vec<CompletionItem>) -> Vec<CompletionItem> {
    items
        .into_iter()
        .filter(|item| {
            item.insert_text_format != Some(InsertTextFormat::SNIPPET)
                && item.kind != Some(CompletionItemKind::SNIPPET)
        })
        .collect()
}
