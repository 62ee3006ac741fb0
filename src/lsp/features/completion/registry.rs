//! Completion provider registry.
//!
//! Providers are registered once, in an explicit order, when the backend is
//! constructed; dispatch walks the same order on every request. A provider
//! failure only silences that provider for the current call.

use anyhow::Result;
use tower_lsp::lsp_types::CompletionItem;
use tracing::warn;

use super::context::CompletionContext;
use crate::workspace::Workspace;

pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Contributes zero or more items for the request. Providers may consult
    /// per-URI workspace state to decide relevance.
    fn provide(
        &self,
        context: &CompletionContext,
        workspace: &Workspace,
    ) -> Result<Vec<CompletionItem>>;
}

#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Box<dyn CompletionProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        ProviderRegistry::default()
    }

    /// Registry preloaded with the built-in providers, in registration order.
    pub fn with_builtins() -> Self {
        use super::providers::{
            BuiltinFunctionProvider, ExCommandProvider, OptionProvider,
            WorkspaceIdentifierProvider,
        };
        let mut registry = ProviderRegistry::new();
        registry.register(Box::new(ExCommandProvider));
        registry.register(Box::new(BuiltinFunctionProvider));
        registry.register(Box::new(WorkspaceIdentifierProvider));
        registry.register(Box::new(OptionProvider));
        registry
    }

    pub fn register(&mut self, provider: Box<dyn CompletionProvider>) {
        self.providers.push(provider);
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Invokes every provider in registration order and concatenates their
    /// items, preserving per-provider order. A provider error is logged and
    /// its contribution is empty for this call; the remaining providers still
    /// run.
    pub fn invoke_all(
        &self,
        context: &CompletionContext,
        workspace: &Workspace,
    ) -> Vec<CompletionItem> {
        let mut items = Vec::new();
        for provider in &self.providers {
            match provider.provide(context, workspace) {
                Ok(mut contributed) => items.append(&mut contributed),
                Err(e) => warn!("completion provider '{}' failed: {:#}", provider.name(), e),
            }
        }
        items
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        f.debug_struct("ProviderRegistry")
            .field("providers", &names)
            .finish()
    }
}
