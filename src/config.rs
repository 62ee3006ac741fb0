//! Server configuration.
//!
//! Settled once during `initialize`: the snippet flag comes from the client's
//! completion capability and may be overridden (along with the quiet period)
//! through camelCase `initializationOptions`.

use std::time::Duration;

use serde::Deserialize;
use tower_lsp::lsp_types::InitializeParams;
use tracing::warn;

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Whether snippet-style completion items may be returned.
    pub snippet_support: bool,
    /// How long a document must stay quiet before it is re-parsed.
    pub quiet_period: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            snippet_support: false,
            quiet_period: DEFAULT_QUIET_PERIOD,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct InitializationOptions {
    snippet_support: Option<bool>,
    quiet_period_ms: Option<u64>,
}

impl ServerConfig {
    pub fn from_initialize(params: &InitializeParams) -> Self {
        let mut config = ServerConfig::default();

        if let Some(snippet_support) = params
            .capabilities
            .text_document
            .as_ref()
            .and_then(|text_document| text_document.completion.as_ref())
            .and_then(|completion| completion.completion_item.as_ref())
            .and_then(|item| item.snippet_support)
        {
            config.snippet_support = snippet_support;
        }

        if let Some(options) = params.initialization_options.clone() {
            match serde_json::from_value::<InitializationOptions>(options) {
                Ok(options) => {
                    if let Some(snippet_support) = options.snippet_support {
                        config.snippet_support = snippet_support;
                    }
                    if let Some(quiet_period_ms) = options.quiet_period_ms {
                        config.quiet_period = Duration::from_millis(quiet_period_ms);
                    }
                }
                Err(e) => warn!("ignoring malformed initializationOptions: {}", e),
            }
        }

        config
    }
}
