use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tower_lsp::{LspService, Server};
use tracing::{error, info};

use vimscript_language_server::lsp::backend::{Backend, BackendOptions, BackgroundIndexer};
use vimscript_language_server::lsp::features::completion::ProviderRegistry;
use vimscript_language_server::parser::VimscriptEngine;
use vimscript_language_server::workspace::Workspace;
use vimscript_language_server::{logging, scan};

#[derive(Debug, Parser)]
#[command(name = "vimscript-language-server", version, about = "Language server for Vim script")]
struct Cli {
    /// Communicate over stdio (the default; accepted for editor compatibility)
    #[arg(long)]
    stdio: bool,

    /// Override the stderr log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Disable ANSI colors in stderr output
    #[arg(long)]
    no_color: bool,

    /// Disable the session log file in the user cache directory
    #[arg(long)]
    no_file_log: bool,

    /// Run as the out-of-process project scanner (internal)
    #[arg(long, hide = true)]
    scan_worker: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.scan_worker {
        // The worker speaks line-delimited JSON over stdio; its log output
        // travels inside that protocol, so no subscriber is installed here.
        let engine = VimscriptEngine::new();
        scan::run_worker(&engine)?;
        return Ok(());
    }

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(serve(cli))
}

async fn serve(cli: Cli) -> Result<()> {
    let _guard = logging::init_logging(cli.no_color, cli.log_level.as_deref(), !cli.no_file_log)?;
    info!(
        "starting {} {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let workspace = Arc::new(Workspace::new());
    let indexer = match BackgroundIndexer::spawn(Arc::clone(&workspace)) {
        Ok(indexer) => indexer,
        Err(e) => {
            // Foreground features work without project-wide indexing.
            error!("failed to start scan worker: {:#}", e);
            let (indexer, _requests) = BackgroundIndexer::channel();
            indexer
        }
    };
    let options = BackendOptions {
        workspace,
        indexer,
        engine: Arc::new(VimscriptEngine::new()),
        registry: Arc::new(ProviderRegistry::with_builtins()),
    };

    let (service, socket) = LspService::new(move |client| Backend::new(client, options));
    Server::new(tokio::io::stdin(), tokio::io::stdout(), socket)
        .serve(service)
        .await;
    Ok(())
}
