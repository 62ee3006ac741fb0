//! Per-document debounce pipelines.
//!
//! Each URI gets its own task the first time a change event for it arrives.
//! The task coalesces bursts of edits into one re-parse after a quiet period
//! and serializes parses for its URI: a parse runs to completion before the
//! next one may start, and events arriving mid-flight collapse to the latest.
//! Tearing the slot down (document close) drops the sender; a pending timer
//! dies with the task, an executing parse finishes and applies best-effort.
//! Pipelines for distinct URIs never wait on each other.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error};

use tower_lsp::lsp_types::Url;

use super::state::{Backend, ChangeEvent};

impl Backend {
    /// Records one change and (re)schedules the re-parse for its URI.
    pub(super) fn enqueue_change(&self, uri: &Url, version: i32, text: String) {
        let event = ChangeEvent {
            uri: uri.clone(),
            version,
            text: Arc::new(text),
            received_at: Instant::now(),
        };
        if self.pipeline_for(uri).send(event).is_err() {
            // Lost the race against a concurrent close; the document is gone.
            debug!("pipeline for {} already closed; dropping change", uri);
        }
    }

    fn pipeline_for(&self, uri: &Url) -> mpsc::UnboundedSender<ChangeEvent> {
        match self.pipelines.entry(uri.clone()) {
            Entry::Occupied(slot) => slot.get().clone(),
            Entry::Vacant(slot) => {
                let (tx, rx) = mpsc::unbounded_channel();
                slot.insert(tx.clone());
                let quiet_period = self.config.read().quiet_period;
                let backend = self.clone();
                let uri = uri.clone();
                tokio::spawn(async move {
                    let handler = backend.clone();
                    run_pipeline(rx, quiet_period, move |event| {
                        let backend = handler.clone();
                        async move { backend.reparse(event).await }
                    })
                    .await;
                    debug!("pipeline for {} terminated", uri);
                });
                tx
            }
        }
    }

    /// Clears the pipeline slot for a closed document. A fresh pipeline is
    /// created if the document is reopened later.
    pub(super) fn teardown_pipeline(&self, uri: &Url) {
        if self.pipelines.remove(uri).is_some() {
            debug!("unsubscribed pipeline for {}", uri);
        }
    }

    /// One parse pass: publish diagnostics, refresh workspace symbols, and
    /// kick off background indexing the first time this URI completes.
    async fn reparse(&self, event: ChangeEvent) {
        match self.engine.parse(&event.uri, &event.text) {
            Ok(outcome) => {
                debug!(
                    "re-parsed {} (version {}, {}ms after last change)",
                    event.uri,
                    event.version,
                    event.received_at.elapsed().as_millis()
                );
                self.client
                    .publish_diagnostics(event.uri.clone(), outcome.diagnostics, Some(event.version))
                    .await;
                self.workspace.update(event.uri.clone(), outcome.root);
                if self.index_requested.insert(event.uri.clone(), ()).is_none() {
                    self.indexer.request_scan(&event.uri);
                }
            }
            Err(e) => {
                // The pipeline survives; the next change event re-parses.
                error!(
                    "parse failed for {} (version {}): {:#}",
                    event.uri, event.version, e
                );
            }
        }
    }
}

/// Scheduling loop for one URI.
///
/// States: waiting for an event; waiting out the quiet period (each newer
/// event restarts the timer and replaces the pending one); parsing. The
/// parse runs on this task, which is what makes execution single-flight:
/// events arriving mid-flight sit in the channel and collapse on the next
/// turn of the outer loop. The loop ends when the sender is dropped.
pub(super) async fn run_pipeline<H, Fut>(
    mut rx: mpsc::UnboundedReceiver<ChangeEvent>,
    quiet_period: Duration,
    mut on_parse: H,
) where
    H: FnMut(ChangeEvent) -> Fut,
    Fut: Future<Output = ()>,
{
    while let Some(mut event) = rx.recv().await {
        loop {
            let timer = sleep(quiet_period);
            tokio::pin!(timer);
            tokio::select! {
                newer = rx.recv() => match newer {
                    // Restart the quiet period; the superseded event is gone.
                    Some(newer) => event = newer,
                    // Unsubscribed while pending: the parse never starts.
                    None => return,
                },
                () = &mut timer => break,
            }
        }
        on_parse(event).await;
    }
}
