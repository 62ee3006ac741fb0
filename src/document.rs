//! Open-document state.
//!
//! Documents are owned by the host editor session; the server only mirrors
//! their text so that the pipeline and completion can take snapshots. Text is
//! kept in a rope so incremental changes stay cheap on large scripts.

use ropey::Rope;
use tokio::sync::RwLock;
use tower_lsp::lsp_types::{Position, TextDocumentContentChangeEvent, Url};
use tracing::warn;

#[derive(Debug)]
pub struct DocumentState {
    pub uri: Url,
    pub text: Rope,
    pub version: i32,
}

#[derive(Debug)]
pub struct LspDocument {
    pub id: u32,
    state: RwLock<DocumentState>,
}

/// Clamped char offset for a position; out-of-range positions snap to the
/// nearest valid location instead of panicking on racy client input.
fn position_to_char(position: &Position, text: &Rope) -> usize {
    let line = (position.line as usize).min(text.len_lines().saturating_sub(1));
    let line_start = text.line_to_char(line);
    let line_len = text.line(line).len_chars();
    line_start + (position.character as usize).min(line_len)
}

impl LspDocument {
    pub fn new(id: u32, uri: Url, text: &str, version: i32) -> Self {
        LspDocument {
            id,
            state: RwLock::new(DocumentState {
                uri,
                text: Rope::from_str(text),
                version,
            }),
        }
    }

    pub async fn uri(&self) -> Url {
        self.state.read().await.uri.clone()
    }

    pub async fn version(&self) -> i32 {
        self.state.read().await.version
    }

    pub async fn text(&self) -> String {
        self.state.read().await.text.to_string()
    }

    /// Applies a change batch and returns the full updated text, or `None`
    /// when the batch is stale (version not newer than the current state).
    pub async fn apply(
        &self,
        changes: Vec<TextDocumentContentChangeEvent>,
        version: i32,
    ) -> Option<String> {
        let mut state = self.state.write().await;
        if version <= state.version {
            warn!(
                "ignoring stale changes for {}: version {} <= {}",
                state.uri, version, state.version
            );
            return None;
        }
        for change in &changes {
            match change.range {
                Some(range) => {
                    let start = position_to_char(&range.start, &state.text);
                    let end = position_to_char(&range.end, &state.text).max(start);
                    state.text.remove(start..end);
                    state.text.insert(start, &change.text);
                }
                None => state.text = Rope::from_str(&change.text),
            }
        }
        state.version = version;
        Some(state.text.to_string())
    }

    /// Full text of one line, without the trailing line break.
    pub async fn line_text(&self, line: u32) -> String {
        let state = self.state.read().await;
        if line as usize >= state.text.len_lines() {
            return String::new();
        }
        let text: String = state.text.line(line as usize).to_string();
        text.trim_end_matches(['\n', '\r']).to_string()
    }

    /// Line text from column zero up to (not including) the cursor.
    pub async fn line_prefix(&self, position: &Position) -> String {
        let full = self.line_text(position.line).await;
        full.chars().take(position.character as usize).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower_lsp::lsp_types::Range;

    fn document(text: &str) -> LspDocument {
        LspDocument::new(1, Url::parse("file:///test.vim").unwrap(), text, 0)
    }

    fn incremental(start: (u32, u32), end: (u32, u32), text: &str) -> TextDocumentContentChangeEvent {
        TextDocumentContentChangeEvent {
            range: Some(Range::new(
                Position::new(start.0, start.1),
                Position::new(end.0, end.1),
            )),
            range_length: None,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn applies_full_replacement() {
        let doc = document("let x = 1\n");
        let text = doc
            .apply(
                vec![TextDocumentContentChangeEvent {
                    range: None,
                    range_length: None,
                    text: "let y = 2\n".to_string(),
                }],
                1,
            )
            .await;
        assert_eq!(text.as_deref(), Some("let y = 2\n"));
        assert_eq!(doc.version().await, 1);
    }

    #[tokio::test]
    async fn applies_incremental_change() {
        let doc = document("let count = one\n");
        let text = doc.apply(vec![incremental((0, 12), (0, 15), "two")], 1).await;
        assert_eq!(text.as_deref(), Some("let count = two\n"));
    }

    #[tokio::test]
    async fn rejects_stale_version() {
        let doc = document("let x = 1\n");
        doc.apply(
            vec![TextDocumentContentChangeEvent {
                range: None,
                range_length: None,
                text: "let x = 2\n".to_string(),
            }],
            3,
        )
        .await;
        let stale = doc.apply(vec![incremental((0, 0), (0, 0), "boom ")], 2).await;
        assert!(stale.is_none());
        assert_eq!(doc.text().await, "let x = 2\n");
        assert_eq!(doc.version().await, 3);
    }

    #[tokio::test]
    async fn line_prefix_stops_at_cursor() {
        let doc = document("let x = foo.bar\ncall s:run()\n");
        assert_eq!(
            doc.line_prefix(&Position::new(0, 13)).await,
            "let x = foo.b"
        );
        assert_eq!(doc.line_text(1).await, "call s:run()");
        // Past end-of-document positions clamp rather than fail.
        assert_eq!(doc.line_text(9).await, "");
    }
}
