//! In-memory symbol workspace.
//!
//! One symbol buffer per URI, written by two producers: the foreground
//! re-parse pipeline (authoritative, always overwrites) and the background
//! scan worker (fills gaps only). The conflict rule is first-writer-wins with
//! foreground precedence, enforced atomically through the map entry API.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use url::Url;

use crate::symbols::SymbolNode;

#[derive(Debug, Default)]
pub struct Workspace {
    buffers: DashMap<Url, Arc<SymbolNode>>,
}

impl Workspace {
    pub fn new() -> Self {
        Workspace::default()
    }

    /// Foreground write: the freshly parsed tree replaces whatever is there.
    pub fn update(&self, uri: Url, node: SymbolNode) {
        self.buffers.insert(uri, Arc::new(node));
    }

    /// Background write: installs only into an empty slot. Returns whether
    /// the node was installed.
    pub fn install_if_absent(&self, uri: Url, node: SymbolNode) -> bool {
        match self.buffers.entry(uri) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(node));
                true
            }
        }
    }

    pub fn buffer(&self, uri: &Url) -> Option<Arc<SymbolNode>> {
        self.buffers.get(uri).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, uri: &Url) -> bool {
        self.buffers.contains_key(uri)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::SymbolKind;
    use tower_lsp::lsp_types::{Position, Range};

    fn node(name: &str) -> SymbolNode {
        SymbolNode::new(
            name,
            SymbolKind::Script,
            Range::new(Position::new(0, 0), Position::new(0, 0)),
        )
    }

    #[test]
    fn background_install_defers_to_foreground() {
        let workspace = Workspace::new();
        let uri = Url::parse("file:///a.vim").unwrap();

        workspace.update(uri.clone(), node("foreground"));
        assert!(!workspace.install_if_absent(uri.clone(), node("background")));
        assert_eq!(workspace.buffer(&uri).unwrap().name, "foreground");
    }

    #[test]
    fn background_install_fills_empty_slot_once() {
        let workspace = Workspace::new();
        let uri = Url::parse("file:///b.vim").unwrap();

        assert!(workspace.install_if_absent(uri.clone(), node("first")));
        assert!(!workspace.install_if_absent(uri.clone(), node("second")));
        assert_eq!(workspace.buffer(&uri).unwrap().name, "first");
    }

    #[test]
    fn foreground_update_overwrites_background() {
        let workspace = Workspace::new();
        let uri = Url::parse("file:///c.vim").unwrap();

        workspace.install_if_absent(uri.clone(), node("background"));
        workspace.update(uri.clone(), node("foreground"));
        assert_eq!(workspace.buffer(&uri).unwrap().name, "foreground");
    }
}
