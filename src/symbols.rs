//! Symbol trees produced by parsing a document.
//!
//! A `SymbolNode` is the unit of workspace state: one tree per URI, rooted at
//! a `Script` node. The tree is serialized verbatim across the scan-worker
//! process boundary, so everything here derives serde.

use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Script,
    Function,
    Variable,
    Command,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolNode {
    pub name: String,
    pub kind: SymbolKind,
    pub range: Range,
    pub children: Vec<SymbolNode>,
}

impl SymbolNode {
    pub fn new(name: impl Into<String>, kind: SymbolKind, range: Range) -> Self {
        SymbolNode {
            name: name.into(),
            kind,
            range,
            children: Vec::new(),
        }
    }

    /// Pre-order traversal over the whole tree, root included.
    pub fn iter(&self) -> SymbolIter<'_> {
        SymbolIter { stack: vec![self] }
    }

    /// All named, non-root symbols in the tree.
    pub fn named_symbols(&self) -> impl Iterator<Item = &SymbolNode> {
        self.iter()
            .filter(|node| node.kind != SymbolKind::Script && !node.name.is_empty())
    }
}

pub struct SymbolIter<'a> {
    stack: Vec<&'a SymbolNode>,
}

impl<'a> Iterator for SymbolIter<'a> {
    type Item = &'a SymbolNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower_lsp::lsp_types::Position;

    fn line_range(line: u32) -> Range {
        Range::new(Position::new(line, 0), Position::new(line, 10))
    }

    #[test]
    fn named_symbols_skips_root_and_preserves_order() {
        let mut root = SymbolNode::new("test.vim", SymbolKind::Script, line_range(0));
        let mut outer = SymbolNode::new("s:Outer", SymbolKind::Function, line_range(1));
        outer.children.push(SymbolNode::new(
            "l:count",
            SymbolKind::Variable,
            line_range(2),
        ));
        root.children.push(outer);
        root.children.push(SymbolNode::new(
            "g:loaded",
            SymbolKind::Variable,
            line_range(5),
        ));

        let names: Vec<&str> = root.named_symbols().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["s:Outer", "l:count", "g:loaded"]);
    }
}
