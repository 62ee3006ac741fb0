//! Syntax engine seam.
//!
//! The re-parse pipeline and the scan worker are both written against the
//! `SyntaxEngine` trait; the grammar behind it is replaceable. The default
//! `VimscriptEngine` is a line-oriented scanner: it recovers the symbol tree
//! (functions, script variables, user commands) and reports unbalanced block
//! constructs. It does not attempt full expression parsing.

use anyhow::Result;
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Position, Range, Url};
use tracing::debug;

use crate::symbols::{SymbolKind, SymbolNode};

const DIAGNOSTIC_SOURCE: &str = "vimscript";

/// Everything one parse invocation yields: the symbol tree for the workspace
/// and the diagnostics to publish.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub root: SymbolNode,
    pub diagnostics: Vec<Diagnostic>,
}

pub trait SyntaxEngine: Send + Sync {
    fn parse(&self, uri: &Url, text: &str) -> Result<ParseOutcome>;
}

#[derive(Debug, Default)]
pub struct VimscriptEngine;

impl VimscriptEngine {
    pub fn new() -> Self {
        VimscriptEngine
    }
}

struct OpenBlock {
    opener: &'static str,
    closer: &'static str,
    line: u32,
    line_len: u32,
    // Present for `function` blocks, absent for plain control-flow blocks.
    symbol: Option<SymbolNode>,
}

impl SyntaxEngine for VimscriptEngine {
    fn parse(&self, uri: &Url, text: &str) -> Result<ParseOutcome> {
        let line_count = text.lines().count() as u32;
        let mut root = SymbolNode::new(
            script_name(uri),
            SymbolKind::Script,
            Range::new(
                Position::new(0, 0),
                Position::new(line_count.saturating_sub(1), 0),
            ),
        );
        let mut blocks: Vec<OpenBlock> = Vec::new();
        let mut diagnostics = Vec::new();

        for (line_no, raw) in text.lines().enumerate() {
            let line_no = line_no as u32;
            let line_len = raw.chars().count() as u32;
            let trimmed = raw.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('"') {
                continue;
            }
            let Some(head) = trimmed.split_whitespace().next() else {
                continue;
            };
            match head.trim_end_matches('!') {
                "function" => {
                    let symbol = function_name(trimmed).map(|name| {
                        SymbolNode::new(
                            name,
                            SymbolKind::Function,
                            Range::new(Position::new(line_no, 0), Position::new(line_no, line_len)),
                        )
                    });
                    blocks.push(OpenBlock {
                        opener: "function",
                        closer: "endfunction",
                        line: line_no,
                        line_len,
                        symbol,
                    });
                }
                "endfunction" | "endfunc" => {
                    close_block(
                        &mut blocks,
                        &mut root,
                        &mut diagnostics,
                        "endfunction",
                        line_no,
                        line_len,
                    );
                }
                "if" => blocks.push(plain_block("if", "endif", line_no, line_len)),
                "endif" => {
                    close_block(&mut blocks, &mut root, &mut diagnostics, "endif", line_no, line_len)
                }
                "while" => blocks.push(plain_block("while", "endwhile", line_no, line_len)),
                "endwhile" => close_block(
                    &mut blocks,
                    &mut root,
                    &mut diagnostics,
                    "endwhile",
                    line_no,
                    line_len,
                ),
                "for" => blocks.push(plain_block("for", "endfor", line_no, line_len)),
                "endfor" => {
                    close_block(&mut blocks, &mut root, &mut diagnostics, "endfor", line_no, line_len)
                }
                "try" => blocks.push(plain_block("try", "endtry", line_no, line_len)),
                "endtry" => {
                    close_block(&mut blocks, &mut root, &mut diagnostics, "endtry", line_no, line_len)
                }
                "let" | "const" => {
                    if let Some(name) = assignment_target(trimmed) {
                        attach(
                            &mut blocks,
                            &mut root,
                            SymbolNode::new(
                                name,
                                SymbolKind::Variable,
                                Range::new(
                                    Position::new(line_no, 0),
                                    Position::new(line_no, line_len),
                                ),
                            ),
                        );
                    }
                }
                "command" => {
                    if let Some(name) = command_name(trimmed) {
                        attach(
                            &mut blocks,
                            &mut root,
                            SymbolNode::new(
                                name,
                                SymbolKind::Command,
                                Range::new(
                                    Position::new(line_no, 0),
                                    Position::new(line_no, line_len),
                                ),
                            ),
                        );
                    }
                }
                _ => {}
            }
        }

        // Anything still open at end-of-file is unterminated.
        while let Some(block) = blocks.pop() {
            diagnostics.push(Diagnostic {
                range: Range::new(
                    Position::new(block.line, 0),
                    Position::new(block.line, block.line_len),
                ),
                severity: Some(DiagnosticSeverity::ERROR),
                source: Some(DIAGNOSTIC_SOURCE.to_string()),
                message: format!("missing `{}` for `{}`", block.closer, block.opener),
                ..Default::default()
            });
            if let Some(mut symbol) = block.symbol {
                symbol.range.end = Position::new(line_count.saturating_sub(1), 0);
                attach(&mut blocks, &mut root, symbol);
            }
        }

        debug!(
            "parsed {}: {} symbols, {} diagnostics",
            uri,
            root.named_symbols().count(),
            diagnostics.len()
        );
        Ok(ParseOutcome { root, diagnostics })
    }
}

fn plain_block(opener: &'static str, closer: &'static str, line: u32, line_len: u32) -> OpenBlock {
    OpenBlock {
        opener,
        closer,
        line,
        line_len,
        symbol: None,
    }
}

fn close_block(
    blocks: &mut Vec<OpenBlock>,
    root: &mut SymbolNode,
    diagnostics: &mut Vec<Diagnostic>,
    closer: &'static str,
    line_no: u32,
    line_len: u32,
) {
    let range = Range::new(Position::new(line_no, 0), Position::new(line_no, line_len));
    match blocks.pop() {
        Some(block) if block.closer == closer => {
            if let Some(mut symbol) = block.symbol {
                symbol.range.end = Position::new(line_no, line_len);
                attach(blocks, root, symbol);
            }
        }
        Some(block) => {
            // Stray closer inside another construct: report it and keep the
            // enclosing block open so its own closer can still match.
            diagnostics.push(Diagnostic {
                range,
                severity: Some(DiagnosticSeverity::ERROR),
                source: Some(DIAGNOSTIC_SOURCE.to_string()),
                message: format!("expected `{}` before `{}`", block.closer, closer),
                ..Default::default()
            });
            blocks.push(block);
        }
        None => {
            diagnostics.push(Diagnostic {
                range,
                severity: Some(DiagnosticSeverity::ERROR),
                source: Some(DIAGNOSTIC_SOURCE.to_string()),
                message: format!("`{}` without a matching opener", closer),
                ..Default::default()
            });
        }
    }
}

/// Attach a finished symbol to the innermost open function, else the script root.
fn attach(blocks: &mut [OpenBlock], root: &mut SymbolNode, node: SymbolNode) {
    for block in blocks.iter_mut().rev() {
        if let Some(parent) = block.symbol.as_mut() {
            parent.children.push(node);
            return;
        }
    }
    root.children.push(node);
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | ':' | '#' | '.')
}

fn function_name(line: &str) -> Option<String> {
    let rest = line.strip_prefix("function")?;
    let rest = rest.strip_prefix('!').unwrap_or(rest).trim_start();
    let name: String = rest.chars().take_while(|c| is_name_char(*c)).collect();
    (!name.is_empty()).then_some(name)
}

fn assignment_target(line: &str) -> Option<String> {
    let rest = line
        .strip_prefix("let")
        .or_else(|| line.strip_prefix("const"))?
        .trim_start();
    // Option, register and environment targets carry no symbol.
    if rest.starts_with(['&', '@', '$']) {
        return None;
    }
    let name: String = rest
        .chars()
        .take_while(|c| c.is_alphanumeric() || matches!(c, '_' | ':' | '#'))
        .collect();
    (!name.is_empty()).then_some(name)
}

fn command_name(line: &str) -> Option<String> {
    let rest = line.strip_prefix("command")?;
    let rest = rest.strip_prefix('!').unwrap_or(rest);
    rest.split_whitespace()
        .find(|token| !token.starts_with('-'))
        .map(str::to_string)
}

fn script_name(uri: &Url) -> String {
    uri.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .unwrap_or("script")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn parse(text: &str) -> ParseOutcome {
        let uri = Url::parse("file:///tmp/test.vim").unwrap();
        VimscriptEngine::new().parse(&uri, text).unwrap()
    }

    #[test]
    fn collects_functions_variables_and_commands() {
        let outcome = parse(indoc! {r#"
            " plugin bootstrap
            let g:loaded_demo = 1
            command! -nargs=0 DemoRun call s:run()

            function! s:run() abort
              let l:count = 0
              return l:count
            endfunction
        "#});

        assert!(outcome.diagnostics.is_empty());
        let names: Vec<&str> = outcome
            .root
            .named_symbols()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["g:loaded_demo", "DemoRun", "s:run", "l:count"]);

        let function = outcome
            .root
            .children
            .iter()
            .find(|s| s.kind == SymbolKind::Function)
            .unwrap();
        assert_eq!(function.name, "s:run");
        assert_eq!(function.children.len(), 1);
        assert_eq!(function.range.start.line, 4);
        assert_eq!(function.range.end.line, 7);
    }

    #[test]
    fn reports_unterminated_function() {
        let outcome = parse("function! s:oops()\n  let x = 1\n");
        assert_eq!(outcome.diagnostics.len(), 1);
        assert!(outcome.diagnostics[0].message.contains("endfunction"));
        assert_eq!(outcome.diagnostics[0].range.start.line, 0);
        // The symbol is still recovered so completion keeps working mid-edit.
        assert!(outcome.root.named_symbols().any(|s| s.name == "s:oops"));
    }

    #[test]
    fn reports_stray_and_mismatched_closers() {
        let outcome = parse(indoc! {r#"
            endif
            function! s:f()
            endwhile
            endfunction
        "#});
        let messages: Vec<&str> = outcome
            .diagnostics
            .iter()
            .map(|d| d.message.as_str())
            .collect();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("without a matching opener"));
        assert!(messages[1].contains("expected `endfunction` before `endwhile`"));
    }

    #[test]
    fn ignores_option_register_and_env_assignments() {
        let outcome = parse("let &shiftwidth = 4\nlet @a = 'x'\nlet $PATH = '/bin'\n");
        assert_eq!(outcome.root.named_symbols().count(), 0);
    }
}
