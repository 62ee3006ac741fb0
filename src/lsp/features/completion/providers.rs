//! Built-in completion providers.
//!
//! Each provider inspects the context and decides for itself whether it is
//! relevant; the registry imposes no exclusivity. The suggestion tables are
//! intentionally small and cover the common editing paths, not the whole of
//! Vim's reference manual.

use anyhow::Result;
use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, InsertTextFormat,
};

use super::context::{CompletionContext, OPTION_SIGIL};
use super::registry::CompletionProvider;
use crate::symbols::SymbolKind;
use crate::workspace::Workspace;

const EX_COMMANDS: &[(&str, &str)] = &[
    ("augroup", "group autocommands"),
    ("autocmd", "register an autocommand"),
    ("call", "call a function"),
    ("command", "define a user command"),
    ("echo", "echo an expression"),
    ("echomsg", "echo and keep in message history"),
    ("execute", "execute an expression as a command"),
    ("finish", "stop sourcing the script"),
    ("function", "define a function"),
    ("let", "assign a variable"),
    ("map", "define a mapping"),
    ("nnoremap", "define a non-recursive normal-mode mapping"),
    ("return", "return from a function"),
    ("set", "set an option"),
    ("setlocal", "set a buffer-local option"),
    ("source", "source a script"),
    ("unlet", "remove a variable"),
];

/// Multi-line constructs offered as snippet items; filtered out entirely when
/// the client cannot handle snippets.
const BLOCK_SNIPPETS: &[(&str, &str)] = &[
    (
        "function",
        "function! ${1:Name}(${2})\n\t${0}\nendfunction",
    ),
    ("if", "if ${1:condition}\n\t${0}\nendif"),
    ("while", "while ${1:condition}\n\t${0}\nendwhile"),
    ("for", "for ${1:item} in ${2:list}\n\t${0}\nendfor"),
    ("try", "try\n\t${0}\ncatch /${1:pattern}/\nendtry"),
    (
        "augroup",
        "augroup ${1:Name}\n\tautocmd!\n\t${0}\naugroup END",
    ),
];

const BUILTIN_FUNCTIONS: &[(&str, &str)] = &[
    ("empty", "empty({expr})"),
    ("exists", "exists({expr})"),
    ("expand", "expand({string} [, {nosuf} [, {list}]])"),
    ("get", "get({list-or-dict}, {idx-or-key} [, {default}])"),
    ("getline", "getline({lnum} [, {end}])"),
    ("has", "has({feature})"),
    ("len", "len({expr})"),
    ("line", "line({expr} [, {winid}])"),
    ("map", "map({expr1}, {expr2})"),
    ("matchstr", "matchstr({expr}, {pat} [, {start} [, {count}]])"),
    ("printf", "printf({fmt}, {expr1} ...)"),
    ("split", "split({string} [, {pattern} [, {keepempty}]])"),
    ("substitute", "substitute({string}, {pat}, {sub}, {flags})"),
    ("type", "type({expr})"),
];

const OPTIONS: &[(&str, &str)] = &[
    ("background", "light or dark"),
    ("cursorline", "highlight the cursor line"),
    ("expandtab", "insert spaces for <Tab>"),
    ("filetype", "type of file, used for autocommands"),
    ("hlsearch", "highlight matches of the last search"),
    ("ignorecase", "ignore case in search patterns"),
    ("laststatus", "when the last window has a status line"),
    ("number", "print the line number in front of each line"),
    ("relativenumber", "show line numbers relative to the cursor"),
    ("shiftwidth", "number of spaces per indent step"),
    ("tabstop", "number of spaces a <Tab> counts for"),
    ("wrap", "wrap long lines"),
];

fn keyword_item(label: &str, detail: &str) -> CompletionItem {
    CompletionItem {
        label: label.to_string(),
        kind: Some(CompletionItemKind::KEYWORD),
        detail: Some(detail.to_string()),
        ..Default::default()
    }
}

fn snippet_item(label: &str, body: &str) -> CompletionItem {
    CompletionItem {
        label: label.to_string(),
        kind: Some(CompletionItemKind::SNIPPET),
        detail: Some(format!("{} block", label)),
        insert_text: Some(body.to_string()),
        insert_text_format: Some(InsertTextFormat::SNIPPET),
        ..Default::default()
    }
}

/// Ex commands, offered at statement starts and straight after `:`.
pub struct ExCommandProvider;

impl CompletionProvider for ExCommandProvider {
    fn name(&self) -> &'static str {
        "command"
    }

    fn provide(
        &self,
        context: &CompletionContext,
        _workspace: &Workspace,
    ) -> Result<Vec<CompletionItem>> {
        let after_colon = context.word == ":";
        let at_statement_start =
            !context.match_stem().is_empty() && context.line.trim() == context.word;
        if !after_colon && !at_statement_start {
            return Ok(Vec::new());
        }
        let stem = if after_colon { "" } else { context.match_stem() };

        let mut items: Vec<CompletionItem> = EX_COMMANDS
            .iter()
            .filter(|(name, _)| name.starts_with(stem))
            .map(|(name, detail)| keyword_item(name, detail))
            .collect();
        items.extend(
            BLOCK_SNIPPETS
                .iter()
                .filter(|(name, _)| name.starts_with(stem))
                .map(|(name, body)| snippet_item(name, body)),
        );
        Ok(items)
    }
}

/// Built-in Vim functions, offered while typing an identifier.
pub struct BuiltinFunctionProvider;

impl CompletionProvider for BuiltinFunctionProvider {
    fn name(&self) -> &'static str {
        "function"
    }

    fn provide(
        &self,
        context: &CompletionContext,
        _workspace: &Workspace,
    ) -> Result<Vec<CompletionItem>> {
        let stem = context.match_stem();
        if stem.is_empty() || context.word == ":" || context.word.starts_with(OPTION_SIGIL) {
            return Ok(Vec::new());
        }
        Ok(BUILTIN_FUNCTIONS
            .iter()
            .filter(|(name, _)| name.starts_with(stem))
            .map(|(name, signature)| CompletionItem {
                label: name.to_string(),
                kind: Some(CompletionItemKind::FUNCTION),
                detail: Some(signature.to_string()),
                ..Default::default()
            })
            .collect())
    }
}

/// Functions, variables and commands parsed out of the current document's
/// workspace buffer.
pub struct WorkspaceIdentifierProvider;

fn stem_matches(name: &str, stem: &str) -> bool {
    if stem.is_empty() {
        return true;
    }
    // Scoped names also match on the part after the scope prefix, so `ru`
    // finds `s:run`.
    name.starts_with(stem)
        || name
            .rsplit(':')
            .next()
            .map(|tail| tail.starts_with(stem))
            .unwrap_or(false)
}

impl CompletionProvider for WorkspaceIdentifierProvider {
    fn name(&self) -> &'static str {
        "identifier"
    }

    fn provide(
        &self,
        context: &CompletionContext,
        workspace: &Workspace,
    ) -> Result<Vec<CompletionItem>> {
        if context.word == ":" || context.word.starts_with(OPTION_SIGIL) {
            return Ok(Vec::new());
        }
        let Some(buffer) = workspace.buffer(&context.uri) else {
            return Ok(Vec::new());
        };
        let stem = context.match_stem();
        Ok(buffer
            .named_symbols()
            .filter(|symbol| stem_matches(&symbol.name, stem))
            .map(|symbol| CompletionItem {
                label: symbol.name.clone(),
                kind: Some(match symbol.kind {
                    SymbolKind::Function => CompletionItemKind::FUNCTION,
                    SymbolKind::Command => CompletionItemKind::EVENT,
                    _ => CompletionItemKind::VARIABLE,
                }),
                ..Default::default()
            })
            .collect())
    }
}

/// Option names, keyed on the `&` sigil or a `set` command on the line.
pub struct OptionProvider;

impl CompletionProvider for OptionProvider {
    fn name(&self) -> &'static str {
        "option"
    }

    fn provide(
        &self,
        context: &CompletionContext,
        _workspace: &Workspace,
    ) -> Result<Vec<CompletionItem>> {
        let sigil = context.word.starts_with(OPTION_SIGIL);
        let set_line = {
            let line = context.line.trim_start();
            line.starts_with("set ") || line.starts_with("setlocal ") || line.starts_with("setglobal ")
        };
        if !sigil && !set_line {
            return Ok(Vec::new());
        }
        let stem = context.match_stem();
        Ok(OPTIONS
            .iter()
            .filter(|(name, _)| name.starts_with(stem))
            .map(|(name, detail)| CompletionItem {
                label: name.to_string(),
                kind: Some(CompletionItemKind::PROPERTY),
                detail: Some(detail.to_string()),
                ..Default::default()
            })
            .collect())
    }
}
