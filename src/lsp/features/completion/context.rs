//! Completion context and word extraction.
//!
//! A `CompletionContext` is built fresh per request and is immutable once
//! built: the line prefix up to the cursor, the token the user has already
//! typed, and the sigil-adjusted match length providers use for prefix
//! filtering.

use tower_lsp::lsp_types::{Position, Url};

/// Leading marker for option references (`&number`). The sigil stays on the
/// extracted token so providers can branch on it, but it never counts toward
/// the match length.
pub const OPTION_SIGIL: char = '&';

/// Word characters are identifier characters; scope separators (`:`) and
/// sigils are handled separately.
fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '#')
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedWord {
    /// Token ending at the requested character, empty when that character is
    /// absent or not a word character.
    pub word: String,
    /// Text immediately following the token (or the requested character when
    /// there is no token).
    pub word_right: String,
}

/// Extracts the token ending at `character` in `line`. A leading sigil is
/// folded into the token.
pub fn word_at(line: &str, character: usize) -> ExtractedWord {
    let chars: Vec<char> = line.chars().collect();
    if character >= chars.len() {
        return ExtractedWord {
            word: String::new(),
            word_right: String::new(),
        };
    }
    if !is_word_char(chars[character]) {
        return ExtractedWord {
            word: String::new(),
            word_right: chars[character..].iter().collect(),
        };
    }
    let mut start = character;
    while start > 0 && is_word_char(chars[start - 1]) {
        start -= 1;
    }
    if start > 0 && chars[start - 1] == OPTION_SIGIL {
        start -= 1;
    }
    ExtractedWord {
        word: chars[start..=character].iter().collect(),
        word_right: chars[character + 1..].iter().collect(),
    }
}

#[derive(Debug, Clone)]
pub struct CompletionContext {
    pub uri: Url,
    pub position: Position,
    /// Line text from column zero up to the cursor.
    pub line: String,
    /// Effective match token; retains a leading sigil, may be a bare `:`.
    pub word: String,
    /// Character count of the token with any sigil stripped.
    pub match_length: usize,
}

impl CompletionContext {
    /// Builds the context for one request. Extraction runs one character
    /// before the cursor: completion matches what the user has already
    /// typed, not a character that does not exist yet.
    pub fn build(uri: Url, position: Position, line_prefix: String, full_line: &str) -> Self {
        let extracted = if position.character == 0 {
            ExtractedWord {
                word: String::new(),
                word_right: full_line.to_string(),
            }
        } else {
            word_at(full_line, position.character as usize - 1)
        };

        let mut word = extracted.word;
        // An empty token in front of a bare separator means the separator
        // itself was just typed; promote it so separator-keyed providers fire.
        if word.is_empty() && extracted.word_right.trim() == ":" {
            word = ":".to_string();
        }

        let match_length = word
            .strip_prefix(OPTION_SIGIL)
            .unwrap_or(&word)
            .chars()
            .count();

        CompletionContext {
            uri,
            position,
            line: line_prefix,
            word,
            match_length,
        }
    }

    /// Token with any leading sigil removed; the prefix providers match on.
    pub fn match_stem(&self) -> &str {
        self.word.strip_prefix(OPTION_SIGIL).unwrap_or(&self.word)
    }
}
