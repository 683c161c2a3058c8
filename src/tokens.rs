//! Whitespace-sensitive token-to-text reconstruction.

use crate::model::{TokenKind, TokenRecord};

/// Closing punctuation after which a following word gets a separating space.
const TERMINAL_MARKS: [char; 13] = [
    '.', ',', ';', ':', '!', '?', ')', ']', '}', '\u{201D}', '\u{2019}', '"', '\'',
];

fn ends_alphanumeric(text: &str) -> bool {
    text.chars().next_back().is_some_and(char::is_alphanumeric)
}

fn starts_alphanumeric(text: &str) -> bool {
    text.chars().next().is_some_and(char::is_alphanumeric)
}

fn ends_with_terminal_mark(text: &str) -> bool {
    text.chars()
        .next_back()
        .is_some_and(|c| TERMINAL_MARKS.contains(&c))
}

/// Collapse every whitespace run to one ASCII space and trim both ends.
pub fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// Incremental text buffer applying token adjacency rules.
///
/// Tokens must be pushed in `tok_index` order. The previous token is the one
/// pushed immediately before, whatever its kind.
#[derive(Clone, Debug, Default)]
pub struct TokenTextBuilder {
    buf: String,
    prev: Option<(TokenKind, bool, bool)>,
}

impl TokenTextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn ends_with_space(&self) -> bool {
        self.buf.ends_with(' ')
    }

    fn push_separator(&mut self) {
        if !self.ends_with_space() {
            self.buf.push(' ');
        }
    }

    fn prev_alnum_guard(&self, text: &str) -> bool {
        matches!(self.prev, Some((_, true, _))) && starts_alphanumeric(text)
    }

    /// Append one token.
    pub fn push(&mut self, kind: TokenKind, text: &str) {
        match kind {
            TokenKind::Space => self.push_separator(),
            kind if kind.is_word_like() => {
                let separate = match self.prev {
                    Some((prev_kind, _, _)) if prev_kind.is_word_like() => true,
                    Some((TokenKind::Punct, _, terminal)) if terminal => true,
                    _ => self.prev_alnum_guard(text),
                };
                if separate {
                    self.push_separator();
                }
                self.buf.push_str(text);
            }
            TokenKind::Punct => self.buf.push_str(text),
            _ => {
                if self.prev_alnum_guard(text) {
                    self.push_separator();
                }
                self.buf.push_str(text);
            }
        }
        self.prev = Some((kind, ends_alphanumeric(text), ends_with_terminal_mark(text)));
    }

    /// Finish with whitespace collapsed and trimmed.
    pub fn finish(self) -> String {
        collapse_whitespace(&self.buf)
    }
}

/// Rebuild one segment's text from its ordered tokens.
pub fn reconstruct_segment_text<'a, I>(tokens: I) -> String
where
    I: IntoIterator<Item = &'a TokenRecord>,
{
    let mut builder = TokenTextBuilder::new();
    for token in tokens {
        builder.push(token.token_type, &token.text);
    }
    builder.finish()
}
