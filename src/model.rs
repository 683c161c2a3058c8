//! Story records read from the data source and the [`Block`] output type.

use serde::{Deserialize, Serialize};

/// One authored version of a story.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionRecord {
    /// Opaque revision identifier.
    pub id: String,
    /// Owning story. Only used by snapshot-backed sources for filtering.
    #[serde(default)]
    pub story_id: String,
    /// Monotonically increasing revision number within a story.
    pub rev: i64,
}

/// A chapter of a story.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChapterRecord {
    /// Opaque chapter identifier.
    pub id: String,
    /// Owning story. Only used by snapshot-backed sources for filtering.
    #[serde(default)]
    pub story_id: String,
    /// Optional display title.
    #[serde(default)]
    pub title: Option<String>,
    /// Reading-order key. Missing values sort after every present value.
    #[serde(default)]
    pub position: Option<f64>,
}

impl ChapterRecord {
    /// Title if present and not blank.
    pub fn display_title(&self) -> Option<&str> {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
    }
}

/// Segment classification controlling paragraph boundaries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum SegmentKind {
    /// Standalone heading block.
    Heading,
    /// Hard paragraph boundary; always its own paragraph block.
    Paragraph,
    /// Sentence-level fragment joined with its neighbours.
    #[default]
    Sentence,
}

impl SegmentKind {
    /// Parse a stored kind string. Unknown values are sentence-level.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("heading") {
            Self::Heading
        } else if raw.eq_ignore_ascii_case("paragraph") {
            Self::Paragraph
        } else {
            Self::Sentence
        }
    }

    /// Canonical lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heading => "heading",
            Self::Paragraph => "paragraph",
            Self::Sentence => "sentence",
        }
    }
}

impl From<Option<String>> for SegmentKind {
    fn from(raw: Option<String>) -> Self {
        raw.as_deref().map(Self::parse).unwrap_or_default()
    }
}

impl From<SegmentKind> for String {
    fn from(kind: SegmentKind) -> Self {
        kind.as_str().to_string()
    }
}

/// A contiguous unit of content within one chapter and one revision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRecord {
    /// Opaque segment identifier.
    pub id: String,
    /// Owning chapter.
    pub chapter_id: String,
    /// Ordering within the chapter. Missing is treated as `0`.
    #[serde(default)]
    pub seg_index: Option<i64>,
    /// Boundary behaviour.
    #[serde(default)]
    pub kind: SegmentKind,
    /// Revision this segment belongs to.
    pub story_revision_id: String,
}

impl SegmentRecord {
    /// Effective ordering index.
    pub fn order_index(&self) -> i64 {
        self.seg_index.unwrap_or(0)
    }
}

/// Lexical class of a token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum TokenKind {
    #[default]
    Word,
    Number,
    Emoji,
    Punct,
    Space,
    /// Explicit `other` tokens: appended as-is with the alphanumeric guard.
    Other,
}

impl TokenKind {
    /// Parse a stored token type. Missing or unrecognized values become [`TokenKind::Word`].
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "number" => Self::Number,
            "emoji" => Self::Emoji,
            "punct" => Self::Punct,
            "space" => Self::Space,
            "other" => Self::Other,
            _ => Self::Word,
        }
    }

    /// Canonical lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Word => "word",
            Self::Number => "number",
            Self::Emoji => "emoji",
            Self::Punct => "punct",
            Self::Space => "space",
            Self::Other => "other",
        }
    }

    /// Words, numbers and emoji get automatic separating spaces.
    pub fn is_word_like(self) -> bool {
        matches!(self, Self::Word | Self::Number | Self::Emoji)
    }
}

impl From<Option<String>> for TokenKind {
    fn from(raw: Option<String>) -> Self {
        raw.as_deref().map(Self::parse).unwrap_or_default()
    }
}

impl From<TokenKind> for String {
    fn from(kind: TokenKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Atomic unit of text reconstruction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Owning segment.
    pub segment_id: String,
    /// Ordering within the segment.
    pub tok_index: i64,
    /// Raw token text.
    #[serde(default)]
    pub text: String,
    /// Lexical class.
    #[serde(default)]
    pub token_type: TokenKind,
}

impl TokenRecord {
    /// Stable identifier used by renderers for word-level interaction.
    pub fn token_id(&self) -> String {
        format!("{}:{}", self.segment_id, self.tok_index)
    }
}

/// Tappable token reference carried by paragraph blocks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockToken {
    pub id: String,
    pub text: String,
}

/// Discriminant of a [`Block`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Chapter,
    Heading,
    Paragraph,
}

/// Renderable unit of reconstructed content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Block {
    /// Chapter marker carrying the chapter title.
    Chapter { key: String, text: String },
    /// Heading reconstructed from a heading segment.
    Heading { key: String, text: String },
    /// Paragraph text plus the tokens it was built from.
    Paragraph {
        key: String,
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tokens: Vec<BlockToken>,
    },
}

impl Block {
    pub fn chapter(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Chapter {
            key: key.into(),
            text: text.into(),
        }
    }

    pub fn heading(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Heading {
            key: key.into(),
            text: text.into(),
        }
    }

    pub fn paragraph(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Paragraph {
            key: key.into(),
            text: text.into(),
            tokens: Vec::new(),
        }
    }

    /// Stable list-rendering identity.
    pub fn key(&self) -> &str {
        match self {
            Self::Chapter { key, .. } | Self::Heading { key, .. } | Self::Paragraph { key, .. } => {
                key
            }
        }
    }

    /// Display text.
    pub fn text(&self) -> &str {
        match self {
            Self::Chapter { text, .. }
            | Self::Heading { text, .. }
            | Self::Paragraph { text, .. } => text,
        }
    }

    pub fn kind(&self) -> BlockKind {
        match self {
            Self::Chapter { .. } => BlockKind::Chapter,
            Self::Heading { .. } => BlockKind::Heading,
            Self::Paragraph { .. } => BlockKind::Paragraph,
        }
    }

    /// Tokens attached to a paragraph; empty for other kinds.
    pub fn tokens(&self) -> &[BlockToken] {
        match self {
            Self::Paragraph { tokens, .. } => tokens,
            _ => &[],
        }
    }
}
