//! Token-level story reconstruction for reader UIs.
//!
//! A story is stored as revisions, chapters, segments and tokens. This crate
//! resolves the authoritative revision per chapter, rebuilds flowing text
//! from ordered tokens, and emits an ordered [`Block`] sequence that a
//! renderer can show as a continuous scroll or hand to the paginator in
//! `story-stream-render`.
//!
//! ```rust,no_run
//! use story_stream::{ContentResolver, MemoryStorySource, StorySnapshot};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let snapshot = StorySnapshot::from_json_str(r#"{"revisions":[],"chapters":[],"segments":[],"tokens":[]}"#)?;
//! let resolver = ContentResolver::new(MemoryStorySource::new(snapshot));
//! let blocks = resolver.load_story_blocks("story-1").await?;
//! assert!(blocks.is_empty());
//! # Ok(())
//! # }
//! ```

#![cfg_attr(
    not(test),
    deny(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented
    )
)]

pub mod error;
pub mod model;
pub mod resolver;
pub mod source;
pub mod tokens;

pub use error::{ResolveError, SnapshotError, SourceQuery};
pub use model::{
    Block, BlockKind, BlockToken, ChapterRecord, RevisionRecord, SegmentKind, SegmentRecord,
    TokenKind, TokenRecord,
};
pub use resolver::{
    assemble_blocks, chapter_order, flush_paragraph, select_latest_revision_segments,
    CancelToken, ContentResolver, LoadLiveness, NeverCancel, ParagraphAccumulator, ParagraphKeys,
    ResolveSummary,
};
pub use source::{MemoryStorySource, StoryDataSource, StorySnapshot};
pub use tokens::{collapse_whitespace, reconstruct_segment_text, TokenTextBuilder};
