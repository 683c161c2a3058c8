//! Query interface to the story store and an in-memory implementation.

use std::collections::BTreeSet;
use std::convert::Infallible;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;
use crate::model::{ChapterRecord, RevisionRecord, SegmentRecord, TokenRecord};

/// Read-only story store consulted by the resolver.
///
/// Implementations typically wrap a network or database client. Every
/// method may fail; the resolver hands such failures back to its caller
/// unchanged.
#[async_trait]
pub trait StoryDataSource: Send + Sync {
    /// Error produced by any query.
    type Error: std::error::Error + Send + Sync + 'static;

    /// All revisions of a story, ordered by `rev` descending.
    async fn list_revisions(&self, story_id: &str) -> Result<Vec<RevisionRecord>, Self::Error>;

    /// All chapters of a story, in any order.
    async fn list_chapters(&self, story_id: &str) -> Result<Vec<ChapterRecord>, Self::Error>;

    /// Segments belonging to any of the given revisions.
    async fn list_segments(
        &self,
        revision_ids: &[String],
    ) -> Result<Vec<SegmentRecord>, Self::Error>;

    /// Tokens of the given segments ordered by `(segment_id, tok_index)`.
    async fn list_tokens(&self, segment_ids: &[String]) -> Result<Vec<TokenRecord>, Self::Error>;
}

/// Flat dump of every record kind, loadable from JSON.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StorySnapshot {
    #[serde(default)]
    pub revisions: Vec<RevisionRecord>,
    #[serde(default)]
    pub chapters: Vec<ChapterRecord>,
    #[serde(default)]
    pub segments: Vec<SegmentRecord>,
    #[serde(default)]
    pub tokens: Vec<TokenRecord>,
}

impl StorySnapshot {
    /// Parse a snapshot from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a snapshot file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

/// [`StoryDataSource`] over an owned [`StorySnapshot`].
#[derive(Clone, Debug, Default)]
pub struct MemoryStorySource {
    snapshot: StorySnapshot,
}

impl MemoryStorySource {
    pub fn new(snapshot: StorySnapshot) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &StorySnapshot {
        &self.snapshot
    }
}

#[async_trait]
impl StoryDataSource for MemoryStorySource {
    type Error = Infallible;

    async fn list_revisions(&self, story_id: &str) -> Result<Vec<RevisionRecord>, Self::Error> {
        let mut revisions: Vec<RevisionRecord> = self
            .snapshot
            .revisions
            .iter()
            .filter(|rev| rev.story_id == story_id)
            .cloned()
            .collect();
        revisions.sort_by(|a, b| b.rev.cmp(&a.rev));
        Ok(revisions)
    }

    async fn list_chapters(&self, story_id: &str) -> Result<Vec<ChapterRecord>, Self::Error> {
        Ok(self
            .snapshot
            .chapters
            .iter()
            .filter(|chapter| chapter.story_id == story_id)
            .cloned()
            .collect())
    }

    async fn list_segments(
        &self,
        revision_ids: &[String],
    ) -> Result<Vec<SegmentRecord>, Self::Error> {
        let wanted: BTreeSet<&str> = revision_ids.iter().map(String::as_str).collect();
        Ok(self
            .snapshot
            .segments
            .iter()
            .filter(|seg| wanted.contains(seg.story_revision_id.as_str()))
            .cloned()
            .collect())
    }

    async fn list_tokens(&self, segment_ids: &[String]) -> Result<Vec<TokenRecord>, Self::Error> {
        let wanted: BTreeSet<&str> = segment_ids.iter().map(String::as_str).collect();
        let mut tokens: Vec<TokenRecord> = self
            .snapshot
            .tokens
            .iter()
            .filter(|tok| wanted.contains(tok.segment_id.as_str()))
            .cloned()
            .collect();
        tokens.sort_by(|a, b| {
            a.segment_id
                .cmp(&b.segment_id)
                .then(a.tok_index.cmp(&b.tok_index))
        });
        Ok(tokens)
    }
}
