//! Navigation over laid-out pages: chapter page map and reading positions
//! that survive re-pagination.

use core::fmt;

use serde::{Deserialize, Serialize};
use story_stream::Block;

use crate::render_ir::RenderPage;
use crate::render_layout::progress_for_index;

/// Chapter-level page span used by [`PageMap`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageMapEntry {
    /// Key of the chapter block (`chapter-<id>`).
    pub chapter_key: String,
    /// Chapter title as emitted.
    pub title: String,
    /// First page index (0-based) of this chapter.
    pub first_page_index: usize,
    /// Pages up to the next titled chapter.
    pub page_count: usize,
}

impl PageMapEntry {
    fn contains_page(&self, page_index: usize) -> bool {
        page_index >= self.first_page_index
            && page_index < self.first_page_index.saturating_add(self.page_count)
    }
}

/// Table of contents over a paginated story.
///
/// Only titled chapters emit a chapter block, so pages of an untitled chapter
/// count towards the titled chapter before it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageMap {
    entries: Vec<PageMapEntry>,
    total_pages: usize,
}

impl PageMap {
    /// Index chapter blocks of `pages`. Chapter blocks always open a page.
    pub fn from_pages(pages: &[RenderPage]) -> Self {
        let mut entries: Vec<PageMapEntry> = Vec::new();
        for (idx, page) in pages.iter().enumerate() {
            if let Some(Block::Chapter { key, text }) = page.blocks.first() {
                entries.push(PageMapEntry {
                    chapter_key: key.clone(),
                    title: text.clone(),
                    first_page_index: idx,
                    page_count: 1,
                });
            } else if let Some(last) = entries.last_mut() {
                last.page_count += 1;
            }
        }
        Self {
            entries,
            total_pages: pages.len(),
        }
    }

    pub fn entries(&self) -> &[PageMapEntry] {
        &self.entries
    }

    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    /// First page of the chapter with block key `chapter_key`.
    pub fn chapter_start_page_index(&self, chapter_key: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|entry| entry.chapter_key == chapter_key)
            .map(|entry| entry.first_page_index)
    }

    /// Chapter that `page_index` belongs to, if any.
    pub fn entry_for_page(&self, page_index: usize) -> Option<&PageMapEntry> {
        self.entries
            .iter()
            .find(|entry| entry.contains_page(page_index))
    }
}

/// Persisted reading position.
///
/// Anchored to a character of a source block rather than a page number, so
/// it can be resolved again after the viewport changes. `progress` is the
/// fallback when the anchor block no longer exists.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReadingPosition {
    /// Key of the unsplit source block at the top of the page.
    pub source_key: String,
    /// Char offset into that block's text.
    pub char_offset: usize,
    /// Story progress in `[0.0, 1.0]` at capture time.
    pub progress: f32,
}

impl ReadingPosition {
    /// Position of the first block on `page`, or `None` for an empty page.
    pub fn capture(page: &RenderPage) -> Option<Self> {
        let span = page.spans.first()?;
        Some(Self {
            source_key: span.source_key.clone(),
            char_offset: span.start_char,
            progress: normalize_progress(page.metrics.progress),
        })
    }

    /// Encode as compact postcard bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ReadingPositionError> {
        postcard::to_allocvec(self).map_err(ReadingPositionError::Encode)
    }

    /// Decode from bytes produced by [`ReadingPosition::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ReadingPositionError> {
        postcard::from_bytes(bytes).map_err(ReadingPositionError::Decode)
    }
}

/// Failure to persist or restore a [`ReadingPosition`].
#[derive(Debug)]
pub enum ReadingPositionError {
    Encode(postcard::Error),
    Decode(postcard::Error),
}

impl ReadingPositionError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Encode(_) => "POSITION_ENCODE",
            Self::Decode(_) => "POSITION_DECODE",
        }
    }
}

impl fmt::Display for ReadingPositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode(err) | Self::Decode(err) => write!(f, "{}: {}", self.code(), err),
        }
    }
}

impl std::error::Error for ReadingPositionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Encode(err) | Self::Decode(err) => Some(err),
        }
    }
}

/// Page in `pages` holding the position's anchor character.
///
/// Falls back to the page nearest the stored progress when the anchor block
/// is gone. Returns `None` only for an empty page list.
pub fn resolve_page_for_position(pages: &[RenderPage], position: &ReadingPosition) -> Option<usize> {
    if pages.is_empty() {
        return None;
    }
    let anchored = pages.iter().position(|page| {
        page.spans.iter().any(|span| {
            span.source_key == position.source_key
                && (span.contains(position.char_offset)
                    || (span.start_char == span.end_char && span.start_char == position.char_offset))
        })
    });
    if anchored.is_none() {
        log::debug!(
            "reading position anchor {} not found; remapping by progress",
            position.source_key
        );
    }
    Some(anchored.unwrap_or_else(|| progress_to_page_index(position.progress, pages.len())))
}

/// Page in `new_pages` at the same story progress as
/// `old_pages[old_page_index]`.
pub fn remap_page_index_by_progress(
    old_pages: &[RenderPage],
    old_page_index: usize,
    new_pages: &[RenderPage],
) -> Option<usize> {
    if new_pages.is_empty() {
        return None;
    }
    let progress = progress_for_index(old_page_index, old_pages.len());
    Some(progress_to_page_index(progress, new_pages.len()))
}

fn normalize_progress(progress: f32) -> f32 {
    if progress.is_finite() {
        return progress.clamp(0.0, 1.0);
    }
    0.0
}

/// Nearest page index for a progress value in `[0.0, 1.0]`.
pub fn progress_to_page_index(progress: f32, page_count: usize) -> usize {
    if page_count <= 1 {
        return 0;
    }
    let max_index = page_count - 1;
    let rounded = (normalize_progress(progress) * max_index as f32).round();
    if !rounded.is_finite() || rounded <= 0.0 {
        return 0;
    }
    (rounded as usize).min(max_index)
}
