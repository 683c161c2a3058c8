//! Content resolver: revisions, chapters, segments and tokens in, blocks out.
//!
//! The resolver picks the newest revision independently for each chapter,
//! rebuilds every chosen segment's text from its tokens, and emits blocks in
//! `(chapter order, seg_index)` order.
//!
//! Segment kinds decide paragraph boundaries:
//! - `heading` segments become heading blocks and close any open paragraph.
//! - `paragraph` segments always become their own paragraph block.
//! - every other segment accumulates into the open paragraph, joined with
//!   single spaces, until the next boundary or the end of the chapter.

use core::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use crate::error::{ResolveError, SourceQuery};
use crate::model::{
    Block, BlockToken, ChapterRecord, RevisionRecord, SegmentKind, SegmentRecord, TokenKind,
    TokenRecord,
};
use crate::source::StoryDataSource;
use crate::tokens::{collapse_whitespace, reconstruct_segment_text};

/// Caller-side liveness check for discarding late load results.
pub trait CancelToken {
    fn is_cancelled(&self) -> bool;
}

/// Never-cancel token for default call paths.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverCancel;

impl CancelToken for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Shared liveness flag owned by a consuming view.
///
/// Clone it into the load task and call [`LoadLiveness::cancel`] when the
/// view goes away; results that complete afterwards are dropped.
#[derive(Clone, Debug)]
pub struct LoadLiveness {
    alive: Arc<AtomicBool>,
}

impl Default for LoadLiveness {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadLiveness {
    pub fn new() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Mark the owner as gone.
    pub fn cancel(&self) {
        self.alive.store(false, AtomicOrdering::Release);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(AtomicOrdering::Acquire)
    }
}

impl CancelToken for LoadLiveness {
    fn is_cancelled(&self) -> bool {
        !self.is_alive()
    }
}

/// Record counts for one resolved story.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResolveSummary {
    pub revisions: usize,
    pub chapters: usize,
    pub segments_fetched: usize,
    pub segments_selected: usize,
    pub tokens: usize,
    pub blocks: usize,
}

fn compare_chapters(a: &ChapterRecord, b: &ChapterRecord) -> Ordering {
    let by_position = match (a.position, b.position) {
        (Some(pa), Some(pb)) => pa.total_cmp(&pb),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_position
        .then_with(|| {
            let ta = a.title.as_deref().unwrap_or_default().to_lowercase();
            let tb = b.title.as_deref().unwrap_or_default().to_lowercase();
            ta.cmp(&tb)
        })
        .then_with(|| a.id.cmp(&b.id))
}

/// Chapters in reading order: `(position, lowercase title, id)`, missing positions last.
pub fn chapter_order(chapters: &[ChapterRecord]) -> Vec<&ChapterRecord> {
    let mut ordered: Vec<&ChapterRecord> = chapters.iter().collect();
    ordered.sort_by(|a, b| compare_chapters(a, b));
    ordered
}

/// Pick, per chapter, the segments of the highest-`rev` revision that has any.
///
/// Segments are grouped by chapter, then by revision; the winning group is
/// sorted by `seg_index` (missing as `0`). Segments whose revision is not in
/// `revisions` are ignored. Chapters with no segments are absent from the map.
pub fn select_latest_revision_segments(
    segments: Vec<SegmentRecord>,
    revisions: &[RevisionRecord],
) -> BTreeMap<String, Vec<SegmentRecord>> {
    let rev_by_id: HashMap<&str, i64> = revisions
        .iter()
        .map(|revision| (revision.id.as_str(), revision.rev))
        .collect();

    let mut by_chapter: BTreeMap<String, BTreeMap<String, Vec<SegmentRecord>>> = BTreeMap::new();
    for segment in segments {
        if !rev_by_id.contains_key(segment.story_revision_id.as_str()) {
            log::warn!(
                "segment {} references unknown revision {}",
                segment.id,
                segment.story_revision_id
            );
            continue;
        }
        by_chapter
            .entry(segment.chapter_id.clone())
            .or_default()
            .entry(segment.story_revision_id.clone())
            .or_default()
            .push(segment);
    }

    let mut chosen = BTreeMap::new();
    for (chapter_id, by_revision) in by_chapter {
        let latest = by_revision
            .into_iter()
            .max_by_key(|(revision_id, _)| rev_by_id.get(revision_id.as_str()).copied());
        if let Some((_, mut group)) = latest {
            group.sort_by_key(SegmentRecord::order_index);
            chosen.insert(chapter_id, group);
        }
    }
    chosen
}

/// Paragraph keys in emission order: `para-1`, `para-2`, ...
#[derive(Clone, Debug, Default)]
pub struct ParagraphKeys {
    next: u64,
}

impl ParagraphKeys {
    fn advance(&mut self) -> String {
        self.next += 1;
        format!("para-{}", self.next)
    }
}

/// Join buffered fragments into one paragraph block.
///
/// Returns `None` (and consumes no key) when the joined text is blank.
pub fn flush_paragraph(
    fragments: &[String],
    tokens: Vec<BlockToken>,
    keys: &mut ParagraphKeys,
) -> Option<Block> {
    let text = collapse_whitespace(&fragments.join(" "));
    if text.is_empty() {
        return None;
    }
    Some(Block::Paragraph {
        key: keys.advance(),
        text,
        tokens,
    })
}

/// Accumulator for sentence-level segments awaiting a paragraph boundary.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ParagraphAccumulator {
    #[default]
    Idle,
    Accumulating {
        fragments: Vec<String>,
        tokens: Vec<BlockToken>,
    },
}

impl ParagraphAccumulator {
    /// Append one non-empty fragment.
    pub fn push(&mut self, text: String, mut new_tokens: Vec<BlockToken>) {
        match self {
            Self::Idle => {
                *self = Self::Accumulating {
                    fragments: vec![text],
                    tokens: new_tokens,
                };
            }
            Self::Accumulating { fragments, tokens } => {
                fragments.push(text);
                tokens.append(&mut new_tokens);
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Close the open paragraph, returning to `Idle`.
    pub fn flush(&mut self, keys: &mut ParagraphKeys) -> Option<Block> {
        match core::mem::take(self) {
            Self::Idle => None,
            Self::Accumulating { fragments, tokens } => flush_paragraph(&fragments, tokens, keys),
        }
    }
}

fn block_tokens(tokens: &[TokenRecord]) -> Vec<BlockToken> {
    tokens
        .iter()
        .filter(|tok| tok.token_type != TokenKind::Space)
        .filter_map(|tok| {
            let text = tok.text.trim();
            (!text.is_empty()).then(|| BlockToken {
                id: tok.token_id(),
                text: text.to_string(),
            })
        })
        .collect()
}

/// Builds the block list chapter by chapter.
#[derive(Debug, Default)]
struct BlockEmitter {
    blocks: Vec<Block>,
    keys: ParagraphKeys,
    pending: ParagraphAccumulator,
}

impl BlockEmitter {
    fn flush_pending(&mut self) {
        if let Some(block) = self.pending.flush(&mut self.keys) {
            self.blocks.push(block);
        }
    }

    fn emit_chapter(
        &mut self,
        chapter: &ChapterRecord,
        segments: &[SegmentRecord],
        tokens_by_segment: &HashMap<String, Vec<TokenRecord>>,
    ) {
        if let Some(title) = chapter.display_title() {
            self.blocks
                .push(Block::chapter(format!("chapter-{}", chapter.id), title));
        }

        for segment in segments {
            let seg_tokens = tokens_by_segment
                .get(&segment.id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let text = reconstruct_segment_text(seg_tokens);
            match segment.kind {
                SegmentKind::Heading => {
                    self.flush_pending();
                    if !text.is_empty() {
                        self.blocks
                            .push(Block::heading(format!("heading-{}", segment.id), text));
                    }
                }
                SegmentKind::Paragraph => {
                    self.flush_pending();
                    if let Some(block) =
                        flush_paragraph(&[text], block_tokens(seg_tokens), &mut self.keys)
                    {
                        self.blocks.push(block);
                    }
                }
                SegmentKind::Sentence => {
                    if !text.is_empty() {
                        self.pending.push(text, block_tokens(seg_tokens));
                    }
                }
            }
        }
        self.flush_pending();
    }
}

/// Assemble blocks from already-fetched records.
///
/// `chosen` maps chapter ids to their selected, ordered segments; `tokens`
/// must be ordered by `tok_index` within each segment.
pub fn assemble_blocks(
    chapters: &[ChapterRecord],
    chosen: &BTreeMap<String, Vec<SegmentRecord>>,
    tokens: Vec<TokenRecord>,
) -> Vec<Block> {
    let mut tokens_by_segment: HashMap<String, Vec<TokenRecord>> = HashMap::new();
    for token in tokens {
        tokens_by_segment
            .entry(token.segment_id.clone())
            .or_default()
            .push(token);
    }
    for seg_tokens in tokens_by_segment.values_mut() {
        seg_tokens.sort_by_key(|tok| tok.tok_index);
    }

    let mut emitter = BlockEmitter::default();
    let ordered = chapter_order(chapters);
    for chapter in &ordered {
        let segments = chosen
            .get(&chapter.id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        emitter.emit_chapter(chapter, segments, &tokens_by_segment);
    }

    let orphans = chosen
        .keys()
        .filter(|chapter_id| !chapters.iter().any(|c| &c.id == *chapter_id))
        .count();
    if orphans > 0 {
        log::warn!(
            "dropping segments of {} chapter(s) missing from the chapter list",
            orphans
        );
    }
    emitter.blocks
}

/// Resolves a story into blocks through a [`StoryDataSource`].
#[derive(Clone, Debug)]
pub struct ContentResolver<S> {
    source: S,
}

impl<S: StoryDataSource> ContentResolver<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Load the ordered block sequence of a story.
    ///
    /// A story without revisions yields an empty list. Any fetch failure is
    /// returned as-is; no partial list is produced.
    pub async fn load_story_blocks(
        &self,
        story_id: &str,
    ) -> Result<Vec<Block>, ResolveError<S::Error>> {
        self.load_story_with_summary(story_id)
            .await
            .map(|(blocks, _)| blocks)
    }

    /// Load blocks unless `cancel` reports the caller gone by completion.
    ///
    /// The fetches themselves are not interrupted; a cancelled load returns
    /// `Ok(None)` and its result is discarded.
    pub async fn load_story_blocks_if_live(
        &self,
        story_id: &str,
        cancel: &(dyn CancelToken + Sync),
    ) -> Result<Option<Vec<Block>>, ResolveError<S::Error>> {
        let result = self.load_story_blocks(story_id).await;
        if cancel.is_cancelled() {
            log::debug!("discarding late load result for story {}", story_id);
            return Ok(None);
        }
        result.map(Some)
    }

    /// Load blocks together with record counts.
    pub async fn load_story_with_summary(
        &self,
        story_id: &str,
    ) -> Result<(Vec<Block>, ResolveSummary), ResolveError<S::Error>> {
        let revisions = self
            .source
            .list_revisions(story_id)
            .await
            .map_err(|e| ResolveError::new(SourceQuery::ListRevisions, e))?;
        if revisions.is_empty() {
            return Ok((Vec::new(), ResolveSummary::default()));
        }

        let revision_ids: Vec<String> = revisions.iter().map(|r| r.id.clone()).collect();
        let (chapters, segments) = tokio::join!(
            self.source.list_chapters(story_id),
            self.source.list_segments(&revision_ids),
        );
        let chapters = chapters.map_err(|e| ResolveError::new(SourceQuery::ListChapters, e))?;
        let segments = segments.map_err(|e| ResolveError::new(SourceQuery::ListSegments, e))?;
        let segments_fetched = segments.len();

        let chosen = select_latest_revision_segments(segments, &revisions);
        let chosen_ids: Vec<String> = chapter_order(&chapters)
            .into_iter()
            .filter_map(|chapter| chosen.get(&chapter.id))
            .flatten()
            .map(|segment| segment.id.clone())
            .collect();

        let tokens = if chosen_ids.is_empty() {
            Vec::new()
        } else {
            self.source
                .list_tokens(&chosen_ids)
                .await
                .map_err(|e| ResolveError::new(SourceQuery::ListTokens, e))?
        };
        let token_count = tokens.len();

        let blocks = assemble_blocks(&chapters, &chosen, tokens);
        let summary = ResolveSummary {
            revisions: revisions.len(),
            chapters: chapters.len(),
            segments_fetched,
            segments_selected: chosen_ids.len(),
            tokens: token_count,
            blocks: blocks.len(),
        };
        log::debug!("resolved story {}: {:?}", story_id, summary);
        Ok((blocks, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(id: &str, title: Option<&str>, position: Option<f64>) -> ChapterRecord {
        ChapterRecord {
            id: id.into(),
            story_id: "s".into(),
            title: title.map(Into::into),
            position,
        }
    }

    fn segment(id: &str, chapter: &str, idx: Option<i64>, kind: &str, rev: &str) -> SegmentRecord {
        SegmentRecord {
            id: id.into(),
            chapter_id: chapter.into(),
            seg_index: idx,
            kind: SegmentKind::parse(kind),
            story_revision_id: rev.into(),
        }
    }

    fn revision(id: &str, rev: i64) -> RevisionRecord {
        RevisionRecord {
            id: id.into(),
            story_id: "s".into(),
            rev,
        }
    }

    fn word(segment: &str, idx: i64, text: &str) -> TokenRecord {
        TokenRecord {
            segment_id: segment.into(),
            tok_index: idx,
            text: text.into(),
            token_type: TokenKind::Word,
        }
    }

    #[test]
    fn chapter_order_sorts_missing_positions_last_then_title_then_id() {
        let chapters = vec![
            chapter("z", Some("Beta"), Some(1.0)),
            chapter("a", None, None),
            chapter("y", Some("alpha"), Some(1.0)),
            chapter("b", Some("Alpha"), Some(1.0)),
            chapter("c", Some("First"), Some(0.5)),
        ];
        let ids: Vec<&str> = chapter_order(&chapters)
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ids, vec!["c", "b", "y", "z", "a"]);
    }

    #[test]
    fn latest_revision_is_selected_per_chapter() {
        let revisions = vec![revision("r2", 2), revision("r1", 1)];
        let segments = vec![
            segment("old", "c1", Some(0), "sentence", "r1"),
            segment("new", "c1", Some(0), "sentence", "r2"),
            segment("only", "c2", Some(0), "sentence", "r1"),
        ];
        let chosen = select_latest_revision_segments(segments, &revisions);
        assert_eq!(chosen["c1"].len(), 1);
        assert_eq!(chosen["c1"][0].id, "new");
        assert_eq!(chosen["c2"][0].id, "only");
    }

    #[test]
    fn chosen_segments_sort_by_index_with_missing_as_zero() {
        let revisions = vec![revision("r1", 1)];
        let segments = vec![
            segment("b", "c1", Some(2), "sentence", "r1"),
            segment("a", "c1", None, "sentence", "r1"),
            segment("m", "c1", Some(1), "sentence", "r1"),
        ];
        let chosen = select_latest_revision_segments(segments, &revisions);
        let ids: Vec<&str> = chosen["c1"].iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "m", "b"]);
    }

    #[test]
    fn segments_with_unknown_revision_are_ignored() {
        let revisions = vec![revision("r1", 1)];
        let segments = vec![segment("x", "c1", Some(0), "sentence", "ghost")];
        assert!(select_latest_revision_segments(segments, &revisions).is_empty());
    }

    #[test]
    fn flush_skips_blank_text_without_consuming_a_key() {
        let mut keys = ParagraphKeys::default();
        assert_eq!(flush_paragraph(&[" ".to_string(), String::new()], vec![], &mut keys), None);
        let block = flush_paragraph(&["A.".to_string(), " B. ".to_string()], vec![], &mut keys)
            .expect("paragraph");
        assert_eq!(block, Block::paragraph("para-1", "A. B."));
    }

    #[test]
    fn accumulator_transitions_between_idle_and_accumulating() {
        let mut keys = ParagraphKeys::default();
        let mut acc = ParagraphAccumulator::default();
        assert!(acc.is_idle());
        assert_eq!(acc.flush(&mut keys), None);

        acc.push("One.".into(), vec![]);
        acc.push("Two.".into(), vec![]);
        assert!(!acc.is_idle());
        let block = acc.flush(&mut keys).expect("paragraph");
        assert_eq!(block.text(), "One. Two.");
        assert!(acc.is_idle());
    }

    #[test]
    fn sentences_merge_and_paragraph_segments_stand_alone() {
        let chapters = vec![chapter("c1", None, Some(1.0))];
        let revisions = vec![revision("r1", 1)];
        let segments = vec![
            segment("s1", "c1", Some(0), "sentence", "r1"),
            segment("s2", "c1", Some(1), "sentence", "r1"),
            segment("p1", "c1", Some(2), "paragraph", "r1"),
            segment("p2", "c1", Some(3), "paragraph", "r1"),
        ];
        let tokens = vec![
            word("s1", 0, "A."),
            word("s2", 0, "B."),
            word("p1", 0, "C."),
            word("p2", 0, "D."),
        ];
        let chosen = select_latest_revision_segments(segments, &revisions);
        let blocks = assemble_blocks(&chapters, &chosen, tokens);
        let texts: Vec<&str> = blocks.iter().map(Block::text).collect();
        assert_eq!(texts, vec!["A. B.", "C.", "D."]);
        let keys: Vec<&str> = blocks.iter().map(Block::key).collect();
        assert_eq!(keys, vec!["para-1", "para-2", "para-3"]);
    }

    #[test]
    fn heading_closes_pending_paragraph() {
        let chapters = vec![chapter("c1", Some("Ch"), Some(1.0))];
        let revisions = vec![revision("r1", 1)];
        let segments = vec![
            segment("s1", "c1", Some(0), "sentence", "r1"),
            segment("h1", "c1", Some(1), "heading", "r1"),
            segment("s2", "c1", Some(2), "sentence", "r1"),
        ];
        let tokens = vec![word("s1", 0, "Before"), word("h1", 0, "Title"), word("s2", 0, "After")];
        let chosen = select_latest_revision_segments(segments, &revisions);
        let blocks = assemble_blocks(&chapters, &chosen, tokens);
        assert_eq!(
            blocks,
            vec![
                Block::chapter("chapter-c1", "Ch"),
                Block::Paragraph {
                    key: "para-1".into(),
                    text: "Before".into(),
                    tokens: vec![BlockToken {
                        id: "s1:0".into(),
                        text: "Before".into()
                    }],
                },
                Block::heading("heading-h1", "Title"),
                Block::Paragraph {
                    key: "para-2".into(),
                    text: "After".into(),
                    tokens: vec![BlockToken {
                        id: "s2:0".into(),
                        text: "After".into()
                    }],
                },
            ]
        );
    }

    #[test]
    fn empty_heading_and_empty_paragraph_emit_nothing() {
        let chapters = vec![chapter("c1", None, Some(1.0))];
        let revisions = vec![revision("r1", 1)];
        let segments = vec![
            segment("h1", "c1", Some(0), "heading", "r1"),
            segment("p1", "c1", Some(1), "paragraph", "r1"),
        ];
        let chosen = select_latest_revision_segments(segments, &revisions);
        assert!(assemble_blocks(&chapters, &chosen, vec![]).is_empty());
    }

    #[test]
    fn paragraph_counter_spans_chapters() {
        let chapters = vec![
            chapter("c1", Some("One"), Some(1.0)),
            chapter("c2", Some("Two"), Some(2.0)),
        ];
        let revisions = vec![revision("r1", 1)];
        let segments = vec![
            segment("a", "c1", Some(0), "sentence", "r1"),
            segment("b", "c2", Some(0), "sentence", "r1"),
        ];
        let tokens = vec![word("a", 0, "x"), word("b", 0, "y")];
        let chosen = select_latest_revision_segments(segments, &revisions);
        let keys: Vec<String> = assemble_blocks(&chapters, &chosen, tokens)
            .iter()
            .map(|b| b.key().to_string())
            .collect();
        assert_eq!(keys, vec!["chapter-c1", "para-1", "chapter-c2", "para-2"]);
    }

    #[test]
    fn space_tokens_are_not_block_tokens() {
        let toks = vec![
            word("s", 0, "Hi"),
            TokenRecord {
                segment_id: "s".into(),
                tok_index: 1,
                text: " ".into(),
                token_type: TokenKind::Space,
            },
            word("s", 2, "there"),
        ];
        let ids: Vec<String> = block_tokens(&toks).into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["s:0", "s:2"]);
    }

    #[test]
    fn liveness_flag_cancels_clones() {
        let live = LoadLiveness::new();
        let held = live.clone();
        assert!(!held.is_cancelled());
        live.cancel();
        assert!(held.is_cancelled());
        assert!(!NeverCancel.is_cancelled());
    }
}
