use serde::{Deserialize, Serialize};
use story_stream::Block;

/// Source range of one block placed on a page.
///
/// Whole blocks span their full text. Paragraph fragments record the char
/// range of the original paragraph they carry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSpan {
    /// Key of the unsplit source block.
    pub source_key: String,
    /// First char offset (inclusive) in the source block text.
    pub start_char: usize,
    /// Last char offset (exclusive) in the source block text.
    pub end_char: usize,
    /// `true` for a forced one-line cut on a page too short for any line.
    pub hard_cut: bool,
}

impl BlockSpan {
    pub(crate) fn whole(block: &Block) -> Self {
        Self {
            source_key: block.key().to_string(),
            start_char: 0,
            end_char: block.text().chars().count(),
            hard_cut: false,
        }
    }

    /// Whether `char_offset` of the source block falls inside this span.
    pub fn contains(&self, char_offset: usize) -> bool {
        char_offset >= self.start_char && char_offset < self.end_char
    }
}

/// Per-page metrics for navigation/progress consumers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetrics {
    /// Page index in the paginated story (0-based).
    pub page_index: usize,
    /// Total pages, once layout is complete.
    pub page_count: Option<usize>,
    /// Estimated height consumed by this page's blocks.
    pub used_height: f32,
    /// Height available to content on every page.
    pub available_height: f32,
    /// Key of the chapter block this page belongs to, if any came before it.
    pub chapter_key: Option<String>,
    /// Story progress in `[0.0, 1.0]`, once layout is complete.
    pub progress: f32,
}

/// One laid-out page.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderPage {
    /// 1-based page number.
    pub page_number: usize,
    /// Blocks and fragments in reading order.
    pub blocks: Vec<Block>,
    /// Source range of each entry in `blocks`.
    pub spans: Vec<BlockSpan>,
    pub metrics: PageMetrics,
}

impl RenderPage {
    /// Create an empty page.
    pub fn new(page_number: usize) -> Self {
        Self {
            page_number,
            blocks: Vec::with_capacity(0),
            spans: Vec::with_capacity(0),
            metrics: PageMetrics {
                page_index: page_number.saturating_sub(1),
                ..PageMetrics::default()
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub(crate) fn push(&mut self, block: Block, span: BlockSpan) {
        self.blocks.push(block);
        self.spans.push(span);
    }

    /// Drop metrics and spans, keeping only the blocks.
    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }
}

/// Stable fingerprint of layout-affecting settings.
///
/// Together with the identity of the block list it is a suitable memo key
/// for callers that cache page lists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PaginationProfileId(pub [u8; 32]);

impl PaginationProfileId {
    /// Build a deterministic profile id from arbitrary payload bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        fn fnv64(seed: u64, payload: &[u8]) -> u64 {
            let mut hash = seed;
            for b in payload {
                hash ^= *b as u64;
                hash = hash.wrapping_mul(0x100000001b3);
            }
            hash
        }
        let mut out = [0u8; 32];
        let seeds = [
            0xcbf29ce484222325u64,
            0x9e3779b97f4a7c15,
            0xd6e8feb86659fd93,
            0xa0761d6478bd642f,
        ];
        for (chunk, seed) in out.chunks_exact_mut(8).zip(seeds) {
            chunk.copy_from_slice(&fnv64(seed, bytes).to_le_bytes());
        }
        Self(out)
    }
}
