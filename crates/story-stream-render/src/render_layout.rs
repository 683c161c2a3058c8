//! Estimated pagination of story blocks.
//!
//! There is no font measurement here. Heights come from a constant line
//! height and an average character width of `font_size * avg_char_width_ratio`,
//! so page breaks are approximate: good enough for swipe-mode reading, not
//! pixel-exact. Renderers that need exact fits must measure themselves.

use story_stream::{Block, BlockToken};

use crate::render_ir::{BlockSpan, PaginationProfileId, RenderPage};

/// Layout configuration for page construction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutConfig {
    /// Viewport width.
    pub viewport_width: f32,
    /// Viewport height.
    pub viewport_height: f32,
    /// Horizontal padding applied on each side.
    pub side_padding: f32,
    /// Vertical space per page not available to content: top and bottom
    /// padding plus the reader's header and page indicator.
    pub vertical_padding_px: f32,
    /// Assumed font size.
    pub font_size_px: f32,
    /// Constant line height.
    pub line_height_px: f32,
    /// Average glyph width as a fraction of the font size.
    pub avg_char_width_ratio: f32,
    /// Bottom margin after each paragraph or fragment.
    pub paragraph_gap_px: f32,
    pub heading_margin_top_px: f32,
    pub heading_margin_bottom_px: f32,
    pub chapter_margin_top_px: f32,
    pub chapter_margin_bottom_px: f32,
    /// Lower clamp for characters per line.
    pub min_chars_per_line: usize,
    /// Half-width of the word-boundary search window around a split target.
    pub split_window_chars: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            viewport_width: 360.0,
            viewport_height: 640.0,
            side_padding: 20.0,
            vertical_padding_px: 120.0,
            font_size_px: 18.0,
            line_height_px: 28.0,
            avg_char_width_ratio: 0.5,
            paragraph_gap_px: 12.0,
            heading_margin_top_px: 8.0,
            heading_margin_bottom_px: 12.0,
            chapter_margin_top_px: 16.0,
            chapter_margin_bottom_px: 20.0,
            min_chars_per_line: 8,
            split_window_chars: 40,
        }
    }
}

fn non_negative(value: f32) -> f32 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

impl LayoutConfig {
    /// Default metrics for a viewport.
    pub fn for_viewport(width: f32, height: f32, side_padding: f32) -> Self {
        Self {
            viewport_width: width,
            viewport_height: height,
            side_padding,
            ..Self::default()
        }
    }

    /// Content height per page, never negative.
    pub fn available_height(&self) -> f32 {
        non_negative(non_negative(self.viewport_height) - non_negative(self.vertical_padding_px))
    }

    fn avg_char_width(&self) -> f32 {
        non_negative(self.font_size_px * self.avg_char_width_ratio)
    }

    fn line_height(&self) -> f32 {
        non_negative(self.line_height_px)
    }

    /// Estimated characters per line, at least `min_chars_per_line`.
    pub fn chars_per_line(&self) -> usize {
        let min = self.min_chars_per_line.max(1);
        let content_w =
            non_negative(self.viewport_width) - 2.0 * non_negative(self.side_padding);
        let avg = self.avg_char_width();
        if avg <= 0.0 {
            return min;
        }
        let per_line = (non_negative(content_w) / avg).floor();
        if per_line.is_finite() && per_line >= min as f32 {
            per_line as usize
        } else {
            min
        }
    }

    /// Estimated height of a chapter marker: one line plus margins.
    pub fn chapter_height(&self) -> f32 {
        self.line_height()
            + non_negative(self.chapter_margin_top_px)
            + non_negative(self.chapter_margin_bottom_px)
    }

    /// Estimated height of a heading: one line plus margins.
    pub fn heading_height(&self) -> f32 {
        self.line_height()
            + non_negative(self.heading_margin_top_px)
            + non_negative(self.heading_margin_bottom_px)
    }

    fn paragraph_gap(&self) -> f32 {
        non_negative(self.paragraph_gap_px)
    }

    fn lines_for_chars(&self, chars: usize) -> usize {
        chars.div_ceil(self.chars_per_line())
    }

    /// Estimated height of a paragraph with `chars` characters.
    pub fn paragraph_height(&self, chars: usize) -> f32 {
        self.lines_for_chars(chars) as f32 * self.line_height() + self.paragraph_gap()
    }

    /// Whole lines that fit in `space` below the paragraph gap.
    fn lines_fitting(&self, space: f32) -> usize {
        let line_h = self.line_height();
        if line_h <= 0.0 {
            return usize::MAX;
        }
        let lines = ((space - self.paragraph_gap()) / line_h).floor();
        if lines.is_finite() && lines > 0.0 {
            lines as usize
        } else {
            0
        }
    }

    /// Stable fingerprint of these settings.
    pub fn profile_id(&self) -> PaginationProfileId {
        let payload = format!("{:?}", self);
        PaginationProfileId::from_bytes(payload.as_bytes())
    }
}

/// Deterministic layout engine that packs blocks into pages.
#[derive(Clone, Debug, Default)]
pub struct LayoutEngine {
    cfg: LayoutConfig,
}

impl LayoutEngine {
    /// Create a layout engine.
    pub fn new(cfg: LayoutConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.cfg
    }

    /// Start an incremental layout session.
    pub fn start_session(&self) -> LayoutSession {
        LayoutSession {
            st: LayoutState::new(self.cfg),
        }
    }

    /// Layout blocks and stream each closed page.
    pub fn layout_with<'a, I, F>(&self, blocks: I, mut on_page: F)
    where
        I: IntoIterator<Item = &'a Block>,
        F: FnMut(RenderPage),
    {
        let mut session = self.start_session();
        for block in blocks {
            session.push_block_with_pages(block, &mut on_page);
        }
        session.finish(&mut on_page);
    }

    /// Layout blocks into pages with completed metrics.
    pub fn layout_blocks(&self, blocks: &[Block]) -> Vec<RenderPage> {
        let mut pages = Vec::with_capacity(8);
        self.layout_with(blocks, |page| pages.push(page));
        let page_count = pages.len();
        for page in pages.iter_mut() {
            page.metrics.page_count = Some(page_count);
            page.metrics.progress = progress_for_index(page.metrics.page_index, page_count);
        }
        log::debug!(
            "paginated {} blocks into {} pages ({} chars/line)",
            blocks.len(),
            page_count,
            self.cfg.chars_per_line()
        );
        pages
    }
}

pub(crate) fn progress_for_index(page_index: usize, page_count: usize) -> f32 {
    if page_count <= 1 {
        return 1.0;
    }
    let clamped = page_index.min(page_count - 1);
    (clamped as f32 / (page_count - 1) as f32).clamp(0.0, 1.0)
}

/// Split blocks into pages for a viewport using default metrics.
///
/// Total over all numeric inputs: zero, negative or non-finite sizes are
/// clamped rather than rejected.
pub fn paginate(blocks: &[Block], width: f32, height: f32, side_padding: f32) -> Vec<Vec<Block>> {
    LayoutEngine::new(LayoutConfig::for_viewport(width, height, side_padding))
        .layout_blocks(blocks)
        .into_iter()
        .map(RenderPage::into_blocks)
        .collect()
}

/// Incremental layout session for streaming blocks into pages.
pub struct LayoutSession {
    st: LayoutState,
}

impl LayoutSession {
    /// Push one block into the layout state.
    pub fn push_block(&mut self, block: &Block) {
        match block {
            Block::Chapter { .. } => self.st.place_chapter(block),
            Block::Heading { .. } => self.st.place_heading(block),
            Block::Paragraph { key, text, tokens } => self.st.place_paragraph(key, text, tokens),
        }
    }

    /// Push one block and emit any fully closed pages.
    pub fn push_block_with_pages<F>(&mut self, block: &Block, on_page: &mut F)
    where
        F: FnMut(RenderPage),
    {
        self.push_block(block);
        for page in self.st.emitted.drain(..) {
            on_page(page);
        }
    }

    /// Close the last page and stream remaining pages.
    pub fn finish<F>(&mut self, on_page: &mut F)
    where
        F: FnMut(RenderPage),
    {
        self.st.close_page();
        for page in self.st.emitted.drain(..) {
            on_page(page);
        }
    }
}

struct LayoutState {
    cfg: LayoutConfig,
    available: f32,
    page_no: usize,
    used: f32,
    page: RenderPage,
    chapter_key: Option<String>,
    emitted: Vec<RenderPage>,
}

impl LayoutState {
    fn new(cfg: LayoutConfig) -> Self {
        Self {
            cfg,
            available: cfg.available_height(),
            page_no: 1,
            used: 0.0,
            page: RenderPage::new(1),
            chapter_key: None,
            emitted: Vec::with_capacity(2),
        }
    }

    fn remaining(&self) -> f32 {
        self.available - self.used
    }

    fn close_page(&mut self) {
        if self.page.is_empty() {
            return;
        }
        self.page_no += 1;
        let mut page = core::mem::replace(&mut self.page, RenderPage::new(self.page_no));
        page.metrics.used_height = self.used;
        page.metrics.available_height = self.available;
        page.metrics.chapter_key = self.chapter_key.clone();
        self.emitted.push(page);
        self.used = 0.0;
    }

    fn place_chapter(&mut self, block: &Block) {
        self.close_page();
        self.chapter_key = Some(block.key().to_string());
        self.page.push(block.clone(), BlockSpan::whole(block));
        self.used += self.cfg.chapter_height();
    }

    fn place_heading(&mut self, block: &Block) {
        let height = self.cfg.heading_height();
        if height > self.remaining() && !self.page.is_empty() {
            self.close_page();
        }
        self.page.push(block.clone(), BlockSpan::whole(block));
        self.used += height;
    }

    fn push_whole_paragraph(
        &mut self,
        key: &str,
        text: &str,
        tokens: &[BlockToken],
        char_len: usize,
        height: f32,
    ) {
        self.page.push(
            Block::Paragraph {
                key: key.to_string(),
                text: text.to_string(),
                tokens: tokens.to_vec(),
            },
            BlockSpan {
                source_key: key.to_string(),
                start_char: 0,
                end_char: char_len,
                hard_cut: false,
            },
        );
        self.used += height;
    }

    fn place_paragraph(&mut self, key: &str, text: &str, tokens: &[BlockToken]) {
        let chars: Vec<char> = text.chars().collect();
        let whole_height = self.cfg.paragraph_height(chars.len());
        if chars.is_empty() && whole_height > self.remaining() {
            self.close_page();
        }
        if chars.is_empty() || whole_height <= self.remaining() {
            self.push_whole_paragraph(key, text, tokens, chars.len(), whole_height);
            return;
        }

        let mut splitter = ParagraphSplitter::new(key, &chars, text, tokens);
        let per_line = self.cfg.chars_per_line();
        loop {
            let start = splitter.start;
            let rest = chars.len() - start;
            if rest == 0 {
                break;
            }
            let height = self.cfg.paragraph_height(rest);
            if height <= self.remaining() {
                if splitter.part == 0 {
                    // Fits after a page turn: keep the original key.
                    self.push_whole_paragraph(key, text, tokens, chars.len(), height);
                } else {
                    let (block, span) = splitter.take(chars.len(), false);
                    self.page.push(block, span);
                    self.used += height;
                }
                break;
            }

            let lines = self.cfg.lines_fitting(self.remaining());
            if lines == 0 {
                if !self.page.is_empty() {
                    self.close_page();
                    continue;
                }
                // Not even one line fits an empty page: force one line through.
                let cut = (start + per_line).min(chars.len());
                let (block, span) = splitter.take(cut, true);
                self.page.push(block, span);
                self.used += self.cfg.paragraph_height(cut - start);
                self.close_page();
                continue;
            }

            let capacity = lines.saturating_mul(per_line);
            let target = start.saturating_add(capacity).min(chars.len());
            let cut = find_word_break(&chars, start, target, self.cfg.split_window_chars)
                .unwrap_or(target);
            let (block, span) = splitter.take(cut, false);
            self.used += self.cfg.paragraph_height(span.end_char - span.start_char);
            self.page.push(block, span);
            self.close_page();
        }
    }
}

/// Last whitespace index in `[target - window, target + window]`.
///
/// A break past `target` puts up to `window` extra chars on the page; the
/// estimate absorbs that rather than splitting a word.
fn find_word_break(chars: &[char], start: usize, target: usize, window: usize) -> Option<usize> {
    if chars.is_empty() {
        return None;
    }
    let lo = target.saturating_sub(window).max(start + 1);
    let hi = target.saturating_add(window).min(chars.len() - 1);
    if lo > hi {
        return None;
    }
    (lo..=hi).rev().find(|&idx| chars[idx].is_whitespace())
}

fn trimmed_end(chars: &[char], start: usize, mut end: usize) -> usize {
    while end > start && chars[end - 1].is_whitespace() {
        end -= 1;
    }
    end
}

/// Cuts one paragraph into keyed fragments and hands each its tokens.
struct ParagraphSplitter<'a> {
    key: &'a str,
    chars: &'a [char],
    tokens: &'a [BlockToken],
    token_offsets: Vec<usize>,
    start: usize,
    /// End of the previous cut; tokens before it are already emitted.
    consumed: usize,
    part: usize,
}

impl<'a> ParagraphSplitter<'a> {
    fn new(key: &'a str, chars: &'a [char], text: &str, tokens: &'a [BlockToken]) -> Self {
        Self {
            key,
            chars,
            tokens,
            token_offsets: token_char_offsets(text, tokens),
            start: chars
                .iter()
                .position(|c| !c.is_whitespace())
                .unwrap_or(chars.len()),
            consumed: 0,
            part: 0,
        }
    }

    /// Emit `chars[start..cut]` trimmed and move past following whitespace.
    fn take(&mut self, cut: usize, hard_cut: bool) -> (Block, BlockSpan) {
        let start = self.start;
        let end = trimmed_end(self.chars, start, cut);
        self.part += 1;
        let mut key = format!("{}-part{}", self.key, self.part);
        if hard_cut {
            key.push_str("-hard");
        }
        let text: String = self.chars[start..end].iter().collect();
        let last = cut >= self.chars.len();
        let floor = self.consumed;
        let tokens = self
            .tokens
            .iter()
            .zip(&self.token_offsets)
            .filter(|&(_, &offset)| offset >= floor && (last || offset < cut))
            .map(|(tok, _)| tok.clone())
            .collect();
        self.consumed = cut;

        let mut next = cut;
        while next < self.chars.len() && self.chars[next].is_whitespace() {
            next += 1;
        }
        self.start = next;

        (
            Block::Paragraph {
                key,
                text,
                tokens,
            },
            BlockSpan {
                source_key: self.key.to_string(),
                start_char: start,
                end_char: end,
                hard_cut,
            },
        )
    }
}

/// Char offset of each token's first occurrence, scanning forward.
///
/// A token that cannot be found is pinned to the position after the
/// previous match.
fn token_char_offsets(text: &str, tokens: &[BlockToken]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(tokens.len());
    let mut byte_cursor = 0usize;
    let mut char_cursor = 0usize;
    for tok in tokens {
        let Some(rel) = text[byte_cursor..].find(tok.text.as_str()) else {
            offsets.push(char_cursor);
            continue;
        };
        let at = byte_cursor + rel;
        char_cursor += text[byte_cursor..at].chars().count();
        offsets.push(char_cursor);
        char_cursor += tok.text.chars().count();
        byte_cursor = at + tok.text.len();
    }
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lorem(len: usize) -> String {
        let words = ["lorem", "ipsum", "dolor", "sit", "amet", "elit"];
        let mut out = String::new();
        let mut idx = 0;
        while out.chars().count() < len {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(words[idx % words.len()]);
            idx += 1;
        }
        out.chars().take(len).collect::<String>().trim_end().to_string()
    }

    #[test]
    fn chars_per_line_uses_half_font_width() {
        let cfg = LayoutConfig::for_viewport(350.0, 600.0, 20.0);
        assert_eq!(cfg.chars_per_line(), 34);
    }

    #[test]
    fn chars_per_line_clamps_degenerate_widths() {
        assert_eq!(LayoutConfig::for_viewport(0.0, 600.0, 20.0).chars_per_line(), 8);
        assert_eq!(LayoutConfig::for_viewport(-50.0, 600.0, 0.0).chars_per_line(), 8);
        assert_eq!(
            LayoutConfig::for_viewport(f32::NAN, 600.0, f32::INFINITY).chars_per_line(),
            8
        );
    }

    #[test]
    fn available_height_never_negative() {
        assert_eq!(LayoutConfig::for_viewport(300.0, 10.0, 0.0).available_height(), 0.0);
        assert_eq!(LayoutConfig::for_viewport(300.0, 600.0, 0.0).available_height(), 480.0);
    }

    #[test]
    fn paragraph_height_rounds_lines_up() {
        let cfg = LayoutConfig::for_viewport(350.0, 600.0, 20.0);
        assert_eq!(cfg.paragraph_height(34), 28.0 + 12.0);
        assert_eq!(cfg.paragraph_height(35), 56.0 + 12.0);
    }

    #[test]
    fn empty_input_yields_no_pages() {
        assert!(paginate(&[], 350.0, 600.0, 20.0).is_empty());
    }

    #[test]
    fn leading_chapter_does_not_create_empty_page() {
        let blocks = vec![Block::chapter("chapter-1", "Ch 1"), Block::paragraph("para-1", "Hi.")];
        let pages = paginate(&blocks, 350.0, 600.0, 20.0);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0], blocks);
    }

    #[test]
    fn every_chapter_starts_a_page() {
        let blocks = vec![
            Block::chapter("chapter-1", "One"),
            Block::paragraph("para-1", "Short."),
            Block::chapter("chapter-2", "Two"),
            Block::paragraph("para-2", "Also short."),
        ];
        let pages = paginate(&blocks, 350.0, 600.0, 20.0);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1][0].key(), "chapter-2");
    }

    #[test]
    fn heading_moves_to_next_page_when_it_would_overflow() {
        // available 172 - 120 = 52; a one-line paragraph uses 40, heading needs 48.
        let blocks = vec![
            Block::paragraph("para-1", "Short."),
            Block::heading("heading-h", "Next"),
        ];
        let pages = paginate(&blocks, 350.0, 172.0, 20.0);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1][0].key(), "heading-h");
    }

    #[test]
    fn heading_on_empty_page_is_placed_even_if_too_tall() {
        let blocks = vec![Block::heading("heading-h", "Tall")];
        let pages = paginate(&blocks, 350.0, 60.0, 20.0);
        assert_eq!(pages.len(), 1);
    }

    #[test]
    fn paragraph_that_fits_a_fresh_page_keeps_its_key() {
        let long = lorem(300);
        let blocks = vec![
            Block::paragraph("para-1", lorem(530)),
            Block::paragraph("para-2", long.clone()),
        ];
        // available 480; 530 chars take 16 lines (460), leaving less than a line.
        let pages = paginate(&blocks, 350.0, 600.0, 20.0);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1], vec![Block::paragraph("para-2", long)]);
    }

    #[test]
    fn split_fragments_break_on_spaces_and_keep_every_char() {
        let text = lorem(500);
        let blocks = vec![Block::paragraph("para-1", text.clone())];
        let pages = paginate(&blocks, 350.0, 300.0, 20.0);
        assert!(pages.len() >= 2);

        let fragments: Vec<&Block> = pages.iter().flatten().collect();
        for (idx, frag) in fragments.iter().enumerate() {
            assert_eq!(frag.key(), format!("para-1-part{}", idx + 1));
            assert!(!frag.text().starts_with(' ') && !frag.text().ends_with(' '));
        }
        let rejoined: Vec<&str> = fragments.iter().map(|b| b.text()).collect();
        assert_eq!(rejoined.join(" "), text);
    }

    #[test]
    fn unspaceable_run_is_cut_at_target_without_hard_suffix() {
        // available 180 holds 6 lines of 34 chars.
        let text = "x".repeat(400);
        let blocks = vec![Block::paragraph("para-1", text.clone())];
        let pages = paginate(&blocks, 350.0, 300.0, 20.0);
        let fragments: Vec<&Block> = pages.iter().flatten().collect();
        let keys: Vec<&str> = fragments.iter().map(|b| b.key()).collect();
        assert_eq!(keys, vec!["para-1-part1", "para-1-part2"]);
        assert_eq!(fragments[0].text().len(), 204);
        let rejoined: String = fragments.iter().map(|b| b.text()).collect();
        assert_eq!(rejoined, text);
    }

    #[test]
    fn space_just_past_target_is_used_as_the_break() {
        // available 480 holds 16 lines of 34 chars: target 544, space at 548.
        let text = format!("{} {}", "x".repeat(548), "y".repeat(100));
        let pages = paginate(&[Block::paragraph("para-1", text)], 350.0, 600.0, 20.0);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0][0].key(), "para-1-part1");
        assert_eq!(pages[0][0].text(), "x".repeat(548));
        assert_eq!(pages[1][0].key(), "para-1-part2");
        assert_eq!(pages[1][0].text(), "y".repeat(100));
    }

    #[test]
    fn spaceless_window_cuts_at_target_on_the_current_page() {
        // After 40px of intro, 440px hold 15 lines: target 510, no space in [470, 550].
        let text = format!("{} {}", "a".repeat(400), "b".repeat(300));
        let blocks = vec![
            Block::paragraph("para-1", "Short intro."),
            Block::paragraph("para-2", text),
        ];
        let pages = paginate(&blocks, 350.0, 600.0, 20.0);
        assert_eq!(pages.len(), 2);
        let first: Vec<&str> = pages[0].iter().map(Block::key).collect();
        assert_eq!(first, vec!["para-1", "para-2-part1"]);
        assert_eq!(pages[0][1].text().chars().count(), 510);
        assert_eq!(pages[1][0].key(), "para-2-part2");
        assert_eq!(pages[1][0].text(), "b".repeat(191));
    }

    #[test]
    fn zero_height_viewport_still_makes_progress() {
        let blocks = vec![Block::paragraph("para-1", lorem(120))];
        let pages = paginate(&blocks, 350.0, 0.0, 20.0);
        assert!(!pages.is_empty());
        let total: usize = pages.iter().flatten().map(|b| b.text().len()).sum();
        assert!(total > 0);
        assert!(pages.iter().all(|page| !page.is_empty()));
        assert!(pages.iter().flatten().all(|b| b.key().ends_with("-hard")));
    }

    #[test]
    fn word_break_takes_last_space_in_window() {
        let chars: Vec<char> = "aaaa bbbb cccc dddd".chars().collect();
        assert_eq!(find_word_break(&chars, 0, 12, 40), Some(14));
        assert_eq!(find_word_break(&chars, 0, 12, 2), Some(14));
        assert_eq!(find_word_break(&chars, 0, 12, 1), None);
    }

    #[test]
    fn tokens_follow_their_fragment() {
        let text = lorem(300);
        let tokens: Vec<BlockToken> = text
            .split(' ')
            .enumerate()
            .map(|(idx, word)| BlockToken {
                id: format!("s:{}", idx),
                text: word.to_string(),
            })
            .collect();
        let blocks = vec![Block::Paragraph {
            key: "para-1".into(),
            text: text.clone(),
            tokens: tokens.clone(),
        }];
        let pages = paginate(&blocks, 350.0, 250.0, 20.0);
        assert!(pages.len() >= 2);
        let mut seen = Vec::new();
        for frag in pages.iter().flatten() {
            let words: Vec<&str> = frag.text().split(' ').collect();
            let tok_words: Vec<&str> = frag.tokens().iter().map(|t| t.text.as_str()).collect();
            assert_eq!(words, tok_words);
            seen.extend(frag.tokens().iter().cloned());
        }
        assert_eq!(seen, tokens);
    }

    #[test]
    fn token_offsets_scan_forward() {
        let tokens = vec![
            BlockToken { id: "a".into(), text: "the".into() },
            BlockToken { id: "b".into(), text: "cat".into() },
            BlockToken { id: "c".into(), text: "the".into() },
            BlockToken { id: "d".into(), text: "missing".into() },
        ];
        assert_eq!(token_char_offsets("the cat saw the dog", &tokens), vec![0, 4, 12, 15]);
    }
}
