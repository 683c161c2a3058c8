//! Estimated pagination, page maps, and reading positions for `story-stream`.
//!
//! Layout is a pure function of the block list and viewport. Page breaks
//! are estimates from fixed font metrics, not measured text.

#![cfg_attr(
    not(test),
    deny(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::panic_in_result_fn,
        clippy::todo,
        clippy::unimplemented
    )
)]

mod render_engine;
mod render_ir;
mod render_layout;

pub use render_engine::{
    progress_to_page_index, remap_page_index_by_progress, resolve_page_for_position, PageMap,
    PageMapEntry, ReadingPosition, ReadingPositionError,
};
pub use render_ir::{BlockSpan, PageMetrics, PaginationProfileId, RenderPage};
pub use render_layout::{paginate, LayoutConfig, LayoutEngine, LayoutSession};
pub use story_stream::Block;
