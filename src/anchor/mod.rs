//! Anchoring: stable block ids, selection → anchor, anchor → range, and
//! painting decorations over the result.
//!
//! Anchors are `(block id, start, end)` triples where the offsets count chars
//! of the block's flattened text. Flattening ignores inline element
//! boundaries, so emphasis, links or existing decorations never shift an
//! anchor.

pub mod blocks;
pub mod decorate;
pub mod range;
pub mod resolver;

pub use blocks::{DEFAULT_BLOCK_PREFIX, assign_block_ids, enclosing_block, reading_blocks};
pub use decorate::{DecorationConfig, DecorationReport, apply_annotations, decorate, undecorate};
pub use range::{TextRange, boundary_at, locate_range, range_text};
pub use resolver::{ChapterContext, Selection, resolve_selection};
