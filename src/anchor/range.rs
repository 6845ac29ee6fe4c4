use crate::document::{Boundary, DocumentTree, char_len, char_slice, find_by_id, text_nodes};
use crate::error::DriftError;

/// A located sub-range of one reading block, both ends on text nodes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextRange<N> {
    pub block: N,
    pub start: Boundary<N>,
    pub end: Boundary<N>,
}

/// One text node's share of a range, as char offsets inside that node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextSegment<N> {
    pub node: N,
    pub start: usize,
    pub end: usize,
}

/// Finds `[start, end)` inside the block with the given id.
///
/// Walks the block's text nodes with the same flattening rules the resolver
/// used, so offsets line up exactly. Fails with a [`DriftError`] when the
/// block is gone or no longer holds enough text.
pub fn locate_range<D: DocumentTree>(
    doc: &D,
    root: D::Node,
    block_id: &str,
    start: usize,
    end: usize,
) -> Result<TextRange<D::Node>, DriftError> {
    let block = find_by_id(doc, root, block_id)
        .ok_or_else(|| DriftError::MissingBlock(block_id.to_string()))?;
    locate_in_block(doc, block, block_id, start, end)
}

pub fn locate_in_block<D: DocumentTree>(
    doc: &D,
    block: D::Node,
    block_id: &str,
    start: usize,
    end: usize,
) -> Result<TextRange<D::Node>, DriftError> {
    if start >= end {
        return Err(DriftError::EmptyRange { start, end });
    }

    let texts = text_nodes(doc, block);
    let total: usize = texts.iter().filter_map(|&t| doc.text(t)).map(char_len).sum();
    if total < end {
        return Err(DriftError::TooShort {
            block_id: block_id.to_string(),
            available: total,
            required: end,
        });
    }

    let mut range_start = None;
    let mut range_end = None;
    let mut consumed = 0usize;
    for &t in &texts {
        let len = doc.text(t).map(char_len).unwrap_or(0);
        if range_start.is_none() && start < consumed + len {
            range_start = Some(Boundary::new(t, start - consumed));
        }
        if range_end.is_none() && consumed < end && end <= consumed + len {
            range_end = Some(Boundary::new(t, end - consumed));
            break;
        }
        consumed += len;
    }

    match (range_start, range_end) {
        (Some(start), Some(end)) => Ok(TextRange { block, start, end }),
        _ => Err(DriftError::TooShort {
            block_id: block_id.to_string(),
            available: total,
            required: end,
        }),
    }
}

/// Text-node point `offset` chars into a block's flattened text. Offsets on a
/// node boundary land at the start of the following node; the block's end
/// lands at the end of its last text node.
pub fn boundary_at<D: DocumentTree>(doc: &D, block: D::Node, offset: usize) -> Option<Boundary<D::Node>> {
    let mut consumed = 0usize;
    let mut last = None;
    for t in text_nodes(doc, block) {
        let len = doc.text(t).map(char_len).unwrap_or(0);
        if offset < consumed + len {
            return Some(Boundary::new(t, offset - consumed));
        }
        consumed += len;
        last = Some((t, len));
    }
    match last {
        Some((t, len)) if offset == consumed => Some(Boundary::new(t, len)),
        _ => None,
    }
}

/// Per-node pieces of `range`, in document order.
pub fn range_segments<D: DocumentTree>(doc: &D, range: &TextRange<D::Node>) -> Vec<TextSegment<D::Node>> {
    let mut segments = Vec::new();
    let mut inside = false;
    for t in text_nodes(doc, range.block) {
        let len = doc.text(t).map(char_len).unwrap_or(0);
        let from = if t == range.start.node {
            inside = true;
            range.start.offset
        } else {
            0
        };
        if !inside {
            continue;
        }
        let to = if t == range.end.node { range.end.offset } else { len };
        if from < to {
            segments.push(TextSegment {
                node: t,
                start: from,
                end: to,
            });
        }
        if t == range.end.node {
            break;
        }
    }
    segments
}

/// The text covered by `range`.
pub fn range_text<D: DocumentTree>(doc: &D, range: &TextRange<D::Node>) -> String {
    range_segments(doc, range)
        .into_iter()
        .filter_map(|seg| doc.text(seg.node).map(|s| char_slice(s, seg.start, seg.end)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::blocks::{DEFAULT_BLOCK_PREFIX, assign_block_ids};
    use crate::document::ChapterDocument;

    fn stamped(html: &str) -> ChapterDocument {
        let mut doc = ChapterDocument::parse(html);
        assign_block_ids(&mut doc, DEFAULT_BLOCK_PREFIX);
        doc
    }

    #[test]
    fn test_locates_within_single_text_node() {
        let doc = stamped("<p>zero</p><p>one</p><p>two</p><p>Hello world</p>");
        let range = locate_range(&doc, doc.root(), "__auto_3", 6, 11).unwrap();
        assert_eq!(range.start.offset, 6);
        assert_eq!(range.end.offset, 11);
        assert_eq!(range_text(&doc, &range), "world");
    }

    #[test]
    fn test_node_boundaries_prefer_inner_side() {
        let doc = stamped("<p id=\"p\">abc<em>def</em>ghi</p>");
        let range = locate_range(&doc, doc.root(), "p", 3, 6).unwrap();
        assert_eq!(doc.text(range.start.node), Some("def"));
        assert_eq!(range.start.offset, 0);
        assert_eq!(doc.text(range.end.node), Some("def"));
        assert_eq!(range.end.offset, 3);
        assert_eq!(range_segments(&doc, &range).len(), 1);
    }

    #[test]
    fn test_spans_inline_elements() {
        let doc = stamped("<p id=\"p\">abc<em>def</em>ghi</p>");
        let range = locate_range(&doc, doc.root(), "p", 1, 8).unwrap();
        assert_eq!(range_text(&doc, &range), "bcdefgh");
        assert_eq!(range_segments(&doc, &range).len(), 3);
    }

    #[test]
    fn test_missing_block_is_drift() {
        let doc = stamped("<p>abc</p>");
        assert_eq!(
            locate_range(&doc, doc.root(), "gone", 0, 1),
            Err(DriftError::MissingBlock("gone".to_string()))
        );
    }

    #[test]
    fn test_short_block_is_drift() {
        let doc = stamped("<p id=\"p\">short</p>");
        assert!(matches!(
            locate_range(&doc, doc.root(), "p", 2, 40),
            Err(DriftError::TooShort { available: 5, required: 40, .. })
        ));
    }

    #[test]
    fn test_empty_range_is_drift() {
        let doc = stamped("<p id=\"p\">short</p>");
        assert!(matches!(
            locate_range(&doc, doc.root(), "p", 3, 3),
            Err(DriftError::EmptyRange { .. })
        ));
    }

    #[test]
    fn test_boundary_at_offsets() {
        let doc = stamped("<p id=\"p\">abc<em>def</em></p>");
        let block = find_by_id(&doc, doc.root(), "p").unwrap();
        let inner = boundary_at(&doc, block, 3).unwrap();
        assert_eq!(doc.text(inner.node), Some("def"));
        assert_eq!(inner.offset, 0);
        let end = boundary_at(&doc, block, 6).unwrap();
        assert_eq!(doc.text(end.node), Some("def"));
        assert_eq!(end.offset, 3);
        assert!(boundary_at(&doc, block, 7).is_none());
    }

    #[test]
    fn test_range_at_block_end() {
        let doc = stamped("<p id=\"p\">abc<b>de</b></p>");
        let range = locate_range(&doc, doc.root(), "p", 0, 5).unwrap();
        assert_eq!(range_text(&doc, &range), "abcde");
    }
}
