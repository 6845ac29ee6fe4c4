use std::collections::HashMap;

use crate::anchor::blocks::enclosing_block;
use crate::document::{
    Boundary, DocumentTree, char_len, char_slice, is_inclusive_descendant, preorder, text_nodes,
};
use crate::error::AnchorError;
use crate::models::Anchor;

/// Chars of block text kept on each side of the selection in the snippet.
pub const CONTEXT_CHARS: usize = 40;

/// A raw selection as reported by the view. `anchor` is where the drag
/// started, `focus` where it ended; either may come first in the document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection<N> {
    pub anchor: Boundary<N>,
    pub focus: Boundary<N>,
}

impl<N: Copy + PartialEq> Selection<N> {
    pub fn new(anchor: Boundary<N>, focus: Boundary<N>) -> Self {
        Self { anchor, focus }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

/// Chapter facts copied onto every anchor.
#[derive(Debug, Clone, Copy)]
pub struct ChapterContext<'a> {
    pub href: &'a str,
    pub title: &'a str,
}

/// Text-node position after element boundaries have been pushed onto text.
type TextPoint<N> = (N, usize);

struct TreeIndex<N> {
    order: HashMap<N, usize>,
    texts: Vec<N>,
}

impl<N: Copy + Eq + std::hash::Hash> TreeIndex<N> {
    fn build<D: DocumentTree<Node = N>>(doc: &D, root: N) -> Self {
        let order = preorder(doc, root)
            .into_iter()
            .enumerate()
            .map(|(i, n)| (n, i))
            .collect();
        Self {
            order,
            texts: text_nodes(doc, root),
        }
    }

    fn order_of(&self, node: N) -> usize {
        self.order.get(&node).copied().unwrap_or(usize::MAX)
    }
}

/// Converts a live selection into a single-block anchor.
///
/// `Ok(None)` means there is nothing to anchor: the selection is collapsed,
/// outside `root`, or covers only whitespace. A selection whose ends fall in
/// different reading blocks is reported as [`AnchorError::MultiBlock`].
pub fn resolve_selection<D: DocumentTree>(
    doc: &D,
    root: D::Node,
    selection: &Selection<D::Node>,
    chapter: ChapterContext<'_>,
) -> Result<Option<Anchor>, AnchorError> {
    if selection.is_collapsed() {
        return Ok(None);
    }
    if !is_inclusive_descendant(doc, selection.anchor.node, root)
        || !is_inclusive_descendant(doc, selection.focus.node, root)
    {
        return Ok(None);
    }

    let index = TreeIndex::build(doc, root);
    let (first, last) = order_boundaries(doc, &index, selection.anchor, selection.focus);

    let (Some(start), Some(end)) = (
        normalize_start(doc, &index, first),
        normalize_end(doc, &index, last),
    ) else {
        return Ok(None);
    };
    if index.order_of(start.0) > index.order_of(end.0)
        || (start.0 == end.0 && start.1 >= end.1)
    {
        return Ok(None);
    }

    let start_block = enclosing_block(doc, start.0);
    let end_block = enclosing_block(doc, end.0);

    let block = match (start_block, end_block) {
        (Some(a), Some(b)) if a == b => a,
        (None, None) => return Ok(None),
        _ => {
            let text = text_between(doc, &index.texts, start, end);
            return Err(AnchorError::MultiBlock { text });
        }
    };

    let Some(block_id) = doc.attr(block, "id") else {
        tracing::warn!("selection landed in a block without an id; were block ids assigned?");
        return Ok(None);
    };

    let block_texts = text_nodes(doc, block);
    let block_text = concat_text(doc, &block_texts);
    let (Some(start_offset), Some(end_offset)) = (
        offset_within(doc, &block_texts, start),
        offset_within(doc, &block_texts, end),
    ) else {
        return Ok(None);
    };

    let text = char_slice(&block_text, start_offset, end_offset).to_string();
    if text.trim().is_empty() {
        return Ok(None);
    }

    Ok(Some(Anchor {
        chapter_href: chapter.href.to_string(),
        block_id: block_id.to_string(),
        start: start_offset,
        end: end_offset,
        context_snippet: context_snippet(&block_text, start_offset, end_offset),
        text,
        chapter_title: chapter.title.to_string(),
    }))
}

/// Whitespace-collapsed block text around `[start, end)`.
pub fn context_snippet(block_text: &str, start: usize, end: usize) -> String {
    let from = start.saturating_sub(CONTEXT_CHARS);
    let to = end.saturating_add(CONTEXT_CHARS);
    char_slice(block_text, from, to)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Preorder position a boundary sits at, for ordering purposes.
fn boundary_key<D: DocumentTree>(doc: &D, index: &TreeIndex<D::Node>, b: Boundary<D::Node>) -> (usize, usize) {
    if doc.text(b.node).is_some() {
        return (index.order_of(b.node), b.offset);
    }
    (element_position(doc, index, b), 0)
}

/// Preorder index of the node that follows an element boundary.
fn element_position<D: DocumentTree>(doc: &D, index: &TreeIndex<D::Node>, b: Boundary<D::Node>) -> usize {
    let children = doc.children(b.node);
    match children.get(b.offset) {
        Some(&child) => index.order_of(child),
        None => index.order_of(b.node).saturating_add(preorder(doc, b.node).len()),
    }
}

fn order_boundaries<D: DocumentTree>(
    doc: &D,
    index: &TreeIndex<D::Node>,
    a: Boundary<D::Node>,
    b: Boundary<D::Node>,
) -> (Boundary<D::Node>, Boundary<D::Node>) {
    if boundary_key(doc, index, a) <= boundary_key(doc, index, b) {
        (a, b)
    } else {
        (b, a)
    }
}

/// Pushes a start boundary forward onto the first text position it covers.
/// A start sitting at the very end of a text node moves to the next one, so
/// dragging from the end of one paragraph into the next anchors in the next.
fn normalize_start<D: DocumentTree>(
    doc: &D,
    index: &TreeIndex<D::Node>,
    b: Boundary<D::Node>,
) -> Option<TextPoint<D::Node>> {
    let pos = match doc.text(b.node) {
        Some(text) if index.texts.contains(&b.node) => {
            if b.offset < char_len(text) {
                return Some((b.node, b.offset));
            }
            index.order_of(b.node).saturating_add(1)
        }
        Some(_) => index.order_of(b.node),
        None => element_position(doc, index, b),
    };
    index
        .texts
        .iter()
        .find(|&&t| index.order_of(t) >= pos && doc.text(t).is_some_and(|s| !s.is_empty()))
        .map(|&t| (t, 0))
}

/// Pulls an end boundary back onto the last text position it covers.
fn normalize_end<D: DocumentTree>(
    doc: &D,
    index: &TreeIndex<D::Node>,
    b: Boundary<D::Node>,
) -> Option<TextPoint<D::Node>> {
    let pos = match doc.text(b.node) {
        Some(text) if index.texts.contains(&b.node) => {
            if b.offset > 0 {
                return Some((b.node, b.offset.min(char_len(text))));
            }
            index.order_of(b.node)
        }
        Some(_) => index.order_of(b.node).saturating_add(1),
        None => element_position(doc, index, b),
    };
    index
        .texts
        .iter()
        .rev()
        .find(|&&t| index.order_of(t) < pos && doc.text(t).is_some_and(|s| !s.is_empty()))
        .map(|&t| (t, doc.text(t).map(char_len).unwrap_or(0)))
}

fn concat_text<D: DocumentTree>(doc: &D, texts: &[D::Node]) -> String {
    texts.iter().filter_map(|&t| doc.text(t)).collect()
}

/// Chars of flattened text before `point`, counted over `texts`.
pub(crate) fn offset_within<D: DocumentTree>(
    doc: &D,
    texts: &[D::Node],
    point: TextPoint<D::Node>,
) -> Option<usize> {
    let mut consumed = 0usize;
    for &t in texts {
        let len = doc.text(t).map(char_len).unwrap_or(0);
        if t == point.0 {
            return Some(consumed + point.1.min(len));
        }
        consumed += len;
    }
    None
}

fn text_between<D: DocumentTree>(
    doc: &D,
    texts: &[D::Node],
    start: TextPoint<D::Node>,
    end: TextPoint<D::Node>,
) -> String {
    let all = concat_text(doc, texts);
    match (offset_within(doc, texts, start), offset_within(doc, texts, end)) {
        (Some(from), Some(to)) => char_slice(&all, from, to).to_string(),
        _ => String::new(),
    }
}
