use std::collections::HashSet;

use crate::document::{DocumentTree, DocumentTreeMut, is_excluded};
use crate::models::ReadingBlock;

/// Paragraph-level elements that act as anchoring units.
pub const BLOCK_TAGS: &[&str] = &[
    "p", "li", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "td", "th", "dt", "dd",
];

pub const DEFAULT_BLOCK_PREFIX: &str = "__auto_";

pub fn is_reading_block<D: DocumentTree>(doc: &D, node: D::Node) -> bool {
    doc.tag(node).is_some_and(|tag| BLOCK_TAGS.contains(&tag))
}

/// Paragraph-level elements under the root, in document order. Subtrees of
/// script-like elements are skipped.
pub fn block_elements<D: DocumentTree>(doc: &D) -> Vec<D::Node> {
    let mut out = Vec::new();
    let mut stack = vec![doc.root()];
    while let Some(node) = stack.pop() {
        if is_excluded(doc, node) {
            continue;
        }
        if is_reading_block(doc, node) {
            out.push(node);
        }
        for &child in doc.children(node).iter().rev() {
            stack.push(child);
        }
    }
    out
}

/// Stamps `<prefix><ordinal>` on every paragraph-level element without an id.
///
/// The ordinal is the element's position among all paragraph-level elements,
/// so ids are stable for identical markup. Ids from the source are kept as
/// they are, and running this twice changes nothing.
pub fn assign_block_ids<D: DocumentTreeMut>(doc: &mut D, prefix: &str) -> Vec<ReadingBlock> {
    let elements = block_elements(doc);
    let mut taken: HashSet<String> = elements
        .iter()
        .filter_map(|&n| doc.attr(n, "id").map(str::to_string))
        .collect();

    let mut assigned = 0usize;
    for (ordinal, &node) in elements.iter().enumerate() {
        if doc.attr(node, "id").is_some_and(|id| !id.is_empty()) {
            continue;
        }
        let mut id = format!("{}{}", prefix, ordinal);
        let mut suffix = 1;
        while taken.contains(&id) {
            id = format!("{}{}-{}", prefix, ordinal, suffix);
            suffix += 1;
        }
        doc.set_attr(node, "id", &id);
        taken.insert(id);
        assigned += 1;
    }

    if assigned > 0 {
        tracing::debug!(assigned, total = elements.len(), "assigned reading block ids");
    }

    reading_blocks(doc)
}

/// Current reading blocks with their flattened text.
pub fn reading_blocks<D: DocumentTree>(doc: &D) -> Vec<ReadingBlock> {
    block_elements(doc)
        .into_iter()
        .enumerate()
        .filter_map(|(index, node)| {
            let id = doc.attr(node, "id")?.to_string();
            Some(ReadingBlock {
                id,
                index,
                text: doc.text_content(node),
            })
        })
        .collect()
}

/// Nearest paragraph-level ancestor of `node`, inclusive.
pub fn enclosing_block<D: DocumentTree>(doc: &D, node: D::Node) -> Option<D::Node> {
    let mut current = Some(node);
    while let Some(n) = current {
        if is_reading_block(doc, n) {
            return Some(n);
        }
        current = doc.parent(n);
    }
    None
}
