//! Abstract document model.
//!
//! The anchoring algorithms only need a handful of tree capabilities, so they
//! are written against [`DocumentTree`] rather than a concrete DOM. The crate
//! ships one implementation, [`ChapterDocument`], parsed from chapter HTML.

mod chapter;

pub use chapter::{ChapterDocument, NodeId};

use std::hash::Hash;

/// Elements whose text never contributes to reading offsets.
pub const EXCLUDED_TAGS: &[&str] = &["script", "style", "template", "noscript"];

/// Read-only tree capabilities used by the anchoring code.
pub trait DocumentTree {
    type Node: Copy + Eq + Hash + std::fmt::Debug;

    fn root(&self) -> Self::Node;
    fn parent(&self, node: Self::Node) -> Option<Self::Node>;
    fn children(&self, node: Self::Node) -> &[Self::Node];
    /// Lower-case tag name, `None` for text nodes.
    fn tag(&self, node: Self::Node) -> Option<&str>;
    /// Text of a text node, `None` for elements.
    fn text(&self, node: Self::Node) -> Option<&str>;
    fn attr(&self, node: Self::Node, name: &str) -> Option<&str>;

    /// Flattened text of a subtree, following the same inclusion rules as
    /// [`text_nodes`].
    fn text_content(&self, node: Self::Node) -> String
    where
        Self: Sized,
    {
        text_nodes(self, node)
            .into_iter()
            .filter_map(|n| self.text(n))
            .collect()
    }
}

/// Trees that allow attributes to be written.
pub trait DocumentTreeMut: DocumentTree {
    fn set_attr(&mut self, node: Self::Node, name: &str, value: &str);
}

/// A point inside the tree with DOM semantics: a char offset inside a text
/// node, or a child index inside an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary<N> {
    pub node: N,
    pub offset: usize,
}

impl<N> Boundary<N> {
    pub fn new(node: N, offset: usize) -> Self {
        Self { node, offset }
    }
}

pub fn is_excluded<D: DocumentTree>(doc: &D, node: D::Node) -> bool {
    doc.tag(node).is_some_and(|tag| EXCLUDED_TAGS.contains(&tag))
}

/// Pre-order list of the text nodes under `node` that count towards reading
/// offsets. Both anchor resolution and range reconstruction go through this
/// one function, so the two can never disagree about what "offset 12" means.
pub fn text_nodes<D: DocumentTree>(doc: &D, node: D::Node) -> Vec<D::Node> {
    let mut out = Vec::new();
    collect_text_nodes(doc, node, &mut out);
    out
}

fn collect_text_nodes<D: DocumentTree>(doc: &D, node: D::Node, out: &mut Vec<D::Node>) {
    if doc.text(node).is_some() {
        out.push(node);
        return;
    }
    if is_excluded(doc, node) {
        return;
    }
    for &child in doc.children(node) {
        collect_text_nodes(doc, child, out);
    }
}

/// Every node under `node` (inclusive) in document order.
pub fn preorder<D: DocumentTree>(doc: &D, node: D::Node) -> Vec<D::Node> {
    let mut out = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        out.push(current);
        for &child in doc.children(current).iter().rev() {
            stack.push(child);
        }
    }
    out
}

/// Whether `node` is `ancestor` or lives somewhere below it.
pub fn is_inclusive_descendant<D: DocumentTree>(doc: &D, node: D::Node, ancestor: D::Node) -> bool {
    let mut current = Some(node);
    while let Some(n) = current {
        if n == ancestor {
            return true;
        }
        current = doc.parent(n);
    }
    false
}

/// Finds the element carrying `id="<id>"` under `root`.
pub fn find_by_id<D: DocumentTree>(doc: &D, root: D::Node, id: &str) -> Option<D::Node> {
    preorder(doc, root)
        .into_iter()
        .find(|&n| doc.tag(n).is_some() && doc.attr(n, "id") == Some(id))
}

pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte index of the `n`th char, clamped to the end of the string.
pub fn byte_index(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

/// Substring by char offsets.
pub fn char_slice(s: &str, start: usize, end: usize) -> &str {
    let from = byte_index(s, start);
    let to = byte_index(s, end.max(start));
    &s[from..to]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_slice_multibyte() {
        let s = "héllo wörld";
        assert_eq!(char_slice(s, 0, 5), "héllo");
        assert_eq!(char_slice(s, 6, 11), "wörld");
        assert_eq!(char_slice(s, 6, 100), "wörld");
        assert_eq!(char_slice(s, 4, 2), "");
    }

    #[test]
    fn test_text_nodes_skip_script_and_style() {
        let doc = ChapterDocument::parse(
            "<p>one <script>var x;</script><em>two</em><style>p{}</style> three</p>",
        );
        let p = find_by_id(&doc, doc.root(), "missing");
        assert!(p.is_none());
        assert_eq!(doc.text_content(doc.root()), "one two three");
    }

    #[test]
    fn test_preorder_is_document_order() {
        let doc = ChapterDocument::parse("<p id=\"a\">x<b id=\"b\">y</b></p><p id=\"c\">z</p>");
        let ids: Vec<&str> = preorder(&doc, doc.root())
            .into_iter()
            .filter_map(|n| doc.attr(n, "id"))
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
