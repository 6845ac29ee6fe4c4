use scraper::{ElementRef, Html};

use super::{DocumentTree, DocumentTreeMut, byte_index, char_len};

pub type NodeId = usize;

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const RAW_TEXT_TAGS: &[&str] = &["script", "style"];

#[derive(Debug, Clone, PartialEq)]
enum NodeData {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Mutable arena tree holding the body of one rendered chapter.
///
/// Nodes are never freed; unwrapping or merging detaches them from the tree
/// and they simply become unreachable for the rest of the render.
#[derive(Debug, Clone)]
pub struct ChapterDocument {
    nodes: Vec<Node>,
    root: NodeId,
}

impl ChapterDocument {
    /// Parses chapter HTML. Full documents and bare fragments are both
    /// accepted; only the body content is kept.
    pub fn parse(html_src: &str) -> Self {
        let html = Html::parse_document(html_src);
        let mut doc = Self {
            nodes: Vec::new(),
            root: 0,
        };
        doc.root = doc.push(
            NodeData::Element {
                tag: "body".to_string(),
                attrs: Vec::new(),
            },
            None,
        );

        let body = html
            .root_element()
            .children()
            .filter_map(ElementRef::wrap)
            .find(|element| element.value().name() == "body");

        if let Some(body) = body {
            let attrs = body
                .value()
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            doc.nodes[doc.root].data = NodeData::Element {
                tag: "body".to_string(),
                attrs,
            };
            doc.import(body, doc.root);
        }

        doc
    }

    fn import(&mut self, source: ElementRef<'_>, parent: NodeId) {
        for child in source.children() {
            if let Some(text) = child.value().as_text() {
                let id = self.push(NodeData::Text(text.text.to_string()), Some(parent));
                self.nodes[parent].children.push(id);
            } else if let Some(element) = ElementRef::wrap(child) {
                let data = NodeData::Element {
                    tag: element.value().name().to_ascii_lowercase(),
                    attrs: element
                        .value()
                        .attrs()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                };
                let id = self.push(data, Some(parent));
                self.nodes[parent].children.push(id);
                self.import(element, id);
            }
        }
    }

    fn push(&mut self, data: NodeData, parent: Option<NodeId>) -> NodeId {
        self.nodes.push(Node {
            data,
            parent,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    fn position_in_parent(&self, node: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.nodes[node].parent?;
        let index = self.nodes[parent].children.iter().position(|&c| c == node)?;
        Some((parent, index))
    }

    /// Splits a text node at a char offset. The original node keeps the
    /// head; the returned node holds the tail and is inserted right after it.
    /// Returns `None`, leaving the node untouched, for elements, for detached
    /// nodes or when the split point is at either edge.
    pub fn split_text(&mut self, node: NodeId, at: usize) -> Option<NodeId> {
        let (parent, index) = self.position_in_parent(node)?;
        let NodeData::Text(text) = &self.nodes[node].data else {
            return None;
        };
        if at == 0 || at >= char_len(text) {
            return None;
        }
        let split = byte_index(text, at);
        let tail = text[split..].to_string();
        let head = text[..split].to_string();
        self.nodes[node].data = NodeData::Text(head);

        let tail_id = self.push(NodeData::Text(tail), Some(parent));
        self.nodes[parent].children.insert(index + 1, tail_id);
        Some(tail_id)
    }

    /// Replaces `node` with a new element and moves `node` inside it.
    pub fn wrap(&mut self, node: NodeId, tag: &str, attrs: Vec<(String, String)>) -> Option<NodeId> {
        let (parent, index) = self.position_in_parent(node)?;
        let wrapper = self.push(
            NodeData::Element {
                tag: tag.to_string(),
                attrs,
            },
            Some(parent),
        );
        self.nodes[parent].children[index] = wrapper;
        self.nodes[wrapper].children.push(node);
        self.nodes[node].parent = Some(wrapper);
        Some(wrapper)
    }

    /// Replaces an element with its children, then merges any text nodes
    /// that became adjacent.
    pub fn unwrap_element(&mut self, node: NodeId) {
        let Some((parent, index)) = self.position_in_parent(node) else {
            return;
        };
        let children = std::mem::take(&mut self.nodes[node].children);
        for &child in &children {
            self.nodes[child].parent = Some(parent);
        }
        self.nodes[parent].children.splice(index..=index, children);
        self.nodes[node].parent = None;
        self.merge_adjacent_text(parent);
    }

    /// Merges runs of sibling text nodes directly under `node`.
    pub fn merge_adjacent_text(&mut self, node: NodeId) {
        let children = std::mem::take(&mut self.nodes[node].children);
        let mut merged: Vec<NodeId> = Vec::with_capacity(children.len());
        for child in children {
            let prev_text = merged.last().and_then(|&prev| match &self.nodes[prev].data {
                NodeData::Text(_) => Some(prev),
                _ => None,
            });
            match (prev_text, &self.nodes[child].data) {
                (Some(prev), NodeData::Text(text)) => {
                    let text = text.clone();
                    if let NodeData::Text(existing) = &mut self.nodes[prev].data {
                        existing.push_str(&text);
                    }
                    self.nodes[child].parent = None;
                }
                _ => merged.push(child),
            }
        }
        self.nodes[node].children = merged;
    }

    pub fn remove_attr(&mut self, node: NodeId, name: &str) {
        if let NodeData::Element { attrs, .. } = &mut self.nodes[node].data {
            attrs.retain(|(k, _)| k != name);
        }
    }

    /// Serialises the body content.
    pub fn to_html(&self) -> String {
        self.inner_html(self.root)
    }

    pub fn inner_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        let raw = self
            .tag(node)
            .is_some_and(|tag| RAW_TEXT_TAGS.contains(&tag));
        for &child in &self.nodes[node].children {
            self.write_node(child, raw, &mut out);
        }
        out
    }

    fn write_node(&self, node: NodeId, raw_text: bool, out: &mut String) {
        match &self.nodes[node].data {
            NodeData::Text(text) => {
                if raw_text {
                    out.push_str(text);
                } else {
                    out.push_str(&html_escape::encode_text(text));
                }
            }
            NodeData::Element { tag, attrs } => {
                out.push('<');
                out.push_str(tag);
                for (key, value) in attrs {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    out.push_str(&html_escape::encode_double_quoted_attribute(value));
                    out.push('"');
                }
                out.push('>');
                if VOID_TAGS.contains(&tag.as_str()) {
                    return;
                }
                let raw = RAW_TEXT_TAGS.contains(&tag.as_str());
                for &child in &self.nodes[node].children {
                    self.write_node(child, raw, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

impl DocumentTree for ChapterDocument {
    type Node = NodeId;

    fn root(&self) -> NodeId {
        self.root
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node].parent
    }

    fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node].children
    }

    fn tag(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node].data {
            NodeData::Element { tag, .. } => Some(tag),
            NodeData::Text(_) => None,
        }
    }

    fn text(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node].data {
            NodeData::Text(text) => Some(text),
            NodeData::Element { .. } => None,
        }
    }

    fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.nodes[node].data {
            NodeData::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            NodeData::Text(_) => None,
        }
    }
}

impl DocumentTreeMut for ChapterDocument {
    fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        if let NodeData::Element { attrs, .. } = &mut self.nodes[node].data {
            match attrs.iter_mut().find(|(k, _)| k == name) {
                Some(entry) => entry.1 = value.to_string(),
                None => attrs.push((name.to_string(), value.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{find_by_id, text_nodes};

    #[test]
    fn test_parse_fragment_and_document() {
        let fragment = ChapterDocument::parse("<p id=\"x\">Hello</p>");
        let full = ChapterDocument::parse(
            "<html><head><title>T</title></head><body><p id=\"x\">Hello</p></body></html>",
        );
        assert_eq!(fragment.to_html(), "<p id=\"x\">Hello</p>");
        assert_eq!(full.to_html(), "<p id=\"x\">Hello</p>");
    }

    #[test]
    fn test_serialisation_escapes_text_and_attributes() {
        let doc = ChapterDocument::parse("<p title=\"a &quot;b&quot;\">1 &lt; 2 &amp; 3</p><br>");
        assert_eq!(
            doc.to_html(),
            "<p title=\"a &quot;b&quot;\">1 &lt; 2 &amp; 3</p><br>"
        );
    }

    #[test]
    fn test_split_wrap_unwrap_round_trip() {
        let mut doc = ChapterDocument::parse("<p id=\"p\">Hello world</p>");
        let p = find_by_id(&doc, doc.root(), "p").unwrap();
        let text = doc.children(p)[0];

        let tail = doc.split_text(text, 6).unwrap();
        assert_eq!(doc.text(text), Some("Hello "));
        assert_eq!(doc.text(tail), Some("world"));

        let mark = doc.wrap(tail, "mark", vec![]).unwrap();
        assert_eq!(doc.to_html(), "<p id=\"p\">Hello <mark>world</mark></p>");

        doc.unwrap_element(mark);
        assert_eq!(doc.to_html(), "<p id=\"p\">Hello world</p>");
        assert_eq!(text_nodes(&doc, p).len(), 1);
    }

    #[test]
    fn test_split_at_edges_is_noop() {
        let mut doc = ChapterDocument::parse("<p>abc</p>");
        let text = text_nodes(&doc, doc.root())[0];
        assert!(doc.split_text(text, 0).is_none());
        assert!(doc.split_text(text, 3).is_none());
        assert_eq!(doc.text(text), Some("abc"));
    }

    #[test]
    fn test_split_detached_text_leaves_it_intact() {
        let mut doc = ChapterDocument::parse("<p id=\"p\">abcd</p>");
        let p = find_by_id(&doc, doc.root(), "p").unwrap();
        let text = doc.children(p)[0];
        let tail = doc.split_text(text, 2).unwrap();
        doc.merge_adjacent_text(p);
        assert_eq!(doc.children(p), &[text]);

        assert!(doc.split_text(tail, 1).is_none());
        assert_eq!(doc.text(tail), Some("cd"));
        assert_eq!(doc.to_html(), "<p id=\"p\">abcd</p>");
    }

    #[test]
    fn test_set_attr_overwrites() {
        let mut doc = ChapterDocument::parse("<p id=\"a\">x</p>");
        let p = find_by_id(&doc, doc.root(), "a").unwrap();
        doc.set_attr(p, "id", "b");
        doc.set_attr(p, "class", "c");
        assert_eq!(doc.to_html(), "<p id=\"b\" class=\"c\">x</p>");
        doc.remove_attr(p, "class");
        assert_eq!(doc.to_html(), "<p id=\"b\">x</p>");
    }
}
