//! Painting annotation decorations onto a rendered chapter.
//!
//! A decoration is one wrapper element per text segment of the anchored
//! range. Wrappers are ordinary inline elements, so the flattened block text,
//! and with it every other anchor in the block, is unchanged by them.

use crate::anchor::range::{TextRange, locate_range, range_segments};
use crate::document::{ChapterDocument, DocumentTree, NodeId, char_len, preorder};
use crate::error::DriftError;
use crate::models::{Annotation, AnnotationStyle};

/// Markup used for decoration wrappers.
#[derive(Debug, Clone, PartialEq)]
pub struct DecorationConfig {
    pub tag: String,
    /// CSS class prefix; wrappers get `<prefix>` and `<prefix>-<style>`
    pub class_prefix: String,
    pub id_attribute: String,
    pub style_attribute: String,
}

impl Default for DecorationConfig {
    fn default() -> Self {
        Self {
            tag: "mark".to_string(),
            class_prefix: "folio-annotation".to_string(),
            id_attribute: "data-annotation-id".to_string(),
            style_attribute: "data-annotation-style".to_string(),
        }
    }
}

impl DecorationConfig {
    pub fn with_class_prefix(prefix: &str) -> Self {
        Self {
            class_prefix: prefix.to_string(),
            ..Self::default()
        }
    }

    fn class_for(&self, style: AnnotationStyle, has_note: bool) -> String {
        let mut class = format!(
            "{} {}-{}",
            self.class_prefix,
            self.class_prefix,
            style.as_str()
        );
        if has_note {
            class.push_str(&format!(" {}-note", self.class_prefix));
        }
        class
    }
}

/// Outcome of re-applying a chapter's annotations.
#[derive(Debug, Default)]
pub struct DecorationReport {
    pub applied: Vec<String>,
    pub skipped: Vec<(String, DriftError)>,
}

/// Wraps every text segment of `range`. Returns the number of wrappers.
pub fn decorate(
    doc: &mut ChapterDocument,
    range: &TextRange<NodeId>,
    annotation: &Annotation,
    config: &DecorationConfig,
) -> usize {
    let segments = range_segments(doc, range);
    let mut wrapped = 0;
    for segment in segments {
        let mut target = segment.node;
        if segment.start > 0 {
            match doc.split_text(target, segment.start) {
                Some(tail) => target = tail,
                None => continue,
            }
        }
        let len = segment.end - segment.start;
        // A segment reaching the node's end needs no tail split.
        let node_len = doc.text(target).map(char_len).unwrap_or(0);
        if len < node_len && doc.split_text(target, len).is_none() {
            continue;
        }

        let attrs = vec![
            (
                "class".to_string(),
                config.class_for(annotation.style, annotation.note.is_some()),
            ),
            (config.id_attribute.clone(), annotation.id.clone()),
            (
                config.style_attribute.clone(),
                annotation.style.as_str().to_string(),
            ),
        ];
        if doc.wrap(target, &config.tag, attrs).is_some() {
            wrapped += 1;
        }
    }
    wrapped
}

fn wrappers_for(doc: &ChapterDocument, annotation_id: &str, config: &DecorationConfig) -> Vec<NodeId> {
    preorder(doc, doc.root())
        .into_iter()
        .filter(|&n| {
            doc.tag(n) == Some(config.tag.as_str())
                && doc.attr(n, &config.id_attribute) == Some(annotation_id)
        })
        .collect()
}

/// Removes every wrapper of an annotation. Returns how many were removed.
pub fn undecorate(doc: &mut ChapterDocument, annotation_id: &str, config: &DecorationConfig) -> usize {
    let wrappers = wrappers_for(doc, annotation_id, config);
    for &wrapper in &wrappers {
        doc.unwrap_element(wrapper);
    }
    wrappers.len()
}

/// Updates the wrappers of an annotation after a style or note change.
pub fn restyle(doc: &mut ChapterDocument, annotation: &Annotation, config: &DecorationConfig) -> usize {
    use crate::document::DocumentTreeMut;

    let wrappers = wrappers_for(doc, &annotation.id, config);
    let class = config.class_for(annotation.style, annotation.note.is_some());
    for &wrapper in &wrappers {
        doc.set_attr(wrapper, "class", &class);
        doc.set_attr(wrapper, &config.style_attribute, annotation.style.as_str());
    }
    wrappers.len()
}

pub fn is_decorated(doc: &ChapterDocument, annotation_id: &str, config: &DecorationConfig) -> bool {
    !wrappers_for(doc, annotation_id, config).is_empty()
}

/// Concatenated text inside an annotation's wrappers.
pub fn decorated_text(doc: &ChapterDocument, annotation_id: &str, config: &DecorationConfig) -> String {
    wrappers_for(doc, annotation_id, config)
        .into_iter()
        .map(|w| doc.text_content(w))
        .collect()
}

/// Re-attaches stored annotations to a fresh render. Annotations whose
/// anchors no longer fit are skipped and reported, never fatal.
pub fn apply_annotations(
    doc: &mut ChapterDocument,
    annotations: &[Annotation],
    config: &DecorationConfig,
) -> DecorationReport {
    let mut report = DecorationReport::default();
    let root = doc.root();
    for annotation in annotations {
        if is_decorated(doc, &annotation.id, config) {
            report.applied.push(annotation.id.clone());
            continue;
        }
        match locate_range(doc, root, &annotation.anchor_block_id, annotation.start, annotation.end) {
            Ok(range) => {
                decorate(doc, &range, annotation, config);
                report.applied.push(annotation.id.clone());
            }
            Err(err) => {
                tracing::debug!(annotation = %annotation.id, error = %err, "skipping decoration");
                report.skipped.push((annotation.id.clone(), err));
            }
        }
    }
    report
}
