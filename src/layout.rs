//! A deterministic stand-in for a browser layout.
//!
//! Block heights come from how many lines `textwrap` needs for the block's
//! own text at the active profile's column width, font size and line height.
//! That is enough for the scroll math in [`crate::progress`] to behave the way
//! it does against a real rendering: a larger font pushes blocks down, a wider
//! column pulls them up.

use hyphenation::{Language, Load, Standard};
use textwrap::{Options, WordSplitter};

use crate::anchor::blocks::is_reading_block;
use crate::document::{DocumentTree, is_excluded};
use crate::progress::Viewport;
use crate::settings::DisplayProfile;

pub const BASE_FONT_PX: f32 = 16.0;
/// Horizontal padding on each side of the content column.
pub const COLUMN_PADDING_PX: f32 = 16.0;
const MIN_CHARS_PER_LINE: usize = 8;

#[derive(Debug, Clone, PartialEq)]
enum FlowItem {
    Open(Option<String>),
    Close,
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockBox {
    pub id: String,
    pub top: f32,
    pub bottom: f32,
}

/// Laid-out chapter inside a fixed-size scroll container.
pub struct LayoutModel {
    flow: Vec<FlowItem>,
    boxes: Vec<BlockBox>,
    splitter: WordSplitter,
    viewport_width: f32,
    client_height: f32,
    content_height: f32,
    scroll_top: f32,
}

fn english_splitter() -> WordSplitter {
    match Standard::from_embedded(Language::EnglishUS) {
        Ok(dictionary) => WordSplitter::Hyphenation(dictionary),
        Err(err) => {
            tracing::warn!(error = %err, "hyphenation dictionary unavailable, wrapping without it");
            WordSplitter::NoHyphenation
        }
    }
}

impl LayoutModel {
    pub fn new(viewport_width: f32, client_height: f32) -> Self {
        Self {
            flow: Vec::new(),
            boxes: Vec::new(),
            splitter: english_splitter(),
            viewport_width: viewport_width.max(0.0),
            client_height: client_height.max(0.0),
            content_height: 0.0,
            scroll_top: 0.0,
        }
    }

    /// Replaces the content with a freshly rendered chapter.
    pub fn load<D: DocumentTree>(&mut self, doc: &D, profile: &DisplayProfile) {
        self.flow.clear();
        collect_flow(doc, doc.root(), &mut self.flow);
        self.scroll_top = 0.0;
        self.relayout(profile);
    }

    pub fn set_viewport(&mut self, width: f32, client_height: f32, profile: &DisplayProfile) {
        self.viewport_width = width.max(0.0);
        self.client_height = client_height.max(0.0);
        self.relayout(profile);
    }

    pub fn viewport_width(&self) -> f32 {
        self.viewport_width
    }

    pub fn boxes(&self) -> &[BlockBox] {
        &self.boxes
    }

    /// Characters that fit on one line under `profile`.
    pub fn chars_per_line(&self, profile: &DisplayProfile) -> usize {
        let column = (profile.max_width as f32).min(self.viewport_width - 2.0 * COLUMN_PADDING_PX);
        let advance = font_px(profile) * profile.font_family.advance_ratio();
        if column <= 0.0 || advance <= 0.0 {
            return MIN_CHARS_PER_LINE;
        }
        ((column / advance).floor() as usize).max(MIN_CHARS_PER_LINE)
    }

    fn line_count(&self, text: &str, width: usize) -> usize {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            return 0;
        }
        let options = Options::new(width).word_splitter(self.splitter.clone());
        textwrap::wrap(&collapsed, &options).len()
    }

    /// Recomputes every block extent under `profile`. Keeps the scroll offset
    /// clamped; callers that care about position restore it afterwards.
    pub fn relayout(&mut self, profile: &DisplayProfile) {
        let width = self.chars_per_line(profile);
        let line_px = font_px(profile) * profile.line_height;
        let gap = font_px(profile);

        let mut cursor = 0.0f32;
        let mut open: Vec<(Option<String>, f32)> = Vec::new();
        let mut boxes = Vec::new();
        let mut pending = String::new();

        for item in &self.flow {
            match item {
                FlowItem::Text(text) => pending.push_str(text),
                FlowItem::Open(id) => {
                    cursor += self.line_count(&pending, width) as f32 * line_px;
                    pending.clear();
                    open.push((id.clone(), cursor));
                }
                FlowItem::Close => {
                    cursor += self.line_count(&pending, width) as f32 * line_px;
                    pending.clear();
                    if let Some((id, top)) = open.pop() {
                        // Every block keeps at least one line of height.
                        cursor = cursor.max(top + line_px) + gap;
                        if let Some(id) = id {
                            boxes.push(BlockBox { id, top, bottom: cursor });
                        }
                    }
                }
            }
        }
        cursor += self.line_count(&pending, width) as f32 * line_px;

        self.boxes = boxes;
        self.content_height = cursor;
        self.scroll_top = self.scroll_top.clamp(0.0, self.max_scroll());
    }
}

fn font_px(profile: &DisplayProfile) -> f32 {
    BASE_FONT_PX * profile.font_size as f32 / 100.0
}

fn collect_flow<D: DocumentTree>(doc: &D, node: D::Node, out: &mut Vec<FlowItem>) {
    if let Some(text) = doc.text(node) {
        out.push(FlowItem::Text(text.to_string()));
        return;
    }
    if is_excluded(doc, node) {
        return;
    }
    let block = is_reading_block(doc, node);
    if block {
        out.push(FlowItem::Open(doc.attr(node, "id").map(str::to_string)));
    }
    for &child in doc.children(node) {
        collect_flow(doc, child, out);
    }
    if block {
        out.push(FlowItem::Close);
    }
}

impl Viewport for LayoutModel {
    fn scroll_top(&self) -> f32 {
        self.scroll_top
    }

    fn scroll_height(&self) -> f32 {
        self.content_height.max(self.client_height)
    }

    fn client_height(&self) -> f32 {
        self.client_height
    }

    fn scroll_to(&mut self, top: f32) {
        self.scroll_top = if top.is_finite() {
            top.clamp(0.0, self.max_scroll())
        } else {
            0.0
        };
    }

    fn element_extent(&self, id: &str) -> Option<(f32, f32)> {
        self.boxes
            .iter()
            .find(|b| b.id == id)
            .map(|b| (b.top, b.bottom))
    }

    fn block_at(&self, y: f32) -> Option<String> {
        self.boxes
            .iter()
            .filter(|b| b.top <= y && y < b.bottom)
            .min_by(|a, b| (a.bottom - a.top).total_cmp(&(b.bottom - b.top)))
            .map(|b| b.id.clone())
    }
}
