use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Paragraph-level element stamped for the current render only.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingBlock {
    pub id: String,
    pub index: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationStyle {
    #[default]
    Highlight,
    Underline,
}

impl AnnotationStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationStyle::Highlight => "highlight",
            AnnotationStyle::Underline => "underline",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            AnnotationStyle::Highlight => AnnotationStyle::Underline,
            AnnotationStyle::Underline => AnnotationStyle::Highlight,
        }
    }
}

impl std::str::FromStr for AnnotationStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "highlight" => Ok(AnnotationStyle::Highlight),
            "underline" => Ok(AnnotationStyle::Underline),
            other => Err(format!("unknown annotation style '{}'", other)),
        }
    }
}

/// A resolved single-block selection, ready to become an annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct Anchor {
    pub chapter_href: String,
    pub block_id: String,
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub context_snippet: String,
    pub chapter_title: String,
}

impl Anchor {
    pub fn overlaps(&self, other: &Annotation) -> bool {
        self.chapter_href == other.chapter_href
            && self.block_id == other.anchor_block_id
            && ranges_overlap(self.start, self.end, other.start, other.end)
    }
}

/// Half-open interval intersection.
pub fn ranges_overlap(start1: usize, end1: usize, start2: usize, end2: usize) -> bool {
    start1 < end2 && start2 < end1
}

/// Canonical annotation record as returned by the annotation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub id: String,
    pub chapter_href: String,
    #[serde(rename = "anchorId")]
    pub anchor_block_id: String,
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub style: AnnotationStyle,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(rename = "context", default)]
    pub context_snippet: String,
    #[serde(default)]
    pub chapter_title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Annotation {
    pub fn is_valid_range(&self) -> bool {
        self.start < self.end
    }
}

/// Body of a create request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAnnotation {
    pub book_id: String,
    pub chapter_href: String,
    #[serde(rename = "anchorId")]
    pub anchor_block_id: String,
    pub start: usize,
    pub end: usize,
    pub style: AnnotationStyle,
    pub text: String,
    pub note: Option<String>,
    #[serde(rename = "context")]
    pub context_snippet: String,
    pub chapter_title: String,
}

impl NewAnnotation {
    pub fn from_anchor(
        book_id: &str,
        anchor: &Anchor,
        style: AnnotationStyle,
        note: Option<String>,
    ) -> Self {
        Self {
            book_id: book_id.to_string(),
            chapter_href: anchor.chapter_href.clone(),
            anchor_block_id: anchor.block_id.clone(),
            start: anchor.start,
            end: anchor.end,
            style,
            text: anchor.text.clone(),
            note: note.filter(|n| !n.trim().is_empty()),
            context_snippet: anchor.context_snippet.clone(),
            chapter_title: anchor.chapter_title.clone(),
        }
    }
}

/// Mutable fields of an annotation. An empty note clears it.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AnnotationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<AnnotationStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl AnnotationPatch {
    pub fn style(style: AnnotationStyle) -> Self {
        Self {
            style: Some(style),
            note: None,
        }
    }

    pub fn note(note: impl Into<String>) -> Self {
        Self {
            style: None,
            note: Some(note.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.style.is_none() && self.note.is_none()
    }

    pub fn apply(&self, annotation: &mut Annotation) {
        if let Some(style) = self.style {
            annotation.style = style;
        }
        if let Some(note) = &self.note {
            annotation.note = if note.trim().is_empty() {
                None
            } else {
                Some(note.clone())
            };
        }
    }
}

/// Where the reader was in a book. Block ids only mean something within the
/// render that produced them, so the percent is always kept as a fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingProgress {
    pub chapter_href: String,
    #[serde(default)]
    pub anchor_block_id: Option<String>,
    pub scroll_percent: f64,
    #[serde(default)]
    pub chapter_title: Option<String>,
    #[serde(default)]
    pub spine_index: Option<usize>,
    pub updated_at: DateTime<Utc>,
}

impl ReadingProgress {
    pub fn snapshot(&self) -> ScrollSnapshot {
        ScrollSnapshot {
            anchor_block_id: self.anchor_block_id.clone(),
            scroll_percent: self.scroll_percent,
        }
    }
}

/// Position inside the currently rendered chapter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScrollSnapshot {
    pub anchor_block_id: Option<String>,
    pub scroll_percent: f64,
}

/// Which step of the restore fallback chain placed the reader.
#[derive(Debug, Clone, PartialEq)]
pub enum RestoreOutcome {
    Anchor(String),
    Percent(f64),
    ChapterStart,
}

/// Book-level progress for a library listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSummary {
    pub percent: Option<u32>,
    pub chapter_title: Option<String>,
    pub spine_index: Option<usize>,
}

impl ProgressSummary {
    pub fn from_progress(progress: &ReadingProgress, spine_len: Option<usize>) -> Self {
        let percent = match (progress.spine_index, spine_len) {
            (Some(index), Some(len)) if len > 0 => {
                let fraction = (index as f64 + progress.scroll_percent.clamp(0.0, 1.0)) / len as f64;
                Some((fraction.clamp(0.0, 1.0) * 100.0).round() as u32)
            }
            _ => None,
        };
        Self {
            percent,
            chapter_title: progress
                .chapter_title
                .clone()
                .filter(|t| !t.trim().is_empty()),
            spine_index: progress.spine_index,
        }
    }

    pub fn label(&self) -> String {
        match (self.percent, &self.chapter_title, self.spine_index) {
            (Some(percent), Some(chapter), _) => format!("Read {}% · {}", percent, chapter),
            (Some(percent), None, _) => format!("Read {}%", percent),
            (None, Some(chapter), _) => format!("Last: {}", chapter),
            (None, None, Some(index)) => format!("Last: Chapter {}", index + 1),
            (None, None, None) => String::new(),
        }
    }
}
