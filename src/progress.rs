//! Capturing and restoring where the reader is inside a chapter.

use std::time::{Duration, Instant};

use chrono::Utc;

use crate::models::{ReadingProgress, RestoreOutcome, ScrollSnapshot};
use crate::state::DurableState;

pub const PROGRESS_KEY: &str = "progress";
pub const DEFAULT_PROBE_OFFSET: f32 = 8.0;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Scrollable container holding the rendered chapter. Coordinates are in
/// content space: 0 is the top of the chapter.
pub trait Viewport {
    fn scroll_top(&self) -> f32;
    fn scroll_height(&self) -> f32;
    fn client_height(&self) -> f32;
    /// Jumps without animation, clamped to the scrollable range.
    fn scroll_to(&mut self, top: f32);
    /// `(top, bottom)` of the element with `id`, if it is rendered.
    fn element_extent(&self, id: &str) -> Option<(f32, f32)>;
    /// Innermost reading block covering `y`.
    fn block_at(&self, y: f32) -> Option<String>;

    fn max_scroll(&self) -> f32 {
        (self.scroll_height() - self.client_height()).max(0.0)
    }
}

/// Scroll fraction in `[0, 1]`; 0 when the content fits the viewport.
pub fn scroll_percent<V: Viewport + ?Sized>(viewport: &V) -> f64 {
    let max = viewport.max_scroll();
    if max <= 0.0 {
        return 0.0;
    }
    (viewport.scroll_top() as f64 / max as f64).clamp(0.0, 1.0)
}

/// Captures and restores scroll snapshots.
///
/// A restore marks the next scroll notification as programmatic, so the
/// session can skip capturing the position it just set.
#[derive(Debug)]
pub struct ProgressTracker {
    sample_offset: f32,
    suppress_next_scroll: bool,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_OFFSET)
    }
}

impl ProgressTracker {
    pub fn new(sample_offset: f32) -> Self {
        Self {
            sample_offset: sample_offset.max(0.0),
            suppress_next_scroll: false,
        }
    }

    pub fn capture<V: Viewport + ?Sized>(&self, viewport: &V) -> ScrollSnapshot {
        let sample_y = viewport.scroll_top() + self.sample_offset;
        ScrollSnapshot {
            anchor_block_id: viewport.block_at(sample_y),
            scroll_percent: scroll_percent(viewport),
        }
    }

    /// Anchor first, then percent, then chapter start.
    ///
    /// When the anchor block is present and the percent position still puts
    /// the sample point inside it, the percent position wins; on an unchanged layout
    /// that reproduces the captured scroll offset exactly.
    pub fn restore<V: Viewport + ?Sized>(
        &mut self,
        viewport: &mut V,
        snapshot: Option<&ScrollSnapshot>,
    ) -> RestoreOutcome {
        self.suppress_next_scroll = true;

        let Some(snapshot) = snapshot else {
            viewport.scroll_to(0.0);
            return RestoreOutcome::ChapterStart;
        };
        let percent = snapshot.scroll_percent;
        let by_percent = if percent.is_finite() {
            Some((percent.clamp(0.0, 1.0) as f32) * viewport.max_scroll())
        } else {
            None
        };

        if let Some(id) = snapshot.anchor_block_id.as_deref() {
            if let Some((top, bottom)) = viewport.element_extent(id) {
                let target = match by_percent {
                    Some(y) if self.sample_within(y, top, bottom) => y,
                    _ => top,
                };
                viewport.scroll_to(target);
                return RestoreOutcome::Anchor(id.to_string());
            }
            tracing::debug!(block = id, "anchor block missing from render, falling back to percent");
        }

        match by_percent {
            Some(y) => {
                viewport.scroll_to(y);
                RestoreOutcome::Percent(percent.clamp(0.0, 1.0))
            }
            None => {
                viewport.scroll_to(0.0);
                RestoreOutcome::ChapterStart
            }
        }
    }

    // Tolerates rounding from the f64 percent going through f32 pixels.
    fn sample_within(&self, scroll_top: f32, top: f32, bottom: f32) -> bool {
        let sample_y = scroll_top + self.sample_offset;
        sample_y >= top - 1.0 && sample_y < bottom + 1.0
    }

    /// Scrolls to the element with `id`, or the chapter start without it.
    pub fn scroll_to_element<V: Viewport + ?Sized>(&mut self, viewport: &mut V, id: &str) -> RestoreOutcome {
        self.suppress_next_scroll = true;
        match viewport.element_extent(id) {
            Some((top, _)) => {
                viewport.scroll_to(top);
                RestoreOutcome::Anchor(id.to_string())
            }
            None => {
                viewport.scroll_to(0.0);
                RestoreOutcome::ChapterStart
            }
        }
    }

    /// Consumes the programmatic-scroll mark. Returns true if the scroll
    /// being reported was caused by a restore.
    pub fn take_programmatic_scroll(&mut self) -> bool {
        std::mem::take(&mut self.suppress_next_scroll)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum WriterState {
    Idle,
    Pending { deadline: Instant, value: ReadingProgress },
    Flushing,
}

/// Trailing-edge debounced progress writes.
#[derive(Debug)]
pub struct ProgressWriter {
    debounce: Duration,
    state: WriterState,
    writes: usize,
}

impl ProgressWriter {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            state: WriterState::Idle,
            writes: 0,
        }
    }

    /// Replaces any pending value and pushes the deadline out.
    pub fn schedule(&mut self, value: ReadingProgress, now: Instant) {
        self.state = WriterState::Pending {
            deadline: now + self.debounce,
            value,
        };
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, WriterState::Pending { .. })
    }

    pub fn pending(&self) -> Option<&ReadingProgress> {
        match &self.state {
            WriterState::Pending { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Number of values written so far.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Writes the pending value if its deadline has passed.
    pub fn poll(&mut self, now: Instant, state: &mut DurableState, book: &str) -> bool {
        match &self.state {
            WriterState::Pending { deadline, .. } if *deadline <= now => self.flush_now(state, book),
            _ => false,
        }
    }

    /// Writes the pending value immediately, ignoring the deadline.
    pub fn flush_now(&mut self, state: &mut DurableState, book: &str) -> bool {
        let WriterState::Pending { value, .. } = std::mem::replace(&mut self.state, WriterState::Flushing) else {
            self.state = WriterState::Idle;
            return false;
        };
        save_progress(state, book, &value);
        self.writes += 1;
        if self.state == WriterState::Flushing {
            self.state = WriterState::Idle;
        }
        true
    }
}

/// Reads the book's last position. Missing, malformed or out-of-range data
/// reads as no progress.
pub fn load_progress(state: &mut DurableState, book: &str) -> Option<ReadingProgress> {
    let progress: ReadingProgress = state.load_json(book, PROGRESS_KEY)?;
    if !progress.scroll_percent.is_finite() || progress.chapter_href.is_empty() {
        tracing::debug!(book, "ignoring unusable stored progress");
        return None;
    }
    Some(ReadingProgress {
        scroll_percent: progress.scroll_percent.clamp(0.0, 1.0),
        ..progress
    })
}

pub fn save_progress(state: &mut DurableState, book: &str, progress: &ReadingProgress) {
    state.save_json(book, PROGRESS_KEY, progress);
    tracing::debug!(book, chapter = %progress.chapter_href, percent = progress.scroll_percent, "progress saved");
}

/// Builds a progress record for the current chapter from a snapshot.
pub fn progress_record(
    chapter_href: &str,
    chapter_title: Option<&str>,
    spine_index: Option<usize>,
    snapshot: ScrollSnapshot,
) -> ReadingProgress {
    ReadingProgress {
        chapter_href: chapter_href.to_string(),
        anchor_block_id: snapshot.anchor_block_id,
        scroll_percent: snapshot.scroll_percent,
        chapter_title: chapter_title.map(str::to_string),
        spine_index,
        updated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fixed-height blocks stacked from the top.
    struct FakeViewport {
        blocks: Vec<(String, f32, f32)>,
        top: f32,
        height: f32,
        client: f32,
    }

    impl FakeViewport {
        fn uniform(count: usize, block_height: f32, client: f32) -> Self {
            let blocks = (0..count)
                .map(|i| (format!("b{}", i), i as f32 * block_height, (i + 1) as f32 * block_height))
                .collect();
            Self {
                blocks,
                top: 0.0,
                height: count as f32 * block_height,
                client,
            }
        }
    }

    impl Viewport for FakeViewport {
        fn scroll_top(&self) -> f32 {
            self.top
        }
        fn scroll_height(&self) -> f32 {
            self.height
        }
        fn client_height(&self) -> f32 {
            self.client
        }
        fn scroll_to(&mut self, top: f32) {
            self.top = top.clamp(0.0, self.max_scroll());
        }
        fn element_extent(&self, id: &str) -> Option<(f32, f32)> {
            self.blocks.iter().find(|b| b.0 == id).map(|b| (b.1, b.2))
        }
        fn block_at(&self, y: f32) -> Option<String> {
            self.blocks
                .iter()
                .find(|b| b.1 <= y && y < b.2)
                .map(|b| b.0.clone())
        }
    }

    #[test]
    fn test_percent_is_zero_when_content_fits() {
        let viewport = FakeViewport::uniform(2, 100.0, 600.0);
        assert_eq!(scroll_percent(&viewport), 0.0);
    }

    #[test]
    fn test_capture_samples_below_top() {
        let mut viewport = FakeViewport::uniform(10, 100.0, 400.0);
        viewport.scroll_to(295.0);
        let snapshot = ProgressTracker::default().capture(&viewport);
        assert_eq!(snapshot.anchor_block_id.as_deref(), Some("b3"));
        assert!((snapshot.scroll_percent - 295.0 / 600.0).abs() < 1e-9);
    }

    #[test]
    fn test_round_trip_on_unchanged_layout() {
        let mut tracker = ProgressTracker::default();
        for top in [0.0, 37.0, 250.0, 512.5, 600.0] {
            let mut viewport = FakeViewport::uniform(10, 100.0, 400.0);
            viewport.scroll_to(top);
            let snapshot = tracker.capture(&viewport);
            viewport.scroll_to(0.0);
            tracker.restore(&mut viewport, Some(&snapshot));
            assert!((viewport.scroll_top() - top).abs() <= 1.0, "top {}", top);
        }
    }

    #[test]
    fn test_restore_prefers_anchor_after_relayout() {
        let mut tracker = ProgressTracker::default();
        let snapshot = ScrollSnapshot {
            anchor_block_id: Some("b7".to_string()),
            scroll_percent: 0.1,
        };
        let mut viewport = FakeViewport::uniform(10, 200.0, 400.0);
        let outcome = tracker.restore(&mut viewport, Some(&snapshot));
        assert_eq!(outcome, RestoreOutcome::Anchor("b7".to_string()));
        assert_eq!(viewport.scroll_top(), 1400.0);
    }

    #[test]
    fn test_restore_falls_back_to_percent() {
        let mut tracker = ProgressTracker::default();
        let snapshot = ScrollSnapshot {
            anchor_block_id: Some("gone".to_string()),
            scroll_percent: 0.5,
        };
        let mut viewport = FakeViewport::uniform(10, 100.0, 400.0);
        assert_eq!(
            tracker.restore(&mut viewport, Some(&snapshot)),
            RestoreOutcome::Percent(0.5)
        );
        assert_eq!(viewport.scroll_top(), 300.0);
    }

    #[test]
    fn test_percent_applies_to_longer_replacement_content() {
        let mut tracker = ProgressTracker::default();
        let mut old = FakeViewport::uniform(10, 100.0, 400.0);
        old.scroll_to(300.0);
        let snapshot = tracker.capture(&old);
        assert_eq!(snapshot.scroll_percent, 0.5);

        let mut longer = FakeViewport::uniform(30, 100.0, 400.0);
        for block in &mut longer.blocks {
            block.0 = format!("new-{}", block.0);
        }
        assert_eq!(
            tracker.restore(&mut longer, Some(&snapshot)),
            RestoreOutcome::Percent(0.5)
        );
        assert_eq!(longer.scroll_top(), 1300.0);
    }

    #[test]
    fn test_restore_without_snapshot_goes_to_start() {
        let mut tracker = ProgressTracker::default();
        let mut viewport = FakeViewport::uniform(10, 100.0, 400.0);
        viewport.scroll_to(300.0);
        assert_eq!(tracker.restore(&mut viewport, None), RestoreOutcome::ChapterStart);
        assert_eq!(viewport.scroll_top(), 0.0);

        let broken = ScrollSnapshot {
            anchor_block_id: None,
            scroll_percent: f64::NAN,
        };
        assert_eq!(
            tracker.restore(&mut viewport, Some(&broken)),
            RestoreOutcome::ChapterStart
        );
    }

    #[test]
    fn test_restore_marks_next_scroll_as_programmatic() {
        let mut tracker = ProgressTracker::default();
        let mut viewport = FakeViewport::uniform(10, 100.0, 400.0);
        assert!(!tracker.take_programmatic_scroll());
        tracker.restore(&mut viewport, None);
        assert!(tracker.take_programmatic_scroll());
        assert!(!tracker.take_programmatic_scroll());
    }

    fn record(percent: f64) -> ReadingProgress {
        progress_record(
            "ch1.xhtml",
            Some("One"),
            Some(0),
            ScrollSnapshot {
                anchor_block_id: None,
                scroll_percent: percent,
            },
        )
    }

    #[test]
    fn test_writer_debounces_to_last_value() {
        let mut state = DurableState::memory_only();
        let mut writer = ProgressWriter::new(DEFAULT_DEBOUNCE);
        let t0 = Instant::now();

        writer.schedule(record(0.1), t0);
        writer.schedule(record(0.2), t0 + Duration::from_millis(100));
        writer.schedule(record(0.3), t0 + Duration::from_millis(200));
        assert!(!writer.poll(t0 + Duration::from_millis(300), &mut state, "book"));
        assert!(writer.poll(t0 + Duration::from_millis(450), &mut state, "book"));
        assert_eq!(writer.writes(), 1);
        assert!(!writer.is_pending());
        assert_eq!(load_progress(&mut state, "book").unwrap().scroll_percent, 0.3);
    }

    #[test]
    fn test_flush_now_ignores_deadline() {
        let mut state = DurableState::memory_only();
        let mut writer = ProgressWriter::new(DEFAULT_DEBOUNCE);
        assert!(!writer.flush_now(&mut state, "book"));
        writer.schedule(record(0.7), Instant::now());
        assert!(writer.flush_now(&mut state, "book"));
        assert_eq!(load_progress(&mut state, "book").unwrap().scroll_percent, 0.7);
    }

    #[test]
    fn test_malformed_progress_reads_as_none() {
        let mut state = DurableState::memory_only();
        state.set("book", PROGRESS_KEY, r#"{"chapterHref": 3}"#);
        assert!(load_progress(&mut state, "book").is_none());

        state.set(
            "book",
            PROGRESS_KEY,
            r#"{"chapterHref":"c.xhtml","scrollPercent":4.0,"updatedAt":"2024-01-01T00:00:00Z"}"#,
        );
        assert_eq!(load_progress(&mut state, "book").unwrap().scroll_percent, 1.0);
    }
}
