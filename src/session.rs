//! Per-book reading session.
//!
//! Owns every cache for one open book: the rendered chapter, the annotation
//! store, progress writes and display profiles. Dropping the session drops
//! all of it; nothing outlives the book being open.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::anchor::decorate::restyle;
use crate::anchor::{
    ChapterContext, DecorationConfig, DecorationReport, Selection, apply_annotations, assign_block_ids, decorate,
    locate_range, resolve_selection, undecorate,
};
use crate::annotations::{AnnotationApi, AnnotationStore};
use crate::document::{ChapterDocument, DocumentTree, NodeId};
use crate::error::{AnchorError, AnnotationError, LoadError};
use crate::layout::LayoutModel;
use crate::loader::{ContentLoader, split_fragment};
use crate::models::{
    Anchor, Annotation, AnnotationPatch, AnnotationStyle, ProgressSummary, ReadingBlock, ReadingProgress,
    RestoreOutcome, ScrollSnapshot,
};
use crate::profile::{Adjustment, ProfileManager, ViewportClass};
use crate::progress::{ProgressTracker, ProgressWriter, Viewport, load_progress, progress_record};
use crate::settings::{DisplayProfile, Settings};
use crate::state::DurableState;

#[derive(Debug, Clone, PartialEq)]
pub struct SpineItem {
    pub href: String,
    pub title: String,
}

impl SpineItem {
    pub fn new(href: &str, title: &str) -> Self {
        Self {
            href: href.to_string(),
            title: title.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub id: String,
    pub spine: Vec<SpineItem>,
}

/// Chapter-load request id. Only the newest ticket may install content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LoadTicket(u64);

/// A chapter load that has been started but whose content has not arrived.
#[derive(Debug, Clone)]
pub struct PendingLoad {
    pub ticket: LoadTicket,
    pub href: String,
    pub fragment: Option<String>,
    pub spine_index: Option<usize>,
}

/// The chapter currently on screen.
#[derive(Debug)]
pub struct Chapter {
    pub href: String,
    pub title: String,
    pub spine_index: Option<usize>,
    pub doc: ChapterDocument,
    pub blocks: Vec<ReadingBlock>,
}

pub struct ReadingSession {
    book: Book,
    loader: Arc<dyn ContentLoader>,
    annotations: AnnotationStore,
    state: DurableState,
    tracker: ProgressTracker,
    writer: ProgressWriter,
    profiles: ProfileManager,
    layout: LayoutModel,
    decoration: DecorationConfig,
    block_prefix: String,
    generation: u64,
    chapter: Option<Chapter>,
}

impl ReadingSession {
    pub fn new(
        book: Book,
        settings: &Settings,
        loader: Arc<dyn ContentLoader>,
        api: Box<dyn AnnotationApi>,
        mut state: DurableState,
        viewport: (f32, f32),
    ) -> Self {
        let (width, height) = viewport;
        let mut profiles = ProfileManager::from_settings(settings, width);
        profiles.load(&mut state);
        let annotations = AnnotationStore::new(&book.id, api);
        tracing::info!(book = %book.id, chapters = book.spine.len(), profile = profiles.active_class().as_str(), "session opened");
        Self {
            book,
            loader,
            annotations,
            state,
            tracker: ProgressTracker::new(settings.sample_offset_px),
            writer: ProgressWriter::new(Duration::from_millis(settings.progress_debounce_ms)),
            profiles,
            layout: LayoutModel::new(width, height),
            decoration: DecorationConfig::with_class_prefix(&settings.decoration_class_prefix),
            block_prefix: settings.block_id_prefix.clone(),
            generation: 0,
            chapter: None,
        }
    }

    pub fn book(&self) -> &Book {
        &self.book
    }

    pub fn chapter(&self) -> Option<&Chapter> {
        self.chapter.as_ref()
    }

    pub fn layout(&self) -> &LayoutModel {
        &self.layout
    }

    pub fn annotations(&self) -> &AnnotationStore {
        &self.annotations
    }

    pub fn display_profile(&self) -> &DisplayProfile {
        self.profiles.active()
    }

    pub fn viewport_class(&self) -> ViewportClass {
        self.profiles.active_class()
    }

    /// Shared handle for fetching on a worker thread.
    pub fn loader(&self) -> Arc<dyn ContentLoader> {
        Arc::clone(&self.loader)
    }

    pub fn chapter_html(&self) -> Option<String> {
        self.chapter.as_ref().map(|c| c.doc.to_html())
    }

    fn spine_position(&self, href: &str) -> Option<usize> {
        self.book.spine.iter().position(|item| item.href == href)
    }

    // ---- chapter loading ----

    /// Starts loading `href` (optionally `href#fragment`). Any load still in
    /// flight becomes stale.
    pub fn begin_load(&mut self, href: &str) -> Result<PendingLoad, LoadError> {
        let (path, fragment) = split_fragment(href);
        let spine_index = self.spine_position(path);
        if spine_index.is_none() && !self.book.spine.is_empty() {
            return Err(LoadError::UnknownChapter(path.to_string()));
        }
        self.generation += 1;
        Ok(PendingLoad {
            ticket: LoadTicket(self.generation),
            href: path.to_string(),
            fragment: fragment.map(str::to_string),
            spine_index,
        })
    }

    pub fn fetch(&self, pending: &PendingLoad) -> Result<String, LoadError> {
        self.loader.load_text(&pending.href)
    }

    pub fn is_current(&self, ticket: LoadTicket) -> bool {
        ticket.0 == self.generation
    }

    /// Installs fetched content. Returns `Ok(None)` when a newer load has
    /// started since `pending` was issued; the content is then dropped.
    pub fn finish_load(
        &mut self,
        pending: PendingLoad,
        content: Result<String, LoadError>,
    ) -> Result<Option<RestoreOutcome>, LoadError> {
        if !self.is_current(pending.ticket) {
            tracing::debug!(href = %pending.href, ticket = pending.ticket.0, current = self.generation, "discarding stale chapter load");
            return Ok(None);
        }
        let html = content.inspect_err(|err| {
            tracing::warn!(href = %pending.href, error = %err, "chapter failed to load");
        })?;

        self.persist_now();

        let mut doc = ChapterDocument::parse(&html);
        let blocks = assign_block_ids(&mut doc, &self.block_prefix);
        let title = pending
            .spine_index
            .and_then(|i| self.book.spine.get(i))
            .map(|item| item.title.clone())
            .unwrap_or_default();

        if let Err(err) = self.annotations.load() {
            tracing::warn!(error = %err, "annotations unavailable for this session");
        }

        self.layout.load(&doc, self.profiles.active());
        self.chapter = Some(Chapter {
            href: pending.href.clone(),
            title,
            spine_index: pending.spine_index,
            doc,
            blocks,
        });
        let report = self.apply_annotations_for_chapter(&pending.href);
        tracing::debug!(href = %pending.href, applied = report.applied.len(), skipped = report.skipped.len(), "chapter rendered");

        let outcome = match pending.fragment.as_deref() {
            Some(fragment) => self.tracker.scroll_to_element(&mut self.layout, fragment),
            None => {
                let snapshot = load_progress(&mut self.state, &self.book.id)
                    .filter(|p| p.chapter_href == pending.href)
                    .map(|p| p.snapshot());
                self.tracker.restore(&mut self.layout, snapshot.as_ref())
            }
        };
        self.persist_now();
        Ok(Some(outcome))
    }

    /// Loads a chapter synchronously.
    pub fn open_chapter(&mut self, href: &str) -> Result<Option<RestoreOutcome>, LoadError> {
        let pending = self.begin_load(href)?;
        let content = self.fetch(&pending);
        self.finish_load(pending, content)
    }

    /// Opens the chapter of the stored position, or the first chapter.
    pub fn resume(&mut self) -> Result<Option<RestoreOutcome>, LoadError> {
        let stored = load_progress(&mut self.state, &self.book.id)
            .map(|p| p.chapter_href)
            .filter(|href| self.book.spine.is_empty() || self.spine_position(href).is_some());
        let href = match stored {
            Some(href) => href,
            None => match self.book.spine.first() {
                Some(item) => item.href.clone(),
                None => return Ok(None),
            },
        };
        self.open_chapter(&href)
    }

    pub fn next_chapter(&mut self) -> Result<Option<RestoreOutcome>, LoadError> {
        let next = self
            .chapter
            .as_ref()
            .and_then(|c| c.spine_index)
            .map(|i| i + 1)
            .and_then(|i| self.book.spine.get(i))
            .map(|item| item.href.clone());
        match next {
            Some(href) => self.open_chapter(&href),
            None => Ok(None),
        }
    }

    pub fn prev_chapter(&mut self) -> Result<Option<RestoreOutcome>, LoadError> {
        let prev = self
            .chapter
            .as_ref()
            .and_then(|c| c.spine_index)
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| self.book.spine.get(i))
            .map(|item| item.href.clone());
        match prev {
            Some(href) => self.open_chapter(&href),
            None => Ok(None),
        }
    }

    // ---- annotations ----

    pub fn resolve_selection(&self, selection: &Selection<NodeId>) -> Result<Option<Anchor>, AnchorError> {
        let Some(chapter) = self.chapter.as_ref() else {
            return Ok(None);
        };
        resolve_selection(
            &chapter.doc,
            chapter.doc.root(),
            selection,
            ChapterContext {
                href: &chapter.href,
                title: &chapter.title,
            },
        )
    }

    fn decorate_one(&mut self, annotation: &Annotation) {
        let Some(chapter) = self.chapter.as_mut() else {
            return;
        };
        if chapter.href != annotation.chapter_href {
            return;
        }
        let root = chapter.doc.root();
        match locate_range(&chapter.doc, root, &annotation.anchor_block_id, annotation.start, annotation.end) {
            Ok(range) => {
                decorate(&mut chapter.doc, &range, annotation, &self.decoration);
            }
            Err(err) => {
                tracing::debug!(annotation = %annotation.id, error = %err, "new annotation could not be painted");
            }
        }
    }

    /// Persists a new annotation, then paints it.
    pub fn create_annotation(
        &mut self,
        anchor: &Anchor,
        style: AnnotationStyle,
        note: Option<String>,
    ) -> Result<Annotation, AnnotationError> {
        let created = self.annotations.create(anchor, style, note)?;
        self.decorate_one(&created);
        Ok(created)
    }

    pub fn update_annotation(&mut self, id: &str, patch: &AnnotationPatch) -> Result<Annotation, AnnotationError> {
        let updated = self.annotations.update(id, patch)?;
        if let Some(chapter) = self.chapter.as_mut() {
            restyle(&mut chapter.doc, &updated, &self.decoration);
        }
        Ok(updated)
    }

    pub fn toggle_annotation_style(&mut self, id: &str) -> Result<Annotation, AnnotationError> {
        let current = self
            .annotations
            .get(id)
            .ok_or_else(|| AnnotationError::NotFound(id.to_string()))?;
        self.update_annotation(id, &AnnotationPatch::style(current.style.toggled()))
    }

    pub fn delete_annotation(&mut self, id: &str) -> Result<Annotation, AnnotationError> {
        let removed = self.annotations.delete(id)?;
        if let Some(chapter) = self.chapter.as_mut() {
            undecorate(&mut chapter.doc, id, &self.decoration);
        }
        Ok(removed)
    }

    /// Paints the cached annotations of `href` onto the current render.
    /// Drifted annotations are skipped, not removed.
    pub fn apply_annotations_for_chapter(&mut self, href: &str) -> DecorationReport {
        let annotations = self.annotations.by_chapter(href);
        match self.chapter.as_mut() {
            Some(chapter) if chapter.href == href => apply_annotations(&mut chapter.doc, &annotations, &self.decoration),
            _ => DecorationReport::default(),
        }
    }

    // ---- progress ----

    pub fn capture_progress(&self) -> Option<ReadingProgress> {
        let chapter = self.chapter.as_ref()?;
        Some(progress_record(
            &chapter.href,
            Some(chapter.title.as_str()).filter(|t| !t.is_empty()),
            chapter.spine_index,
            self.tracker.capture(&self.layout),
        ))
    }

    pub fn restore_progress(&mut self, snapshot: Option<&ScrollSnapshot>) -> RestoreOutcome {
        self.tracker.restore(&mut self.layout, snapshot)
    }

    /// Scroll notification from the view. The first notification after a
    /// programmatic restore is not captured.
    pub fn on_scroll(&mut self, top: f32, now: Instant) {
        if self.tracker.take_programmatic_scroll() && (top - self.layout.scroll_top()).abs() < 0.5 {
            return;
        }
        self.layout.scroll_to(top);
        if let Some(progress) = self.capture_progress() {
            self.writer.schedule(progress, now);
        }
    }

    /// Writes a debounced position whose deadline has passed.
    pub fn tick(&mut self, now: Instant) -> bool {
        self.writer.poll(now, &mut self.state, &self.book.id)
    }

    pub fn on_visibility_hidden(&mut self) {
        self.persist_now();
    }

    fn persist_now(&mut self) {
        if let Some(progress) = self.capture_progress() {
            self.writer.schedule(progress, Instant::now());
        }
        self.writer.flush_now(&mut self.state, &self.book.id);
    }

    pub fn stored_progress(&mut self) -> Option<ReadingProgress> {
        load_progress(&mut self.state, &self.book.id)
    }

    pub fn progress_summary(&mut self) -> Option<ProgressSummary> {
        let spine_len = Some(self.book.spine.len()).filter(|&n| n > 0);
        self.stored_progress()
            .map(|p| ProgressSummary::from_progress(&p, spine_len))
    }

    // ---- display ----

    pub fn set_viewport_width(&mut self, width: f32) -> Option<ViewportClass> {
        self.profiles
            .on_viewport_width(width, &mut self.tracker, &mut self.layout)
    }

    pub fn adjust_display(&mut self, adjustment: Adjustment) -> Option<RestoreOutcome> {
        let outcome = self
            .profiles
            .apply(adjustment, &mut self.tracker, &mut self.layout)?;
        self.profiles.persist(&mut self.state);
        Some(outcome)
    }

    /// Flushes any pending position before the session goes away.
    pub fn close(mut self) {
        self.persist_now();
        tracing::info!(book = %self.book.id, "session closed");
    }
}
