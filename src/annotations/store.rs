//! Session cache over the remote annotation service.

use std::cmp::Ordering;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::annotations::api::AnnotationApi;
use crate::error::AnnotationError;
use crate::models::{Anchor, Annotation, AnnotationPatch, AnnotationStyle, NewAnnotation};

/// Per-book annotation cache.
///
/// Every mutation is persisted remotely first and only applied to the cache
/// once the service has answered; there is no optimistic state to roll back.
/// Mutations are serialised so the overlap check and the append can never
/// interleave with another writer.
pub struct AnnotationStore {
    book_id: String,
    api: Box<dyn AnnotationApi>,
    cache: Mutex<Option<Vec<Annotation>>>,
    load_lock: Mutex<()>,
    write_lock: Mutex<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Compares block ids with digit runs taken as numbers, so `__auto_2` comes
/// before `__auto_10`.
pub fn compare_block_ids(a: &str, b: &str) -> Ordering {
    let (mut a, mut b) = (a, b);
    loop {
        let (Some(ca), Some(cb)) = (a.chars().next(), b.chars().next()) else {
            return a.len().cmp(&b.len());
        };
        let digits = ca.is_ascii_digit();
        let (run_a, rest_a) = split_run(a, digits);
        let (run_b, rest_b) = split_run(b, cb.is_ascii_digit());
        let ord = if digits && cb.is_ascii_digit() {
            let (na, nb) = (run_a.trim_start_matches('0'), run_b.trim_start_matches('0'));
            na.len().cmp(&nb.len()).then_with(|| na.cmp(nb)).then_with(|| run_a.len().cmp(&run_b.len()))
        } else {
            run_a.cmp(run_b)
        };
        if ord != Ordering::Equal {
            return ord;
        }
        a = rest_a;
        b = rest_b;
    }
}

fn split_run(s: &str, digits: bool) -> (&str, &str) {
    let end = s.find(|c: char| c.is_ascii_digit() != digits).unwrap_or(s.len());
    s.split_at(end)
}

impl AnnotationStore {
    pub fn new(book_id: &str, api: Box<dyn AnnotationApi>) -> Self {
        Self {
            book_id: book_id.to_string(),
            api,
            cache: Mutex::new(None),
            load_lock: Mutex::new(()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    pub fn is_loaded(&self) -> bool {
        lock(&self.cache).is_some()
    }

    /// Fetches the book's annotations once. Callers arriving while a fetch
    /// is in flight wait for it instead of issuing their own.
    pub fn load(&self) -> Result<(), AnnotationError> {
        if self.is_loaded() {
            return Ok(());
        }
        let _loading = lock(&self.load_lock);
        if self.is_loaded() {
            return Ok(());
        }

        let fetched = self.api.list(&self.book_id)?;
        let total = fetched.len();
        let valid: Vec<Annotation> = fetched
            .into_iter()
            .filter(|a| {
                let ok = a.is_valid_range();
                if !ok {
                    tracing::warn!(annotation = %a.id, start = a.start, end = a.end, "dropping annotation with empty range");
                }
                ok
            })
            .collect();
        tracing::info!(book = %self.book_id, loaded = valid.len(), total, "annotations loaded");
        *lock(&self.cache) = Some(valid);
        Ok(())
    }

    /// First cached annotation in the anchor's block that intersects it.
    pub fn find_overlap(&self, anchor: &Anchor) -> Option<Annotation> {
        lock(&self.cache)
            .as_ref()?
            .iter()
            .find(|existing| anchor.overlaps(existing))
            .cloned()
    }

    /// Persists a new annotation for `anchor`.
    ///
    /// Fails with [`AnnotationError::Overlap`] without touching the service
    /// or the cache when the range intersects an existing annotation in the
    /// same block.
    pub fn create(
        &self,
        anchor: &Anchor,
        style: AnnotationStyle,
        note: Option<String>,
    ) -> Result<Annotation, AnnotationError> {
        if anchor.start >= anchor.end || anchor.block_id.is_empty() {
            return Err(AnnotationError::InvalidAnchor);
        }
        self.load()?;

        let _writing = lock(&self.write_lock);
        if let Some(existing) = self.find_overlap(anchor) {
            tracing::info!(existing = %existing.id, block = %anchor.block_id, "rejecting overlapping annotation");
            return Err(AnnotationError::Overlap {
                existing: existing.id,
            });
        }

        let request = NewAnnotation::from_anchor(&self.book_id, anchor, style, note);
        let created = self.api.create(&request).inspect_err(|err| {
            tracing::warn!(error = %err, "failed to save annotation");
        })?;

        lock(&self.cache)
            .get_or_insert_with(Vec::new)
            .push(created.clone());
        tracing::debug!(annotation = %created.id, "annotation created");
        Ok(created)
    }

    /// Changes style and/or note.
    pub fn update(&self, id: &str, patch: &AnnotationPatch) -> Result<Annotation, AnnotationError> {
        self.load()?;
        let _writing = lock(&self.write_lock);
        let current = self
            .get(id)
            .ok_or_else(|| AnnotationError::NotFound(id.to_string()))?;
        if patch.is_empty() {
            return Ok(current);
        }

        let updated = self.api.update(id, patch).inspect_err(|err| {
            tracing::warn!(annotation = %id, error = %err, "failed to update annotation");
        })?;

        let mut cache = lock(&self.cache);
        if let Some(slot) = cache
            .as_mut()
            .and_then(|list| list.iter_mut().find(|a| a.id == id))
        {
            *slot = updated.clone();
        }
        Ok(updated)
    }

    /// Removes an annotation remotely, then from the cache.
    pub fn delete(&self, id: &str) -> Result<Annotation, AnnotationError> {
        self.load()?;
        let _writing = lock(&self.write_lock);
        if self.get(id).is_none() {
            return Err(AnnotationError::NotFound(id.to_string()));
        }

        self.api.delete(id).inspect_err(|err| {
            tracing::warn!(annotation = %id, error = %err, "failed to delete annotation");
        })?;

        let mut cache = lock(&self.cache);
        let list = cache.get_or_insert_with(Vec::new);
        let position = list
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| AnnotationError::NotFound(id.to_string()))?;
        Ok(list.remove(position))
    }

    pub fn get(&self, id: &str) -> Option<Annotation> {
        lock(&self.cache)
            .as_ref()?
            .iter()
            .find(|a| a.id == id)
            .cloned()
    }

    /// Cached annotations for one chapter, ordered by block then offset.
    pub fn by_chapter(&self, href: &str) -> Vec<Annotation> {
        let mut list: Vec<Annotation> = lock(&self.cache)
            .as_ref()
            .map(|all| {
                all.iter()
                    .filter(|a| a.chapter_href == href)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        list.sort_by(|a, b| compare_block_ids(&a.anchor_block_id, &b.anchor_block_id).then(a.start.cmp(&b.start)));
        list
    }

    pub fn all(&self) -> Vec<Annotation> {
        lock(&self.cache).clone().unwrap_or_default()
    }
}
