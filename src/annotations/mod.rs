//! Annotation persistence: the remote service and the per-book cache.

pub mod api;
pub mod store;

pub use api::{AnnotationApi, HttpAnnotationApi};
pub use store::{AnnotationStore, compare_block_ids};
