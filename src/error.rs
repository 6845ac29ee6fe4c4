//! Error types for the anchoring and persistence subsystems.
//!
//! None of these are fatal to reading. Callers surface the user-facing ones
//! (`AnchorError`, `AnnotationError`) as a transient notice and silently
//! degrade on the rest.

use thiserror::Error;

/// A selection could not be turned into an anchor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnchorError {
    /// Start and end fall in different reading blocks.
    #[error("selection spans more than one paragraph")]
    MultiBlock { text: String },
}

/// A stored anchor no longer fits the freshly rendered content.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriftError {
    #[error("block {0} is not present in the current render")]
    MissingBlock(String),

    #[error("block {block_id} holds {available} chars, anchor needs {required}")]
    TooShort {
        block_id: String,
        available: usize,
        required: usize,
    },

    #[error("empty or inverted range {start}..{end}")]
    EmptyRange { start: usize, end: usize },
}

/// Annotation CRUD failures.
#[derive(Error, Debug)]
pub enum AnnotationError {
    #[error("selection is not a valid single-paragraph range")]
    InvalidAnchor,

    #[error("overlaps existing annotation {existing}")]
    Overlap { existing: String },

    #[error("annotation {0} not found")]
    NotFound(String),

    #[error("annotation service error: {0}")]
    Network(#[from] ApiError),
}

/// Remote annotation API failures. Never retried automatically.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server responded with status {0}")]
    Status(u16),

    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Durable key-value storage failures.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Chapter content could not be fetched.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("content not found: {0}")]
    NotFound(String),

    #[error("content request for {href} returned status {status}")]
    Status { href: String, status: u16 },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("href {0} is not in the spine")]
    UnknownChapter(String),
}
