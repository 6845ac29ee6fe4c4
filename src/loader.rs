//! Where chapter markup comes from.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;

use crate::error::LoadError;

/// Raw response for one chapter document.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub text: String,
    pub status: u16,
}

impl Fetched {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            status: 200,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Origin-agnostic chapter fetch. `href` never carries a fragment.
pub trait ContentLoader: Send + Sync {
    fn fetch_content(&self, href: &str) -> Result<Fetched, LoadError>;

    /// Fetch that turns a non-2xx status into an error.
    fn load_text(&self, href: &str) -> Result<String, LoadError> {
        let fetched = self.fetch_content(href)?;
        if fetched.is_success() {
            Ok(fetched.text)
        } else if fetched.status == 404 {
            Err(LoadError::NotFound(href.to_string()))
        } else {
            Err(LoadError::Status {
                href: href.to_string(),
                status: fetched.status,
            })
        }
    }
}

/// Splits `chapter.xhtml#note-3` into the document and the fragment.
pub fn split_fragment(href: &str) -> (&str, Option<&str>) {
    match href.split_once('#') {
        Some((path, fragment)) if !fragment.is_empty() => (path, Some(fragment)),
        Some((path, _)) => (path, None),
        None => (href, None),
    }
}

/// Chapters stored as files under one directory (an unpacked book).
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves `href` below the root; hrefs escaping it resolve to nothing.
    fn resolve(&self, href: &str) -> Option<PathBuf> {
        let relative = Path::new(href.trim_start_matches('/'));
        let mut path = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(path)
    }
}

impl ContentLoader for DirectoryLoader {
    fn fetch_content(&self, href: &str) -> Result<Fetched, LoadError> {
        let Some(path) = self.resolve(href) else {
            return Ok(Fetched {
                text: String::new(),
                status: 404,
            });
        };
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Fetched::ok(text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Fetched {
                text: String::new(),
                status: 404,
            }),
            Err(err) => Err(err.into()),
        }
    }
}

/// Chapters served over HTTP relative to a base URL.
pub struct HttpLoader {
    client: Client,
    base_url: reqwest::Url,
}

impl HttpLoader {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, LoadError> {
        let mut builder = Client::builder().timeout(timeout).user_agent("folio");
        if base_url.starts_with("http://127.0.0.1") || base_url.starts_with("http://localhost") {
            builder = builder.no_proxy();
        }
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url =
            reqwest::Url::parse(&normalized).map_err(|_| LoadError::NotFound(base_url.to_string()))?;
        Ok(Self {
            client: builder.build()?,
            base_url,
        })
    }

    pub fn url_for(&self, href: &str) -> Result<reqwest::Url, LoadError> {
        self.base_url
            .join(href.trim_start_matches('/'))
            .map_err(|_| LoadError::NotFound(href.to_string()))
    }
}

impl ContentLoader for HttpLoader {
    fn fetch_content(&self, href: &str) -> Result<Fetched, LoadError> {
        let response = self.client.get(self.url_for(href)?).send()?;
        let status = response.status().as_u16();
        let text = response.text()?;
        Ok(Fetched { text, status })
    }
}

/// Tries a local source first and the network second.
pub struct FallbackLoader {
    primary: Box<dyn ContentLoader>,
    secondary: Box<dyn ContentLoader>,
}

impl FallbackLoader {
    pub fn new(primary: Box<dyn ContentLoader>, secondary: Box<dyn ContentLoader>) -> Self {
        Self { primary, secondary }
    }
}

impl ContentLoader for FallbackLoader {
    fn fetch_content(&self, href: &str) -> Result<Fetched, LoadError> {
        match self.primary.fetch_content(href) {
            Ok(fetched) if fetched.is_success() => return Ok(fetched),
            Ok(fetched) => tracing::debug!(href, status = fetched.status, "primary source missed, trying fallback"),
            Err(err) => tracing::debug!(href, error = %err, "primary source failed, trying fallback"),
        }
        self.secondary.fetch_content(href)
    }
}
