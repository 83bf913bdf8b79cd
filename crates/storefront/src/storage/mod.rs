//! Object storage for product files.
//!
//! Product PDFs live in a private bucket. The storefront never exposes bucket
//! paths directly: it either hands out a short-lived signed URL or proxies the
//! bytes through [`ObjectStorage::fetch`].

pub mod supabase;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use thiserror::Error;

pub use supabase::SupabaseStorage;

/// A byte stream used for proxying file contents.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Errors from the storage collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Transport failure talking to the storage service.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("storage API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// No object at the given path.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The path is not a plain relative object key.
    #[error("invalid object path: {0}")]
    InvalidPath(String),

    /// The service answered with something we could not parse.
    #[error("parse error: {0}")]
    Parse(String),
}

/// A time-limited link to a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrl {
    pub url: String,
    pub expires_in: Duration,
}

/// An object being streamed out of storage.
pub struct StoredObject {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl std::fmt::Debug for StoredObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredObject")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Read access to the product file bucket.
#[async_trait]
pub trait ObjectStorage: Send + Sync + std::fmt::Debug + 'static {
    /// Issue a signed URL for `path`, valid for `ttl`.
    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<SignedUrl, StorageError>;

    /// Open `path` for streaming.
    async fn fetch(&self, path: &str) -> Result<StoredObject, StorageError>;
}

/// Reject anything but a plain relative object key.
///
/// # Errors
///
/// Returns [`StorageError::InvalidPath`] for empty paths, absolute paths,
/// backslashes and `..` segments.
pub fn validate_path(path: &str) -> Result<&str, StorageError> {
    let invalid = path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path.contains('\0')
        || path.split('/').any(|segment| segment == ".." || segment == ".");

    if invalid {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(path)
}
