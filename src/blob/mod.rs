mod fs;

pub use fs::FsBlobStore;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("object not found")]
    NotFound,
    #[error("invalid object path: {0}")]
    InvalidPath(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reference to a stored object.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub path: String,
    pub url: String,
    pub size: u64,
}

/// Blob storage sink for artifact binaries. Writes are last-writer-wins per
/// object key; the single-threaded run loop is the only writer.
pub trait BlobStore: Send + Sync {
    fn exists(&self, path: &str) -> Result<bool, BlobError>;

    fn delete(&self, path: &str) -> Result<bool, BlobError>;

    fn write(&self, path: &str, data: &[u8]) -> Result<StoredBlob, BlobError>;

    /// Reads an object back, used to re-fetch already-uploaded base binaries
    /// at bundling time.
    fn read(&self, path: &str) -> Result<Vec<u8>, BlobError>;
}
