use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("not found")]
    NotFound,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("store api error: {0}")]
    Market(#[from] crate::market::MarketError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("blob storage error: {0}")]
    Blob(#[from] crate::blob::BlobError),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("signing error: {0}")]
    Signer(String),

    #[error("package metadata error: {0}")]
    Metadata(String),

    #[error("download exceeds {limit} bytes")]
    DownloadTooLarge { limit: usize },

    #[error("notification error: {0}")]
    Notify(String),
}

pub type Result<T> = std::result::Result<T, Error>;
