use thiserror::Error;

/// Errors that can occur while resolving host platform services.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("path error: {0}")]
    Path(String),

    #[error("unsupported operation on {os}: {detail}")]
    Unsupported { os: String, detail: String },
}
