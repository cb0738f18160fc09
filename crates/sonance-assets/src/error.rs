use std::path::PathBuf;

/// Errors that can occur while fetching audio assets.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("failed to fetch '{0}': {1}")]
    Fetch(String, String),

    #[error("no playable codec for '{0}'")]
    UnsupportedFormat(String),

    #[error("I/O error reading '{}': {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),
}
