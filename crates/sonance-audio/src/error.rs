use sonance_assets::AssetError;

/// Errors that can occur in the audio system.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("failed to fetch '{0}': {1}")]
    Fetch(String, String),

    #[error("no playable codec for '{0}'")]
    UnsupportedFormat(String),

    #[error("failed to decode '{0}': {1}")]
    Decode(String, String),

    #[error("failed to initialize audio backend: {0}")]
    InitFailed(String),

    #[error("audio engine was disposed")]
    AlreadyDisposed,

    #[error("audio playback failed: {0}")]
    PlaybackFailed(String),

    #[error("all {0} voices are busy")]
    PoolExhausted(usize),

    #[error("audio is locked until the first user interaction")]
    Locked,
}

impl From<AssetError> for AudioError {
    fn from(err: AssetError) -> Self {
        match err {
            AssetError::NotFound(url) => AudioError::NotFound(url),
            AssetError::Fetch(url, reason) => AudioError::Fetch(url, reason),
            AssetError::UnsupportedFormat(url) => AudioError::UnsupportedFormat(url),
            AssetError::Io(path, source) => {
                AudioError::Fetch(path.display().to_string(), source.to_string())
            }
        }
    }
}
