use std::sync::Arc;

use sonance_assets::AssetEntry;

use crate::error::AudioError;

/// Per-bind settings that the output fixes when playback starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceSettings {
    pub looping: bool,
    pub playback_rate: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            looping: false,
            playback_rate: 1.0,
        }
    }
}

/// A reusable playback handle supplied by the platform output.
///
/// A voice is bound to one asset at a time. `play` starts a freshly bound
/// voice and resumes a paused one from where it stopped.
pub trait Voice: Send {
    fn bind(&mut self, asset: &Arc<AssetEntry>, settings: VoiceSettings) -> Result<(), AudioError>;

    /// Stop output and forget the bound asset.
    fn unbind(&mut self);

    /// Linear gain, 0.0–1.0.
    fn set_gain(&mut self, gain: f32);

    /// Stereo pan, -1.0–1.0.
    fn set_pan(&mut self, pan: f32);

    fn play(&mut self) -> Result<(), AudioError>;

    fn pause(&mut self);

    fn seek_to_start(&mut self);

    /// Whether a non-looping sound has played to its end.
    fn is_finished(&self) -> bool;
}

/// The platform audio context. Dropping it tears the context down.
pub trait AudioBackend: Send {
    fn name(&self) -> &'static str;

    fn create_voice(&mut self) -> Result<Box<dyn Voice>, AudioError>;
}

/// Turns fetched assets into whatever the output needs to start playing.
///
/// `prepare` runs on a blocking thread while a sound loads, so `Voice::bind`
/// only has to look the result up.
pub trait Decoder: Send + Sync {
    fn prepare(&self, asset: &AssetEntry) -> Result<(), AudioError>;

    /// Forget everything prepared so far.
    fn clear(&self);
}

/// Creates a fresh backend; called on first use and again after dispose.
pub type BackendFactory = Arc<dyn Fn() -> Result<Box<dyn AudioBackend>, AudioError> + Send + Sync>;
