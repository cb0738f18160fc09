use serde::{Deserialize, Serialize};
use sonance_assets::Codec;

use crate::channel::{clamp_volume, Channel};

/// What the voice pool does when every voice is busy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionPolicy {
    /// Refuse the new sound; the busy voices keep playing.
    Reject,
    /// Cut off the voice that was acquired first, whatever it is playing.
    #[default]
    StealOldest,
    /// Cut off the lowest-priority voice (oldest among equals), unless it
    /// outranks the new sound.
    StealLowestPriority,
}

/// Engine configuration. Channel volumes here are the initial values; the
/// caller owns persistence of later changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of pooled voices.
    pub pool_capacity: usize,
    pub eviction: EvictionPolicy,
    /// Initial music channel volume (0.0–1.0).
    pub music_volume: f32,
    /// Initial sound effects channel volume (0.0–1.0).
    pub sfx_volume: f32,
    /// Hold playback until `AudioEngine::init` is called from an input handler.
    pub require_user_gesture: bool,
    /// Whether music loops unless a sound or call says otherwise.
    pub default_music_loop: bool,
    /// Codecs the output backend can decode. Assets in other formats fall
    /// through to the next alternate URL.
    pub supported_codecs: Vec<Codec>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_capacity: 20,
            eviction: EvictionPolicy::StealOldest,
            music_volume: 0.8,
            sfx_volume: 1.0,
            require_user_gesture: true,
            default_music_loop: true,
            supported_codecs: vec![Codec::Mp3, Codec::Ogg, Codec::Wav, Codec::Flac],
        }
    }
}

impl EngineConfig {
    /// Initial volume for a channel, clamped.
    pub fn initial_volume(&self, channel: Channel) -> f32 {
        match channel {
            Channel::Music => clamp_volume(self.music_volume),
            Channel::Sfx => clamp_volume(self.sfx_volume),
        }
    }

    /// Pool capacity, never zero.
    pub fn capacity(&self) -> usize {
        self.pool_capacity.max(1)
    }

    pub fn supports(&self, codec: Codec) -> bool {
        self.supported_codecs.contains(&codec)
    }
}
