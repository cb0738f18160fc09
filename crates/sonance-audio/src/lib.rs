//! Sonance Audio - Sound registry, voice pooling, mixing and playback
//!
//! [`AudioEngine`] is the entry point: register sounds, play them on the
//! `music` or `sfx` channel, and subscribe to lifecycle events. Output goes
//! through kira, or through a headless backend for servers and tests.

pub mod backend;
mod channel;
mod config;
mod engine;
mod error;
mod events;
mod fade;
mod options;
mod playback;
mod pool;
mod registry;
mod spatial;
mod voice;

pub use channel::{clamp_volume, Channel, ChannelState};
pub use config::{EngineConfig, EvictionPolicy};
pub use engine::{AudioEngine, PreloadSummary, Visibility};
pub use error::AudioError;
pub use events::{AudioEvent, EventBus, EventKind, Handler, ListenerId};
pub use options::{PlaybackOptions, MUSIC_PRIORITY, SFX_PRIORITY};
pub use registry::{SoundDescriptor, SoundSpec, SoundState};
pub use spatial::{attenuation, compute_spatial, Listener, SpatialParams};
pub use voice::{AudioBackend, BackendFactory, Decoder, Voice, VoiceSettings};
