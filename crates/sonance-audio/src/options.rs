use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channel::Channel;
use crate::spatial;

/// Default voice priority for music when the eviction policy compares
/// priorities.
pub const MUSIC_PRIORITY: u8 = 200;

/// Default voice priority for sound effects.
pub const SFX_PRIORITY: u8 = 100;

/// Per-call playback options. Every field is optional; unset fields fall back
/// to the sound's registered defaults and then to the values documented on
/// each builder method.
///
/// ```
/// use std::time::Duration;
/// use sonance_audio::PlaybackOptions;
///
/// let options = PlaybackOptions::new()
///     .volume(0.5)
///     .fade_in(Duration::from_secs(2));
/// assert_eq!(options.volume, Some(0.5));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackOptions {
    pub volume: Option<f32>,
    pub looping: Option<bool>,
    pub playback_rate: Option<f32>,
    pub pan: Option<f32>,
    pub distance: Option<f32>,
    pub fade_in: Option<Duration>,
    pub fade_out: Option<Duration>,
    pub priority: Option<u8>,
}

impl PlaybackOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-voice volume multiplier on top of the channel volume (default 1.0).
    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Loop until stopped (default: music loops per config, effects do not).
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = Some(looping);
        self
    }

    /// Playback speed factor (default 1.0, limited to 0.1–4.0).
    pub fn playback_rate(mut self, rate: f32) -> Self {
        self.playback_rate = Some(rate);
        self
    }

    /// Stereo position, -1.0 (left) to 1.0 (right). Default centered.
    pub fn pan(mut self, pan: f32) -> Self {
        self.pan = Some(pan);
        self
    }

    /// Distance from the listener, attenuating the volume (default: none).
    pub fn distance(mut self, distance: f32) -> Self {
        self.distance = Some(distance);
        self
    }

    /// Linear gain ramp from silence when playback starts.
    pub fn fade_in(mut self, duration: Duration) -> Self {
        self.fade_in = Some(duration);
        self
    }

    /// Linear gain ramp to silence when stopping. On `play` of a music
    /// sound, applies to the music being replaced.
    pub fn fade_out(mut self, duration: Duration) -> Self {
        self.fade_out = Some(duration);
        self
    }

    /// Voice priority for `EvictionPolicy::StealLowestPriority`.
    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Fields set on `self` win; unset fields are taken from `defaults`.
    pub fn merged_over(&self, defaults: &PlaybackOptions) -> PlaybackOptions {
        PlaybackOptions {
            volume: self.volume.or(defaults.volume),
            looping: self.looping.or(defaults.looping),
            playback_rate: self.playback_rate.or(defaults.playback_rate),
            pan: self.pan.or(defaults.pan),
            distance: self.distance.or(defaults.distance),
            fade_in: self.fade_in.or(defaults.fade_in),
            fade_out: self.fade_out.or(defaults.fade_out),
            priority: self.priority.or(defaults.priority),
        }
    }

    pub(crate) fn resolve(&self, channel: Channel) -> ResolvedOptions {
        let sanitize = |v: f32, lo: f32, hi: f32, fallback: f32| {
            if v.is_nan() {
                fallback
            } else {
                v.clamp(lo, hi)
            }
        };

        ResolvedOptions {
            volume: sanitize(self.volume.unwrap_or(1.0), 0.0, 1.0, 1.0),
            looping: self.looping.unwrap_or(false),
            playback_rate: sanitize(self.playback_rate.unwrap_or(1.0), 0.1, 4.0, 1.0),
            pan: sanitize(self.pan.unwrap_or(0.0), -1.0, 1.0, 0.0),
            attenuation: self.distance.map_or(1.0, spatial::attenuation),
            fade_in: self.fade_in.unwrap_or(Duration::ZERO),
            fade_out: self.fade_out.unwrap_or(Duration::ZERO),
            priority: self.priority.unwrap_or(match channel {
                Channel::Music => MUSIC_PRIORITY,
                Channel::Sfx => SFX_PRIORITY,
            }),
        }
    }
}

/// Options with every default applied and every value in range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ResolvedOptions {
    pub volume: f32,
    pub looping: bool,
    pub playback_rate: f32,
    pub pan: f32,
    pub attenuation: f32,
    pub fade_in: Duration,
    pub fade_out: Duration,
    pub priority: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_options_override_defaults() {
        let defaults = PlaybackOptions::new().volume(0.3).looping(true);
        let call = PlaybackOptions::new().volume(0.9);
        let merged = call.merged_over(&defaults);
        assert_eq!(merged.volume, Some(0.9));
        assert_eq!(merged.looping, Some(true));
        assert_eq!(merged.fade_in, None);
    }

    #[test]
    fn resolve_applies_defaults() {
        let resolved = PlaybackOptions::new().resolve(Channel::Sfx);
        assert_eq!(resolved.volume, 1.0);
        assert!(!resolved.looping);
        assert_eq!(resolved.playback_rate, 1.0);
        assert_eq!(resolved.pan, 0.0);
        assert_eq!(resolved.attenuation, 1.0);
        assert_eq!(resolved.fade_in, Duration::ZERO);
        assert_eq!(resolved.priority, SFX_PRIORITY);
        assert_eq!(PlaybackOptions::new().resolve(Channel::Music).priority, MUSIC_PRIORITY);
    }

    #[test]
    fn resolve_clamps_out_of_range_values() {
        let resolved = PlaybackOptions::new()
            .volume(3.0)
            .pan(-7.0)
            .playback_rate(f32::NAN)
            .resolve(Channel::Sfx);
        assert_eq!(resolved.volume, 1.0);
        assert_eq!(resolved.pan, -1.0);
        assert_eq!(resolved.playback_rate, 1.0);
    }

    #[test]
    fn distance_attenuates() {
        let near = PlaybackOptions::new().distance(1.0).resolve(Channel::Sfx);
        let far = PlaybackOptions::new().distance(10.0).resolve(Channel::Sfx);
        assert!((near.attenuation - 1.0).abs() < 1e-6);
        assert!(far.attenuation < near.attenuation);
    }
}
