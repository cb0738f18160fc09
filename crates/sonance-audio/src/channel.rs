use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;

/// A named mixing bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Music,
    Sfx,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Music, Channel::Sfx];

    pub fn for_sound(is_music: bool) -> Self {
        if is_music {
            Channel::Music
        } else {
            Channel::Sfx
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Channel::Music => "music",
            Channel::Sfx => "sfx",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Clamp a volume into `[0, 1]`; NaN becomes silence.
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

/// Volume and mute state of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelState {
    pub volume: f32,
    pub muted: bool,
}

/// Stored state of both channels. Applying changes to live voices is the
/// playback controller's job.
#[derive(Debug, Clone)]
pub struct Mixer {
    music: ChannelState,
    sfx: ChannelState,
}

impl Mixer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            music: ChannelState {
                volume: config.initial_volume(Channel::Music),
                muted: false,
            },
            sfx: ChannelState {
                volume: config.initial_volume(Channel::Sfx),
                muted: false,
            },
        }
    }

    pub fn get(&self, channel: Channel) -> ChannelState {
        match channel {
            Channel::Music => self.music,
            Channel::Sfx => self.sfx,
        }
    }

    fn get_mut(&mut self, channel: Channel) -> &mut ChannelState {
        match channel {
            Channel::Music => &mut self.music,
            Channel::Sfx => &mut self.sfx,
        }
    }

    pub fn volume(&self, channel: Channel) -> f32 {
        self.get(channel).volume
    }

    pub fn is_muted(&self, channel: Channel) -> bool {
        self.get(channel).muted
    }

    /// Store a clamped volume and return it.
    pub fn set_volume(&mut self, channel: Channel, volume: f32) -> f32 {
        let volume = clamp_volume(volume);
        self.get_mut(channel).volume = volume;
        volume
    }

    /// Store the mute flag. Returns `false` when it was already in that state.
    pub fn set_muted(&mut self, channel: Channel, muted: bool) -> bool {
        let state = self.get_mut(channel);
        if state.muted == muted {
            return false;
        }
        state.muted = muted;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_is_always_clamped() {
        let mut mixer = Mixer::new(&EngineConfig::default());
        let cases = [(-1.0, 0.0), (0.25, 0.25), (1.0, 1.0), (42.0, 1.0), (f32::NAN, 0.0)];
        for (input, expected) in cases {
            assert_eq!(mixer.set_volume(Channel::Music, input), expected);
            assert_eq!(mixer.volume(Channel::Music), expected);
        }
        assert_eq!(mixer.volume(Channel::Sfx), 1.0);
    }

    #[test]
    fn mute_reports_changes_only() {
        let mut mixer = Mixer::new(&EngineConfig::default());
        assert!(mixer.set_muted(Channel::Sfx, true));
        assert!(!mixer.set_muted(Channel::Sfx, true));
        assert!(mixer.is_muted(Channel::Sfx));
        assert!(!mixer.is_muted(Channel::Music));
        assert!(mixer.set_muted(Channel::Sfx, false));
    }

    #[test]
    fn channel_names() {
        assert_eq!(Channel::for_sound(true), Channel::Music);
        assert_eq!(Channel::Sfx.to_string(), "sfx");
    }
}
