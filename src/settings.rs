//! Player settings with persistence
//!
//! Settings are saved to `~/.config/sonance/settings.toml`

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sonance_audio::{clamp_volume, AudioEngine, Channel, EngineConfig};
use tracing::{debug, info, warn};

/// All player settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSettings {
    pub music: ChannelPrefs,
    pub sfx: ChannelPrefs,
    /// Engine tuning; channel volumes here are overridden by the prefs above
    pub engine: EngineConfig,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            music: ChannelPrefs {
                volume: engine.music_volume,
                muted: false,
            },
            sfx: ChannelPrefs {
                volume: engine.sfx_volume,
                muted: false,
            },
            engine,
        }
    }
}

impl PlayerSettings {
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("sonance"))
    }

    fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.toml"))
    }

    /// Load from the user's config directory, falling back to defaults
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => {
                warn!("Could not determine config directory, using default channel settings");
                Self::default()
            }
        }
    }

    /// Load from `path`; a missing or unreadable file yields defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            debug!("No settings at {:?}, using defaults", path);
            return Self::default();
        }

        let parsed = fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|content| toml::from_str::<Self>(&content).map_err(anyhow::Error::from));
        match parsed {
            Ok(settings) => {
                info!("Loaded player settings from {:?}", path);
                settings
            }
            Err(e) => {
                warn!("Ignoring settings at {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Save to the user's config directory
    pub fn save(&self) -> anyhow::Result<()> {
        let Some(path) = Self::settings_path() else {
            anyhow::bail!("Could not determine config directory");
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;
        info!("Saved player settings to {:?}", path);
        Ok(())
    }

    pub fn prefs(&self, channel: Channel) -> &ChannelPrefs {
        match channel {
            Channel::Music => &self.music,
            Channel::Sfx => &self.sfx,
        }
    }

    pub fn prefs_mut(&mut self, channel: Channel) -> &mut ChannelPrefs {
        match channel {
            Channel::Music => &mut self.music,
            Channel::Sfx => &mut self.sfx,
        }
    }

    /// Engine configuration with the saved channel volumes applied.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            music_volume: self.music.volume(),
            sfx_volume: self.sfx.volume(),
            ..self.engine.clone()
        }
    }

    /// Push the saved mute flags into a running engine.
    pub fn apply_mutes(&self, engine: &AudioEngine) {
        for channel in Channel::ALL {
            engine.set_channel_mute(channel, self.prefs(channel).muted);
        }
    }
}

/// Saved state of one mixer channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelPrefs {
    /// Volume (0.0 to 1.0)
    pub volume: f32,
    pub muted: bool,
}

impl Default for ChannelPrefs {
    fn default() -> Self {
        Self {
            volume: 1.0,
            muted: false,
        }
    }
}

impl ChannelPrefs {
    /// Stored volume, clamped in case the file was edited by hand
    pub fn volume(&self) -> f32 {
        clamp_volume(self.volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_toml() {
        let mut settings = PlayerSettings::default();
        settings.music.volume = 0.4;
        settings.sfx.muted = true;

        let text = toml::to_string_pretty(&settings).unwrap();
        let back: PlayerSettings = toml::from_str(&text).unwrap();

        assert_eq!(back.music, settings.music);
        assert_eq!(back.sfx, settings.sfx);
    }

    #[test]
    fn partial_files_fill_in_defaults() {
        let settings: PlayerSettings = toml::from_str("[music]\nvolume = 0.3\n").unwrap();
        assert_eq!(settings.music.volume, 0.3);
        assert!(!settings.music.muted);
        assert_eq!(settings.sfx, ChannelPrefs::default());
        assert_eq!(settings.engine.pool_capacity, 20);
    }

    #[test]
    fn save_then_load_from_disk() {
        let dir = std::env::temp_dir().join(format!("sonance-settings-{}", std::process::id()));
        let path = dir.join("nested").join("settings.toml");
        let mut settings = PlayerSettings::default();
        settings.sfx.volume = 0.6;
        settings.music.muted = true;

        settings.save_to(&path).unwrap();
        let back = PlayerSettings::load_from(&path);
        fs::remove_dir_all(&dir).ok();

        assert_eq!(back.sfx.volume, 0.6);
        assert!(back.music.muted);
    }

    #[test]
    fn unreadable_files_fall_back_to_defaults() {
        let missing = PlayerSettings::load_from(Path::new("/nonexistent/sonance/settings.toml"));
        assert_eq!(missing.music, PlayerSettings::default().music);

        let path = std::env::temp_dir().join(format!("sonance-bad-{}.toml", std::process::id()));
        fs::write(&path, "music = [not toml").unwrap();
        let garbled = PlayerSettings::load_from(&path);
        fs::remove_file(&path).ok();
        assert_eq!(garbled.sfx, ChannelPrefs::default());
    }

    #[test]
    fn engine_config_uses_clamped_prefs() {
        let mut settings = PlayerSettings::default();
        settings.music.volume = 3.0;
        settings.sfx.volume = 0.25;

        let config = settings.engine_config();
        assert_eq!(config.music_volume, 1.0);
        assert_eq!(config.sfx_volume, 0.25);
    }
}
