//! Sound manifests
//!
//! A manifest lists the sounds to register and where to fetch them from:
//!
//! ```toml
//! base = "assets"          # directory, or an http(s) URL
//!
//! [[sounds]]
//! id = "theme"
//! url = "music/theme.ogg"
//! is_music = true
//! alternate_urls = ["mp3"]
//! ```
//!
//! The same shape is accepted as JSON when the file ends in `.json`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sonance_assets::{AssetSource, FileSource, HttpSource};
use sonance_audio::SoundSpec;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    /// Asset root, relative to the manifest's directory unless it is a URL
    pub base: Option<String>,
    pub sounds: Vec<SoundSpec>,
    #[serde(skip)]
    dir: PathBuf,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {:?}", path))?;
        let mut manifest = Self::parse(&content, path)?;
        manifest.dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(manifest)
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_str(content)
                .with_context(|| format!("Invalid JSON manifest {:?}", path))
        } else {
            toml::from_str(content).with_context(|| format!("Invalid TOML manifest {:?}", path))
        }
    }

    /// Where the engine should fetch this manifest's assets from.
    pub fn source(&self) -> Result<Arc<dyn AssetSource>> {
        match self.base.as_deref() {
            Some(base) if base.starts_with("http://") || base.starts_with("https://") => {
                let source = HttpSource::new(Some(base.to_string()))
                    .context("Failed to create HTTP client")?;
                Ok(Arc::new(source))
            }
            Some(base) => Ok(Arc::new(FileSource::new(self.dir.join(base)))),
            None => Ok(Arc::new(FileSource::new(self.dir.clone()))),
        }
    }

    /// The first music sound, played when no ids are given.
    pub fn first_music(&self) -> Option<&str> {
        self.sounds.iter().find(|s| s.is_music).map(|s| s.id.as_str())
    }
}
