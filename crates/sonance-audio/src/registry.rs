use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sonance_assets::{AssetCache, AssetEntry};
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::AudioError;
use crate::options::PlaybackOptions;

/// A sound to register: a logical id, its primary URL, and fallbacks.
///
/// Each alternate is either a full URL or a bare extension such as `"ogg"`,
/// which swaps the primary URL's extension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoundSpec {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub is_music: bool,
    #[serde(default)]
    pub alternate_urls: Vec<String>,
    #[serde(default)]
    pub options: PlaybackOptions,
}

impl SoundSpec {
    pub fn music(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(id, url, true)
    }

    pub fn effect(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(id, url, false)
    }

    fn new(id: impl Into<String>, url: impl Into<String>, is_music: bool) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            is_music,
            alternate_urls: Vec::new(),
            options: PlaybackOptions::default(),
        }
    }

    pub fn with_alternates<I, S>(mut self, alternates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.alternate_urls = alternates.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_options(mut self, options: PlaybackOptions) -> Self {
        self.options = options;
        self
    }

    /// The primary URL followed by every alternate, in order.
    pub fn candidate_urls(&self) -> Vec<String> {
        std::iter::once(self.url.clone())
            .chain(self.alternate_urls.iter().map(|alt| self.expand_alternate(alt)))
            .collect()
    }

    fn expand_alternate(&self, alternate: &str) -> String {
        if alternate.contains('/') || alternate.contains('.') {
            return alternate.to_string();
        }
        let stem_end = self
            .url
            .rfind('.')
            .filter(|&dot| !self.url[dot..].contains('/'))
            .unwrap_or(self.url.len());
        format!("{}.{}", &self.url[..stem_end], alternate)
    }
}

/// Logical playback state of a sound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SoundState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// A registered sound: its loaded asset, classification, default options
/// and playback bookkeeping.
#[derive(Debug)]
pub struct SoundDescriptor {
    id: String,
    asset: Arc<AssetEntry>,
    is_music: bool,
    defaults: PlaybackOptions,
    state: SoundState,
    start_time: Option<Duration>,
    end_time: Option<Duration>,
}

impl SoundDescriptor {
    pub fn new(
        id: impl Into<String>,
        asset: Arc<AssetEntry>,
        is_music: bool,
        defaults: PlaybackOptions,
    ) -> Self {
        Self {
            id: id.into(),
            asset,
            is_music,
            defaults,
            state: SoundState::Stopped,
            start_time: None,
            end_time: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn asset(&self) -> &Arc<AssetEntry> {
        &self.asset
    }

    pub fn is_music(&self) -> bool {
        self.is_music
    }

    pub fn defaults(&self) -> &PlaybackOptions {
        &self.defaults
    }

    pub fn state(&self) -> SoundState {
        self.state
    }

    /// Engine clock time of the last transition into `Playing` from `Stopped`.
    pub fn start_time(&self) -> Option<Duration> {
        self.start_time
    }

    /// Engine clock time of the last transition into `Stopped`.
    pub fn end_time(&self) -> Option<Duration> {
        self.end_time
    }

    pub(crate) fn set_state(&mut self, state: SoundState, now: Duration) {
        match (self.state, state) {
            (SoundState::Stopped, SoundState::Playing) => {
                self.start_time = Some(now);
                self.end_time = None;
            }
            (SoundState::Playing | SoundState::Paused, SoundState::Stopped) => {
                self.end_time = Some(now);
            }
            _ => {}
        }
        self.state = state;
    }
}

/// Maps sound ids to their descriptors.
#[derive(Debug, Default)]
pub struct SoundRegistry {
    sounds: HashMap<String, SoundDescriptor>,
}

impl SoundRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a descriptor. An id that is already registered keeps its
    /// existing descriptor and `false` is returned.
    pub fn insert(&mut self, descriptor: SoundDescriptor) -> bool {
        if self.sounds.contains_key(descriptor.id()) {
            return false;
        }
        self.sounds.insert(descriptor.id.clone(), descriptor);
        true
    }

    pub fn get(&self, id: &str) -> Option<&SoundDescriptor> {
        self.sounds.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut SoundDescriptor> {
        self.sounds.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sounds.contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sounds.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sounds.is_empty()
    }

    pub fn clear(&mut self) {
        self.sounds.clear();
    }
}

/// Load the first candidate URL of `spec` that exists, fetches, and has a
/// codec the output can play. The last failure is returned if none does.
pub(crate) async fn resolve_asset(
    cache: &AssetCache,
    spec: &SoundSpec,
    config: &EngineConfig,
) -> Result<Arc<AssetEntry>, AudioError> {
    let mut last_error = None;

    for url in spec.candidate_urls() {
        match cache.load(&url).await {
            Ok(asset) if config.supports(asset.codec()) => return Ok(asset),
            Ok(asset) => {
                debug!("'{}': {} is {}, not playable here", spec.id, url, asset.mime());
                last_error = Some(AudioError::UnsupportedFormat(url));
            }
            Err(e) => {
                debug!("'{}': could not load {}: {}", spec.id, url, e);
                last_error = Some(e.into());
            }
        }
    }

    Err(last_error.unwrap_or_else(|| AudioError::NotFound(spec.url.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonance_assets::{Codec, MemorySource};

    fn asset(url: &str) -> Arc<AssetEntry> {
        Arc::new(AssetEntry::new(url, Codec::Mp3, vec![0u8; 4]))
    }

    #[test]
    fn alternates_expand_bare_extensions() {
        let spec = SoundSpec::music("theme", "/audio/theme.mp3")
            .with_alternates(["ogg", "/fallback/theme.wav"]);
        assert_eq!(
            spec.candidate_urls(),
            vec!["/audio/theme.mp3", "/audio/theme.ogg", "/fallback/theme.wav"]
        );
    }

    #[test]
    fn alternate_on_extensionless_url_appends() {
        let spec = SoundSpec::effect("beep", "/v1.2/beep").with_alternates(["wav"]);
        assert_eq!(spec.candidate_urls()[1], "/v1.2/beep.wav");
    }

    #[test]
    fn insert_is_idempotent() {
        let mut registry = SoundRegistry::new();
        let defaults = PlaybackOptions::default();
        let first = SoundDescriptor::new("a", asset("a.mp3"), false, defaults.clone());
        let second = SoundDescriptor::new("a", asset("other.mp3"), true, defaults);
        assert!(registry.insert(first));
        assert!(!registry.insert(second));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("a").unwrap().asset().url(), "a.mp3");
        assert!(!registry.get("a").unwrap().is_music());
    }

    #[test]
    fn state_transitions_stamp_times() {
        let defaults = PlaybackOptions::default();
        let mut sound = SoundDescriptor::new("a", asset("a.mp3"), false, defaults);
        sound.set_state(SoundState::Playing, Duration::from_secs(1));
        assert_eq!(sound.start_time(), Some(Duration::from_secs(1)));
        sound.set_state(SoundState::Paused, Duration::from_secs(2));
        sound.set_state(SoundState::Playing, Duration::from_secs(3));
        assert_eq!(sound.start_time(), Some(Duration::from_secs(1)));
        sound.set_state(SoundState::Stopped, Duration::from_secs(4));
        assert_eq!(sound.end_time(), Some(Duration::from_secs(4)));
    }

    #[tokio::test]
    async fn resolve_falls_back_to_alternates() {
        let source = MemorySource::new().with("/audio/theme.ogg", b"OggS....".to_vec());
        let cache = AssetCache::new(Arc::new(source));
        let spec = SoundSpec::music("theme", "/audio/theme.mp3").with_alternates(["ogg"]);

        let asset = resolve_asset(&cache, &spec, &EngineConfig::default()).await.unwrap();
        assert_eq!(asset.url(), "/audio/theme.ogg");
    }

    #[tokio::test]
    async fn resolve_skips_unsupported_codecs() {
        let source = MemorySource::new()
            .with("/a.webm", vec![0x1A, 0x45, 0xDF, 0xA3])
            .with("/a.wav", b"RIFF....WAVE".to_vec());
        let cache = AssetCache::new(Arc::new(source));
        let spec = SoundSpec::effect("a", "/a.webm").with_alternates(["wav"]);

        let asset = resolve_asset(&cache, &spec, &EngineConfig::default()).await.unwrap();
        assert_eq!(asset.codec(), Codec::Wav);
    }

    #[tokio::test]
    async fn resolve_reports_last_failure() {
        let cache = AssetCache::new(Arc::new(MemorySource::new()));
        let spec = SoundSpec::effect("a", "/missing.mp3");
        let err = resolve_asset(&cache, &spec, &EngineConfig::default()).await.unwrap_err();
        assert!(matches!(err, AudioError::NotFound(ref url) if url == "/missing.mp3"));
    }
}
