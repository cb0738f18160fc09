use std::sync::Arc;

use parking_lot::Mutex;
use sonance_assets::AssetEntry;

use crate::error::AudioError;
use crate::voice::{AudioBackend, BackendFactory, Decoder, Voice, VoiceSettings};

/// Observable state of one headless voice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeState {
    pub url: Option<String>,
    pub gain: f32,
    pub pan: f32,
    pub playing: bool,
    pub finished: bool,
    pub looping: bool,
    pub playback_rate: f32,
    /// Number of times playback was started or resumed.
    pub plays: u32,
    /// Number of rewinds to the start.
    pub rewinds: u32,
}

/// Shared view of a headless voice, for inspection from outside the engine.
#[derive(Debug, Clone, Default)]
pub struct VoiceProbe {
    inner: Arc<Mutex<ProbeState>>,
}

impl VoiceProbe {
    pub fn state(&self) -> ProbeState {
        self.inner.lock().clone()
    }

    pub fn url(&self) -> Option<String> {
        self.inner.lock().url.clone()
    }

    pub fn gain(&self) -> f32 {
        self.inner.lock().gain
    }

    pub fn is_playing(&self) -> bool {
        self.inner.lock().playing
    }

    /// Simulate the bound sound reaching its end.
    pub fn finish(&self) {
        let mut state = self.inner.lock();
        if state.url.is_some() && !state.looping {
            state.playing = false;
            state.finished = true;
        }
    }
}

/// Every voice created by the backends of one factory, in creation order.
#[derive(Debug, Clone, Default)]
pub struct HeadlessProbes {
    voices: Arc<Mutex<Vec<VoiceProbe>>>,
    backends: Arc<Mutex<usize>>,
    decoded: Arc<Mutex<Vec<String>>>,
}

impl HeadlessProbes {
    pub fn all(&self) -> Vec<VoiceProbe> {
        self.voices.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.voices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.lock().is_empty()
    }

    /// Voices currently bound to `url`.
    pub fn bound_to(&self, url: &str) -> Vec<VoiceProbe> {
        self.voices
            .lock()
            .iter()
            .filter(|p| p.url().as_deref() == Some(url))
            .cloned()
            .collect()
    }

    /// Number of backends (audio contexts) created so far.
    pub fn backends_created(&self) -> usize {
        *self.backends.lock()
    }

    /// URLs prepared by the decoder since the last clear.
    pub fn decoded(&self) -> Vec<String> {
        self.decoded.lock().clone()
    }
}

/// Output without a device. Voices only record what they were told, which
/// suits servers, CI and tests.
pub struct HeadlessBackend {
    probes: HeadlessProbes,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::with_probes(HeadlessProbes::default())
    }

    pub fn with_probes(probes: HeadlessProbes) -> Self {
        *probes.backends.lock() += 1;
        Self { probes }
    }

    pub fn probes(&self) -> HeadlessProbes {
        self.probes.clone()
    }

    /// A factory whose backends all report into `probes`.
    pub fn factory(probes: HeadlessProbes) -> BackendFactory {
        Arc::new(move || {
            Ok(Box::new(HeadlessBackend::with_probes(probes.clone())) as Box<dyn AudioBackend>)
        })
    }
}

/// Accepts any non-empty asset and notes its URL.
pub struct HeadlessDecoder {
    probes: HeadlessProbes,
}

impl HeadlessDecoder {
    pub fn new(probes: HeadlessProbes) -> Self {
        Self { probes }
    }
}

impl Decoder for HeadlessDecoder {
    fn prepare(&self, asset: &AssetEntry) -> Result<(), AudioError> {
        if asset.is_empty() {
            return Err(AudioError::Decode(asset.url().to_string(), "no audio data".into()));
        }
        let mut decoded = self.probes.decoded.lock();
        if !decoded.iter().any(|url| url == asset.url()) {
            decoded.push(asset.url().to_string());
        }
        Ok(())
    }

    fn clear(&self) {
        self.probes.decoded.lock().clear();
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for HeadlessBackend {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn create_voice(&mut self) -> Result<Box<dyn Voice>, AudioError> {
        let probe = VoiceProbe::default();
        self.probes.voices.lock().push(probe.clone());
        Ok(Box::new(HeadlessVoice { probe }))
    }
}

struct HeadlessVoice {
    probe: VoiceProbe,
}

impl Voice for HeadlessVoice {
    fn bind(&mut self, asset: &Arc<AssetEntry>, settings: VoiceSettings) -> Result<(), AudioError> {
        let mut state = self.probe.inner.lock();
        *state = ProbeState {
            url: Some(asset.url().to_string()),
            looping: settings.looping,
            playback_rate: settings.playback_rate,
            ..ProbeState::default()
        };
        Ok(())
    }

    fn unbind(&mut self) {
        let mut state = self.probe.inner.lock();
        state.url = None;
        state.playing = false;
        state.finished = false;
    }

    fn set_gain(&mut self, gain: f32) {
        self.probe.inner.lock().gain = gain;
    }

    fn set_pan(&mut self, pan: f32) {
        self.probe.inner.lock().pan = pan;
    }

    fn play(&mut self) -> Result<(), AudioError> {
        let mut state = self.probe.inner.lock();
        if state.url.is_none() {
            return Err(AudioError::PlaybackFailed("voice has no sound bound".into()));
        }
        state.playing = true;
        state.plays += 1;
        Ok(())
    }

    fn pause(&mut self) {
        self.probe.inner.lock().playing = false;
    }

    fn seek_to_start(&mut self) {
        let mut state = self.probe.inner.lock();
        state.rewinds += 1;
        state.finished = false;
    }

    fn is_finished(&self) -> bool {
        self.probe.inner.lock().finished
    }
}
