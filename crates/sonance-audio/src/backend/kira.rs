use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use ::kira::manager::backend::DefaultBackend;
use ::kira::manager::{AudioManager, AudioManagerSettings};
use ::kira::sound::static_sound::{StaticSoundData, StaticSoundHandle, StaticSoundSettings};
use ::kira::sound::PlaybackState;
use ::kira::tween::Tween;
use parking_lot::Mutex;
use sonance_assets::AssetEntry;
use tracing::{debug, info};

use crate::error::AudioError;
use crate::voice::{AudioBackend, BackendFactory, Decoder, Voice, VoiceSettings};

/// Short ramp for gain/pan updates so per-tick changes do not click.
const SMOOTHING: Duration = Duration::from_millis(10);

type SharedManager = Arc<Mutex<AudioManager<DefaultBackend>>>;

/// Decoded sound data keyed by asset URL, shared by all voices.
type DecodeCache = Arc<Mutex<HashMap<String, StaticSoundData>>>;

/// Audio output through kira's default (cpal) backend.
pub struct KiraBackend {
    manager: SharedManager,
    decoded: DecodeCache,
}

impl KiraBackend {
    fn new(decoded: DecodeCache) -> Result<Self, AudioError> {
        let manager = AudioManager::<DefaultBackend>::new(AudioManagerSettings::default())
            .map_err(|e| AudioError::InitFailed(e.to_string()))?;

        info!("Kira audio backend initialized");

        Ok(Self {
            manager: Arc::new(Mutex::new(manager)),
            decoded,
        })
    }

    /// A backend factory and the decoder that fills its sound data.
    pub fn output() -> (BackendFactory, Arc<dyn Decoder>) {
        let decoder = KiraDecoder::default();
        let decoded = Arc::clone(&decoder.decoded);
        let factory: BackendFactory = Arc::new(move || {
            Ok(Box::new(KiraBackend::new(Arc::clone(&decoded))?) as Box<dyn AudioBackend>)
        });
        (factory, Arc::new(decoder))
    }
}

/// Decodes assets into kira sound data ahead of playback.
#[derive(Default)]
pub struct KiraDecoder {
    decoded: DecodeCache,
}

impl Decoder for KiraDecoder {
    fn prepare(&self, asset: &AssetEntry) -> Result<(), AudioError> {
        if self.decoded.lock().contains_key(asset.url()) {
            return Ok(());
        }
        let data = StaticSoundData::from_cursor(Cursor::new(asset.bytes().to_vec()))
            .map_err(|e| AudioError::Decode(asset.url().to_string(), e.to_string()))?;
        debug!("Decoded {} ({:.2}s)", asset.url(), data.duration().as_secs_f64());
        self.decoded.lock().insert(asset.url().to_string(), data);
        Ok(())
    }

    fn clear(&self) {
        self.decoded.lock().clear();
    }
}

impl AudioBackend for KiraBackend {
    fn name(&self) -> &'static str {
        "kira"
    }

    fn create_voice(&mut self) -> Result<Box<dyn Voice>, AudioError> {
        Ok(Box::new(KiraVoice {
            manager: Arc::clone(&self.manager),
            decoded: Arc::clone(&self.decoded),
            data: None,
            handle: None,
            gain: 1.0,
            pan: 0.0,
            settings: VoiceSettings::default(),
        }))
    }
}

struct KiraVoice {
    manager: SharedManager,
    decoded: DecodeCache,
    data: Option<StaticSoundData>,
    handle: Option<StaticSoundHandle>,
    gain: f32,
    pan: f32,
    settings: VoiceSettings,
}

/// Kira pans from 0.0 (left) through 0.5 (center) to 1.0 (right).
fn kira_panning(pan: f32) -> f64 {
    ((pan.clamp(-1.0, 1.0) + 1.0) / 2.0) as f64
}

fn smooth() -> Tween {
    Tween {
        duration: SMOOTHING,
        ..Default::default()
    }
}

impl Voice for KiraVoice {
    fn bind(&mut self, asset: &Arc<AssetEntry>, settings: VoiceSettings) -> Result<(), AudioError> {
        self.unbind();
        let data = self.decoded.lock().get(asset.url()).cloned().ok_or_else(|| {
            AudioError::PlaybackFailed(format!("'{}' has not been decoded", asset.url()))
        })?;
        self.data = Some(data);
        self.settings = settings;
        Ok(())
    }

    fn unbind(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.stop(Tween::default());
        }
        self.data = None;
    }

    fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
        if let Some(handle) = self.handle.as_mut() {
            handle.set_volume(gain as f64, smooth());
        }
    }

    fn set_pan(&mut self, pan: f32) {
        self.pan = pan;
        if let Some(handle) = self.handle.as_mut() {
            handle.set_panning(kira_panning(pan), smooth());
        }
    }

    fn play(&mut self) -> Result<(), AudioError> {
        if let Some(handle) = self.handle.as_mut() {
            if handle.state() != PlaybackState::Stopped {
                handle.resume(Tween::default());
                return Ok(());
            }
        }

        let data = self
            .data
            .clone()
            .ok_or_else(|| AudioError::PlaybackFailed("voice has no sound bound".into()))?;
        let mut settings = StaticSoundSettings::new()
            .volume(self.gain as f64)
            .panning(kira_panning(self.pan))
            .playback_rate(self.settings.playback_rate as f64);
        if self.settings.looping {
            settings = settings.loop_region(..);
        }

        let handle = self
            .manager
            .lock()
            .play(data.with_settings(settings))
            .map_err(|e| AudioError::PlaybackFailed(e.to_string()))?;
        self.handle = Some(handle);
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            handle.pause(Tween::default());
        }
    }

    fn seek_to_start(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            handle.seek_to(0.0);
        }
    }

    fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|h| h.state() == PlaybackState::Stopped)
    }
}
