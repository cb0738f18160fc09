//! Per-sound playback state machine.
//!
//! ```text
//! Stopped --play--> Playing --pause--> Paused --resume--> Playing
//! Playing --stop / fade-out done / natural end--> Stopped
//! ```
//!
//! Each `play` binds one pooled voice. Music is exclusive: starting a music
//! sound stops the current one first. Voices can additionally be held
//! silent by a channel mute or by the application going to the background;
//! holds never change the logical state above.

use std::sync::Arc;
use std::time::Duration;

use sonance_assets::AssetEntry;
use tracing::{debug, warn};

use crate::channel::{Channel, Mixer};
use crate::config::EngineConfig;
use crate::error::AudioError;
use crate::events::AudioEvent;
use crate::fade::Fade;
use crate::options::PlaybackOptions;
use crate::pool::{VoiceId, VoicePool};
use crate::registry::{SoundRegistry, SoundState};
use crate::voice::{AudioBackend, Voice, VoiceSettings};

/// What the controller works against during one engine call.
pub(crate) struct Frame<'a> {
    pub sounds: &'a mut SoundRegistry,
    pub mixer: &'a Mixer,
    pub now: Duration,
    pub events: &'a mut Vec<AudioEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Run {
    Playing,
    Paused,
}

struct Playback {
    sound: String,
    channel: Channel,
    voice: VoiceId,
    run: Run,
    /// Volume override times distance attenuation.
    level: f32,
    /// Current fade envelope multiplier.
    envelope: f32,
    fade: Option<Fade>,
    looping: bool,
    /// Fading out after `stop`; released when the fade completes.
    stopping: bool,
    held_by_mute: bool,
    held_by_background: bool,
}

impl Playback {
    fn is_running(&self) -> bool {
        self.run == Run::Playing && !self.held_by_mute && !self.held_by_background
    }

    fn gain(&self, mixer: &Mixer) -> f32 {
        mixer.volume(self.channel) * self.level * self.envelope
    }
}

/// Snapshot taken when the application goes to the background.
struct Background {
    music_unmuted: bool,
}

fn start_voice(
    voice: &mut dyn Voice,
    asset: &Arc<AssetEntry>,
    settings: VoiceSettings,
    gain: f32,
    pan: f32,
) -> Result<(), AudioError> {
    voice.bind(asset, settings)?;
    voice.set_gain(gain);
    voice.set_pan(pan);
    voice.play()
}

/// Owns the output backend, the voice pool and every live playback.
pub struct PlaybackController {
    backend: Box<dyn AudioBackend>,
    pool: VoicePool,
    playbacks: Vec<Playback>,
    current_music: Option<String>,
    background: Option<Background>,
}

impl PlaybackController {
    pub fn new(backend: Box<dyn AudioBackend>, config: &EngineConfig) -> Self {
        Self {
            backend,
            pool: VoicePool::new(config.capacity(), config.eviction),
            playbacks: Vec::new(),
            current_music: None,
            background: None,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn current_music(&self) -> Option<&str> {
        self.current_music.as_deref()
    }

    pub fn is_backgrounded(&self) -> bool {
        self.background.is_some()
    }

    pub fn pool(&self) -> &VoicePool {
        &self.pool
    }

    /// Fades in flight for a sound.
    pub fn active_fades(&self, id: &str) -> usize {
        self.playbacks
            .iter()
            .filter(|p| p.sound == id && p.fade.is_some())
            .count()
    }

    pub(crate) fn play(&mut self, cx: &mut Frame<'_>, id: &str, options: &PlaybackOptions) {
        let Some(sound) = cx.sounds.get(id) else {
            warn!("play('{}'): sound is not loaded", id);
            return;
        };
        let channel = Channel::for_sound(sound.is_music());
        if cx.mixer.is_muted(channel) {
            warn!("play('{}'): {} channel is muted", id, channel);
            return;
        }
        if self.background.is_some() {
            warn!("play('{}'): audio is in the background", id);
            return;
        }

        let opts = options.merged_over(sound.defaults()).resolve(channel);
        let asset = Arc::clone(sound.asset());
        let is_music = sound.is_music();

        if is_music {
            if self.current_music.as_deref() == Some(id) && sound.state() == SoundState::Playing {
                debug!("play('{}'): already playing", id);
                return;
            }
            if let Some(previous) = self.current_music.take() {
                self.stop_sound(cx, &previous, opts.fade_out);
            }
        }

        let acquired = match self.pool.acquire(self.backend.as_mut(), id, opts.priority) {
            Ok(acquired) => acquired,
            Err(e) => {
                warn!("play('{}'): {}", id, e);
                return;
            }
        };
        if let Some(evicted) = acquired.evicted.as_deref() {
            self.forget_voice(cx, acquired.id, evicted);
        }

        let playback = Playback {
            sound: id.to_string(),
            channel,
            voice: acquired.id,
            run: Run::Playing,
            level: opts.volume * opts.attenuation,
            envelope: if opts.fade_in.is_zero() { 1.0 } else { 0.0 },
            fade: (!opts.fade_in.is_zero()).then(|| Fade::fade_in(opts.fade_in)),
            looping: opts.looping,
            stopping: false,
            held_by_mute: false,
            held_by_background: false,
        };

        let settings = VoiceSettings {
            looping: opts.looping,
            playback_rate: opts.playback_rate,
        };
        let started = match self.pool.voice_mut(acquired.id) {
            Some(voice) => start_voice(voice, &asset, settings, playback.gain(cx.mixer), opts.pan),
            None => Err(AudioError::PlaybackFailed("acquired voice is not active".into())),
        };
        if let Err(e) = started {
            warn!("play('{}'): {}", id, e);
            self.pool.release(acquired.id);
            return;
        }

        self.playbacks.push(playback);
        if is_music {
            self.current_music = Some(id.to_string());
        }
        if let Some(sound) = cx.sounds.get_mut(id) {
            sound.set_state(SoundState::Playing, cx.now);
        }
        debug!("Playing '{}' on {}", id, channel);
        cx.events.push(AudioEvent::Play { id: id.to_string() });
    }

    pub(crate) fn stop(&mut self, cx: &mut Frame<'_>, id: &str, options: &PlaybackOptions) {
        let Some(sound) = cx.sounds.get(id) else {
            warn!("stop('{}'): sound is not loaded", id);
            return;
        };
        let fade_out = options
            .merged_over(sound.defaults())
            .fade_out
            .unwrap_or(Duration::ZERO);
        self.stop_sound(cx, id, fade_out);
    }

    pub(crate) fn stop_all(&mut self, cx: &mut Frame<'_>, fade_out: Duration) {
        let mut ids: Vec<String> = self.playbacks.iter().map(|p| p.sound.clone()).collect();
        ids.dedup();
        for id in ids {
            self.stop_sound(cx, &id, fade_out);
        }
    }

    /// Fade out running voices of `id`, release the rest now. A voice that is
    /// already fading out keeps its fade unless this stop is immediate.
    fn stop_sound(&mut self, cx: &mut Frame<'_>, id: &str, fade_out: Duration) {
        let mut finished = Vec::new();
        for (index, playback) in self.playbacks.iter_mut().enumerate() {
            if playback.sound != id {
                continue;
            }
            if playback.stopping {
                if fade_out.is_zero() {
                    finished.push(index);
                }
                continue;
            }
            if !fade_out.is_zero() && playback.is_running() {
                playback.fade = Some(Fade::fade_out(playback.envelope, fade_out));
                playback.stopping = true;
            } else {
                finished.push(index);
            }
        }
        self.finalize(finished);

        if self.current_music.as_deref() == Some(id) {
            self.current_music = None;
        }
        if let Some(sound) = cx.sounds.get_mut(id) {
            if sound.state() != SoundState::Stopped {
                sound.set_state(SoundState::Stopped, cx.now);
            }
        }
    }

    pub(crate) fn pause(&mut self, cx: &mut Frame<'_>, id: &str) {
        let Some(sound) = cx.sounds.get(id) else {
            warn!("pause('{}'): sound is not loaded", id);
            return;
        };
        if sound.state() != SoundState::Playing {
            debug!("pause('{}'): not playing", id);
            return;
        }

        for playback in self.playbacks.iter_mut() {
            if playback.sound != id || playback.stopping || playback.run != Run::Playing {
                continue;
            }
            if playback.is_running() {
                if let Some(voice) = self.pool.voice_mut(playback.voice) {
                    voice.pause();
                }
            }
            playback.run = Run::Paused;
            playback.held_by_mute = false;
            playback.held_by_background = false;
        }

        if let Some(sound) = cx.sounds.get_mut(id) {
            sound.set_state(SoundState::Paused, cx.now);
        }
        cx.events.push(AudioEvent::Pause { id: id.to_string() });
    }

    pub(crate) fn resume(&mut self, cx: &mut Frame<'_>, id: &str) {
        let Some(sound) = cx.sounds.get(id) else {
            warn!("resume('{}'): sound is not loaded", id);
            return;
        };
        if sound.state() != SoundState::Paused {
            debug!("resume('{}'): not paused", id);
            return;
        }
        let channel = Channel::for_sound(sound.is_music());
        if cx.mixer.is_muted(channel) {
            warn!("resume('{}'): {} channel is muted", id, channel);
            return;
        }
        if self.background.is_some() {
            warn!("resume('{}'): audio is in the background", id);
            return;
        }

        for playback in self.playbacks.iter_mut() {
            if playback.sound != id || playback.stopping || playback.run != Run::Paused {
                continue;
            }
            playback.run = Run::Playing;
            if let Some(voice) = self.pool.voice_mut(playback.voice) {
                voice.set_gain(playback.gain(cx.mixer));
                if let Err(e) = voice.play() {
                    warn!("resume('{}'): {}", id, e);
                }
            }
        }

        if let Some(sound) = cx.sounds.get_mut(id) {
            sound.set_state(SoundState::Playing, cx.now);
        }
        cx.events.push(AudioEvent::Resume { id: id.to_string() });
    }

    /// Advance fades and collect voices that finished.
    pub(crate) fn update(&mut self, cx: &mut Frame<'_>, dt: Duration) {
        let mut finished = Vec::new();
        let mut natural_ends = Vec::new();

        for (index, playback) in self.playbacks.iter_mut().enumerate() {
            if !playback.is_running() {
                continue;
            }
            let Some(voice) = self.pool.voice_mut(playback.voice) else {
                continue;
            };

            if let Some(fade) = playback.fade.as_mut() {
                playback.envelope = fade.advance(dt);
                if fade.is_complete() {
                    playback.fade = None;
                    if playback.stopping {
                        finished.push(index);
                        continue;
                    }
                }
                voice.set_gain(playback.gain(cx.mixer));
            }

            if voice.is_finished() {
                if !playback.stopping && !playback.looping {
                    natural_ends.push(playback.sound.clone());
                }
                finished.push(index);
            }
        }

        let released = self.finalize(finished);
        for playback in &released {
            self.refresh_state(cx, &playback.sound);
        }
        for id in natural_ends {
            debug!("'{}' reached its end", id);
            cx.events.push(AudioEvent::End { id });
        }
    }

    pub(crate) fn apply_channel_volume(&mut self, mixer: &Mixer, channel: Channel) {
        for playback in &self.playbacks {
            if playback.channel != channel || playback.run != Run::Playing {
                continue;
            }
            if let Some(voice) = self.pool.voice_mut(playback.voice) {
                voice.set_gain(playback.gain(mixer));
            }
        }
    }

    /// Silence every playing voice on `channel` and remember them for unmute.
    pub(crate) fn mute(&mut self, channel: Channel) {
        let mut dropped = Vec::new();
        for (index, playback) in self.playbacks.iter_mut().enumerate() {
            if playback.channel != channel {
                continue;
            }
            if playback.stopping {
                dropped.push(index);
                continue;
            }
            if playback.run == Run::Playing && !playback.held_by_mute {
                if !playback.held_by_background {
                    if let Some(voice) = self.pool.voice_mut(playback.voice) {
                        voice.pause();
                    }
                }
                playback.held_by_mute = true;
            }
        }
        self.finalize(dropped);
    }

    /// Resume exactly the voices that `mute` silenced and that are still live.
    pub(crate) fn unmute(&mut self, mixer: &Mixer, channel: Channel) {
        let backgrounded = self.background.is_some();
        for playback in self.playbacks.iter_mut() {
            if playback.channel != channel || !playback.held_by_mute {
                continue;
            }
            playback.held_by_mute = false;
            if backgrounded {
                playback.held_by_background = true;
                continue;
            }
            if playback.is_running() {
                if let Some(voice) = self.pool.voice_mut(playback.voice) {
                    voice.set_gain(playback.gain(mixer));
                    if let Err(e) = voice.play() {
                        warn!("unmute: could not resume '{}': {}", playback.sound, e);
                    }
                }
            }
        }
    }

    pub(crate) fn enter_background(&mut self, mixer: &Mixer) {
        if self.background.is_some() {
            return;
        }
        self.background = Some(Background {
            music_unmuted: !mixer.is_muted(Channel::Music),
        });

        let mut dropped = Vec::new();
        for (index, playback) in self.playbacks.iter_mut().enumerate() {
            if playback.stopping {
                dropped.push(index);
                continue;
            }
            if playback.run != Run::Playing {
                continue;
            }
            // Mute-held voices are already silent but still carry the hold,
            // so a later unmute cannot revive them.
            if playback.is_running() {
                if let Some(voice) = self.pool.voice_mut(playback.voice) {
                    voice.pause();
                }
            }
            playback.held_by_background = true;
        }
        self.finalize(dropped);
        debug!("Audio suspended for background");
    }

    /// Bring back the current music if its channel was audible when the
    /// application left; every other voice held by the background is dropped.
    pub(crate) fn enter_foreground(&mut self, cx: &mut Frame<'_>) {
        let Some(background) = self.background.take() else {
            return;
        };

        let mut dropped = Vec::new();
        let mut paused_music = None;
        for (index, playback) in self.playbacks.iter_mut().enumerate() {
            if !playback.held_by_background {
                continue;
            }
            playback.held_by_background = false;

            let is_current_music = playback.channel == Channel::Music
                && self.current_music.as_deref() == Some(playback.sound.as_str());
            if !is_current_music {
                dropped.push(index);
                continue;
            }

            if !background.music_unmuted {
                playback.run = Run::Paused;
                paused_music = Some(playback.sound.clone());
            } else if playback.is_running() {
                if let Some(voice) = self.pool.voice_mut(playback.voice) {
                    voice.set_gain(playback.gain(cx.mixer));
                    if let Err(e) = voice.play() {
                        warn!("foreground: could not resume '{}': {}", playback.sound, e);
                    }
                }
            }
        }

        let released = self.finalize(dropped);
        for playback in &released {
            self.refresh_state(cx, &playback.sound);
        }
        if let Some(id) = paused_music {
            if let Some(sound) = cx.sounds.get_mut(&id) {
                sound.set_state(SoundState::Paused, cx.now);
            }
            cx.events.push(AudioEvent::Pause { id });
        }
        debug!("Audio back in the foreground");
    }

    /// Stop and release every voice.
    pub(crate) fn shutdown(&mut self) {
        for playback in self.playbacks.drain(..) {
            if let Some(voice) = self.pool.voice_mut(playback.voice) {
                voice.pause();
                voice.seek_to_start();
            }
        }
        self.pool.clear();
        self.current_music = None;
        self.background = None;
    }

    /// Rewind and release the voices of the given playbacks.
    fn finalize(&mut self, mut indices: Vec<usize>) -> Vec<Playback> {
        indices.sort_unstable_by(|a, b| b.cmp(a));
        indices.dedup();
        let mut released = Vec::with_capacity(indices.len());
        for index in indices {
            let playback = self.playbacks.remove(index);
            if let Some(voice) = self.pool.voice_mut(playback.voice) {
                voice.seek_to_start();
            }
            self.pool.release(playback.voice);
            released.push(playback);
        }
        released
    }

    /// A stolen voice already belongs to someone else; drop the playback that
    /// used it without touching the voice.
    fn forget_voice(&mut self, cx: &mut Frame<'_>, voice: VoiceId, owner: &str) {
        if let Some(index) = self.playbacks.iter().position(|p| p.voice == voice) {
            self.playbacks.remove(index);
            self.refresh_state(cx, owner);
        }
    }

    /// Derive a sound's state from its remaining voices.
    fn refresh_state(&mut self, cx: &mut Frame<'_>, id: &str) {
        let live = || self.playbacks.iter().filter(|p| p.sound == id && !p.stopping);
        let state = if live().any(|p| p.run == Run::Playing) {
            SoundState::Playing
        } else if live().any(|p| p.run == Run::Paused) {
            SoundState::Paused
        } else {
            SoundState::Stopped
        };

        if state == SoundState::Stopped && self.current_music.as_deref() == Some(id) {
            self.current_music = None;
        }
        if let Some(sound) = cx.sounds.get_mut(id) {
            if sound.state() != state {
                sound.set_state(state, cx.now);
            }
        }
    }
}
