use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use glam::Vec3;
use parking_lot::Mutex;
use sonance_assets::{AssetCache, AssetEntry, AssetSource};
use tracing::{debug, error, info, warn};

use crate::backend::{HeadlessBackend, HeadlessDecoder, HeadlessProbes, KiraBackend};
use crate::channel::{Channel, ChannelState, Mixer};
use crate::config::EngineConfig;
use crate::error::AudioError;
use crate::events::{AudioEvent, EventBus, EventKind, ListenerId};
use crate::options::PlaybackOptions;
use crate::playback::{Frame, PlaybackController};
use crate::registry::{resolve_asset, SoundDescriptor, SoundRegistry, SoundSpec, SoundState};
use crate::spatial::{compute_spatial, Listener};
use crate::voice::{BackendFactory, Decoder};

/// Whether the host application is currently visible.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Visibility {
    #[default]
    Foreground,
    Background,
}

/// Outcome of [`AudioEngine::preload`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreloadSummary {
    pub loaded: Vec<String>,
    pub failed: Vec<String>,
}

impl PreloadSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

struct EngineState {
    sounds: SoundRegistry,
    mixer: Mixer,
    /// Present between the first unlocked playback call and `dispose`.
    controller: Option<PlaybackController>,
    unlocked: bool,
    /// Bumped by `dispose` so loads started earlier are discarded.
    epoch: u64,
    clock: Duration,
    visibility: Visibility,
    listener: Listener,
}

struct Shared {
    config: EngineConfig,
    state: Mutex<EngineState>,
    cache: AssetCache,
    bus: EventBus,
    factory: BackendFactory,
    decoder: Arc<dyn Decoder>,
}

/// The audio engine. Cheap to clone; all clones drive the same state.
///
/// Every call returns without waiting on audio output. Only loading is
/// async. Fades and end-of-sound detection advance in [`AudioEngine::update`],
/// which the host calls once per frame. Events are delivered after the
/// engine's lock is released, so handlers may call back into the engine.
#[derive(Clone)]
pub struct AudioEngine {
    shared: Arc<Shared>,
}

impl AudioEngine {
    pub fn new(
        config: EngineConfig,
        source: Arc<dyn AssetSource>,
        factory: BackendFactory,
        decoder: Arc<dyn Decoder>,
    ) -> Self {
        let state = EngineState {
            sounds: SoundRegistry::new(),
            mixer: Mixer::new(&config),
            controller: None,
            unlocked: !config.require_user_gesture,
            epoch: 0,
            clock: Duration::ZERO,
            visibility: Visibility::Foreground,
            listener: Listener::default(),
        };

        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(state),
                cache: AssetCache::new(source),
                bus: EventBus::new(),
                factory,
                decoder,
            }),
        }
    }

    /// Engine playing through the default output device.
    pub fn with_kira(config: EngineConfig, source: Arc<dyn AssetSource>) -> Self {
        let (factory, decoder) = KiraBackend::output();
        Self::new(config, source, factory, decoder)
    }

    /// Engine without an output device, plus probes onto its voices.
    pub fn headless(
        config: EngineConfig,
        source: Arc<dyn AssetSource>,
    ) -> (Self, HeadlessProbes) {
        let probes = HeadlessProbes::default();
        let factory = HeadlessBackend::factory(probes.clone());
        let decoder = Arc::new(HeadlessDecoder::new(probes.clone()));
        (Self::new(config, source, factory, decoder), probes)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    // ---- Lifecycle ----

    /// Unlock audio and create the output. Call from a user input handler;
    /// repeated calls are no-ops.
    pub fn init(&self) -> Result<(), AudioError> {
        let mut state = self.shared.state.lock();
        if !state.unlocked {
            info!("Audio unlocked by user gesture");
            state.unlocked = true;
        }
        self.ensure_controller(&mut state)
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.state.lock().controller.is_some()
    }

    /// Feed the host's visibility signal.
    pub fn set_visibility(&self, visibility: Visibility) {
        let mut events = Vec::new();
        {
            let mut guard = self.shared.state.lock();
            let state = &mut *guard;
            if state.visibility == visibility {
                return;
            }
            state.visibility = visibility;
            debug!("Visibility changed to {:?}", visibility);

            let EngineState {
                sounds,
                mixer,
                controller,
                clock,
                ..
            } = state;
            if let Some(controller) = controller.as_mut() {
                match visibility {
                    Visibility::Background => controller.enter_background(mixer),
                    Visibility::Foreground => {
                        let mut cx = Frame {
                            sounds,
                            mixer,
                            now: *clock,
                            events: &mut events,
                        };
                        controller.enter_foreground(&mut cx);
                    }
                }
            }
        }
        self.dispatch(events);
    }

    /// Stop everything, forget every sound and cached asset, and tear down the
    /// output. Channel settings and event handlers survive; the next playback
    /// call brings the output back up.
    pub fn dispose(&self) {
        {
            let mut state = self.shared.state.lock();
            if let Some(mut controller) = state.controller.take() {
                controller.shutdown();
            }
            state.sounds.clear();
            state.epoch += 1;
        }
        self.shared.cache.clear();
        self.shared.decoder.clear();
        info!("Audio engine disposed");
    }

    /// Advance the engine clock by `dt`: run fades and collect finished sounds.
    pub fn update(&self, dt: Duration) {
        let mut events = Vec::new();
        {
            let mut guard = self.shared.state.lock();
            let state = &mut *guard;
            state.clock += dt;

            let EngineState {
                sounds,
                mixer,
                controller,
                clock,
                ..
            } = state;
            if let Some(controller) = controller.as_mut() {
                let mut cx = Frame {
                    sounds,
                    mixer,
                    now: *clock,
                    events: &mut events,
                };
                controller.update(&mut cx, dt);
            }
        }
        self.dispatch(events);
    }

    /// Engine clock, the sum of every `update` step.
    pub fn clock(&self) -> Duration {
        self.shared.state.lock().clock
    }

    // ---- Loading ----

    /// Load a sound's asset, trying alternates in order, and register it.
    /// Registering a known id returns immediately. On failure an `error`
    /// event is published and the id stays unregistered.
    pub async fn register(&self, spec: SoundSpec) -> Result<(), AudioError> {
        let epoch = {
            let state = self.shared.state.lock();
            if state.sounds.contains(&spec.id) {
                debug!("'{}' already registered", spec.id);
                return Ok(());
            }
            state.epoch
        };

        let loaded = match resolve_asset(&self.shared.cache, &spec, &self.shared.config).await {
            Ok(asset) => self.decode(asset).await,
            Err(e) => Err(e),
        };
        let asset = match loaded {
            Ok(asset) => asset,
            Err(e) => {
                warn!("Failed to load '{}': {}", spec.id, e);
                self.dispatch(vec![AudioEvent::Error {
                    id: spec.id.clone(),
                    cause: e.to_string(),
                }]);
                return Err(e);
            }
        };

        let url = asset.url().to_string();
        {
            let mut state = self.shared.state.lock();
            if state.epoch != epoch {
                debug!("Dropping '{}': engine was disposed while loading", spec.id);
                return Err(AudioError::AlreadyDisposed);
            }

            let mut defaults = spec.options.clone();
            if spec.is_music && defaults.looping.is_none() {
                defaults.looping = Some(self.shared.config.default_music_loop);
            }
            let descriptor = SoundDescriptor::new(spec.id.clone(), asset, spec.is_music, defaults);
            if !state.sounds.insert(descriptor) {
                return Ok(());
            }
        }

        info!("Loaded '{}' from {}", spec.id, url);
        self.dispatch(vec![AudioEvent::Load { id: spec.id, url }]);
        Ok(())
    }

    /// Decode off the async runtime so `play` never has to.
    async fn decode(&self, asset: Arc<AssetEntry>) -> Result<Arc<AssetEntry>, AudioError> {
        let decoder = Arc::clone(&self.shared.decoder);
        let entry = Arc::clone(&asset);
        tokio::task::spawn_blocking(move || decoder.prepare(&entry))
            .await
            .map_err(|e| AudioError::Decode(asset.url().to_string(), e.to_string()))??;
        Ok(asset)
    }

    /// Register many sounds concurrently.
    pub async fn preload(&self, specs: Vec<SoundSpec>) -> PreloadSummary {
        let results = join_all(specs.into_iter().map(|spec| async move {
            let id = spec.id.clone();
            (id, self.register(spec).await)
        }))
        .await;

        let mut summary = PreloadSummary::default();
        for (id, result) in results {
            match result {
                Ok(()) => summary.loaded.push(id),
                Err(_) => summary.failed.push(id),
            }
        }
        info!(
            "Preloaded {} sound(s), {} failed",
            summary.loaded.len(),
            summary.failed.len()
        );
        summary
    }

    // ---- Playback ----

    pub fn play(&self, id: &str, options: PlaybackOptions) {
        self.with_controller("play", |controller, cx| controller.play(cx, id, &options));
    }

    /// Switch music to `id`, fading the current track out while the new one
    /// fades in.
    pub fn crossfade_music(&self, id: &str, duration: Duration) {
        self.play(id, PlaybackOptions::new().fade_in(duration).fade_out(duration));
    }

    /// Play a sound panned and attenuated for an emitter at `position`.
    pub fn play_at(&self, id: &str, position: Vec3, options: PlaybackOptions) {
        let listener = self.shared.state.lock().listener.clone();
        let spatial = compute_spatial(&listener, position);
        self.play(id, options.pan(spatial.panning).distance(spatial.distance));
    }

    pub fn set_listener(&self, listener: Listener) {
        self.shared.state.lock().listener = listener;
    }

    pub fn stop(&self, id: &str, options: PlaybackOptions) {
        self.with_existing(|controller, cx| controller.stop(cx, id, &options));
    }

    /// Stop every sound, fading out by `options.fade_out` if set.
    pub fn stop_all(&self, options: PlaybackOptions) {
        let fade_out = options.fade_out.unwrap_or(Duration::ZERO);
        self.with_existing(|controller, cx| controller.stop_all(cx, fade_out));
    }

    pub fn pause(&self, id: &str) {
        self.with_existing(|controller, cx| controller.pause(cx, id));
    }

    pub fn resume(&self, id: &str) {
        self.with_existing(|controller, cx| controller.resume(cx, id));
    }

    // ---- Channels ----

    /// Set a channel's volume. The value is clamped to 0.0–1.0, applied to
    /// every playing voice on the channel, and returned.
    pub fn set_channel_volume(&self, channel: Channel, volume: f32) -> f32 {
        let volume = {
            let mut guard = self.shared.state.lock();
            let state = &mut *guard;
            let volume = state.mixer.set_volume(channel, volume);
            if let Some(controller) = state.controller.as_mut() {
                controller.apply_channel_volume(&state.mixer, channel);
            }
            volume
        };
        debug!("{} volume set to {:.2}", channel, volume);
        self.dispatch(vec![AudioEvent::VolumeChange { channel, volume }]);
        volume
    }

    pub fn set_channel_mute(&self, channel: Channel, muted: bool) {
        let changed = {
            let mut guard = self.shared.state.lock();
            let state = &mut *guard;
            let changed = state.mixer.set_muted(channel, muted);
            if changed {
                if let Some(controller) = state.controller.as_mut() {
                    if muted {
                        controller.mute(channel);
                    } else {
                        controller.unmute(&state.mixer, channel);
                    }
                }
            }
            changed
        };
        if changed {
            debug!("{} {}", channel, if muted { "muted" } else { "unmuted" });
            self.dispatch(vec![AudioEvent::MuteChange { channel, muted }]);
        }
    }

    pub fn channel(&self, channel: Channel) -> ChannelState {
        self.shared.state.lock().mixer.get(channel)
    }

    // ---- Events ----

    pub fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&AudioEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.shared.bus.on(kind, handler)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.shared.bus.off(id)
    }

    pub fn events(&self) -> &EventBus {
        &self.shared.bus
    }

    // ---- Queries ----

    /// Playback state of a registered sound.
    pub fn state(&self, id: &str) -> Option<SoundState> {
        self.shared.state.lock().sounds.get(id).map(|s| s.state())
    }

    pub fn is_loaded(&self, id: &str) -> bool {
        self.shared.state.lock().sounds.contains(id)
    }

    pub fn loaded_ids(&self) -> Vec<String> {
        self.shared.state.lock().sounds.ids()
    }

    /// Inspect a registered sound.
    pub fn with_sound<R>(&self, id: &str, f: impl FnOnce(&SoundDescriptor) -> R) -> Option<R> {
        self.shared.state.lock().sounds.get(id).map(f)
    }

    pub fn current_music(&self) -> Option<String> {
        let state = self.shared.state.lock();
        state
            .controller
            .as_ref()
            .and_then(|c| c.current_music())
            .map(str::to_string)
    }

    /// Voices currently bound to a sound.
    pub fn active_voices(&self) -> usize {
        self.shared
            .state
            .lock()
            .controller
            .as_ref()
            .map_or(0, |c| c.pool().active_count())
    }

    /// Voices created so far, bound or idle. Never exceeds the pool capacity.
    pub fn voice_count(&self) -> usize {
        self.shared
            .state
            .lock()
            .controller
            .as_ref()
            .map_or(0, |c| c.pool().len())
    }

    pub fn backend_name(&self) -> Option<&'static str> {
        let state = self.shared.state.lock();
        state.controller.as_ref().map(|c| c.backend_name())
    }

    /// Whether playback is held because the host is in the background.
    pub fn is_suspended(&self) -> bool {
        let state = self.shared.state.lock();
        state.controller.as_ref().is_some_and(|c| c.is_backgrounded())
    }

    // ---- Internals ----

    fn ensure_controller(&self, state: &mut EngineState) -> Result<(), AudioError> {
        if !state.unlocked {
            return Err(AudioError::Locked);
        }
        if state.controller.is_some() {
            return Ok(());
        }

        let backend = (self.shared.factory)()?;
        info!("Audio output ready ({})", backend.name());
        let mut controller = PlaybackController::new(backend, &self.shared.config);
        if state.visibility == Visibility::Background {
            controller.enter_background(&state.mixer);
        }
        state.controller = Some(controller);
        Ok(())
    }

    /// Run a playback operation, bringing the output up first if needed.
    fn with_controller<R>(
        &self,
        op: &str,
        f: impl FnOnce(&mut PlaybackController, &mut Frame<'_>) -> R,
    ) -> Option<R> {
        {
            let mut state = self.shared.state.lock();
            match self.ensure_controller(&mut state) {
                Ok(()) => {}
                Err(AudioError::Locked) => {
                    warn!("{}: audio is locked until init() runs from a user gesture", op);
                    return None;
                }
                Err(e) => {
                    error!("{}: audio output unavailable: {}", op, e);
                    return None;
                }
            }
        }
        self.with_existing(f)
    }

    /// Run a playback operation if the output is up.
    fn with_existing<R>(
        &self,
        f: impl FnOnce(&mut PlaybackController, &mut Frame<'_>) -> R,
    ) -> Option<R> {
        let mut events = Vec::new();
        let result = {
            let mut guard = self.shared.state.lock();
            let EngineState {
                sounds,
                mixer,
                controller,
                clock,
                ..
            } = &mut *guard;
            let controller = controller.as_mut()?;
            let mut cx = Frame {
                sounds,
                mixer,
                now: *clock,
                events: &mut events,
            };
            f(controller, &mut cx)
        };
        self.dispatch(events);
        Some(result)
    }

    fn dispatch(&self, events: Vec<AudioEvent>) {
        for event in &events {
            self.shared.bus.trigger(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonance_assets::MemorySource;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn source() -> Arc<MemorySource> {
        Arc::new(
            MemorySource::new()
                .with("music/theme.ogg", vec![0u8; 16])
                .with("music/boss.ogg", vec![0u8; 16])
                .with("sfx/click.wav", vec![0u8; 16])
                .with("sfx/coin.ogg", vec![0u8; 16]),
        )
    }

    fn engine() -> (AudioEngine, HeadlessProbes) {
        let config = EngineConfig {
            require_user_gesture: false,
            ..EngineConfig::default()
        };
        AudioEngine::headless(config, source())
    }

    fn record(engine: &AudioEngine, kinds: &[EventKind]) -> Arc<Mutex<Vec<AudioEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        for &kind in kinds {
            let seen = Arc::clone(&seen);
            engine.on(kind, move |e| {
                seen.lock().push(e.clone());
                Ok(())
            });
        }
        seen
    }

    fn specs() -> Vec<SoundSpec> {
        vec![
            SoundSpec::music("theme", "music/theme.ogg"),
            SoundSpec::music("boss", "music/boss.ogg"),
            SoundSpec::effect("click", "sfx/click.wav"),
            SoundSpec::effect("coin", "sfx/coin.ogg"),
        ]
    }

    #[test]
    fn channel_volume_is_clamped() {
        let (engine, _) = engine();
        let seen = record(&engine, &[EventKind::VolumeChange]);

        assert_eq!(engine.set_channel_volume(Channel::Music, 1.5), 1.0);
        assert_eq!(engine.set_channel_volume(Channel::Sfx, -0.3), 0.0);
        assert_eq!(engine.channel(Channel::Music).volume, 1.0);

        assert_eq!(
            *seen.lock(),
            vec![
                AudioEvent::VolumeChange {
                    channel: Channel::Music,
                    volume: 1.0
                },
                AudioEvent::VolumeChange {
                    channel: Channel::Sfx,
                    volume: 0.0
                },
            ]
        );
    }

    #[test]
    fn mute_events_fire_on_change_only() {
        let (engine, _) = engine();
        let seen = record(&engine, &[EventKind::MuteChange]);

        engine.set_channel_mute(Channel::Sfx, true);
        engine.set_channel_mute(Channel::Sfx, true);
        engine.set_channel_mute(Channel::Sfx, false);

        assert_eq!(seen.lock().len(), 2);
        assert!(!engine.channel(Channel::Sfx).muted);
    }

    #[tokio::test]
    async fn preload_registers_and_announces() {
        let (engine, _) = engine();
        let seen = record(&engine, &[EventKind::Load]);

        let summary = engine.preload(specs()).await;

        assert!(summary.is_complete());
        assert_eq!(summary.loaded.len(), 4);
        assert_eq!(engine.loaded_ids(), vec!["boss", "click", "coin", "theme"]);
        assert_eq!(seen.lock().len(), 4);
        assert_eq!(engine.state("theme"), Some(SoundState::Stopped));
        assert_eq!(engine.with_sound("theme", |s| s.defaults().looping), Some(Some(true)));
    }

    #[tokio::test]
    async fn registering_twice_is_idempotent() {
        let (engine, _) = engine();
        let seen = record(&engine, &[EventKind::Load]);

        engine.register(SoundSpec::effect("click", "sfx/click.wav")).await.unwrap();
        engine.register(SoundSpec::effect("click", "sfx/other.wav")).await.unwrap();

        assert_eq!(seen.lock().len(), 1);
        assert_eq!(
            engine.with_sound("click", |s| s.asset().url().to_string()).as_deref(),
            Some("sfx/click.wav")
        );
    }

    #[tokio::test]
    async fn alternates_are_tried_in_order() {
        let (engine, _) = engine();
        let spec = SoundSpec::effect("coin", "sfx/coin.mp3").with_alternates(["webm", "ogg"]);

        engine.register(spec).await.unwrap();

        assert_eq!(
            engine.with_sound("coin", |s| s.asset().url().to_string()).as_deref(),
            Some("sfx/coin.ogg")
        );
    }

    #[tokio::test]
    async fn missing_asset_reports_error_and_stays_silent() {
        let (engine, probes) = engine();
        let errors = record(&engine, &[EventKind::Error]);
        let plays = record(&engine, &[EventKind::Play]);

        let summary = engine
            .preload(vec![SoundSpec::effect("ghost", "sfx/ghost.ogg")])
            .await;
        assert_eq!(summary.failed, vec!["ghost".to_string()]);

        let errors = errors.lock().clone();
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], AudioEvent::Error { id, .. } if id == "ghost"));
        assert!(!engine.is_loaded("ghost"));

        engine.play("ghost", PlaybackOptions::new());
        assert!(plays.lock().is_empty());
        assert!(probes.is_empty());
        assert_eq!(engine.active_voices(), 0);
    }

    #[tokio::test]
    async fn only_one_music_plays_at_a_time() {
        let (engine, _) = engine();
        engine.preload(specs()).await;

        engine.play("theme", PlaybackOptions::new());
        engine.play("boss", PlaybackOptions::new());

        assert_eq!(engine.state("theme"), Some(SoundState::Stopped));
        assert_eq!(engine.state("boss"), Some(SoundState::Playing));
        assert_eq!(engine.current_music().as_deref(), Some("boss"));
        assert_eq!(engine.active_voices(), 1);
    }

    #[tokio::test]
    async fn crossfade_overlaps_then_settles() {
        let (engine, probes) = engine();
        engine.preload(specs()).await;
        engine.play("theme", PlaybackOptions::new());

        engine.crossfade_music("boss", Duration::from_secs(2));
        assert_eq!(engine.active_voices(), 2);
        engine.update(Duration::from_secs(1));
        assert!((probes.bound_to("music/boss.ogg")[0].gain() - 0.4).abs() < 1e-4);
        assert!((probes.bound_to("music/theme.ogg")[0].gain() - 0.4).abs() < 1e-4);

        engine.update(Duration::from_secs(1));
        assert_eq!(engine.active_voices(), 1);
        assert!(probes.bound_to("music/theme.ogg").is_empty());
    }

    #[tokio::test]
    async fn stop_during_fade_in_ends_stopped() {
        let (engine, _) = engine();
        engine.preload(specs()).await;

        engine.play("click", PlaybackOptions::new().fade_in(Duration::from_secs(2)));
        engine.update(Duration::from_millis(500));
        engine.stop("click", PlaybackOptions::new().fade_out(Duration::from_secs(1)));

        {
            let state = engine.shared.state.lock();
            let controller = state.controller.as_ref().unwrap();
            assert_eq!(controller.active_fades("click"), 1);
        }
        assert_eq!(engine.state("click"), Some(SoundState::Stopped));

        engine.update(Duration::from_secs(1));
        assert_eq!(engine.state("click"), Some(SoundState::Stopped));
        assert_eq!(engine.active_voices(), 0);
        assert!(engine.with_sound("click", |s| s.end_time()).flatten().is_some());
    }

    #[tokio::test]
    async fn pool_never_grows_past_capacity() {
        let config = EngineConfig {
            require_user_gesture: false,
            pool_capacity: 2,
            ..EngineConfig::default()
        };
        let (engine, probes) = AudioEngine::headless(config, source());
        engine.preload(specs()).await;

        for _ in 0..5 {
            engine.play("click", PlaybackOptions::new());
            engine.play("coin", PlaybackOptions::new());
        }

        assert_eq!(engine.voice_count(), 2);
        assert_eq!(probes.len(), 2);
        assert_eq!(engine.state("coin"), Some(SoundState::Playing));
    }

    #[tokio::test]
    async fn natural_end_fires_end_event() {
        let (engine, probes) = engine();
        let ends = record(&engine, &[EventKind::End]);
        engine.preload(specs()).await;

        engine.play("coin", PlaybackOptions::new());
        probes.bound_to("sfx/coin.ogg")[0].finish();
        engine.update(Duration::from_millis(16));

        assert_eq!(*ends.lock(), vec![AudioEvent::End { id: "coin".into() }]);
        assert_eq!(engine.state("coin"), Some(SoundState::Stopped));
        assert_eq!(engine.active_voices(), 0);
    }

    #[tokio::test]
    async fn background_keeps_music_and_drops_effects() {
        let (engine, probes) = engine();
        engine.preload(specs()).await;
        engine.play("theme", PlaybackOptions::new());
        engine.play("click", PlaybackOptions::new().looping(true));

        engine.set_visibility(Visibility::Background);
        assert!(engine.is_suspended());
        assert!(probes.all().iter().all(|p| !p.is_playing()));

        engine.set_visibility(Visibility::Foreground);
        assert!(!engine.is_suspended());
        assert!(probes.bound_to("music/theme.ogg")[0].is_playing());
        assert!(probes.bound_to("sfx/click.wav").is_empty());
        assert_eq!(engine.state("click"), Some(SoundState::Stopped));
        assert_eq!(engine.state("theme"), Some(SoundState::Playing));
    }

    #[tokio::test]
    async fn muted_music_stays_silent_after_foreground() {
        let (engine, probes) = engine();
        engine.preload(specs()).await;
        engine.play("theme", PlaybackOptions::new());
        engine.set_channel_mute(Channel::Music, true);

        engine.set_visibility(Visibility::Background);
        engine.set_visibility(Visibility::Foreground);

        assert!(!probes.bound_to("music/theme.ogg")[0].is_playing());
    }

    #[tokio::test]
    async fn muted_effect_is_dropped_by_background_round_trip() {
        let (engine, probes) = engine();
        engine.preload(specs()).await;
        engine.play("click", PlaybackOptions::new().looping(true));
        engine.set_channel_mute(Channel::Sfx, true);

        engine.set_visibility(Visibility::Background);
        engine.set_visibility(Visibility::Foreground);
        engine.set_channel_mute(Channel::Sfx, false);

        assert_eq!(engine.state("click"), Some(SoundState::Stopped));
        assert!(probes.bound_to("sfx/click.wav").is_empty());
        assert!(probes.all().iter().all(|p| !p.is_playing()));
    }

    #[tokio::test]
    async fn locked_engine_ignores_playback_until_init() {
        let (engine, probes) = AudioEngine::headless(EngineConfig::default(), source());
        engine.preload(specs()).await;

        engine.play("click", PlaybackOptions::new());
        assert!(!engine.is_initialized());
        assert_eq!(probes.backends_created(), 0);

        engine.init().unwrap();
        engine.init().unwrap();
        assert_eq!(engine.backend_name(), Some("headless"));
        engine.play("click", PlaybackOptions::new());
        assert_eq!(probes.backends_created(), 1);
        assert_eq!(engine.state("click"), Some(SoundState::Playing));
    }

    #[tokio::test]
    async fn dispose_then_lazy_reinit() {
        let (engine, probes) = engine();
        engine.init().unwrap();
        engine.preload(specs()).await;
        engine.play("theme", PlaybackOptions::new());

        engine.dispose();
        assert!(!engine.is_initialized());
        assert_eq!(engine.voice_count(), 0);
        assert!(engine.loaded_ids().is_empty());
        assert!(!probes.bound_to("music/theme.ogg").iter().any(|p| p.is_playing()));

        engine.preload(specs()).await;
        engine.play("theme", PlaybackOptions::new());
        assert!(engine.is_initialized());
        assert_eq!(probes.backends_created(), 2);
        assert_eq!(engine.state("theme"), Some(SoundState::Playing));
    }

    #[tokio::test]
    async fn dispose_in_background_reinits_silent() {
        let (engine, probes) = engine();
        engine.preload(specs()).await;
        engine.play("theme", PlaybackOptions::new());
        engine.set_visibility(Visibility::Background);

        engine.dispose();
        engine.preload(specs()).await;
        engine.play("theme", PlaybackOptions::new());

        assert!(engine.is_initialized());
        assert!(engine.is_suspended());
        assert!(probes.all().iter().all(|p| !p.is_playing()));
        assert_eq!(engine.state("theme"), Some(SoundState::Stopped));

        engine.set_visibility(Visibility::Foreground);
        engine.play("theme", PlaybackOptions::new());
        assert!(probes.bound_to("music/theme.ogg").iter().any(|p| p.is_playing()));
    }

    #[tokio::test]
    async fn sounds_are_decoded_while_loading() {
        let (engine, probes) = engine();
        engine.preload(specs()).await;

        let mut decoded = probes.decoded();
        decoded.sort();
        assert_eq!(
            decoded,
            vec!["music/boss.ogg", "music/theme.ogg", "sfx/click.wav", "sfx/coin.ogg"]
        );
        assert_eq!(probes.backends_created(), 0);

        engine.dispose();
        assert!(probes.decoded().is_empty());
    }

    #[tokio::test]
    async fn undecodable_asset_is_not_registered() {
        let source = Arc::new(MemorySource::new().with("sfx/blank.wav", Vec::<u8>::new()));
        let config = EngineConfig {
            require_user_gesture: false,
            ..EngineConfig::default()
        };
        let (engine, _) = AudioEngine::headless(config, source);
        let errors = record(&engine, &[EventKind::Error]);

        let err = engine
            .register(SoundSpec::effect("blank", "sfx/blank.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, AudioError::Decode(..)));
        assert!(!engine.is_loaded("blank"));
        assert_eq!(errors.lock().len(), 1);
    }

    #[tokio::test]
    async fn failing_handler_does_not_reach_caller() {
        let (engine, _) = engine();
        engine.preload(specs()).await;
        let calls = Arc::new(AtomicUsize::new(0));

        engine.on(EventKind::Play, |_| anyhow::bail!("listener broke"));
        engine.on(EventKind::Play, |_| panic!("listener panicked"));
        let counter = Arc::clone(&calls);
        engine.on(EventKind::Play, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        engine.play("click", PlaybackOptions::new());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.state("click"), Some(SoundState::Playing));
    }

    #[tokio::test]
    async fn handlers_can_call_back_into_the_engine() {
        let (engine, probes) = engine();
        engine.preload(specs()).await;

        let chained = engine.clone();
        engine.on(EventKind::End, move |e| {
            if e.sound_id() == Some("coin") {
                chained.play("click", PlaybackOptions::new());
            }
            Ok(())
        });

        engine.play("coin", PlaybackOptions::new());
        probes.bound_to("sfx/coin.ogg")[0].finish();
        engine.update(Duration::from_millis(16));

        assert_eq!(engine.state("click"), Some(SoundState::Playing));
    }

    #[tokio::test]
    async fn play_at_pans_toward_the_emitter() {
        let (engine, probes) = engine();
        engine.preload(specs()).await;

        engine.play_at("click", Vec3::new(10.0, 0.0, 0.0), PlaybackOptions::new());

        let probe = probes.bound_to("sfx/click.wav")[0].state();
        assert!(probe.pan > 0.9);
        assert!((probe.gain - 0.1).abs() < 1e-4);
    }
}
