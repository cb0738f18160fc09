//! Sonance - command-line sound player
//!
//! Loads a sound manifest, plays sounds through the Sonance audio engine on a
//! fixed frame loop, and keeps channel preferences between runs.

mod manifest;
mod settings;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use sonance_audio::{AudioEngine, Channel, EventKind, PlaybackOptions};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::manifest::Manifest;
use crate::settings::PlayerSettings;

const FRAME: Duration = Duration::from_millis(16);

#[derive(Parser, Debug)]
#[command(name = "sonance", about = "Play sounds through the Sonance audio engine")]
struct Cli {
    /// Run without an output device
    #[arg(long, global = true)]
    headless: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play sounds from a manifest
    Play {
        manifest: PathBuf,
        /// Sound ids to play; defaults to the first music sound
        ids: Vec<String>,
        /// How long to keep the frame loop running
        #[arg(long, default_value_t = 10.0)]
        seconds: f32,
        /// Fade-in for each sound, in seconds
        #[arg(long)]
        fade_in: Option<f32>,
        /// Fade-out applied when stopping at the end, in seconds
        #[arg(long, default_value_t = 0.5)]
        fade_out: f32,
        /// Print engine events to stdout as JSON lines
        #[arg(long)]
        events: bool,
    },
    /// Load every sound in a manifest and report failures
    Check { manifest: PathBuf },
    /// Show or change saved channel settings
    Channel {
        channel: ChannelArg,
        /// New volume (0.0 to 1.0)
        volume: Option<f32>,
        #[arg(long, conflicts_with = "unmute")]
        mute: bool,
        #[arg(long)]
        unmute: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ChannelArg {
    Music,
    Sfx,
}

impl From<ChannelArg> for Channel {
    fn from(arg: ChannelArg) -> Self {
        match arg {
            ChannelArg::Music => Channel::Music,
            ChannelArg::Sfx => Channel::Sfx,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")?;

    let cli = Cli::parse();
    let settings = PlayerSettings::load();

    match cli.command {
        Commands::Play {
            manifest,
            ids,
            seconds,
            fade_in,
            fade_out,
            events,
        } => {
            let options = PlayOptions {
                seconds,
                fade_in,
                fade_out,
                events,
            };
            run_play(&settings, cli.headless, &manifest, ids, options).await
        }
        Commands::Check { manifest } => run_check(&settings, &manifest).await,
        Commands::Channel {
            channel,
            volume,
            mute,
            unmute,
        } => run_channel(settings, channel.into(), volume, mute, unmute),
    }
}

struct PlayOptions {
    seconds: f32,
    fade_in: Option<f32>,
    fade_out: f32,
    events: bool,
}

fn secs(value: f32) -> Duration {
    Duration::from_secs_f32(value.max(0.0))
}

fn build_engine(
    settings: &PlayerSettings,
    headless: bool,
    manifest: &Manifest,
) -> Result<AudioEngine> {
    let config = settings.engine_config();
    let source = manifest.source()?;
    let engine = if headless {
        AudioEngine::headless(config, source).0
    } else {
        AudioEngine::with_kira(config, source)
    };
    Ok(engine)
}

async fn run_play(
    settings: &PlayerSettings,
    headless: bool,
    manifest_path: &Path,
    ids: Vec<String>,
    options: PlayOptions,
) -> Result<()> {
    let manifest = Manifest::load(manifest_path)?;
    let engine = build_engine(settings, headless, &manifest)?;

    if options.events {
        for kind in EventKind::ALL {
            engine.on(kind, |event| {
                println!("{}", serde_json::to_string(event)?);
                Ok(())
            });
        }
    }

    // Launching the player counts as the user gesture.
    engine.init().context("Failed to open audio output")?;
    settings.apply_mutes(&engine);

    let summary = engine.preload(manifest.sounds.clone()).await;
    for id in &summary.failed {
        warn!("Skipping '{}': could not be loaded", id);
    }

    let ids = if ids.is_empty() {
        manifest.first_music().map(str::to_string).into_iter().collect()
    } else {
        ids
    };
    if ids.is_empty() {
        anyhow::bail!("Nothing to play: pass sound ids or add a music sound to the manifest");
    }

    let mut play_options = PlaybackOptions::new();
    if let Some(fade_in) = options.fade_in {
        play_options = play_options.fade_in(secs(fade_in));
    }
    for id in &ids {
        engine.play(id, play_options.clone());
    }

    run_frames(&engine, secs(options.seconds)).await;

    let fade_out = secs(options.fade_out);
    engine.stop_all(PlaybackOptions::new().fade_out(fade_out));
    run_frames(&engine, fade_out + FRAME).await;
    engine.dispose();
    info!("Done");
    Ok(())
}

/// Drive the engine clock until `duration` has passed or Ctrl-C is pressed.
async fn run_frames(engine: &AudioEngine, duration: Duration) {
    let mut interval = tokio::time::interval(FRAME);
    let started = Instant::now();
    let mut last = started;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Instant::now();
                engine.update(now - last);
                last = now;
                if now - started >= duration {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }
}

async fn run_check(settings: &PlayerSettings, manifest_path: &Path) -> Result<()> {
    let manifest = Manifest::load(manifest_path)?;
    let engine = build_engine(settings, true, &manifest)?;

    let summary = engine.preload(manifest.sounds.clone()).await;
    for id in &summary.loaded {
        let url = engine
            .with_sound(id, |s| s.asset().url().to_string())
            .unwrap_or_default();
        println!("ok      {id} ({url})");
    }
    for id in &summary.failed {
        println!("failed  {id}");
    }

    if !summary.is_complete() {
        anyhow::bail!(
            "{} of {} sounds failed to load",
            summary.failed.len(),
            manifest.sounds.len()
        );
    }
    Ok(())
}

fn run_channel(
    mut settings: PlayerSettings,
    channel: Channel,
    volume: Option<f32>,
    mute: bool,
    unmute: bool,
) -> Result<()> {
    let changed = volume.is_some() || mute || unmute;
    let prefs = settings.prefs_mut(channel);
    if let Some(volume) = volume {
        prefs.volume = sonance_audio::clamp_volume(volume);
    }
    if mute || unmute {
        prefs.muted = mute;
    }

    let prefs = settings.prefs(channel).clone();
    println!(
        "{channel}: volume {:.2}{}",
        prefs.volume(),
        if prefs.muted { " (muted)" } else { "" }
    );

    if changed {
        settings.save()?;
    }
    Ok(())
}
