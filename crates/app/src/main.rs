use std::path::{Path, PathBuf};
use std::sync::Arc;

use beatsync_core::{
    AudioProvider, ClockEvent, ManualClock, QuantizationController, SessionConfig, SimulatedSource,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

fn main() -> beatsync_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            session,
            seconds,
            fps,
            snapshot_every,
        } => run_simulate(session.as_deref(), seconds, fps, snapshot_every),
        Commands::Check { session } => run_check(&session),
    }
}

fn run_simulate(
    session: Option<&Path>,
    seconds: f64,
    fps: u32,
    snapshot_every: f64,
) -> beatsync_core::Result<()> {
    let config = match session {
        Some(path) => SessionConfig::from_path(path)?,
        None => SessionConfig::demo(),
    };
    let fps = fps.max(1);
    let frames = frame_count(seconds, fps)?;
    tracing::info!(?session, seconds, fps, tracks = config.tracks.len(), "starting simulation");

    let hardware = Arc::new(ManualClock::default());
    let source_clock = hardware.clone();
    let mut controller = config.build(hardware.clone(), |track| -> Box<dyn AudioProvider> {
        Box::new(SimulatedSource::new(
            source_clock.clone(),
            track.clip_duration_seconds,
        ))
    })?;
    attach_beat_logging(&mut controller);

    let mut script = config.script.clone();
    script.sort_by(|a, b| a.at_seconds.total_cmp(&b.at_seconds));
    let mut next_action = 0;
    let mut next_snapshot = 0.0;

    let delta = 1.0 / f64::from(fps);

    for frame in 0..=frames {
        let now = frame as f64 * delta;
        hardware.set(now);

        while let Some(scripted) = script.get(next_action).filter(|s| s.at_seconds <= now) {
            tracing::info!(at = scripted.at_seconds, action = ?scripted.action, "running scripted action");
            if let Err(err) = controller.apply(scripted.action) {
                tracing::warn!(error = %err, "scripted action failed");
            }
            next_action += 1;
        }

        controller.tick(delta as f32);

        if snapshot_every > 0.0 && now >= next_snapshot {
            log_snapshots(&controller, now)?;
            next_snapshot += snapshot_every;
        }
    }

    log_snapshots(&controller, frames as f64 * delta)?;
    Ok(())
}

/// Longest run the simulator accepts, one day of simulated audio.
const MAX_SIMULATED_SECONDS: f64 = 86_400.0;

fn frame_count(seconds: f64, fps: u32) -> beatsync_core::Result<u64> {
    if !(seconds.is_finite() && (0.0..=MAX_SIMULATED_SECONDS).contains(&seconds)) {
        return Err(format!(
            "--seconds must be between 0 and {MAX_SIMULATED_SECONDS}, got {seconds}"
        )
        .into());
    }
    Ok((seconds * f64::from(fps)).ceil() as u64)
}

fn run_check(session: &Path) -> beatsync_core::Result<()> {
    tracing::info!(?session, "validating session");
    let config = SessionConfig::from_path(session)?;
    println!("{}", config.to_json_pretty()?);
    Ok(())
}

fn attach_beat_logging(controller: &mut QuantizationController) {
    for index in 0..controller.tracks().len() {
        let Ok(track) = controller.track_mut(index) else {
            continue;
        };
        let name = track.name().to_string();
        track.clock_mut().on_event(move |event| match event {
            ClockEvent::Beat(beat) => tracing::debug!(track = %name, beat, "beat"),
            ClockEvent::Started => tracing::info!(track = %name, "track started"),
            ClockEvent::Stopped => tracing::info!(track = %name, "track stopped"),
        });
    }
}

fn log_snapshots(controller: &QuantizationController, now: f64) -> beatsync_core::Result<()> {
    for track in controller.tracks() {
        let snapshot = serde_json::to_string(&track.clock().snapshot())?;
        tracing::info!(
            at = now,
            track = track.name(),
            volume = track.volume(),
            fading = track.fader().is_fading(),
            %snapshot,
            "clock snapshot"
        );
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Beat-synchronized adaptive audio driver", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a session against simulated audio sources.
    Simulate {
        /// Session file to load; the built-in demo session is used otherwise.
        #[arg(short, long)]
        session: Option<PathBuf>,
        /// Length of the simulated run in seconds.
        #[arg(long, default_value_t = 20.0)]
        seconds: f64,
        /// Simulated frame rate; each frame ticks every track once.
        #[arg(long, default_value_t = 60)]
        fps: u32,
        /// Seconds between clock snapshots, 0 to disable.
        #[arg(long, default_value_t = 2.0)]
        snapshot_every: f64,
    },
    /// Validate a session file and print it with defaults filled in.
    Check {
        /// Path to the session file.
        session: PathBuf,
    },
}
