use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

use buildtune::playback::{self, PlaybackSink};
use buildtune::{BuildEvent, BuildLog, EngineUpdate, Options, spawn_engine};

#[derive(Parser)]
#[command(name = "buildtune")]
#[command(about = "Replays a recorded build as music and writes it to a MIDI file")]
struct Cli {
    /// Recorded build log (RON) to replay
    #[arg(required_unless_present = "list_ports")]
    log: Option<PathBuf>,

    /// Options file (RON); missing fields take their defaults
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Where to write the .mid score
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Play through the first MIDI output whose name contains this
    #[arg(long, short)]
    port: Option<String>,

    /// Compose and export only, without opening a MIDI device
    #[arg(long)]
    no_play: bool,

    /// Print the available MIDI outputs and exit
    #[arg(long)]
    list_ports: bool,

    /// Replay with the original gaps between events
    #[arg(long)]
    pace: bool,

    /// Pacing speed multiplier
    #[arg(long)]
    speed: Option<f32>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("buildtune=info")),
        )
        .init();

    let cli = Cli::parse();

    if cli.list_ports {
        return match playback::list_output_ports() {
            Ok(ports) if ports.is_empty() => {
                println!("No MIDI outputs found");
                ExitCode::SUCCESS
            }
            Ok(ports) => {
                for (i, name) in ports.iter().enumerate() {
                    println!("{}: {}", i, name);
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("{}", e);
                ExitCode::FAILURE
            }
        };
    }

    let Some(log_path) = cli.log.as_deref() else {
        error!("No build log given");
        return ExitCode::FAILURE;
    };

    let mut options = match &cli.config {
        Some(path) => match Options::load(path) {
            Ok(options) => options,
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => Options::default(),
    };
    if cli.output.is_some() {
        options.output = cli.output.clone();
    }
    if cli.pace {
        options.pacing = true;
    }
    if let Some(speed) = cli.speed {
        options.speed = speed;
    }
    options.validate();

    let mut log = match BuildLog::load(log_path) {
        Ok(log) => log,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if !log.is_chronological() {
        warn!("Build log timestamps go backwards; ticks will be clamped");
    }
    if log.events.is_empty() {
        warn!("Build log {} has no events", log_path.display());
        return ExitCode::SUCCESS;
    }
    close_unfinished_log(&mut log);

    let sink: Option<Arc<dyn PlaybackSink>> = if cli.no_play {
        None
    } else {
        match playback::open_output(cli.port.as_deref()) {
            Ok(sink) => Some(Arc::new(sink)),
            Err(e) => {
                warn!("Playback disabled: {}", e);
                None
            }
        }
    };

    info!("Replaying {} events from {}", log.events.len(), log_path.display());
    let engine = spawn_engine(options, sink.clone());
    for event in log.events {
        if !engine.send(event) {
            break;
        }
    }

    let mut status = ExitCode::SUCCESS;
    let mut ring_out = None;
    while let Ok(update) = engine.update_rx.recv() {
        match update {
            EngineUpdate::ScoreWritten { path, notes } => {
                println!("Wrote {} notes to {}", notes, path.display());
            }
            EngineUpdate::Error { message } => {
                error!("{}", message);
                status = ExitCode::FAILURE;
            }
            EngineUpdate::Finished {
                succeeded,
                notes,
                ring_out: tail,
            } => {
                info!(
                    "Build {} with {} notes",
                    if succeeded { "succeeded" } else { "failed" },
                    notes
                );
                ring_out = Some(tail);
                break;
            }
        }
    }
    engine.shutdown();

    if let Some(sink) = sink {
        if let Some(tail) = ring_out {
            std::thread::sleep(tail);
        }
        sink.dispose();
    }
    status
}

/// Logs cut short before the build finished still get a closing event, so
/// the score is written. The build counts as failed if any error was seen.
fn close_unfinished_log(log: &mut BuildLog) {
    if log
        .events
        .iter()
        .any(|e| matches!(e, BuildEvent::BuildFinished { .. }))
    {
        return;
    }
    let Some(timestamp) = log.events.iter().map(|e| e.timestamp()).max() else {
        return;
    };
    let succeeded = !log
        .events
        .iter()
        .any(|e| matches!(e, BuildEvent::ErrorRaised { .. }));
    warn!("Build log has no BuildFinished event, closing it");
    log.events.push(BuildEvent::BuildFinished {
        succeeded,
        timestamp,
    });
}
