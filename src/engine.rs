use crossbeam::channel::{Receiver, Sender};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};

use crate::composer::Composer;
use crate::config::{MIN_SPEED, Options};
use crate::events::BuildEvent;
use crate::playback::PlaybackSink;

#[derive(Debug, Clone)]
pub enum EngineCommand {
    Event(BuildEvent),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineUpdate {
    ScoreWritten {
        path: PathBuf,
        notes: usize,
    },
    Finished {
        succeeded: bool,
        notes: usize,
        /// How long the closing gesture keeps sounding after this update.
        ring_out: Duration,
    },
    Error {
        message: String,
    },
}

pub struct EngineHandle {
    pub command_tx: Sender<EngineCommand>,
    pub update_rx: Receiver<EngineUpdate>,
    thread: Option<JoinHandle<()>>,
}

impl EngineHandle {
    /// Returns false once the engine thread has gone away.
    pub fn send(&self, event: BuildEvent) -> bool {
        self.command_tx.send(EngineCommand::Event(event)).is_ok()
    }

    /// Asks the engine to stop and waits for it.
    pub fn shutdown(mut self) {
        let _ = self.command_tx.send(EngineCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Engine thread panicked");
            }
        }
    }
}

/// Starts the event-handling thread. One engine composes exactly one build.
pub fn spawn_engine(options: Options, sink: Option<Arc<dyn PlaybackSink>>) -> EngineHandle {
    let (command_tx, command_rx) = crossbeam::channel::unbounded();
    let (update_tx, update_rx) = crossbeam::channel::unbounded();

    let thread = std::thread::spawn(move || {
        engine_thread(options, sink, command_rx, update_tx);
    });

    EngineHandle {
        command_tx,
        update_rx,
        thread: Some(thread),
    }
}

fn engine_thread(
    options: Options,
    sink: Option<Arc<dyn PlaybackSink>>,
    command_rx: Receiver<EngineCommand>,
    update_tx: Sender<EngineUpdate>,
) {
    let mut composer = Composer::new(&options, sink);
    let mut previous: Option<SystemTime> = None;

    loop {
        match command_rx.recv() {
            Ok(EngineCommand::Event(event)) => {
                let timestamp = event.timestamp();
                if options.pacing {
                    if let Some(previous) = previous {
                        pace(previous, timestamp, options.speed);
                    }
                }
                previous = Some(timestamp);

                if composer.is_finished() {
                    warn!("Ignoring {:?} after the build finished", event);
                    continue;
                }
                composer.handle(&event);

                if let BuildEvent::BuildFinished { succeeded, .. } = event {
                    finish_build(&mut composer, &options, succeeded, &update_tx);
                }
            }
            Ok(EngineCommand::Shutdown) => break,
            Err(crossbeam::channel::RecvError) => {
                debug!("Engine command channel closed");
                break;
            }
        }
    }

    composer.shutdown();
}

/// Blocks for the wall-clock gap between two events, divided by `speed`.
/// Speeds below [`MIN_SPEED`] (or not numbers at all) are raised to it.
fn pace(previous: SystemTime, current: SystemTime, speed: f32) {
    let gap = current.duration_since(previous).unwrap_or_default();
    let speed = if speed >= MIN_SPEED { speed } else { MIN_SPEED };
    let wait = Duration::try_from_secs_f64(gap.as_secs_f64() / speed as f64)
        .unwrap_or(Duration::MAX);
    if !wait.is_zero() {
        std::thread::sleep(wait);
    }
}

fn finish_build(
    composer: &mut Composer,
    options: &Options,
    succeeded: bool,
    update_tx: &Sender<EngineUpdate>,
) {
    composer.shutdown();
    let notes = composer.notes().len();

    if let Some(path) = &options.output {
        match composer.write_score(path) {
            Ok(_) => {
                let _ = update_tx.send(EngineUpdate::ScoreWritten {
                    path: path.clone(),
                    notes,
                });
            }
            Err(e) => {
                error!("{}", e);
                let _ = update_tx.send(EngineUpdate::Error {
                    message: format!("Failed to write score: {}", e),
                });
            }
        }
    } else {
        info!("No output path configured, score not written");
    }

    let _ = update_tx.send(EngineUpdate::Finished {
        succeeded,
        notes,
        ring_out: composer.ring_out(),
    });
}
