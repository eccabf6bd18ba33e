use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use super::clock::ticks_to_duration;
use crate::patterns::{STEPS_PER_BASS_NOTE, bass_degree, bass_duration, drum_step};
use crate::playback::PlaybackSink;
use crate::theory::{BASS_CHANNEL, PERCUSSION_CHANNEL, Scale};

pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(1);

const BASS_VELOCITY: u8 = 90;

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub bpm: f32,
    pub ticks_per_quarter: u32,
    pub scale: Scale,
    pub bass_octave: u8,
    pub drums: bool,
    pub bass: bool,
}

/// Backing groove played in real time while the build runs.
///
/// The worker paces itself against the instant it started, so late wakeups
/// never accumulate into drift. It reads the current key on every bass note
/// and otherwise shares nothing with the composer but the sink.
pub struct LiveLoop {
    cancel_tx: Option<Sender<()>>,
    done_rx: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl LiveLoop {
    pub fn start(
        sink: Arc<dyn PlaybackSink>,
        key: Arc<AtomicU8>,
        settings: LoopSettings,
    ) -> std::io::Result<Self> {
        let (cancel_tx, cancel_rx) = crossbeam::channel::bounded(1);
        let (done_tx, done_rx) = crossbeam::channel::bounded(1);

        let handle = std::thread::Builder::new()
            .name("buildtune-live-loop".into())
            .spawn(move || {
                backing_loop(sink, key, settings, cancel_rx);
                let _ = done_tx.send(());
            })?;

        info!("Live backing loop started");
        Ok(Self {
            cancel_tx: Some(cancel_tx),
            done_rx,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Asks the worker to finish and waits up to `timeout` for it. Returns
    /// false if the worker had to be abandoned.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.try_send(());
        }

        match self.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    warn!("Live backing loop panicked");
                }
                info!("Live backing loop stopped");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Live backing loop did not stop within {:?}, leaving it behind",
                    timeout
                );
                false
            }
        }
    }
}

impl Drop for LiveLoop {
    fn drop(&mut self) {
        self.stop(DEFAULT_STOP_TIMEOUT);
    }
}

fn backing_loop(
    sink: Arc<dyn PlaybackSink>,
    key: Arc<AtomicU8>,
    settings: LoopSettings,
    cancel_rx: Receiver<()>,
) {
    let tpq = settings.ticks_per_quarter;
    let step_length = ticks_to_duration(tpq / 2, settings.bpm, tpq);
    let started = Instant::now();
    let mut step: u32 = 0;

    loop {
        let due = step_length
            .checked_mul(step)
            .and_then(|offset| started.checked_add(offset));
        let Some(due) = due else {
            // the next step would never come; just wait to be cancelled
            let _ = cancel_rx.recv();
            break;
        };
        match cancel_rx.recv_deadline(due) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        if settings.drums {
            for hit in drum_step(step, tpq) {
                let duration = ticks_to_duration(hit.duration_ticks, settings.bpm, tpq);
                if let Err(e) = sink.play_note(PERCUSSION_CHANNEL, hit.key, hit.velocity, duration)
                {
                    debug!("Live drum hit dropped: {}", e);
                }
            }
        }

        if settings.bass && step % STEPS_PER_BASS_NOTE == 0 {
            let degree = bass_degree(step / STEPS_PER_BASS_NOTE);
            let pitch = settings.scale.degree_to_pitch(
                degree,
                key.load(Ordering::Relaxed),
                settings.bass_octave,
            );
            let duration = ticks_to_duration(bass_duration(tpq), settings.bpm, tpq);
            if let Err(e) = sink.play_note(BASS_CHANNEL, pitch, BASS_VELOCITY, duration) {
                debug!("Live bass note dropped: {}", e);
            }
        }

        step = step.wrapping_add(1);
    }
}
