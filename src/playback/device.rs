use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{PlaybackError, PlaybackSink};
use crate::theory::is_percussion;

const NOTE_ON: u8 = 0x90;
const NOTE_OFF: u8 = 0x80;
const CONTROL_CHANGE: u8 = 0xB0;
const PROGRAM_CHANGE: u8 = 0xC0;
const ALL_SOUND_OFF: u8 = 120;
const ALL_NOTES_OFF: u8 = 123;

/// Raw byte output to a MIDI device.
pub trait MidiPort: Send + 'static {
    fn send(&mut self, message: &[u8]) -> Result<(), PlaybackError>;
}

type Pending = Reverse<(Instant, u64, [u8; 3])>;

/// A [`PlaybackSink`] over one device port.
///
/// Every write goes through a single lock. Note-offs and delayed note-ons
/// are handed to a timer thread and never awaited; if the sink is disposed
/// before they fire, the all-notes-off sweep in [`PlaybackSink::dispose`]
/// silences whatever was left hanging.
pub struct DeviceSink<P: MidiPort> {
    port: Arc<Mutex<P>>,
    timer_tx: Sender<Pending>,
    disposed: Arc<AtomicBool>,
    sequence: AtomicU64,
}

impl<P: MidiPort> DeviceSink<P> {
    pub fn new(port: P) -> Self {
        let port = Arc::new(Mutex::new(port));
        let disposed = Arc::new(AtomicBool::new(false));
        let (timer_tx, timer_rx) = crossbeam::channel::unbounded();

        let timer_port = port.clone();
        let timer_disposed = disposed.clone();
        let spawned = std::thread::Builder::new()
            .name("buildtune-note-timer".into())
            .spawn(move || note_timer(timer_port, timer_rx, timer_disposed));
        if let Err(e) = spawned {
            warn!("Failed to start note timer, note-offs will be lost: {}", e);
        }

        Self {
            port,
            timer_tx,
            disposed,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// The disposed flag is read under the port lock, so nothing can slip
    /// in after the all-notes-off sweep.
    fn send_now(&self, message: &[u8]) -> Result<(), PlaybackError> {
        let mut port = self.port.lock();
        if self.is_disposed() {
            return Err(PlaybackError::Disposed);
        }
        port.send(message)
    }

    fn schedule(&self, due: Instant, message: [u8; 3]) {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        // the timer only goes away when the sink does
        let _ = self.timer_tx.send(Reverse((due, seq, message)));
    }
}

impl<P: MidiPort> PlaybackSink for DeviceSink<P> {
    fn set_instrument(&self, channel: u8, program: u8) -> Result<(), PlaybackError> {
        if is_percussion(channel) {
            return Ok(());
        }
        self.send_now(&[PROGRAM_CHANGE | (channel & 0x0F), program & 0x7F])
    }

    fn play_note(
        &self,
        channel: u8,
        pitch: u8,
        velocity: u8,
        duration: Duration,
    ) -> Result<(), PlaybackError> {
        let channel = channel & 0x0F;
        self.send_now(&[NOTE_ON | channel, pitch & 0x7F, velocity & 0x7F])?;
        self.schedule(
            after(duration),
            [NOTE_OFF | channel, pitch & 0x7F, 0],
        );
        Ok(())
    }

    fn play_note_after(
        &self,
        delay: Duration,
        channel: u8,
        pitch: u8,
        velocity: u8,
        duration: Duration,
    ) -> Result<(), PlaybackError> {
        if delay.is_zero() {
            return self.play_note(channel, pitch, velocity, duration);
        }
        if self.is_disposed() {
            return Err(PlaybackError::Disposed);
        }
        let channel = channel & 0x0F;
        let start = after(delay);
        let end = start.checked_add(duration).unwrap_or(start);
        self.schedule(start, [NOTE_ON | channel, pitch & 0x7F, velocity & 0x7F]);
        self.schedule(end, [NOTE_OFF | channel, pitch & 0x7F, 0]);
        Ok(())
    }

    fn dispose(&self) {
        let mut port = self.port.lock();
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        for channel in 0..16u8 {
            for controller in [ALL_NOTES_OFF, ALL_SOUND_OFF] {
                if let Err(e) = port.send(&[CONTROL_CHANGE | channel, controller, 0]) {
                    warn!("Failed to silence channel {}: {}", channel, e);
                }
            }
        }
        info!("Playback device silenced");
    }
}

impl<P: MidiPort> Drop for DeviceSink<P> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// `now + delay`, pinned to now when the sum is not representable.
fn after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay).unwrap_or(now)
}

fn note_timer<P: MidiPort>(
    port: Arc<Mutex<P>>,
    timer_rx: Receiver<Pending>,
    disposed: Arc<AtomicBool>,
) {
    let mut pending: BinaryHeap<Pending> = BinaryHeap::new();

    loop {
        let next_due = pending.peek().map(|Reverse((due, _, _))| *due);
        let received = match next_due {
            Some(due) => timer_rx.recv_deadline(due),
            None => timer_rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(item) => {
                pending.push(item);
                pending.extend(timer_rx.try_iter());
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let now = Instant::now();
        while let Some(Reverse((due, _, message))) = pending.peek().copied() {
            if due > now {
                break;
            }
            pending.pop();
            let mut guard = port.lock();
            if disposed.load(Ordering::Acquire) {
                continue;
            }
            if let Err(e) = guard.send(&message) {
                warn!("Scheduled MIDI send failed: {}", e);
            }
        }
    }

    debug!("Note timer exited with {} pending messages", pending.len());
}
