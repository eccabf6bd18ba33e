//! Real-time output of notes to a single shared MIDI device.

mod device;
mod midi_out;

use std::time::Duration;

pub use device::{DeviceSink, MidiPort};
pub use midi_out::{list_output_ports, open_output};

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("Failed to initialize MIDI: {0}")]
    InitFailed(String),

    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("No MIDI output ports available")]
    NoPorts,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Sink already disposed")]
    Disposed,
}

/// Something that can sound notes as they are composed.
///
/// Implementations are shared between the event thread and the live loop,
/// so every method takes `&self` and must serialize access to the device.
pub trait PlaybackSink: Send + Sync {
    /// Selects a program on a channel. Ignored for the percussion channel.
    fn set_instrument(&self, channel: u8, program: u8) -> Result<(), PlaybackError>;

    /// Starts a note now and releases it after `duration`.
    fn play_note(
        &self,
        channel: u8,
        pitch: u8,
        velocity: u8,
        duration: Duration,
    ) -> Result<(), PlaybackError>;

    /// Starts a note after `delay`. Sinks without a scheduler play it
    /// immediately.
    fn play_note_after(
        &self,
        delay: Duration,
        channel: u8,
        pitch: u8,
        velocity: u8,
        duration: Duration,
    ) -> Result<(), PlaybackError> {
        let _ = delay;
        self.play_note(channel, pitch, velocity, duration)
    }

    /// Silences everything still sounding and releases the device.
    fn dispose(&self);
}
