use midir::{MidiOutput, MidiOutputConnection};
use tracing::info;

use super::{DeviceSink, MidiPort, PlaybackError};

const CLIENT_NAME: &str = "buildtune";

impl MidiPort for MidiOutputConnection {
    fn send(&mut self, message: &[u8]) -> Result<(), PlaybackError> {
        MidiOutputConnection::send(self, message)
            .map_err(|e| PlaybackError::SendFailed(e.to_string()))
    }
}

pub fn list_output_ports() -> Result<Vec<String>, PlaybackError> {
    let midi_out =
        MidiOutput::new(CLIENT_NAME).map_err(|e| PlaybackError::InitFailed(e.to_string()))?;

    Ok(midi_out
        .ports()
        .iter()
        .map(|p| midi_out.port_name(p).unwrap_or_default())
        .collect())
}

/// Opens the first output port whose name contains `pattern`, or the first
/// port at all when no pattern is given.
pub fn open_output(
    pattern: Option<&str>,
) -> Result<DeviceSink<MidiOutputConnection>, PlaybackError> {
    let midi_out =
        MidiOutput::new(CLIENT_NAME).map_err(|e| PlaybackError::InitFailed(e.to_string()))?;

    let ports = midi_out.ports();
    let port = match pattern {
        Some(pattern) => ports
            .iter()
            .find(|p| {
                midi_out
                    .port_name(p)
                    .map(|n| n.contains(pattern))
                    .unwrap_or(false)
            })
            .ok_or_else(|| PlaybackError::PortNotFound(pattern.to_string()))?,
        None => ports.first().ok_or(PlaybackError::NoPorts)?,
    };

    let port_name = midi_out
        .port_name(port)
        .map_err(|e| PlaybackError::ConnectionFailed(e.to_string()))?;

    let connection = midi_out
        .connect(port, "buildtune-output")
        .map_err(|e| PlaybackError::ConnectionFailed(e.to_string()))?;

    info!("Opened MIDI output: {}", port_name);
    Ok(DeviceSink::new(connection))
}
