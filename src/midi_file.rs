//! Standard MIDI File (SMF) output.
//!
//! Writes format 1: a conductor track holding the tempo, then one track per
//! channel in ascending channel order. Notes are split into note-on/note-off
//! pairs and stably sorted by tick, so a note-on inserted before its own
//! note-off at the same tick stays in front of it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::theory::{NoteEvent, is_percussion};

pub const DEFAULT_TICKS_PER_QUARTER: u16 = 480;

const HEADER_MAGIC: &[u8; 4] = b"MThd";
const TRACK_MAGIC: &[u8; 4] = b"MTrk";
const FORMAT_MULTI_TRACK: u16 = 1;
const NOTE_ON: u8 = 0x90;
const NOTE_OFF: u8 = 0x80;
const PROGRAM_CHANGE: u8 = 0xC0;
const MAX_VLQ: u32 = 0x0FFF_FFFF;
const END_OF_TRACK: [u8; 3] = [0xFF, 0x2F, 0x00];

#[derive(Debug, thiserror::Error)]
pub enum ScoreError {
    #[error("Failed to write score to {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Appends `value` as a variable-length quantity: 7-bit groups, most
/// significant first, continuation bit on all but the last byte. Values past
/// the 28-bit SMF limit are clamped.
pub fn write_vlq(buf: &mut Vec<u8>, value: u32) {
    let mut value = value.min(MAX_VLQ);
    let mut bytes = [0u8; 4];
    let mut len = 0;
    loop {
        bytes[len] = (value & 0x7F) as u8;
        len += 1;
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    for i in (0..len).rev() {
        let continuation = if i > 0 { 0x80 } else { 0 };
        buf.push(bytes[i] | continuation);
    }
}

/// Reads a variable-length quantity from the front of `data`, returning the
/// value and the number of bytes consumed.
pub fn read_vlq(data: &[u8]) -> Option<(u32, usize)> {
    let mut value: u32 = 0;
    for (i, &byte) in data.iter().take(4).enumerate() {
        value = (value << 7) | (byte & 0x7F) as u32;
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

/// Microseconds per quarter note, truncated toward zero.
pub fn tempo_microseconds(bpm: f32) -> u32 {
    let micros = (60_000_000.0 / bpm as f64).trunc();
    micros.clamp(1.0, 0xFF_FFFF as f64) as u32
}

#[derive(Debug, Clone)]
pub struct SmfWriter {
    bpm: f32,
    ticks_per_quarter: u16,
    programs: BTreeMap<u8, u8>,
}

impl SmfWriter {
    pub fn new(bpm: f32, ticks_per_quarter: u16) -> Self {
        Self {
            bpm,
            ticks_per_quarter,
            programs: BTreeMap::new(),
        }
    }

    /// Assigns a program to a channel. The channel gets a track even if no
    /// note ends up on it. Programs on the percussion channel are ignored.
    pub fn with_program(mut self, channel: u8, program: u8) -> Self {
        let channel = channel & 0x0F;
        if !is_percussion(channel) {
            self.programs.insert(channel, program & 0x7F);
        }
        self
    }

    pub fn encode(&self, notes: &[NoteEvent]) -> Vec<u8> {
        let channels: BTreeSet<u8> = notes
            .iter()
            .map(|n| n.channel())
            .chain(self.programs.keys().copied())
            .collect();

        let mut out = Vec::new();
        write_header(&mut out, 1 + channels.len() as u16, self.ticks_per_quarter);
        write_chunk(&mut out, TRACK_MAGIC, &tempo_track(self.bpm));

        for channel in channels {
            let channel_notes: Vec<NoteEvent> = notes
                .iter()
                .filter(|n| n.channel() == channel)
                .copied()
                .collect();
            let program = self.programs.get(&channel).copied();
            write_chunk(
                &mut out,
                TRACK_MAGIC,
                &channel_track(channel, program, &channel_notes),
            );
        }
        out
    }

    pub fn write(&self, notes: &[NoteEvent], path: &Path) -> Result<usize, ScoreError> {
        let bytes = self.encode(notes);
        std::fs::write(path, &bytes).map_err(|source| ScoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(bytes.len())
    }
}

fn write_header(out: &mut Vec<u8>, track_count: u16, ticks_per_quarter: u16) {
    out.extend_from_slice(HEADER_MAGIC);
    out.extend_from_slice(&6u32.to_be_bytes());
    out.extend_from_slice(&FORMAT_MULTI_TRACK.to_be_bytes());
    out.extend_from_slice(&track_count.to_be_bytes());
    out.extend_from_slice(&ticks_per_quarter.to_be_bytes());
}

fn write_chunk(out: &mut Vec<u8>, magic: &[u8; 4], body: &[u8]) {
    out.extend_from_slice(magic);
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(body);
}

pub fn tempo_track(bpm: f32) -> Vec<u8> {
    let micros = tempo_microseconds(bpm);
    let mut body = Vec::new();
    write_vlq(&mut body, 0);
    body.extend_from_slice(&[
        0xFF,
        0x51,
        0x03,
        (micros >> 16) as u8,
        (micros >> 8) as u8,
        micros as u8,
    ]);
    write_vlq(&mut body, 0);
    body.extend_from_slice(&END_OF_TRACK);
    body
}

/// Body of one channel's track: optional program change at tick 0, then
/// every note as an on/off pair, then end-of-track.
pub fn channel_track(channel: u8, program: Option<u8>, notes: &[NoteEvent]) -> Vec<u8> {
    let channel = channel & 0x0F;
    let mut body = Vec::new();

    if let Some(program) = program.filter(|_| !is_percussion(channel)) {
        write_vlq(&mut body, 0);
        body.extend_from_slice(&[PROGRAM_CHANGE | channel, program & 0x7F]);
    }

    let mut messages: Vec<(u32, [u8; 3])> = Vec::with_capacity(notes.len() * 2);
    for note in notes {
        messages.push((
            note.start_tick(),
            [NOTE_ON | channel, note.pitch(), note.velocity()],
        ));
        messages.push((note.end_tick(), [NOTE_OFF | channel, note.pitch(), 0]));
    }
    // stable: equal ticks keep insertion order
    messages.sort_by_key(|&(tick, _)| tick);

    let mut last_tick = 0u32;
    for (tick, message) in messages {
        write_vlq(&mut body, tick.saturating_sub(last_tick));
        body.extend_from_slice(&message);
        last_tick = tick;
    }

    write_vlq(&mut body, 0);
    body.extend_from_slice(&END_OF_TRACK);
    body
}
