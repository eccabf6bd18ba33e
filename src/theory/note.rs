/// A single sounded note on the score's tick timeline.
///
/// Pitch and velocity are clamped into the MIDI data range on construction,
/// and the channel is masked to four bits, so anything downstream may write
/// the values straight into a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    pitch: u8,
    velocity: u8,
    channel: u8,
    start_tick: u32,
    duration_ticks: u32,
}

impl NoteEvent {
    pub fn new(
        pitch: i32,
        velocity: i32,
        channel: u8,
        start_tick: u32,
        duration_ticks: u32,
    ) -> Self {
        Self {
            pitch: pitch.clamp(0, 127) as u8,
            velocity: velocity.clamp(0, 127) as u8,
            channel: channel & 0x0F,
            start_tick,
            duration_ticks,
        }
    }

    pub fn pitch(&self) -> u8 {
        self.pitch
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn start_tick(&self) -> u32 {
        self.start_tick
    }

    pub fn duration_ticks(&self) -> u32 {
        self.duration_ticks
    }

    pub fn end_tick(&self) -> u32 {
        self.start_tick.saturating_add(self.duration_ticks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_out_of_range_values() {
        let note = NoteEvent::new(300, -5, 0, 0, 10);
        assert_eq!(note.pitch(), 127);
        assert_eq!(note.velocity(), 0);

        let note = NoteEvent::new(-12, 200, 17, 5, 10);
        assert_eq!(note.pitch(), 0);
        assert_eq!(note.velocity(), 127);
        assert_eq!(note.channel(), 1);
        assert_eq!(note.end_tick(), 15);
    }
}
