use serde::{Deserialize, Serialize};

pub const MELODY_CHANNEL: u8 = 0;
pub const HARMONY_CHANNEL: u8 = 1;
pub const BASS_CHANNEL: u8 = 2;
/// General MIDI reserves channel 10 (index 9) for drum kits.
pub const PERCUSSION_CHANNEL: u8 = 9;

/// General MIDI percussion keys used by the composer and pattern generator.
pub mod drums {
    pub const KICK: u8 = 36;
    pub const SNARE: u8 = 38;
    pub const LOW_FLOOR_TOM: u8 = 41;
    pub const CLOSED_HAT: u8 = 42;
    pub const OPEN_HAT: u8 = 46;
    pub const CRASH: u8 = 49;
}

/// General MIDI program numbers for the three pitched voices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Instruments {
    pub melody: u8,
    pub harmony: u8,
    pub bass: u8,
}

impl Default for Instruments {
    fn default() -> Self {
        Self {
            // Acoustic Grand Piano
            melody: 0,
            // String Ensemble 1
            harmony: 48,
            // Electric Bass (finger)
            bass: 33,
        }
    }
}

impl Instruments {
    /// Channel/program pairs in channel order.
    pub fn assignments(&self) -> [(u8, u8); 3] {
        [
            (MELODY_CHANNEL, self.melody),
            (HARMONY_CHANNEL, self.harmony),
            (BASS_CHANNEL, self.bass),
        ]
    }
}

pub fn is_percussion(channel: u8) -> bool {
    channel == PERCUSSION_CHANNEL
}
