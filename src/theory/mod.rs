mod instrument;
mod note;
mod scale;

pub use instrument::{
    BASS_CHANNEL, HARMONY_CHANNEL, Instruments, MELODY_CHANNEL, PERCUSSION_CHANNEL, drums,
    is_percussion,
};
pub use note::NoteEvent;
pub use scale::{Scale, ScaleKind, snap_to_chord_tone};
