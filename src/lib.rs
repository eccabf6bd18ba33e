//! Turns the lifecycle of a software build into music.
//!
//! Build events drive a [`Composer`] that keeps a key, a melodic position
//! and a list of timed notes. Notes sound live through a [`PlaybackSink`]
//! while the build runs, and the whole build is exported as a Standard MIDI
//! File once it finishes.

pub mod composer;
pub mod config;
pub mod engine;
pub mod events;
pub mod mapper;
pub mod midi_file;
pub mod patterns;
pub mod playback;
pub mod theory;
pub mod timing;

pub use composer::Composer;
pub use config::{ComposerSettings, ConfigError, Options};
pub use engine::{EngineCommand, EngineHandle, EngineUpdate, spawn_engine};
pub use events::{BuildEvent, BuildLog, LogError};
pub use midi_file::{ScoreError, SmfWriter};
pub use playback::{PlaybackError, PlaybackSink};
pub use theory::{Instruments, NoteEvent, Scale, ScaleKind};
