use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::midi_file::DEFAULT_TICKS_PER_QUARTER;
use crate::theory::{Instruments, ScaleKind};

/// Slowest tempo accepted by [`Options::validate`].
pub const MIN_BPM: f32 = 1.0;
/// Slowest replay speed accepted by [`Options::validate`].
pub const MIN_SPEED: f32 = 0.01;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read or write {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] ron::Error),
}

/// Melodic behaviour of the composer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerSettings {
    /// Minimum distance between accepted melody notes. `None` means one
    /// quarter note.
    pub min_melody_spacing_ticks: Option<u32>,
    /// Largest scale-degree leap a target may cause.
    pub max_step: i32,
    /// Only every Nth task start is considered for a melody note.
    pub task_thinning: u32,
    pub snap_targets_to_half_notes: bool,
    pub snap_to_chord_tones: bool,
}

impl Default for ComposerSettings {
    fn default() -> Self {
        Self {
            min_melody_spacing_ticks: None,
            max_step: 2,
            task_thinning: 4,
            snap_targets_to_half_notes: true,
            snap_to_chord_tones: true,
        }
    }
}

impl ComposerSettings {
    pub fn min_melody_spacing(&self, ticks_per_quarter: u32) -> u32 {
        self.min_melody_spacing_ticks.unwrap_or(ticks_per_quarter)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub bpm: f32,
    pub ticks_per_quarter: u16,
    pub scale: ScaleKind,
    pub base_octave: u8,
    pub instruments: Instruments,
    pub drums: bool,
    pub bass: bool,
    /// Sleep between events for the wall-clock gap they arrived with.
    pub pacing: bool,
    /// Divides paced sleeps; 2.0 replays twice as fast.
    pub speed: f32,
    pub output: Option<PathBuf>,
    pub composer: ComposerSettings,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            ticks_per_quarter: DEFAULT_TICKS_PER_QUARTER,
            scale: ScaleKind::default(),
            base_octave: 5,
            instruments: Instruments::default(),
            drums: true,
            bass: true,
            pacing: false,
            speed: 1.0,
            output: None,
            composer: ComposerSettings::default(),
        }
    }
}

impl Options {
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let ron_string = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, ron_string).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ron_string = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let options: Options = ron::from_str(&ron_string)?;
        Ok(options)
    }

    /// Replaces every out-of-range value with its default and returns the
    /// names of the fields that were replaced.
    pub fn validate(&mut self) -> Vec<&'static str> {
        let defaults = Options::default();
        let mut replaced = Vec::new();

        if !self.bpm.is_finite() || self.bpm < MIN_BPM {
            self.bpm = defaults.bpm;
            replaced.push("bpm");
        }
        if self.ticks_per_quarter == 0
            || self.ticks_per_quarter % 4 != 0
            || self.ticks_per_quarter > 0x7FFF
        {
            self.ticks_per_quarter = defaults.ticks_per_quarter;
            replaced.push("ticks_per_quarter");
        }
        if self.base_octave > 9 {
            self.base_octave = defaults.base_octave;
            replaced.push("base_octave");
        }
        if !self.speed.is_finite() || self.speed < MIN_SPEED {
            self.speed = defaults.speed;
            replaced.push("speed");
        }

        let default_instruments = Instruments::default();
        if self.instruments.melody > 127 {
            self.instruments.melody = default_instruments.melody;
            replaced.push("instruments.melody");
        }
        if self.instruments.harmony > 127 {
            self.instruments.harmony = default_instruments.harmony;
            replaced.push("instruments.harmony");
        }
        if self.instruments.bass > 127 {
            self.instruments.bass = default_instruments.bass;
            replaced.push("instruments.bass");
        }

        if self.composer.max_step <= 0 {
            self.composer.max_step = defaults.composer.max_step;
            replaced.push("composer.max_step");
        }
        if self.composer.task_thinning == 0 {
            self.composer.task_thinning = defaults.composer.task_thinning;
            replaced.push("composer.task_thinning");
        }

        for field in &replaced {
            warn!("Config value for {} is out of range, using default", field);
        }
        replaced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let options: Options = ron::from_str("(bpm: 96.0, scale: Pentatonic, drums: false)").unwrap();
        assert_eq!(options.bpm, 96.0);
        assert_eq!(options.scale, ScaleKind::Pentatonic);
        assert!(!options.drums);
        assert!(options.bass);
        assert_eq!(options.ticks_per_quarter, 480);
        assert_eq!(options.instruments, Instruments::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buildtune.ron");
        let options = Options {
            bpm: 100.0,
            scale: ScaleKind::Blues,
            output: Some(PathBuf::from("build.mid")),
            ..Options::default()
        };
        options.save(&path).unwrap();
        assert_eq!(Options::load(&path).unwrap(), options);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = Options::load(Path::new("/nonexistent/buildtune.ron")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn unknown_scale_is_a_parse_error() {
        let err = ron::from_str::<Options>("(scale: Lydian)").map_err(ConfigError::from);
        assert!(matches!(err, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn validate_replaces_bad_values() {
        let mut options = Options {
            bpm: -3.0,
            ticks_per_quarter: 97,
            base_octave: 12,
            speed: 0.0,
            instruments: Instruments {
                melody: 200,
                harmony: 48,
                bass: 33,
            },
            ..Options::default()
        };
        options.composer.task_thinning = 0;

        let replaced = options.validate();
        assert_eq!(
            replaced,
            vec![
                "bpm",
                "ticks_per_quarter",
                "base_octave",
                "speed",
                "instruments.melody",
                "composer.task_thinning"
            ]
        );
        assert_eq!(options.bpm, 120.0);
        assert_eq!(options.ticks_per_quarter, 480);
        assert_eq!(options.base_octave, 5);
        assert_eq!(options.instruments.melody, 0);
        assert_eq!(options.composer.task_thinning, 4);
    }

    #[test]
    fn vanishing_tempo_and_speed_are_replaced() {
        let mut options = Options {
            bpm: 1e-30,
            speed: 1e-30,
            pacing: true,
            ..Options::default()
        };
        assert_eq!(options.validate(), vec!["bpm", "speed"]);
        assert_eq!(options.bpm, 120.0);
        assert_eq!(options.speed, 1.0);

        let mut slow = Options {
            bpm: MIN_BPM,
            speed: MIN_SPEED,
            ..Options::default()
        };
        assert!(slow.validate().is_empty());
    }

    #[test]
    fn valid_config_is_untouched() {
        let mut options = Options::default();
        assert!(options.validate().is_empty());
        assert_eq!(options, Options::default());
    }
}
