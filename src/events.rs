use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::SystemTime;

/// Lifecycle notifications from the build being sonified, in the order the
/// build produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BuildEvent {
    ProjectStarted {
        path: String,
        timestamp: SystemTime,
    },
    ProjectFinished {
        path: String,
        succeeded: bool,
        timestamp: SystemTime,
    },
    TargetStarted {
        name: String,
        project: String,
        timestamp: SystemTime,
    },
    TargetFinished {
        name: String,
        succeeded: bool,
        timestamp: SystemTime,
    },
    TaskStarted {
        name: String,
        timestamp: SystemTime,
    },
    WarningRaised {
        timestamp: SystemTime,
    },
    ErrorRaised {
        timestamp: SystemTime,
    },
    BuildFinished {
        succeeded: bool,
        timestamp: SystemTime,
    },
}

impl BuildEvent {
    pub fn timestamp(&self) -> SystemTime {
        match self {
            BuildEvent::ProjectStarted { timestamp, .. }
            | BuildEvent::ProjectFinished { timestamp, .. }
            | BuildEvent::TargetStarted { timestamp, .. }
            | BuildEvent::TargetFinished { timestamp, .. }
            | BuildEvent::TaskStarted { timestamp, .. }
            | BuildEvent::WarningRaised { timestamp }
            | BuildEvent::ErrorRaised { timestamp }
            | BuildEvent::BuildFinished { timestamp, .. } => *timestamp,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("Failed to read or write build log {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid build log: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("Failed to serialize build log: {0}")]
    Serialize(#[from] ron::Error),
}

/// A recorded build, replayable through the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildLog {
    pub events: Vec<BuildEvent>,
}

impl BuildLog {
    pub fn save(&self, path: &Path) -> Result<(), LogError> {
        let ron_string = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, ron_string).map_err(|source| LogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, LogError> {
        let ron_string = fs::read_to_string(path).map_err(|source| LogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let log: BuildLog = ron::from_str(&ron_string)?;
        Ok(log)
    }

    /// True if timestamps never go backwards.
    pub fn is_chronological(&self) -> bool {
        self.events
            .windows(2)
            .all(|pair| pair[0].timestamp() <= pair[1].timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn at(millis: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_000_000 + millis)
    }

    #[test]
    fn log_survives_a_save_and_load() {
        let log = BuildLog {
            events: vec![
                BuildEvent::ProjectStarted {
                    path: "src/Foo/Foo.csproj".into(),
                    timestamp: at(0),
                },
                BuildEvent::TaskStarted {
                    name: "Csc".into(),
                    timestamp: at(250),
                },
                BuildEvent::BuildFinished {
                    succeeded: true,
                    timestamp: at(900),
                },
            ],
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("build.ron");
        log.save(&path).unwrap();
        let loaded = BuildLog::load(&path).unwrap();
        assert_eq!(loaded, log);
        assert!(loaded.is_chronological());
    }

    #[test]
    fn detects_out_of_order_events() {
        let log = BuildLog {
            events: vec![
                BuildEvent::WarningRaised { timestamp: at(10) },
                BuildEvent::ErrorRaised { timestamp: at(5) },
            ],
        };
        assert!(!log.is_chronological());
    }
}
