use std::time::{Duration, SystemTime};

use crate::mapper;

/// Converts wall-clock build time into score ticks.
///
/// The build start is latched by the first event that reaches the clock and
/// serves as tick 0 for the rest of the build.
#[derive(Debug, Clone)]
pub struct TickClock {
    bpm: f32,
    ticks_per_quarter: u32,
    build_start: Option<SystemTime>,
}

impl TickClock {
    pub fn new(bpm: f32, ticks_per_quarter: u32) -> Self {
        Self {
            bpm,
            ticks_per_quarter,
            build_start: None,
        }
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    pub fn ticks_per_quarter(&self) -> u32 {
        self.ticks_per_quarter
    }

    /// Returns true if this call set the build start.
    pub fn latch(&mut self, timestamp: SystemTime) -> bool {
        if self.build_start.is_some() {
            return false;
        }
        self.build_start = Some(timestamp);
        true
    }

    pub fn tick_at(&self, timestamp: SystemTime) -> u32 {
        match self.build_start {
            Some(start) => {
                mapper::timestamp_to_tick(timestamp, start, self.bpm, self.ticks_per_quarter)
            }
            None => 0,
        }
    }

    pub fn sixteenth(&self) -> u32 {
        self.ticks_per_quarter / 4
    }

    pub fn eighth(&self) -> u32 {
        self.ticks_per_quarter / 2
    }

    pub fn beats(&self, beats: u32) -> u32 {
        self.ticks_per_quarter.saturating_mul(beats)
    }

    /// Rounds to the nearest half note (two quarters).
    pub fn snap_to_half_note(&self, tick: u32) -> u32 {
        let half = self.beats(2).max(1) as u64;
        let snapped = (tick as u64 + half / 2) / half * half;
        snapped.min(u32::MAX as u64) as u32
    }

    pub fn ticks_to_duration(&self, ticks: u32) -> Duration {
        ticks_to_duration(ticks, self.bpm, self.ticks_per_quarter)
    }
}

pub fn ticks_to_duration(ticks: u32, bpm: f32, ticks_per_quarter: u32) -> Duration {
    let seconds_per_quarter = 60.0 / bpm as f64;
    Duration::try_from_secs_f64(ticks as f64 / ticks_per_quarter as f64 * seconds_per_quarter)
        .unwrap_or(Duration::MAX)
}
