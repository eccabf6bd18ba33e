//! The event-to-music state machine.
//!
//! One `Composer` lives for exactly one build. It is driven from a single
//! thread, one build event at a time, and accumulates every note it writes
//! so the whole build can be exported as a score once it finishes. Notes are
//! also forwarded to the playback sink as they are composed.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use crate::config::{ComposerSettings, Options};
use crate::events::BuildEvent;
use crate::mapper;
use crate::midi_file::{ScoreError, SmfWriter};
use crate::patterns;
use crate::playback::PlaybackSink;
use crate::theory::{
    HARMONY_CHANNEL, Instruments, MELODY_CHANNEL, NoteEvent, PERCUSSION_CHANNEL, Scale, drums,
    snap_to_chord_tone,
};
use crate::timing::{DEFAULT_STOP_TIMEOUT, KeyTimeline, LiveLoop, LoopSettings, TickClock};

const VELOCITY_SOFT: i32 = 50;
const VELOCITY_LIGHT: i32 = 60;
const VELOCITY_MEDIUM: i32 = 80;
const VELOCITY_ACCENT: i32 = 90;
const VELOCITY_LOUD: i32 = 110;
const VELOCITY_MAX: i32 = 127;

const PROJECT_CHORD: [i32; 3] = [0, 2, 4];
const RESOLVING_CHORD: [i32; 4] = [0, 2, 4, 7];
const DISSONANT_CLUSTER: [i32; 3] = [0, 1, -1];
/// Task steps wrap inside one seven-degree window.
const TASK_WINDOW: i32 = 7;

const PROJECT_CHORD_BEATS: u32 = 16;
const FAILURE_NOTE_BEATS: u32 = 8;
const CLOSING_BEATS: u32 = 4;

pub struct Composer {
    settings: ComposerSettings,
    scale: Scale,
    instruments: Instruments,
    melody_octave: u8,
    harmony_octave: u8,
    bass_octave: u8,
    drums_enabled: bool,
    bass_enabled: bool,
    clock: TickClock,
    sink: Option<Arc<dyn PlaybackSink>>,

    current_degree: i32,
    current_key: Arc<AtomicU8>,
    key_timeline: KeyTimeline,
    project_keys: HashMap<String, u8>,
    last_melody_tick: Option<u32>,
    task_count: u64,
    instruments_ready: bool,
    target_starts: HashMap<String, SystemTime>,
    notes: Vec<NoteEvent>,

    live_loop: Option<LiveLoop>,
    live_loop_requested: bool,
    finished: bool,
}

impl Composer {
    pub fn new(options: &Options, sink: Option<Arc<dyn PlaybackSink>>) -> Self {
        let octave = options.base_octave;
        Self {
            settings: options.composer.clone(),
            scale: Scale::new(options.scale),
            instruments: options.instruments,
            melody_octave: octave,
            harmony_octave: octave.saturating_sub(1),
            bass_octave: octave.saturating_sub(2),
            drums_enabled: options.drums,
            bass_enabled: options.bass,
            clock: TickClock::new(options.bpm, options.ticks_per_quarter as u32),
            sink,
            current_degree: 0,
            current_key: Arc::new(AtomicU8::new(0)),
            key_timeline: KeyTimeline::new(0),
            project_keys: HashMap::new(),
            last_melody_tick: None,
            task_count: 0,
            instruments_ready: false,
            target_starts: HashMap::new(),
            notes: Vec::new(),
            live_loop: None,
            live_loop_requested: false,
            finished: false,
        }
    }

    pub fn handle(&mut self, event: &BuildEvent) {
        match event {
            BuildEvent::ProjectStarted { path, timestamp } => {
                self.project_started(path, *timestamp)
            }
            BuildEvent::ProjectFinished {
                path,
                succeeded,
                timestamp,
            } => self.project_finished(path, *succeeded, *timestamp),
            BuildEvent::TargetStarted {
                name, timestamp, ..
            } => self.target_started(name, *timestamp),
            BuildEvent::TargetFinished {
                name,
                succeeded,
                timestamp,
            } => self.target_finished(name, *succeeded, *timestamp),
            BuildEvent::TaskStarted { name, timestamp } => self.task_started(name, *timestamp),
            BuildEvent::WarningRaised { timestamp } => self.warning_raised(*timestamp),
            BuildEvent::ErrorRaised { timestamp } => self.error_raised(*timestamp),
            BuildEvent::BuildFinished {
                succeeded,
                timestamp,
            } => self.build_finished(*succeeded, *timestamp),
        }
    }

    pub fn project_started(&mut self, path: &str, timestamp: SystemTime) {
        if self.clock.latch(timestamp) {
            info!("Build started, scoring in {:?}", self.scale.kind);
        }
        let tick = self.clock.tick_at(timestamp);
        self.ensure_instruments();

        let key = mapper::project_to_key(path);
        self.key_timeline.push(tick, key);
        self.current_key.store(key, Ordering::Relaxed);
        self.project_keys.insert(path.to_string(), key);
        info!("Project {} started in key {} at tick {}", path, key, tick);

        let duration = self.clock.beats(PROJECT_CHORD_BEATS);
        for degree in PROJECT_CHORD {
            let pitch = self.scale.degree_to_pitch(degree, key, self.harmony_octave);
            self.emit(
                NoteEvent::new(pitch as i32, VELOCITY_SOFT, HARMONY_CHANNEL, tick, duration),
                0,
            );
        }
        self.current_degree = 0;

        self.ensure_live_loop();
    }

    pub fn project_finished(&mut self, path: &str, succeeded: bool, timestamp: SystemTime) {
        let tick = self.tick_for(timestamp);
        if succeeded {
            debug!("Project {} finished", path);
            return;
        }

        let key = self.project_keys.get(path).copied().unwrap_or_else(|| self.key());
        info!("Project {} failed at tick {}", path, tick);
        let pitch = self
            .scale
            .degree_to_pitch(-1, key, self.harmony_octave.saturating_sub(1));
        let duration = self.clock.beats(FAILURE_NOTE_BEATS);
        self.emit(
            NoteEvent::new(pitch as i32, VELOCITY_LOUD, HARMONY_CHANNEL, tick, duration),
            0,
        );
    }

    pub fn target_started(&mut self, name: &str, timestamp: SystemTime) {
        let mut tick = self.tick_for(timestamp);
        if self.settings.snap_targets_to_half_notes {
            tick = self.clock.snap_to_half_note(tick);
        }
        self.target_starts.insert(name.to_string(), timestamp);

        if !self.melody_spacing_allows(tick) {
            debug!("Target {} at tick {} too close to last melody note", name, tick);
            return;
        }

        let target = mapper::target_to_degree(name);
        let max_step = self.settings.max_step;
        let distance = target - self.current_degree;
        let step = if distance.abs() <= max_step {
            distance
        } else {
            max_step * distance.signum()
        };

        let mut degree = self.current_degree + step;
        let beats = if self.settings.snap_to_chord_tones {
            degree = snap_to_chord_tone(degree);
            2
        } else {
            1
        };
        self.current_degree = degree;

        let duration = self.clock.beats(beats);
        self.melody_note(degree, VELOCITY_MEDIUM, tick, duration);
        self.last_melody_tick = Some(tick);
    }

    pub fn target_finished(&mut self, name: &str, succeeded: bool, timestamp: SystemTime) {
        let tick = self.tick_for(timestamp);
        if let Some(started) = self.target_starts.remove(name) {
            let elapsed = timestamp.duration_since(started).unwrap_or_default();
            debug!("Target {} took {:?}", name, elapsed);
        }
        if succeeded {
            return;
        }

        // failures always sound, regardless of spacing
        self.current_degree -= 1;
        let duration = self.clock.eighth();
        self.melody_note(self.current_degree, VELOCITY_LOUD, tick, duration);
    }

    pub fn task_started(&mut self, name: &str, timestamp: SystemTime) {
        self.task_count += 1;
        let tick = self.tick_for(timestamp);
        if self.task_count % self.settings.task_thinning.max(1) as u64 != 0 {
            return;
        }
        if !self.melody_spacing_allows(tick) {
            debug!("Task {} at tick {} too close to last melody note", name, tick);
            return;
        }

        let direction = if mapper::task_to_offset(name) >= 3 { 1 } else { -1 };
        self.current_degree = (self.current_degree + direction).rem_euclid(TASK_WINDOW);

        let duration = self.clock.eighth();
        self.melody_note(self.current_degree, VELOCITY_LIGHT, tick, duration);
        self.last_melody_tick = Some(tick);
    }

    pub fn warning_raised(&mut self, timestamp: SystemTime) {
        let tick = self.tick_for(timestamp);
        let duration = self.clock.sixteenth();
        self.emit(
            NoteEvent::new(
                drums::OPEN_HAT as i32,
                VELOCITY_ACCENT,
                PERCUSSION_CHANNEL,
                tick,
                duration,
            ),
            0,
        );
    }

    pub fn error_raised(&mut self, timestamp: SystemTime) {
        let tick = self.tick_for(timestamp);
        let crash = self.clock.beats(1);
        let hit = self.clock.eighth();
        self.emit(
            NoteEvent::new(
                drums::CRASH as i32,
                VELOCITY_MAX,
                PERCUSSION_CHANNEL,
                tick,
                crash,
            ),
            0,
        );
        self.emit(
            NoteEvent::new(
                drums::LOW_FLOOR_TOM as i32,
                VELOCITY_LOUD,
                PERCUSSION_CHANNEL,
                tick,
                hit,
            ),
            0,
        );
    }

    pub fn build_finished(&mut self, succeeded: bool, timestamp: SystemTime) {
        let tick = self.tick_for(timestamp);
        self.stop_live_loop();

        let tpq = self.clock.ticks_per_quarter();
        if self.drums_enabled {
            self.notes.extend(patterns::drum_pattern(tick, tpq));
        }
        if self.bass_enabled {
            self.notes.extend(patterns::bass_line(
                tick,
                tpq,
                &self.key_timeline,
                &self.scale,
                self.bass_octave,
            ));
        }

        let budget = self.clock.beats(CLOSING_BEATS);
        if succeeded {
            self.arpeggiate(&RESOLVING_CHORD, tick, budget, VELOCITY_LOUD);
        } else {
            self.arpeggiate(&DISSONANT_CLUSTER, tick, budget, VELOCITY_LOUD);
            self.emit(
                NoteEvent::new(
                    drums::CRASH as i32,
                    VELOCITY_MAX,
                    PERCUSSION_CHANNEL,
                    tick,
                    budget,
                ),
                0,
            );
        }

        self.finished = true;
        info!(
            "Build {} at tick {} with {} notes",
            if succeeded { "succeeded" } else { "failed" },
            tick,
            self.notes.len()
        );
    }

    /// Stops the live loop, waiting a bounded time for it.
    pub fn shutdown(&mut self) {
        self.stop_live_loop();
    }

    pub fn notes(&self) -> &[NoteEvent] {
        &self.notes
    }

    pub fn key_timeline(&self) -> &KeyTimeline {
        &self.key_timeline
    }

    pub fn key(&self) -> u8 {
        self.current_key.load(Ordering::Relaxed)
    }

    pub fn current_degree(&self) -> i32 {
        self.current_degree
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn live_loop_running(&self) -> bool {
        self.live_loop.as_ref().is_some_and(|l| l.is_running())
    }

    /// Wall-clock length of the closing gesture.
    pub fn ring_out(&self) -> Duration {
        self.clock.ticks_to_duration(self.clock.beats(CLOSING_BEATS))
    }

    pub fn smf_writer(&self) -> SmfWriter {
        let mut writer = SmfWriter::new(self.clock.bpm(), self.clock.ticks_per_quarter() as u16);
        for (channel, program) in self.instruments.assignments() {
            writer = writer.with_program(channel, program);
        }
        writer
    }

    pub fn to_smf(&self) -> Vec<u8> {
        self.smf_writer().encode(&self.notes)
    }

    pub fn write_score(&self, path: &Path) -> Result<usize, ScoreError> {
        let written = self.smf_writer().write(&self.notes, path)?;
        info!("Wrote {} bytes of score to {}", written, path.display());
        Ok(written)
    }

    fn tick_for(&mut self, timestamp: SystemTime) -> u32 {
        self.clock.latch(timestamp);
        self.clock.tick_at(timestamp)
    }

    fn melody_spacing_allows(&self, tick: u32) -> bool {
        let spacing = self
            .settings
            .min_melody_spacing(self.clock.ticks_per_quarter());
        match self.last_melody_tick {
            None => true,
            Some(last) => tick.checked_sub(last).is_some_and(|gap| gap >= spacing),
        }
    }

    fn melody_note(&mut self, degree: i32, velocity: i32, tick: u32, duration: u32) {
        let pitch = self
            .scale
            .degree_to_pitch(degree, self.key(), self.melody_octave);
        self.emit(
            NoteEvent::new(pitch as i32, velocity, MELODY_CHANNEL, tick, duration),
            0,
        );
    }

    /// One melody note per degree, a sixteenth apart, each ringing a
    /// sixteenth less than the one before it.
    fn arpeggiate(&mut self, degrees: &[i32], base_tick: u32, budget: u32, velocity: i32) {
        let spacing = self.clock.sixteenth();
        let floor = spacing.max(1);
        let key = self.key();
        for (i, &degree) in degrees.iter().enumerate() {
            let offset = spacing * i as u32;
            let duration = budget.saturating_sub(offset).max(floor);
            let pitch = self.scale.degree_to_pitch(degree, key, self.melody_octave);
            self.emit(
                NoteEvent::new(
                    pitch as i32,
                    velocity,
                    MELODY_CHANNEL,
                    base_tick.saturating_add(offset),
                    duration,
                ),
                offset,
            );
        }
    }

    /// Records a note and sounds it, `delay_ticks` from now.
    fn emit(&mut self, note: NoteEvent, delay_ticks: u32) {
        debug!(
            "Note ch={} pitch={} vel={} at {} for {}",
            note.channel(),
            note.pitch(),
            note.velocity(),
            note.start_tick(),
            note.duration_ticks()
        );
        self.notes.push(note);

        if let Some(sink) = &self.sink {
            let delay = self.clock.ticks_to_duration(delay_ticks);
            let duration = self.clock.ticks_to_duration(note.duration_ticks());
            if let Err(e) = sink.play_note_after(
                delay,
                note.channel(),
                note.pitch(),
                note.velocity(),
                duration,
            ) {
                warn!("Playback failed: {}", e);
            }
        }
    }

    fn ensure_instruments(&mut self) {
        if self.instruments_ready {
            return;
        }
        self.instruments_ready = true;
        let Some(sink) = &self.sink else {
            return;
        };
        for (channel, program) in self.instruments.assignments() {
            if let Err(e) = sink.set_instrument(channel, program) {
                warn!("Failed to set instrument on channel {}: {}", channel, e);
            }
        }
    }

    fn ensure_live_loop(&mut self) {
        if self.live_loop_requested {
            return;
        }
        self.live_loop_requested = true;
        if !(self.drums_enabled || self.bass_enabled) {
            return;
        }
        let Some(sink) = &self.sink else {
            return;
        };

        let settings = LoopSettings {
            bpm: self.clock.bpm(),
            ticks_per_quarter: self.clock.ticks_per_quarter(),
            scale: self.scale.clone(),
            bass_octave: self.bass_octave,
            drums: self.drums_enabled,
            bass: self.bass_enabled,
        };
        match LiveLoop::start(sink.clone(), self.current_key.clone(), settings) {
            Ok(live_loop) => self.live_loop = Some(live_loop),
            Err(e) => warn!("Failed to start live backing loop: {}", e),
        }
    }

    fn stop_live_loop(&mut self) {
        if let Some(mut live_loop) = self.live_loop.take() {
            live_loop.stop(DEFAULT_STOP_TIMEOUT);
        }
    }
}
