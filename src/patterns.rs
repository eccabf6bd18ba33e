//! Backing material generated after the fact for the whole build length.
//!
//! The live loop plays the same grid in real time, so both share
//! [`drum_step`] and [`bass_degree`].

use crate::theory::{BASS_CHANNEL, NoteEvent, PERCUSSION_CHANNEL, Scale, drums};
use crate::timing::KeyTimeline;

/// Eighth-note steps per 4/4 bar.
pub const STEPS_PER_BAR: u32 = 8;
/// Eighth-note steps per bass note.
pub const STEPS_PER_BASS_NOTE: u32 = 4;

const KICK_VELOCITY: u8 = 100;
const SNARE_VELOCITY: u8 = 96;
const HAT_ACCENT_VELOCITY: u8 = 84;
const HAT_VELOCITY: u8 = 56;
const BASS_VELOCITY: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrumHit {
    pub key: u8,
    pub velocity: u8,
    pub duration_ticks: u32,
}

/// Hits for one eighth-note step of the groove.
pub fn drum_step(step: u32, ticks_per_quarter: u32) -> Vec<DrumHit> {
    let eighth = ticks_per_quarter / 2;
    let position = step % STEPS_PER_BAR;
    let on_beat = position % 2 == 0;

    let mut hits = Vec::with_capacity(3);
    if on_beat {
        hits.push(DrumHit {
            key: drums::KICK,
            velocity: KICK_VELOCITY,
            duration_ticks: eighth,
        });
    }
    // beats 2 and 4
    if position == 2 || position == 6 {
        hits.push(DrumHit {
            key: drums::SNARE,
            velocity: SNARE_VELOCITY,
            duration_ticks: eighth,
        });
    }
    let (velocity, duration_ticks) = if on_beat {
        (HAT_ACCENT_VELOCITY, eighth / 2)
    } else {
        (HAT_VELOCITY, eighth)
    };
    hits.push(DrumHit {
        key: drums::CLOSED_HAT,
        velocity,
        duration_ticks,
    });
    hits
}

/// Root on even half notes, fifth on odd ones.
pub fn bass_degree(half_note_index: u32) -> i32 {
    if half_note_index % 2 == 0 { 0 } else { 4 }
}

/// Articulated length of a bass note: a half note minus a thirty-second.
pub fn bass_duration(ticks_per_quarter: u32) -> u32 {
    ticks_per_quarter * 2 - ticks_per_quarter / 8
}

pub fn drum_pattern(end_tick: u32, ticks_per_quarter: u32) -> Vec<NoteEvent> {
    let eighth = (ticks_per_quarter / 2).max(1);
    let mut notes = Vec::new();
    let mut step = 0u32;
    while let Some(tick) = step.checked_mul(eighth).filter(|&t| t < end_tick) {
        for hit in drum_step(step, ticks_per_quarter) {
            notes.push(NoteEvent::new(
                hit.key as i32,
                hit.velocity as i32,
                PERCUSSION_CHANNEL,
                tick,
                hit.duration_ticks,
            ));
        }
        step += 1;
    }
    notes
}

pub fn bass_line(
    end_tick: u32,
    ticks_per_quarter: u32,
    timeline: &KeyTimeline,
    scale: &Scale,
    octave: u8,
) -> Vec<NoteEvent> {
    let half = (ticks_per_quarter * 2).max(1);
    let duration = bass_duration(ticks_per_quarter);
    let mut notes = Vec::new();
    let mut index = 0u32;
    while let Some(tick) = index.checked_mul(half).filter(|&t| t < end_tick) {
        let key = timeline.key_at(tick);
        let pitch = scale.degree_to_pitch(bass_degree(index), key, octave);
        notes.push(NoteEvent::new(
            pitch as i32,
            BASS_VELOCITY as i32,
            BASS_CHANNEL,
            tick,
            duration,
        ));
        index += 1;
    }
    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theory::ScaleKind;

    fn hits_at(notes: &[NoteEvent], tick: u32) -> Vec<u8> {
        notes
            .iter()
            .filter(|n| n.start_tick() == tick)
            .map(|n| n.pitch())
            .collect()
    }

    #[test]
    fn one_bar_of_drums() {
        let notes = drum_pattern(480 * 4, 480);
        assert_eq!(hits_at(&notes, 0), vec![drums::KICK, drums::CLOSED_HAT]);
        assert_eq!(hits_at(&notes, 240), vec![drums::CLOSED_HAT]);
        assert_eq!(
            hits_at(&notes, 480),
            vec![drums::KICK, drums::SNARE, drums::CLOSED_HAT]
        );
        assert_eq!(
            hits_at(&notes, 1440),
            vec![drums::KICK, drums::SNARE, drums::CLOSED_HAT]
        );
        assert!(hits_at(&notes, 1920).is_empty());

        let hats = notes.iter().filter(|n| n.pitch() == drums::CLOSED_HAT).count();
        let kicks = notes.iter().filter(|n| n.pitch() == drums::KICK).count();
        let snares = notes.iter().filter(|n| n.pitch() == drums::SNARE).count();
        assert_eq!((hats, kicks, snares), (8, 4, 2));
        assert!(notes.iter().all(|n| n.channel() == PERCUSSION_CHANNEL));
    }

    #[test]
    fn on_beat_hats_are_louder_and_shorter() {
        let notes = drum_pattern(480, 480);
        let hats: Vec<_> = notes
            .iter()
            .filter(|n| n.pitch() == drums::CLOSED_HAT)
            .collect();
        assert_eq!(hats.len(), 2);
        assert!(hats[0].velocity() > hats[1].velocity());
        assert!(hats[0].duration_ticks() < hats[1].duration_ticks());
    }

    #[test]
    fn empty_range_has_no_drums() {
        assert!(drum_pattern(0, 480).is_empty());
    }

    #[test]
    fn bass_alternates_root_and_fifth_following_keys() {
        let scale = Scale::new(ScaleKind::Major);
        let mut timeline = KeyTimeline::new(0);
        timeline.push(0, 0);
        timeline.push(1920, 2);

        let notes = bass_line(3840, 480, &timeline, &scale, 3);
        let pitches: Vec<u8> = notes.iter().map(|n| n.pitch()).collect();
        // C3 G3 | D3 A3
        assert_eq!(pitches, vec![36, 43, 38, 45]);
        let starts: Vec<u32> = notes.iter().map(|n| n.start_tick()).collect();
        assert_eq!(starts, vec![0, 960, 1920, 2880]);
        assert!(notes.iter().all(|n| n.duration_ticks() == 900));
        assert!(notes.iter().all(|n| n.channel() == BASS_CHANNEL));
    }
}
