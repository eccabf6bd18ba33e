use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScaleKind {
    #[default]
    Major,
    Minor,
    Pentatonic,
    Blues,
    Chromatic,
}

impl ScaleKind {
    #[cfg(test)]
    pub const ALL: [ScaleKind; 5] = [
        ScaleKind::Major,
        ScaleKind::Minor,
        ScaleKind::Pentatonic,
        ScaleKind::Blues,
        ScaleKind::Chromatic,
    ];

    pub fn intervals(self) -> &'static [u8] {
        match self {
            ScaleKind::Major => &[0, 2, 4, 5, 7, 9, 11],
            ScaleKind::Minor => &[0, 2, 3, 5, 7, 8, 10],
            ScaleKind::Pentatonic => &[0, 2, 4, 7, 9],
            ScaleKind::Blues => &[0, 3, 5, 6, 7, 10],
            ScaleKind::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
        }
    }
}

/// Ascending semitone intervals from the root of one scale family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scale {
    pub kind: ScaleKind,
    intervals: &'static [u8],
}

impl Scale {
    pub fn new(kind: ScaleKind) -> Self {
        Self {
            kind,
            intervals: kind.intervals(),
        }
    }

    /// Maps a signed degree to a MIDI pitch. Degrees outside `[0, len)` wrap
    /// into neighbouring octaves; the result is clamped to `0..=127`.
    pub fn degree_to_pitch(&self, degree: i32, key: u8, base_octave: u8) -> u8 {
        let n = self.intervals.len() as i64;
        let degree = degree as i64;
        let normalized = degree.rem_euclid(n) as usize;
        let octave_offset = degree.div_euclid(n);

        let pitch = (base_octave as i64 + octave_offset) * 12
            + key as i64
            + self.intervals[normalized] as i64;
        pitch.clamp(0, 127) as u8
    }
}

/// Pulls a degree onto the nearest tone of the tonic triad (0, 2, 4) within
/// its seven-step window. A third resolves up to the fifth.
pub fn snap_to_chord_tone(degree: i32) -> i32 {
    let window = degree.rem_euclid(7);
    let base = degree - window;
    let snapped = match window {
        0 | 1 => 0,
        2 => 2,
        3..=5 => 4,
        _ => 7,
    };
    base + snapped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_of_c_major_is_middle_c() {
        let scale = Scale::new(ScaleKind::Major);
        assert_eq!(scale.degree_to_pitch(0, 0, 5), 60);
        assert_eq!(scale.degree_to_pitch(4, 0, 5), 67);
        assert_eq!(scale.degree_to_pitch(2, 3, 5), 67);
    }

    #[test]
    fn negative_degrees_wrap_down() {
        let scale = Scale::new(ScaleKind::Major);
        // one step below C5 is B4
        assert_eq!(scale.degree_to_pitch(-1, 0, 5), 59);
        assert_eq!(scale.degree_to_pitch(-7, 0, 5), 48);
        assert_eq!(scale.degree_to_pitch(-8, 0, 5), 47);
    }

    #[test]
    fn degrees_past_the_table_wrap_up() {
        let scale = Scale::new(ScaleKind::Pentatonic);
        assert_eq!(scale.degree_to_pitch(5, 0, 4), 60);
        assert_eq!(scale.degree_to_pitch(6, 0, 4), 62);
    }

    #[test]
    fn pitch_is_always_in_midi_range() {
        for kind in ScaleKind::ALL {
            let scale = Scale::new(kind);
            for degree in (-200..200).step_by(7) {
                for key in 0..12 {
                    for octave in 0..=9 {
                        let pitch = scale.degree_to_pitch(degree, key, octave);
                        assert!(pitch <= 127);
                    }
                }
            }
        }
        let scale = Scale::new(ScaleKind::Major);
        assert_eq!(scale.degree_to_pitch(i32::MAX, 11, 9), 127);
        assert_eq!(scale.degree_to_pitch(i32::MIN, 0, 0), 0);
    }

    #[test]
    fn one_scale_length_up_is_one_octave_up() {
        for kind in ScaleKind::ALL {
            let scale = Scale::new(kind);
            let n = kind.intervals().len() as i32;
            for degree in -20..20 {
                for key in 0..12 {
                    for octave in 1..8 {
                        let up = scale.degree_to_pitch(degree + n, key, octave);
                        let next = scale.degree_to_pitch(degree, key, octave + 1);
                        if up < 127 && next < 127 && up > 0 {
                            assert_eq!(up, next, "{kind:?} degree {degree}");
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn chord_tone_snapping() {
        let snapped: Vec<i32> = (0..8).map(snap_to_chord_tone).collect();
        assert_eq!(snapped, vec![0, 0, 2, 4, 4, 4, 7, 7]);
        assert_eq!(snap_to_chord_tone(-1), 0);
        assert_eq!(snap_to_chord_tone(-4), -3);
        assert_eq!(snap_to_chord_tone(10), 11);
    }
}
