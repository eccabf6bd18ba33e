/// Append-only record of which key was active from which tick on.
#[derive(Debug, Clone, Default)]
pub struct KeyTimeline {
    changes: Vec<(u32, u8)>,
    default_key: u8,
}

impl KeyTimeline {
    pub fn new(default_key: u8) -> Self {
        Self {
            changes: Vec::new(),
            default_key,
        }
    }

    /// Ticks must not go backwards; an out-of-order tick is raised to the
    /// last recorded one.
    pub fn push(&mut self, tick: u32, key: u8) {
        let tick = match self.changes.last() {
            Some(&(last, _)) => tick.max(last),
            None => tick,
        };
        self.changes.push((tick, key));
    }

    pub fn key_at(&self, tick: u32) -> u8 {
        let mut key = self.default_key;
        for &(change_tick, change_key) in &self.changes {
            if change_tick > tick {
                break;
            }
            key = change_key;
        }
        key
    }

    pub fn changes(&self) -> &[(u32, u8)] {
        &self.changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_timeline_uses_default() {
        let timeline = KeyTimeline::new(5);
        assert_eq!(timeline.key_at(0), 5);
        assert_eq!(timeline.key_at(10_000), 5);
    }

    #[test]
    fn returns_last_change_at_or_before_tick() {
        let mut timeline = KeyTimeline::new(0);
        timeline.push(960, 3);
        timeline.push(1920, 7);
        timeline.push(1920, 9);

        assert_eq!(timeline.key_at(0), 0);
        assert_eq!(timeline.key_at(959), 0);
        assert_eq!(timeline.key_at(960), 3);
        assert_eq!(timeline.key_at(1919), 3);
        assert_eq!(timeline.key_at(1920), 9);
        assert_eq!(timeline.key_at(u32::MAX), 9);
    }

    #[test]
    fn keeps_ticks_non_decreasing() {
        let mut timeline = KeyTimeline::new(0);
        timeline.push(500, 1);
        timeline.push(100, 2);
        assert_eq!(timeline.changes(), &[(500, 1), (500, 2)]);
    }
}
