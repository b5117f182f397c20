//! Circular schedule of pending key actions.
//!
//! The buffer covers a rolling window of the next [`SCHEDULE_SLOTS`]
//! milliseconds. A target timestamp lands in slot `target % SCHEDULE_SLOTS`,
//! so a target more than one window ahead aliases onto a nearer slot and
//! overwrites whatever is there. That is the capacity limit of the relay:
//! jitter beyond ~1 s makes a remote keyer unusable anyway.
//!
//! There is no locking here. The buffer has one writer (the connection
//! handler) and one sweeper (the dispatcher), and both run on the event
//! loop that owns the [`KeyerEngine`](crate::KeyerEngine).

/// Number of one-millisecond slots in the schedule.
pub const SCHEDULE_SLOTS: usize = 1024;

// ── Action ───────────────────────────────────────────────────────

/// A physical key transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Down,
    Up,
}

/// Contents of one schedule slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Slot {
    #[default]
    Empty,
    Down,
    Up,
}

impl From<Action> for Slot {
    fn from(action: Action) -> Self {
        match action {
            Action::Down => Slot::Down,
            Action::Up => Slot::Up,
        }
    }
}

// ── ScheduleBuffer ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ScheduleBuffer {
    slots: [Slot; SCHEDULE_SLOTS],
}

impl ScheduleBuffer {
    pub fn new() -> Self {
        Self {
            slots: [Slot::Empty; SCHEDULE_SLOTS],
        }
    }

    fn index(ms: u32) -> usize {
        ms as usize % SCHEDULE_SLOTS
    }

    /// Schedule `action` at `target`, replacing anything already in
    /// that slot.
    pub fn set(&mut self, target: u32, action: Action) {
        self.slots[Self::index(target)] = action.into();
    }

    /// Remove and return the action in the slot for `ms`.
    pub fn take_if_due(&mut self, ms: u32) -> Option<Action> {
        match std::mem::take(&mut self.slots[Self::index(ms)]) {
            Slot::Empty => None,
            Slot::Down => Some(Action::Down),
            Slot::Up => Some(Action::Up),
        }
    }

    /// Drop every pending action.
    pub fn clear(&mut self) {
        self.slots.fill(Slot::Empty);
    }

    /// Number of occupied slots.
    pub fn pending(&self) -> usize {
        self.slots.iter().filter(|s| **s != Slot::Empty).count()
    }

    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }
}

impl Default for ScheduleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffer_is_empty() {
        let buf = ScheduleBuffer::new();
        assert!(buf.is_empty());
    }

    #[test]
    fn take_clears_the_slot() {
        let mut buf = ScheduleBuffer::new();
        buf.set(42, Action::Down);
        assert_eq!(buf.pending(), 1);
        assert_eq!(buf.take_if_due(42), Some(Action::Down));
        assert_eq!(buf.take_if_due(42), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn second_set_overwrites_first() {
        let mut buf = ScheduleBuffer::new();
        buf.set(500, Action::Down);
        buf.set(500, Action::Up);
        assert_eq!(buf.pending(), 1);
        assert_eq!(buf.take_if_due(500), Some(Action::Up));
    }

    #[test]
    fn targets_one_window_apart_alias() {
        let mut buf = ScheduleBuffer::new();
        buf.set(10, Action::Down);
        buf.set(10 + SCHEDULE_SLOTS as u32, Action::Up);
        assert_eq!(buf.pending(), 1);
        assert_eq!(buf.take_if_due(10), Some(Action::Up));
    }

    #[test]
    fn clear_empties_every_slot() {
        let mut buf = ScheduleBuffer::new();
        for ms in 0..SCHEDULE_SLOTS as u32 {
            buf.set(ms, if ms % 2 == 0 { Action::Down } else { Action::Up });
        }
        assert_eq!(buf.pending(), SCHEDULE_SLOTS);
        buf.clear();
        assert!(buf.is_empty());
        for ms in 0..SCHEDULE_SLOTS as u32 {
            assert_eq!(buf.take_if_due(ms), None);
        }
    }

    #[test]
    fn high_timestamps_map_into_range() {
        let mut buf = ScheduleBuffer::new();
        buf.set(u32::MAX, Action::Down);
        assert_eq!(buf.take_if_due(u32::MAX), Some(Action::Down));
    }
}
