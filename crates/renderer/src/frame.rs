//! Frame slots and the per-frame state machine.

use std::fmt;

/// Round-robin index over the frames in flight.
///
/// Advances once per submitted frame. A frame aborted before submission
/// (out-of-date acquire) keeps its slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSlots {
    count: usize,
    current: usize,
}

impl FrameSlots {
    /// `count` is clamped to at least one.
    pub fn new(count: usize) -> Self {
        Self {
            count: count.max(1),
            current: 0,
        }
    }

    #[inline]
    pub fn current(&self) -> usize {
        self.current
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Moves to the next slot and returns it.
    pub fn advance(&mut self) -> usize {
        self.current = (self.current + 1) % self.count;
        self.current
    }
}

/// Where the frame protocol currently is.
///
/// ```text
/// Ready -> Acquiring -> Recording -> Submitted -> Presenting -> Ready
///              |                                      |
///              +-------------> Recreating <-----------+
///                                  |
///                                  +--> Ready
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameState {
    #[default]
    Ready,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
    Recreating,
}

impl FrameState {
    /// Whether `next` may follow `self`.
    pub fn can_transition_to(self, next: FrameState) -> bool {
        use FrameState::*;
        matches!(
            (self, next),
            (Ready, Acquiring)
                | (Ready, Recreating)
                | (Acquiring, Recording)
                | (Acquiring, Recreating)
                | (Recording, Submitted)
                | (Submitted, Presenting)
                | (Presenting, Ready)
                | (Presenting, Recreating)
                | (Recreating, Ready)
        )
    }
}

impl fmt::Display for FrameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_cycle() {
        let mut slots = FrameSlots::new(2);
        let mut seen = vec![slots.current()];
        for _ in 0..4 {
            seen.push(slots.advance());
        }
        assert_eq!(seen, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn test_zero_slots_clamped() {
        let mut slots = FrameSlots::new(0);
        assert_eq!(slots.count(), 1);
        assert_eq!(slots.advance(), 0);
    }

    #[test]
    fn test_state_transitions() {
        use FrameState::*;
        let happy = [Ready, Acquiring, Recording, Submitted, Presenting, Ready];
        for pair in happy.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(Acquiring.can_transition_to(Recreating));
        assert!(Presenting.can_transition_to(Recreating));
        assert!(Recreating.can_transition_to(Ready));

        assert!(!Ready.can_transition_to(Recording));
        assert!(!Recording.can_transition_to(Recreating));
        assert!(!Submitted.can_transition_to(Ready));
    }
}
