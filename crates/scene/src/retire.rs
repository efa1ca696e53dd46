//! Deferred destruction of GPU-owning values.

use umbra_rhi::MAX_FRAMES_IN_FLIGHT;

/// Holds values until no in-flight frame can still reference them.
///
/// [`tick`](Self::tick) is called once per frame after that frame's fence
/// wait. A value pushed between two frames has been seen by at most the
/// last `MAX_FRAMES_IN_FLIGHT` submissions, and each tick retires one of
/// them, so it is dropped on the tick that brings its count to zero.
#[derive(Debug)]
pub struct RetireQueue<T> {
    pending: Vec<(usize, T)>,
}

impl<T> Default for RetireQueue<T> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
        }
    }
}

impl<T> RetireQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: T) {
        self.pending.push((MAX_FRAMES_IN_FLIGHT, value));
    }

    /// Advances one frame and drops everything that became unreachable.
    /// Returns how many values were dropped.
    pub fn tick(&mut self) -> usize {
        let before = self.pending.len();
        for (frames, _) in &mut self.pending {
            *frames = frames.saturating_sub(1);
        }
        self.pending.retain(|(frames, _)| *frames > 0);
        before - self.pending.len()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drops everything at once. Only valid after the device is idle.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_value_survives_frames_in_flight() {
        let value = Rc::new(());
        let mut queue = RetireQueue::new();
        queue.push(Rc::clone(&value));

        for _ in 0..MAX_FRAMES_IN_FLIGHT - 1 {
            assert_eq!(queue.tick(), 0);
            assert_eq!(Rc::strong_count(&value), 2);
        }
        assert_eq!(queue.tick(), 1);
        assert_eq!(Rc::strong_count(&value), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_staggered_pushes_retire_independently() {
        let mut queue = RetireQueue::new();
        queue.push("first");
        queue.tick();
        queue.push("second");
        assert_eq!(queue.len(), 2);

        let mut dropped = 0;
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            dropped += queue.tick();
        }
        assert_eq!(dropped, 2);
    }
}
