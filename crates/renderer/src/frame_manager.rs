//! The per-frame protocol.
//!
//! [`FrameManager`] drives one frame through
//!
//! ```text
//! 1. wait on the slot's fence
//! 2. acquire an image        (out-of-date: recreate, abort the frame)
//! 3. reset the slot's fence
//! 4. record
//! 5. submit                  (waits on image-available at colour output,
//!                             signals render-finished and the fence)
//! 6. present                 (out-of-date, suboptimal or a resize request:
//!                             recreate afterwards)
//! ```
//!
//! and advances the slot only when a frame was submitted. The fence is reset
//! after a successful acquire, never before, so an aborted frame leaves it
//! signaled and the next wait on that slot returns immediately.
//!
//! The GPU side is behind two traits. [`SlotFence`] is the CPU view of a
//! slot's fence and [`PresentSurface`] does acquisition, recording,
//! submission, presentation and rebuilding. The renderer implements both on
//! Vulkan objects; tests implement them with plain counters.

use std::time::Duration;

use ash::vk;
use tracing::{debug, info, trace, warn};

use umbra_platform::ExtentSource;
use umbra_rhi::MAX_FRAMES_IN_FLIGHT;
use umbra_rhi::sync::FrameSync;

use crate::error::{RendererError, RendererResult};
use crate::frame::{FrameSlots, FrameState};

/// How often recreation re-reads a zero window size before giving up on
/// this frame.
const ZERO_EXTENT_POLLS: u32 = 50;
const ZERO_EXTENT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Identifies the frame being recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameContext {
    pub slot: usize,
    pub image_index: u32,
    /// Count of frames submitted before this one.
    pub frame_number: u64,
}

/// Result of an acquire that did not fail outright.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquire {
    Image { index: u32, suboptimal: bool },
    OutOfDate,
}

/// Whether the swapchain still matches the surface after a present.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    Optimal,
    /// Out-of-date or suboptimal.
    Stale,
}

/// What [`FrameManager::render_frame`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Recorded, submitted and presented. `recreated` is set when the
    /// swapchain was rebuilt after the present.
    Presented {
        slot: usize,
        image_index: u32,
        draws: u32,
        recreated: bool,
    },
    /// Acquisition reported out-of-date. The swapchain was rebuilt and
    /// nothing was recorded.
    Recreated,
    /// The surface has zero size, or a rebuild is waiting for it to have
    /// one. Nothing was recorded.
    Skipped,
}

impl FrameOutcome {
    /// Draw calls recorded this frame.
    pub fn draws(&self) -> u32 {
        match self {
            FrameOutcome::Presented { draws, .. } => *draws,
            FrameOutcome::Recreated | FrameOutcome::Skipped => 0,
        }
    }
}

/// CPU view of one slot's fence.
pub trait SlotFence {
    /// Blocks until the slot's last submission has completed.
    fn wait(&self) -> RendererResult<()>;
    /// Makes the fence unsignaled. Only valid after [`wait`](Self::wait).
    fn reset(&self) -> RendererResult<()>;
    fn is_signaled(&self) -> bool;
}

impl SlotFence for FrameSync {
    fn wait(&self) -> RendererResult<()> {
        Ok(self.in_flight_fence().wait(u64::MAX)?)
    }

    fn reset(&self) -> RendererResult<()> {
        Ok(self.in_flight_fence().reset()?)
    }

    fn is_signaled(&self) -> bool {
        self.in_flight_fence().is_signaled()
    }
}

/// The presentation target a frame is rendered into.
pub trait PresentSurface {
    /// Per-slot synchronization handed back on every call for that slot.
    type Sync: SlotFence;

    /// Acquires the next image, signaling the slot's image-available
    /// semaphore. Errors other than out-of-date are fatal.
    fn acquire(&mut self, sync: &Self::Sync) -> RendererResult<Acquire>;

    /// Records the slot's command buffer. Returns the number of draw calls.
    fn record(&mut self, frame: FrameContext) -> RendererResult<u32>;

    /// Submits the slot's command buffer, signaling the slot's fence.
    fn submit(&mut self, frame: FrameContext, sync: &Self::Sync) -> RendererResult<()>;

    fn present(&mut self, frame: FrameContext, sync: &Self::Sync) -> RendererResult<PresentStatus>;

    /// Waits for the device to go idle and rebuilds everything sized to the
    /// surface.
    fn rebuild(&mut self, extent: vk::Extent2D) -> RendererResult<()>;
}

/// Runs the frame protocol over [`MAX_FRAMES_IN_FLIGHT`] slots.
pub struct FrameManager<F> {
    syncs: Vec<F>,
    slots: FrameSlots,
    state: FrameState,
    /// Set by window resize events, consumed after the next present.
    resize_requested: bool,
    /// A recreation was abandoned because the window stayed at zero size.
    stale: bool,
    frame_number: u64,
    zero_extent_polls: u32,
    poll_interval: Duration,
}

impl<F: SlotFence> FrameManager<F> {
    /// Takes one sync object per slot.
    pub fn new(syncs: Vec<F>) -> RendererResult<Self> {
        if syncs.len() != MAX_FRAMES_IN_FLIGHT {
            return Err(RendererError::Frame(format!(
                "expected {} frame slots, got {}",
                MAX_FRAMES_IN_FLIGHT,
                syncs.len()
            )));
        }
        info!("Frame manager created with {} frames in flight", syncs.len());
        Ok(Self {
            slots: FrameSlots::new(syncs.len()),
            syncs,
            state: FrameState::Ready,
            resize_requested: false,
            stale: false,
            frame_number: 0,
            zero_extent_polls: ZERO_EXTENT_POLLS,
            poll_interval: ZERO_EXTENT_POLL_INTERVAL,
        })
    }

    /// Overrides how long recreation waits out a zero-sized window.
    pub fn with_zero_extent_polling(mut self, polls: u32, interval: Duration) -> Self {
        self.zero_extent_polls = polls;
        self.poll_interval = interval;
        self
    }

    /// Rebuild after the next present.
    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }

    pub fn resize_requested(&self) -> bool {
        self.resize_requested
    }

    #[inline]
    pub fn state(&self) -> FrameState {
        self.state
    }

    #[inline]
    pub fn current_slot(&self) -> usize {
        self.slots.current()
    }

    /// Frames submitted so far.
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn sync(&self, slot: usize) -> &F {
        &self.syncs[slot]
    }

    pub fn syncs(&self) -> &[F] {
        &self.syncs
    }

    /// Runs one frame.
    pub fn render_frame<S>(
        &mut self,
        surface: &mut S,
        window: &dyn ExtentSource,
    ) -> RendererResult<FrameOutcome>
    where
        S: PresentSurface<Sync = F>,
    {
        if window.is_zero() {
            trace!("Surface has zero size, skipping frame");
            return Ok(FrameOutcome::Skipped);
        }
        if self.stale && !self.recreate(surface, window)? {
            return Ok(FrameOutcome::Skipped);
        }

        let slot = self.slots.current();

        self.transition(FrameState::Acquiring);
        self.syncs[slot].wait()?;

        let (image_index, suboptimal) = match surface.acquire(&self.syncs[slot])? {
            Acquire::Image { index, suboptimal } => (index, suboptimal),
            Acquire::OutOfDate => {
                debug!("Swapchain out of date during acquire (slot {})", slot);
                return Ok(if self.recreate(surface, window)? {
                    FrameOutcome::Recreated
                } else {
                    FrameOutcome::Skipped
                });
            }
        };

        self.syncs[slot].reset()?;

        let frame = FrameContext {
            slot,
            image_index,
            frame_number: self.frame_number,
        };

        self.transition(FrameState::Recording);
        let draws = surface.record(frame)?;

        surface.submit(frame, &self.syncs[slot])?;
        self.transition(FrameState::Submitted);
        self.slots.advance();
        self.frame_number += 1;

        self.transition(FrameState::Presenting);
        let status = surface.present(frame, &self.syncs[slot])?;

        let needs_rebuild = status == PresentStatus::Stale || suboptimal || self.resize_requested;
        let recreated = if needs_rebuild {
            debug!(
                "Recreating after present (status {:?}, suboptimal acquire {}, resize {})",
                status, suboptimal, self.resize_requested
            );
            self.recreate(surface, window)?
        } else {
            self.transition(FrameState::Ready);
            false
        };

        Ok(FrameOutcome::Presented {
            slot,
            image_index,
            draws,
            recreated,
        })
    }

    /// Rebuilds the surface resources at the window's current size.
    ///
    /// Polls while the window reports zero size. If it is still zero after
    /// the polling budget, returns `false` and retries before the next
    /// frame instead of blocking the event loop.
    pub fn recreate<S>(
        &mut self,
        surface: &mut S,
        window: &dyn ExtentSource,
    ) -> RendererResult<bool>
    where
        S: PresentSurface<Sync = F>,
    {
        self.transition(FrameState::Recreating);

        let mut extent = window.extent();
        let mut polls = 0;
        while extent.width == 0 || extent.height == 0 {
            if polls >= self.zero_extent_polls {
                warn!("Window still has zero size, deferring swapchain recreation");
                self.stale = true;
                self.transition(FrameState::Ready);
                return Ok(false);
            }
            std::thread::sleep(self.poll_interval);
            extent = window.extent();
            polls += 1;
        }

        surface.rebuild(extent)?;
        self.resize_requested = false;
        self.stale = false;
        self.transition(FrameState::Ready);
        Ok(true)
    }

    fn transition(&mut self, next: FrameState) {
        debug_assert!(
            self.state.can_transition_to(next) || self.state == next,
            "invalid frame transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::HashSet;
    use std::rc::Rc;

    use umbra_platform::FixedExtent;

    use super::*;

    #[derive(Debug, Default)]
    struct FenceState {
        signaled: bool,
        /// A submission referencing this slot has not completed yet.
        in_flight: bool,
    }

    /// Shares its state with the mock surface, which marks it in flight on
    /// submit. Waiting completes the submission.
    #[derive(Clone, Debug)]
    struct MockFence(Rc<RefCell<FenceState>>);

    impl MockFence {
        fn signaled() -> Self {
            Self(Rc::new(RefCell::new(FenceState {
                signaled: true,
                in_flight: false,
            })))
        }

        fn in_flight(&self) -> bool {
            self.0.borrow().in_flight
        }
    }

    impl SlotFence for MockFence {
        fn wait(&self) -> RendererResult<()> {
            let mut state = self.0.borrow_mut();
            assert!(
                state.signaled || state.in_flight,
                "wait on an unsignaled fence with nothing in flight would never return"
            );
            state.in_flight = false;
            state.signaled = true;
            Ok(())
        }

        fn reset(&self) -> RendererResult<()> {
            let mut state = self.0.borrow_mut();
            assert!(!state.in_flight, "reset while the GPU still owns the slot");
            state.signaled = false;
            Ok(())
        }

        fn is_signaled(&self) -> bool {
            self.0.borrow().signaled
        }
    }

    const PASS_DRAWS: u32 = 7;

    #[derive(Default)]
    struct MockSurface {
        fences: Vec<MockFence>,
        acquires: u64,
        out_of_date_on: HashSet<u64>,
        stale_present_on: HashSet<u64>,
        image_count: u32,
        next_image: u32,
        /// Per-slot "uniform buffer": the frame number last written.
        uniforms: Vec<Option<u64>>,
        /// (acquire number, slot) of every recorded frame.
        recorded: Vec<(u64, usize)>,
        rebuilds: Vec<vk::Extent2D>,
    }

    impl MockSurface {
        fn new(fences: &[MockFence]) -> Self {
            Self {
                fences: fences.to_vec(),
                image_count: 3,
                uniforms: vec![None; fences.len()],
                ..Self::default()
            }
        }
    }

    impl PresentSurface for MockSurface {
        type Sync = MockFence;

        fn acquire(&mut self, _sync: &MockFence) -> RendererResult<Acquire> {
            self.acquires += 1;
            if self.out_of_date_on.contains(&self.acquires) {
                return Ok(Acquire::OutOfDate);
            }
            let index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Ok(Acquire::Image {
                index,
                suboptimal: false,
            })
        }

        fn record(&mut self, frame: FrameContext) -> RendererResult<u32> {
            assert!(
                !self.fences[frame.slot].in_flight(),
                "slot {} written while its previous submission is in flight",
                frame.slot
            );
            self.uniforms[frame.slot] = Some(frame.frame_number);
            self.recorded.push((self.acquires, frame.slot));
            Ok(PASS_DRAWS)
        }

        fn submit(&mut self, _frame: FrameContext, sync: &MockFence) -> RendererResult<()> {
            let mut state = sync.0.borrow_mut();
            assert!(!state.signaled, "submitted with a signaled fence");
            state.in_flight = true;
            Ok(())
        }

        fn present(
            &mut self,
            _frame: FrameContext,
            _sync: &MockFence,
        ) -> RendererResult<PresentStatus> {
            if self.stale_present_on.contains(&self.acquires) {
                Ok(PresentStatus::Stale)
            } else {
                Ok(PresentStatus::Optimal)
            }
        }

        fn rebuild(&mut self, extent: vk::Extent2D) -> RendererResult<()> {
            // The device is idle after a rebuild.
            for fence in &self.fences {
                let mut state = fence.0.borrow_mut();
                if state.in_flight {
                    state.in_flight = false;
                    state.signaled = true;
                }
            }
            self.rebuilds.push(extent);
            Ok(())
        }
    }

    /// Returns the queued extents in order, then repeats the last one.
    struct ScriptedExtent {
        extents: RefCell<Vec<vk::Extent2D>>,
        reads: Cell<u32>,
    }

    impl ScriptedExtent {
        fn new(sizes: &[(u32, u32)]) -> Self {
            let mut extents: Vec<_> = sizes
                .iter()
                .map(|&(width, height)| vk::Extent2D { width, height })
                .collect();
            extents.reverse();
            Self {
                extents: RefCell::new(extents),
                reads: Cell::new(0),
            }
        }
    }

    impl ExtentSource for ScriptedExtent {
        fn extent(&self) -> vk::Extent2D {
            self.reads.set(self.reads.get() + 1);
            let mut extents = self.extents.borrow_mut();
            if extents.len() > 1 {
                extents.pop().unwrap()
            } else {
                extents[0]
            }
        }
    }

    fn setup() -> (FrameManager<MockFence>, MockSurface, Vec<MockFence>) {
        let fences: Vec<_> = (0..MAX_FRAMES_IN_FLIGHT).map(|_| MockFence::signaled()).collect();
        let surface = MockSurface::new(&fences);
        let manager = FrameManager::new(fences.clone())
            .unwrap()
            .with_zero_extent_polling(5, Duration::ZERO);
        (manager, surface, fences)
    }

    fn window() -> FixedExtent {
        FixedExtent::new(1280, 720)
    }

    #[test]
    fn test_slot_cycles_over_five_frames() {
        let (mut manager, mut surface, _) = setup();
        let slots: Vec<usize> = (0..5)
            .map(|_| match manager.render_frame(&mut surface, &window()).unwrap() {
                FrameOutcome::Presented { slot, .. } => slot,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(slots, vec![0, 1, 0, 1, 0]);
        assert_eq!(manager.frame_number(), 5);
        assert_eq!(manager.state(), FrameState::Ready);
    }

    #[test]
    fn test_out_of_date_acquire_recreates_and_draws_nothing() {
        let (mut manager, mut surface, _) = setup();
        surface.out_of_date_on.insert(3);

        let outcomes: Vec<FrameOutcome> = (0..4)
            .map(|_| manager.render_frame(&mut surface, &window()).unwrap())
            .collect();

        assert!(matches!(outcomes[0], FrameOutcome::Presented { slot: 0, .. }));
        assert!(matches!(outcomes[1], FrameOutcome::Presented { slot: 1, .. }));
        assert_eq!(outcomes[2], FrameOutcome::Recreated);
        assert_eq!(outcomes[2].draws(), 0);
        // Frame 4 reuses the aborted frame's slot and renders normally.
        assert_eq!(
            outcomes[3],
            FrameOutcome::Presented {
                slot: 0,
                image_index: 2,
                draws: PASS_DRAWS,
                recreated: false,
            }
        );

        assert_eq!(surface.rebuilds, vec![vk::Extent2D { width: 1280, height: 720 }]);
        let recorded_acquires: Vec<u64> = surface.recorded.iter().map(|&(a, _)| a).collect();
        assert_eq!(recorded_acquires, vec![1, 2, 4]);
    }

    #[test]
    fn test_aborted_frame_leaves_fence_signaled() {
        let (mut manager, mut surface, fences) = setup();
        surface.out_of_date_on.insert(1);
        manager.render_frame(&mut surface, &window()).unwrap();
        assert!(fences[0].is_signaled());
        assert_eq!(manager.current_slot(), 0);
    }

    #[test]
    fn test_slot_never_written_while_in_flight() {
        let (mut manager, mut surface, fences) = setup();
        for n in 0..6u64 {
            manager.render_frame(&mut surface, &window()).unwrap();
            let slot = (n % 2) as usize;
            // Just submitted: owned by the GPU until the next wait.
            assert!(fences[slot].in_flight());
            assert!(!fences[slot].is_signaled());
            assert_eq!(surface.uniforms[slot], Some(n));
        }
        // The other slot's data is from the frame before, untouched.
        assert_eq!(surface.uniforms[0], Some(4));
        assert_eq!(surface.uniforms[1], Some(5));
    }

    #[test]
    fn test_stale_present_recreates_after_presenting() {
        let (mut manager, mut surface, _) = setup();
        surface.stale_present_on.insert(2);
        manager.render_frame(&mut surface, &window()).unwrap();
        let outcome = manager.render_frame(&mut surface, &window()).unwrap();
        assert!(matches!(
            outcome,
            FrameOutcome::Presented {
                draws: PASS_DRAWS,
                recreated: true,
                ..
            }
        ));
        assert_eq!(surface.rebuilds.len(), 1);
        // The slot still advanced.
        assert_eq!(manager.current_slot(), 0);
    }

    #[test]
    fn test_resize_request_is_consumed_after_present() {
        let (mut manager, mut surface, _) = setup();
        manager.request_resize();
        let outcome = manager.render_frame(&mut surface, &window()).unwrap();
        assert!(matches!(outcome, FrameOutcome::Presented { recreated: true, .. }));
        assert!(!manager.resize_requested());
        assert_eq!(surface.rebuilds.len(), 1);

        manager.render_frame(&mut surface, &window()).unwrap();
        assert_eq!(surface.rebuilds.len(), 1);
    }

    #[test]
    fn test_zero_extent_skips_without_touching_fences() {
        let (mut manager, mut surface, fences) = setup();
        let outcome = manager
            .render_frame(&mut surface, &FixedExtent::new(0, 0))
            .unwrap();
        assert_eq!(outcome, FrameOutcome::Skipped);
        assert_eq!(surface.acquires, 0);
        assert!(fences.iter().all(|f| f.is_signaled()));
    }

    #[test]
    fn test_recreation_waits_out_zero_extent() {
        let (mut manager, mut surface, _) = setup();
        surface.out_of_date_on.insert(1);
        // Frame start sees a size, then the window minimizes briefly.
        let window = ScriptedExtent::new(&[(800, 600), (0, 0), (0, 0), (640, 480)]);
        let outcome = manager.render_frame(&mut surface, &window).unwrap();
        assert_eq!(outcome, FrameOutcome::Recreated);
        assert_eq!(surface.rebuilds, vec![vk::Extent2D { width: 640, height: 480 }]);
        assert_eq!(window.reads.get(), 4);
    }

    #[test]
    fn test_recreation_deferred_while_minimized() {
        let (mut manager, mut surface, _) = setup();
        surface.out_of_date_on.insert(1);
        let window = ScriptedExtent::new(&[(800, 600), (0, 0)]);
        let outcome = manager.render_frame(&mut surface, &window).unwrap();
        assert_eq!(outcome, FrameOutcome::Skipped);
        assert!(surface.rebuilds.is_empty());

        // Restored: the pending rebuild happens before the next frame.
        let restored = FixedExtent::new(800, 600);
        let outcome = manager.render_frame(&mut surface, &restored).unwrap();
        assert!(matches!(outcome, FrameOutcome::Presented { recreated: false, .. }));
        assert_eq!(surface.rebuilds.len(), 1);
    }

    #[test]
    fn test_stale_present_while_minimized_defers_rebuild() {
        let (mut manager, mut surface, _) = setup();
        surface.stale_present_on.insert(1);
        let window = ScriptedExtent::new(&[(800, 600), (0, 0)]);

        let outcome = manager.render_frame(&mut surface, &window).unwrap();
        assert_eq!(
            outcome,
            FrameOutcome::Presented {
                slot: 0,
                image_index: 0,
                draws: PASS_DRAWS,
                recreated: false,
            }
        );
        assert!(surface.rebuilds.is_empty());
        assert_eq!(manager.state(), FrameState::Ready);

        // The deferred rebuild runs once the window has a size again.
        let restored = FixedExtent::new(800, 600);
        let outcome = manager.render_frame(&mut surface, &restored).unwrap();
        assert!(matches!(outcome, FrameOutcome::Presented { slot: 1, .. }));
        assert_eq!(surface.rebuilds, vec![vk::Extent2D { width: 800, height: 600 }]);
    }

    #[test]
    fn test_wrong_slot_count_rejected() {
        let result = FrameManager::new(vec![MockFence::signaled()]);
        assert!(matches!(result, Err(RendererError::Frame(_))));
    }
}
