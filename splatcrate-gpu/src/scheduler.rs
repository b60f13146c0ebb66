//! Frame scheduling over a multi-buffered presentation surface
//!
//! [`FrameScheduler`] cycles through `N` frame slots. Each frame goes through
//! acquire, record, submit and present, and the slot index advances modulo
//! `N` after every submitted frame. When the surface reports that it no
//! longer matches the window, the scheduler rebuilds it and asks the caller
//! to retry with [`FrameStatus::Retry`].
//!
//! The state machine only talks to a [`PresentationSurface`]. The wgpu
//! implementation is [`crate::surface::WindowSurface`]; it is also where a
//! slot waits for its previous submission before being reused.

use splatcrate_core::{Error, Result};
use thiserror::Error;
use tracing::{debug, trace};

/// Non-success outcome of an acquire or present
#[derive(Debug, Error)]
pub enum SurfaceFailure {
    /// The surface no longer matches the window and must be rebuilt
    #[error("surface is out of date")]
    Stale,
    #[error(transparent)]
    Fatal(#[from] Error),
}

/// Which queue a recorder feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderKind {
    Graphics,
    Compute,
}

/// The device side of frame scheduling.
pub trait PresentationSurface {
    /// A presentable image acquired for one frame
    type Image;
    /// A command recorder for one frame
    type Recorder;

    /// Number of frame slots the surface tracks submissions for
    fn frames_in_flight(&self) -> usize;

    /// Acquire the next image for `slot`.
    ///
    /// Must not return before the previous submission made from `slot` has
    /// completed on the device.
    fn acquire(&mut self, slot: usize) -> std::result::Result<Self::Image, SurfaceFailure>;

    /// Start recording commands for `slot`
    fn begin_recorder(&mut self, slot: usize, kind: RecorderKind) -> Self::Recorder;

    /// Close both recorders and submit them, compute before graphics
    fn submit(&mut self, slot: usize, compute: Self::Recorder, graphics: Self::Recorder) -> Result<()>;

    /// Queue `image` for presentation
    fn present(&mut self, image: Self::Image) -> std::result::Result<(), SurfaceFailure>;

    /// Recreate the surface for its current size.
    ///
    /// Waits for the device to go idle first.
    fn rebuild(&mut self) -> Result<()>;
}

/// Outcome of a successful scheduler call
#[derive(Debug, PartialEq, Eq)]
pub enum FrameStatus<T> {
    Ready(T),
    /// The surface was rebuilt; skip this frame and try again
    Retry,
}

impl<T> FrameStatus<T> {
    pub fn is_retry(&self) -> bool {
        matches!(self, FrameStatus::Retry)
    }
}

/// Everything a render system needs to record one frame
pub struct FrameContext<'a, S: PresentationSurface> {
    pub frame_index: usize,
    pub surface: &'a S,
    pub image: &'a S::Image,
    pub compute: &'a mut S::Recorder,
    pub graphics: &'a mut S::Recorder,
}

struct ActiveFrame<S: PresentationSurface> {
    image: S::Image,
    compute: S::Recorder,
    graphics: S::Recorder,
}

/// Drives acquire, record, submit and present over `N` frame slots
pub struct FrameScheduler<S: PresentationSurface> {
    surface: S,
    frames_in_flight: usize,
    slot: usize,
    active: Option<ActiveFrame<S>>,
    resized: bool,
}

impl<S: PresentationSurface> FrameScheduler<S> {
    /// Schedule over the surface's frame slots.
    ///
    /// # Panics
    ///
    /// Panics if the surface reports zero frames in flight.
    pub fn new(surface: S) -> Self {
        let frames_in_flight = surface.frames_in_flight();
        assert!(frames_in_flight >= 1, "At least one frame in flight is required");
        Self {
            surface,
            frames_in_flight,
            slot: 0,
            active: None,
            resized: false,
        }
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn is_frame_in_progress(&self) -> bool {
        self.active.is_some()
    }

    /// Force a rebuild at the end of the current or next frame
    pub fn mark_resized(&mut self) {
        self.resized = true;
    }

    /// Acquire an image and open both recorders for the current slot.
    ///
    /// # Panics
    ///
    /// Panics if a frame is already in progress.
    pub fn begin_frame(&mut self) -> Result<FrameStatus<FrameContext<'_, S>>> {
        assert!(
            self.active.is_none(),
            "Cannot call begin_frame while a frame is already in progress"
        );

        let image = match self.surface.acquire(self.slot) {
            Ok(image) => image,
            Err(SurfaceFailure::Stale) => {
                debug!("surface stale on acquire, rebuilding");
                self.rebuild()?;
                return Ok(FrameStatus::Retry);
            }
            Err(SurfaceFailure::Fatal(e)) => return Err(e),
        };

        let compute = self.surface.begin_recorder(self.slot, RecorderKind::Compute);
        let graphics = self.surface.begin_recorder(self.slot, RecorderKind::Graphics);
        self.active = Some(ActiveFrame {
            image,
            compute,
            graphics,
        });

        trace!("began frame in slot {}", self.slot);
        Ok(FrameStatus::Ready(self.current_frame()))
    }

    /// Submit the recorded work and present the image.
    ///
    /// # Panics
    ///
    /// Panics if no frame is in progress.
    pub fn end_frame(&mut self) -> Result<FrameStatus<()>> {
        let frame = self
            .active
            .take()
            .unwrap_or_else(|| panic!("Cannot call end_frame while no frame is in progress"));

        self.surface.submit(self.slot, frame.compute, frame.graphics)?;
        let presented = self.surface.present(frame.image);
        self.slot = (self.slot + 1) % self.frames_in_flight;

        match presented {
            Ok(()) if !self.resized => Ok(FrameStatus::Ready(())),
            Ok(()) | Err(SurfaceFailure::Stale) => {
                debug!("surface stale or resized on present, rebuilding");
                self.rebuild()?;
                Ok(FrameStatus::Retry)
            }
            Err(SurfaceFailure::Fatal(e)) => Err(e),
        }
    }

    /// Slot of the frame in progress.
    ///
    /// # Panics
    ///
    /// Panics if no frame is in progress.
    pub fn frame_index(&self) -> usize {
        assert!(
            self.active.is_some(),
            "Cannot get frame index when no frame is in progress"
        );
        self.slot
    }

    /// Recorders and image of the frame in progress.
    ///
    /// # Panics
    ///
    /// Panics if no frame is in progress.
    pub fn current_frame(&mut self) -> FrameContext<'_, S> {
        let frame = self
            .active
            .as_mut()
            .unwrap_or_else(|| panic!("Cannot get the current frame when no frame is in progress"));
        FrameContext {
            frame_index: self.slot,
            surface: &self.surface,
            image: &frame.image,
            compute: &mut frame.compute,
            graphics: &mut frame.graphics,
        }
    }

    fn rebuild(&mut self) -> Result<()> {
        self.resized = false;
        self.surface.rebuild()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Acquire(usize),
        Submit {
            slot: usize,
            compute: Vec<&'static str>,
            graphics: Vec<&'static str>,
        },
        Present(usize),
        Rebuild,
    }

    #[derive(Debug)]
    struct MockRecorder {
        kind: RecorderKind,
        commands: Vec<&'static str>,
    }

    enum Outcome {
        Stale,
        Fatal,
    }

    #[derive(Default)]
    struct MockSurface {
        slots: usize,
        events: Vec<Event>,
        acquire_failures: VecDeque<Outcome>,
        present_failures: VecDeque<Outcome>,
    }

    impl MockSurface {
        fn with_slots(slots: usize) -> Self {
            Self {
                slots,
                ..Self::default()
            }
        }

        fn failure(outcome: Outcome) -> SurfaceFailure {
            match outcome {
                Outcome::Stale => SurfaceFailure::Stale,
                Outcome::Fatal => SurfaceFailure::Fatal(Error::Surface("device lost".to_string())),
            }
        }

        fn acquired_slots(&self) -> Vec<usize> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    Event::Acquire(slot) => Some(*slot),
                    _ => None,
                })
                .collect()
        }

        fn rebuilds(&self) -> usize {
            self.events.iter().filter(|e| **e == Event::Rebuild).count()
        }
    }

    impl PresentationSurface for MockSurface {
        type Image = usize;
        type Recorder = MockRecorder;

        fn frames_in_flight(&self) -> usize {
            self.slots
        }

        fn acquire(&mut self, slot: usize) -> std::result::Result<usize, SurfaceFailure> {
            self.events.push(Event::Acquire(slot));
            match self.acquire_failures.pop_front() {
                Some(outcome) => Err(Self::failure(outcome)),
                None => Ok(slot),
            }
        }

        fn begin_recorder(&mut self, _slot: usize, kind: RecorderKind) -> MockRecorder {
            MockRecorder {
                kind,
                commands: Vec::new(),
            }
        }

        fn submit(&mut self, slot: usize, compute: MockRecorder, graphics: MockRecorder) -> Result<()> {
            assert_eq!(compute.kind, RecorderKind::Compute);
            assert_eq!(graphics.kind, RecorderKind::Graphics);
            self.events.push(Event::Submit {
                slot,
                compute: compute.commands,
                graphics: graphics.commands,
            });
            Ok(())
        }

        fn present(&mut self, image: usize) -> std::result::Result<(), SurfaceFailure> {
            self.events.push(Event::Present(image));
            match self.present_failures.pop_front() {
                Some(outcome) => Err(Self::failure(outcome)),
                None => Ok(()),
            }
        }

        fn rebuild(&mut self) -> Result<()> {
            self.events.push(Event::Rebuild);
            Ok(())
        }
    }

    fn run_frame(scheduler: &mut FrameScheduler<MockSurface>) -> usize {
        let index = match scheduler.begin_frame().unwrap() {
            FrameStatus::Ready(frame) => frame.frame_index,
            FrameStatus::Retry => panic!("unexpected retry"),
        };
        assert_eq!(scheduler.end_frame().unwrap(), FrameStatus::Ready(()));
        index
    }

    #[test]
    fn test_slot_index_wraps_after_n_frames() {
        for n in 1..=4 {
            let mut scheduler = FrameScheduler::new(MockSurface::with_slots(n));
            let indices: Vec<usize> = (0..2 * n + 1).map(|_| run_frame(&mut scheduler)).collect();
            let expected: Vec<usize> = (0..2 * n + 1).map(|i| i % n).collect();
            assert_eq!(indices, expected, "frames in flight = {}", n);
        }
    }

    #[test]
    fn test_compute_and_graphics_submitted_together() {
        let mut scheduler = FrameScheduler::new(MockSurface::with_slots(2));
        if let FrameStatus::Ready(frame) = scheduler.begin_frame().unwrap() {
            frame.compute.commands.push("dispatch");
            frame.graphics.commands.push("draw");
        }
        scheduler.end_frame().unwrap();

        assert_eq!(
            scheduler.surface().events,
            vec![
                Event::Acquire(0),
                Event::Submit {
                    slot: 0,
                    compute: vec!["dispatch"],
                    graphics: vec!["draw"],
                },
                Event::Present(0),
            ]
        );
    }

    #[test]
    fn test_stale_acquire_rebuilds_and_keeps_slot() {
        let mut scheduler = FrameScheduler::new(MockSurface::with_slots(2));
        run_frame(&mut scheduler);

        scheduler.surface_mut().acquire_failures.push_back(Outcome::Stale);
        assert!(scheduler.begin_frame().unwrap().is_retry());
        assert!(!scheduler.is_frame_in_progress());
        assert_eq!(scheduler.surface().rebuilds(), 1);

        assert_eq!(run_frame(&mut scheduler), 1);
        assert_eq!(scheduler.surface().acquired_slots(), vec![0, 1, 1]);
    }

    #[test]
    fn test_resize_flag_rebuilds_in_end_frame() {
        let mut scheduler = FrameScheduler::new(MockSurface::with_slots(2));
        scheduler.mark_resized();

        assert!(matches!(scheduler.begin_frame().unwrap(), FrameStatus::Ready(_)));
        assert!(scheduler.end_frame().unwrap().is_retry());
        assert_eq!(scheduler.surface().rebuilds(), 1);

        // The flag is consumed by the rebuild
        run_frame(&mut scheduler);
        assert_eq!(scheduler.surface().rebuilds(), 1);
    }

    #[test]
    fn test_stale_acquire_consumes_resize_flag() {
        let mut scheduler = FrameScheduler::new(MockSurface::with_slots(2));
        scheduler.mark_resized();
        scheduler.surface_mut().acquire_failures.push_back(Outcome::Stale);

        assert!(scheduler.begin_frame().unwrap().is_retry());
        assert_eq!(scheduler.surface().rebuilds(), 1);

        run_frame(&mut scheduler);
        assert_eq!(scheduler.surface().rebuilds(), 1);
    }

    #[test]
    fn test_slot_count_comes_from_surface() {
        let scheduler = FrameScheduler::new(MockSurface::with_slots(3));
        assert_eq!(scheduler.frames_in_flight(), 3);
    }

    #[test]
    fn test_stale_present_advances_slot() {
        let mut scheduler = FrameScheduler::new(MockSurface::with_slots(3));
        scheduler.surface_mut().present_failures.push_back(Outcome::Stale);

        assert!(matches!(scheduler.begin_frame().unwrap(), FrameStatus::Ready(_)));
        assert!(scheduler.end_frame().unwrap().is_retry());
        assert_eq!(run_frame(&mut scheduler), 1);
    }

    #[test]
    fn test_fatal_acquire_is_an_error() {
        let mut scheduler = FrameScheduler::new(MockSurface::with_slots(2));
        scheduler.surface_mut().acquire_failures.push_back(Outcome::Fatal);
        assert!(matches!(scheduler.begin_frame(), Err(Error::Surface(_))));
        assert_eq!(scheduler.surface().rebuilds(), 0);
    }

    #[test]
    fn test_fatal_present_is_an_error() {
        let mut scheduler = FrameScheduler::new(MockSurface::with_slots(2));
        scheduler.surface_mut().present_failures.push_back(Outcome::Fatal);
        assert!(matches!(scheduler.begin_frame().unwrap(), FrameStatus::Ready(_)));
        assert!(scheduler.end_frame().is_err());
    }

    #[test]
    #[should_panic(expected = "already in progress")]
    fn test_double_begin_panics() {
        let mut scheduler = FrameScheduler::new(MockSurface::with_slots(2));
        let _ = scheduler.begin_frame().unwrap();
        let _ = scheduler.begin_frame();
    }

    #[test]
    #[should_panic(expected = "no frame is in progress")]
    fn test_end_without_begin_panics() {
        let mut scheduler = FrameScheduler::new(MockSurface::with_slots(2));
        let _ = scheduler.end_frame();
    }

    #[test]
    #[should_panic(expected = "no frame is in progress")]
    fn test_frame_index_outside_frame_panics() {
        let scheduler = FrameScheduler::new(MockSurface::with_slots(2));
        scheduler.frame_index();
    }

    #[test]
    #[should_panic(expected = "At least one frame")]
    fn test_zero_frames_in_flight_panics() {
        let _ = FrameScheduler::new(MockSurface::with_slots(0));
    }
}
