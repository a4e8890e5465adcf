// src/tracker.rs

use anyhow::Result;
use tracing::{info, warn};

use crate::types::{BoundingBox, Frame, TrackingState};

/// Opaque single-object visual tracker. Implementations carry whatever
/// internal model they like; the session only ever inits once per arming and
/// updates once per frame.
pub trait ObjectTracker {
    fn init(&mut self, frame: &Frame, bb: BoundingBox) -> Result<()>;

    /// `Ok(None)` means the tracker ran but lost the marker this frame.
    fn update(&mut self, frame: &Frame) -> Result<Option<BoundingBox>>;
}

/// State machine around an opaque tracker: Idle until the user selects a
/// region, Tracking once the tracker initializes, back to Idle only on an
/// explicit reset. Losing the marker does not leave Tracking: sampling
/// continues regardless once armed.
pub struct ProbeTracker {
    inner: Box<dyn ObjectTracker>,
    state: TrackingState,
}

impl ProbeTracker {
    pub fn new(inner: Box<dyn ObjectTracker>) -> Self {
        Self {
            inner,
            state: TrackingState::Idle,
        }
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    /// Armed means tracking was started at some point and not reset since;
    /// the session samples power on every frame while this holds.
    pub fn is_armed(&self) -> bool {
        self.state != TrackingState::Idle
    }

    /// Initialize tracking on a user-selected region.
    pub fn arm(&mut self, frame: &Frame, bb: BoundingBox) -> Result<()> {
        self.state = TrackingState::Armed;
        self.inner.init(frame, bb)?;
        self.state = TrackingState::Tracking;
        info!(
            "tracking armed at ({:.0}, {:.0}) {}x{}",
            bb.x, bb.y, bb.w as i64, bb.h as i64
        );
        Ok(())
    }

    /// One tracker step. Only meaningful while Tracking.
    pub fn update(&mut self, frame: &Frame) -> Result<Option<BoundingBox>> {
        if self.state != TrackingState::Tracking {
            return Ok(None);
        }
        let update = self.inner.update(frame)?;
        if update.is_none() {
            warn!("tracker lost the probe this frame");
        }
        Ok(update)
    }

    pub fn reset(&mut self) {
        self.state = TrackingState::Idle;
    }
}

/// OpenCV CSRT tracker. A fresh tracker instance is created on every arming,
/// matching how highgui sessions re-select a region after a reset.
pub struct CsrtTracker {
    tracker: Option<opencv::core::Ptr<opencv::tracking::TrackerCSRT>>,
}

impl CsrtTracker {
    pub fn new() -> Self {
        Self { tracker: None }
    }
}

impl ObjectTracker for CsrtTracker {
    fn init(&mut self, frame: &Frame, bb: BoundingBox) -> Result<()> {
        use opencv::prelude::*;
        use opencv::tracking::{TrackerCSRT, TrackerCSRT_Params};

        let mat = crate::display::to_bgr_mat(frame)?;
        let mut tracker = TrackerCSRT::create(&TrackerCSRT_Params::default()?)?;
        let rect = opencv::core::Rect::new(bb.x as i32, bb.y as i32, bb.w as i32, bb.h as i32);
        tracker.init(&mat, rect)?;
        self.tracker = Some(tracker);
        Ok(())
    }

    fn update(&mut self, frame: &Frame) -> Result<Option<BoundingBox>> {
        use opencv::prelude::*;

        let Some(tracker) = self.tracker.as_mut() else {
            return Ok(None);
        };
        let mat = crate::display::to_bgr_mat(frame)?;
        let mut rect = opencv::core::Rect::default();
        let ok = tracker.update(&mat, &mut rect)?;
        if !ok {
            return Ok(None);
        }
        Ok(Some(BoundingBox::new(
            rect.x as f64,
            rect.y as f64,
            rect.width as f64,
            rect.height as f64,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted tracker double: a fixed box, optionally losing the marker on
    /// given update calls.
    struct ScriptedTracker {
        bb: BoundingBox,
        lose_on: Vec<usize>,
        calls: usize,
        initialized: bool,
    }

    impl ScriptedTracker {
        fn new(bb: BoundingBox, lose_on: Vec<usize>) -> Self {
            Self {
                bb,
                lose_on,
                calls: 0,
                initialized: false,
            }
        }
    }

    impl ObjectTracker for ScriptedTracker {
        fn init(&mut self, _frame: &Frame, bb: BoundingBox) -> Result<()> {
            self.bb = bb;
            self.initialized = true;
            Ok(())
        }

        fn update(&mut self, _frame: &Frame) -> Result<Option<BoundingBox>> {
            assert!(self.initialized, "update before init");
            self.calls += 1;
            if self.lose_on.contains(&self.calls) {
                Ok(None)
            } else {
                Ok(Some(self.bb))
            }
        }
    }

    fn frame() -> Frame {
        Frame::new(100, 100)
    }

    #[test]
    fn test_idle_until_armed() {
        let bb = BoundingBox::new(10.0, 10.0, 20.0, 20.0);
        let mut probe = ProbeTracker::new(Box::new(ScriptedTracker::new(bb, vec![])));
        assert_eq!(probe.state(), TrackingState::Idle);
        assert!(!probe.is_armed());
        // Updates in Idle are no-ops.
        assert!(probe.update(&frame()).unwrap().is_none());
    }

    #[test]
    fn test_arm_transitions_to_tracking() {
        let bb = BoundingBox::new(10.0, 10.0, 20.0, 20.0);
        let mut probe = ProbeTracker::new(Box::new(ScriptedTracker::new(bb, vec![])));
        probe.arm(&frame(), bb).unwrap();
        assert_eq!(probe.state(), TrackingState::Tracking);
        assert_eq!(probe.update(&frame()).unwrap(), Some(bb));
    }

    #[test]
    fn test_lost_frame_stays_armed() {
        let bb = BoundingBox::new(10.0, 10.0, 20.0, 20.0);
        let mut probe = ProbeTracker::new(Box::new(ScriptedTracker::new(bb, vec![2])));
        probe.arm(&frame(), bb).unwrap();
        assert!(probe.update(&frame()).unwrap().is_some());
        assert!(probe.update(&frame()).unwrap().is_none());
        assert!(probe.is_armed());
        assert!(probe.update(&frame()).unwrap().is_some());
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let bb = BoundingBox::new(10.0, 10.0, 20.0, 20.0);
        let mut probe = ProbeTracker::new(Box::new(ScriptedTracker::new(bb, vec![])));
        probe.arm(&frame(), bb).unwrap();
        probe.reset();
        assert_eq!(probe.state(), TrackingState::Idle);
        assert!(probe.update(&frame()).unwrap().is_none());
    }
}
