// Per-tick outcome classification
//
// Acquire and present return raw Vulkan results. These helpers decide which
// of them end the tick, which mark the swapchain for recreation, and which
// mean the device is gone.

use crate::backend::sync::{FrameSynchronizer, SyncBackend};
use anyhow::Result;
use ash::prelude::VkResult;
use ash::vk;
use std::time::{Duration, Instant};

/// What the application should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// A frame was submitted and presented
    Ok,
    /// Nothing was presented this tick; try again next tick
    Skip,
    /// The renderer cannot continue
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Image { index: u32, suboptimal: bool },
    OutOfDate,
    Failed(vk::Result),
}

pub fn classify_acquire(result: VkResult<(u32, bool)>) -> AcquireOutcome {
    match result {
        Ok((index, suboptimal)) => AcquireOutcome::Image { index, suboptimal },
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => AcquireOutcome::OutOfDate,
        Err(e) => AcquireOutcome::Failed(e),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
    Failed(vk::Result),
}

impl PresentOutcome {
    pub fn needs_recreate(self) -> bool {
        matches!(self, Self::Suboptimal | Self::OutOfDate)
    }
}

pub fn classify_present(result: VkResult<bool>) -> PresentOutcome {
    match result {
        Ok(false) => PresentOutcome::Presented,
        Ok(true) => PresentOutcome::Suboptimal,
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => PresentOutcome::OutOfDate,
        Err(e) => PresentOutcome::Failed(e),
    }
}

/// Status for a failed acquire or present. A lost device or surface cannot be
/// recovered by retrying; anything else aborts only the current tick.
pub fn failure_status(result: vk::Result) -> FrameStatus {
    match result {
        vk::Result::ERROR_DEVICE_LOST | vk::Result::ERROR_SURFACE_LOST_KHR => FrameStatus::Fatal,
        _ => FrameStatus::Skip,
    }
}

/// Outcome of the first half of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameBegin {
    /// The slot fence is reset and the image is free to record into
    Ready { slot: usize, image_index: u32 },
    /// No image was acquired; the slot fence is still signaled
    Ended { status: FrameStatus, recreate: bool },
}

/// Wait for the current slot, acquire an image with the slot's semaphore,
/// and re-arm the slot fence only once an image was acquired. When the image
/// was last submitted from another slot, that slot is waited on too.
pub fn begin_frame<B: SyncBackend>(
    sync: &mut FrameSynchronizer<B>,
    acquire: impl FnOnce(vk::Semaphore) -> VkResult<(u32, bool)>,
) -> Result<FrameBegin> {
    let slot = sync.current_frame();
    sync.wait_slot(slot)?;

    let image_index = match classify_acquire(acquire(sync.image_available(slot)?)) {
        AcquireOutcome::Image { index, suboptimal } => {
            if suboptimal {
                log::debug!("Acquired suboptimal swapchain image {}", index);
            }
            index
        }
        AcquireOutcome::OutOfDate => {
            log::debug!("Swapchain out of date on acquire");
            return Ok(FrameBegin::Ended {
                status: FrameStatus::Skip,
                recreate: true,
            });
        }
        AcquireOutcome::Failed(e) => {
            log::error!("Failed to acquire swapchain image: {}", e);
            return Ok(FrameBegin::Ended {
                status: failure_status(e),
                recreate: false,
            });
        }
    };

    // Work will be submitted from here on
    sync.reset_slot(slot)?;
    if let Some(previous) = sync.claim_image(image_index as usize, slot)? {
        sync.wait_slot(previous)?;
    }
    Ok(FrameBegin::Ready { slot, image_index })
}

/// Frames-per-second counter reporting once per interval.
#[derive(Debug, Clone)]
pub struct FpsCounter {
    interval: Duration,
    window_start: Instant,
    frames: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FpsSample {
    pub fps: f64,
    pub frame_ms: f64,
}

impl FpsCounter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            window_start: Instant::now(),
            frames: 0,
        }
    }

    /// Count one frame. Returns a sample when the interval has elapsed.
    pub fn frame(&mut self, now: Instant) -> Option<FpsSample> {
        self.frames += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.interval {
            return None;
        }

        let secs = elapsed.as_secs_f64();
        let sample = FpsSample {
            fps: self.frames as f64 / secs,
            frame_ms: secs * 1000.0 / self.frames as f64,
        };
        self.frames = 0;
        self.window_start = now;
        Some(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::sync::tests::MockSync;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn synchronizer(mock: &Arc<MockSync>) -> FrameSynchronizer<MockSync> {
        FrameSynchronizer::new(mock.clone(), 2, 3).unwrap()
    }

    #[test]
    fn out_of_date_acquire_leaves_slot_fence_signaled() {
        let mock = Arc::new(MockSync::default());
        let mut sync = synchronizer(&mock);
        let fence = sync.in_flight_fence(0).unwrap();

        let begun = begin_frame(&mut sync, |_| Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap();
        assert_eq!(
            begun,
            FrameBegin::Ended {
                status: FrameStatus::Skip,
                recreate: true
            }
        );
        assert!(mock.is_signaled(fence));
        assert_eq!(sync.current_frame(), 0);

        // The retry waits on the same slot without blocking
        let begun = begin_frame(&mut sync, |_| Ok((0, false))).unwrap();
        assert_eq!(begun, FrameBegin::Ready { slot: 0, image_index: 0 });
        assert!(!mock.is_signaled(fence));
    }

    #[test]
    fn failed_acquire_reports_status_without_reset() {
        let mock = Arc::new(MockSync::default());
        let mut sync = synchronizer(&mock);

        let begun = begin_frame(&mut sync, |_| Err(vk::Result::ERROR_DEVICE_LOST)).unwrap();
        assert_eq!(
            begun,
            FrameBegin::Ended {
                status: FrameStatus::Fatal,
                recreate: false
            }
        );
        let begun = begin_frame(&mut sync, |_| Err(vk::Result::TIMEOUT)).unwrap();
        assert_eq!(
            begun,
            FrameBegin::Ended {
                status: FrameStatus::Skip,
                recreate: false
            }
        );
        assert!(mock.is_signaled(sync.in_flight_fence(0).unwrap()));
    }

    #[test]
    fn acquire_waits_on_the_current_slot_semaphore() {
        let mock = Arc::new(MockSync::default());
        let mut sync = synchronizer(&mock);
        sync.advance_frame();
        let expected = sync.image_available(1).unwrap();

        let mut seen = None;
        let begun = begin_frame(&mut sync, |semaphore| {
            seen = Some(semaphore);
            Ok((2, true))
        })
        .unwrap();
        assert_eq!(seen, Some(expected));
        assert_eq!(begun, FrameBegin::Ready { slot: 1, image_index: 2 });
    }

    #[test]
    fn image_last_used_by_another_slot_waits_for_it() {
        let mock = Arc::new(MockSync::default());
        let mut sync = synchronizer(&mock);

        // Slot 0 takes image 1 and its submission is still pending
        let begun = begin_frame(&mut sync, |_| Ok((1, false))).unwrap();
        assert_eq!(begun, FrameBegin::Ready { slot: 0, image_index: 1 });
        sync.advance_frame();

        // Slot 1 gets image 1 back out of order: it must wait on slot 0,
        // which the mock reports as an error instead of blocking
        assert!(begin_frame(&mut sync, |_| Ok((1, false))).is_err());

        let mock = Arc::new(MockSync::default());
        let mut sync = synchronizer(&mock);
        begin_frame(&mut sync, |_| Ok((1, false))).unwrap();
        mock.signal(sync.in_flight_fence(0).unwrap());
        sync.advance_frame();
        let begun = begin_frame(&mut sync, |_| Ok((1, false))).unwrap();
        assert_eq!(begun, FrameBegin::Ready { slot: 1, image_index: 1 });
    }

    #[test]
    fn acquire_results_map_to_outcomes() {
        assert_eq!(
            classify_acquire(Ok((2, false))),
            AcquireOutcome::Image { index: 2, suboptimal: false }
        );
        assert_eq!(
            classify_acquire(Ok((0, true))),
            AcquireOutcome::Image { index: 0, suboptimal: true }
        );
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)),
            AcquireOutcome::OutOfDate
        );
        assert_eq!(
            classify_acquire(Err(vk::Result::TIMEOUT)),
            AcquireOutcome::Failed(vk::Result::TIMEOUT)
        );
    }

    #[test]
    fn present_suboptimal_and_out_of_date_request_recreate() {
        assert!(!classify_present(Ok(false)).needs_recreate());
        assert!(classify_present(Ok(true)).needs_recreate());
        assert!(classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).needs_recreate());

        let failed = classify_present(Err(vk::Result::ERROR_DEVICE_LOST));
        assert_eq!(failed, PresentOutcome::Failed(vk::Result::ERROR_DEVICE_LOST));
        assert!(!failed.needs_recreate());
    }

    #[test]
    fn only_lost_device_or_surface_is_fatal() {
        assert_eq!(failure_status(vk::Result::ERROR_DEVICE_LOST), FrameStatus::Fatal);
        assert_eq!(failure_status(vk::Result::ERROR_SURFACE_LOST_KHR), FrameStatus::Fatal);
        assert_eq!(failure_status(vk::Result::TIMEOUT), FrameStatus::Skip);
        assert_eq!(failure_status(vk::Result::ERROR_OUT_OF_HOST_MEMORY), FrameStatus::Skip);
    }

    #[test]
    fn fps_counter_reports_once_per_interval() {
        let mut counter = FpsCounter::new(Duration::from_secs(1));
        let start = counter.window_start;

        for i in 1..60 {
            assert!(counter.frame(start + Duration::from_millis(i * 16)).is_none());
        }
        let sample = counter.frame(start + Duration::from_secs(1)).unwrap();
        assert_relative_eq!(sample.fps, 60.0, epsilon = 1e-9);
        assert_relative_eq!(sample.frame_ms, 1000.0 / 60.0, epsilon = 1e-9);

        // Window restarted
        assert!(counter.frame(start + Duration::from_millis(1500)).is_none());
    }
}
