// Synchronization primitives
//
// Fences, semaphores for GPU-CPU and GPU-GPU sync.
// Two independently sized rings:
// - per frame-in-flight slot: in-flight fence + image-available semaphore
// - per swapchain image: render-finished semaphore
// Keeping render-finished on the image means present never waits on a
// semaphore signaled by work that targeted a different image.

use super::error::BackendError;
use super::VulkanDevice;
use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

/// The handful of driver calls the synchronizer needs. Implemented by the
/// real device and by test doubles.
pub trait SyncBackend {
    fn create_fence(&self, signaled: bool) -> Result<vk::Fence>;
    fn create_semaphore(&self) -> Result<vk::Semaphore>;
    fn wait_fence(&self, fence: vk::Fence) -> Result<()>;
    fn reset_fence(&self, fence: vk::Fence) -> Result<()>;
    fn destroy_fence(&self, fence: vk::Fence);
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
}

impl SyncBackend for VulkanDevice {
    fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence_info = vk::FenceCreateInfo::builder().flags(flags);
        unsafe { self.device.create_fence(&fence_info, None) }.context("Failed to create fence")
    }

    fn create_semaphore(&self) -> Result<vk::Semaphore> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        unsafe { self.device.create_semaphore(&semaphore_info, None) }
            .context("Failed to create semaphore")
    }

    fn wait_fence(&self, fence: vk::Fence) -> Result<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, u64::MAX) }
            .context("Failed waiting for in-flight fence")
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        unsafe { self.device.reset_fences(&[fence]) }.context("Failed to reset fence")
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }
}

/// Frame pacing state: which slot is current, what each slot and image owns.
pub struct FrameSynchronizer<B: SyncBackend = VulkanDevice> {
    in_flight: Vec<vk::Fence>,
    image_available: Vec<vk::Semaphore>,
    render_finished: Vec<vk::Semaphore>,
    /// Frame slot whose submission last targeted each swapchain image
    images_in_flight: Vec<Option<usize>>,
    current_frame: usize,
    backend: Arc<B>,
}

impl<B: SyncBackend> FrameSynchronizer<B> {
    pub fn new(backend: Arc<B>, frames_in_flight: usize, image_count: usize) -> Result<Self> {
        anyhow::ensure!(frames_in_flight > 0, "At least one frame in flight is required");

        let mut sync = Self {
            in_flight: Vec::with_capacity(frames_in_flight),
            image_available: Vec::with_capacity(frames_in_flight),
            render_finished: Vec::new(),
            images_in_flight: Vec::new(),
            current_frame: 0,
            backend,
        };

        // Partially built objects are released by Drop on early return
        for _ in 0..frames_in_flight {
            // Start signaled so the first wait on every slot returns immediately
            sync.in_flight.push(sync.backend.create_fence(true)?);
            sync.image_available.push(sync.backend.create_semaphore()?);
        }
        sync.recreate_image_semaphores(image_count)?;

        log::debug!(
            "Frame synchronizer: {} slots, {} image semaphores",
            frames_in_flight,
            image_count
        );
        Ok(sync)
    }

    /// Replace the per-image semaphores after the swapchain image count changed.
    /// Caller must have drained the device.
    pub fn recreate_image_semaphores(&mut self, image_count: usize) -> Result<()> {
        for semaphore in self.render_finished.drain(..) {
            self.backend.destroy_semaphore(semaphore);
        }
        for _ in 0..image_count {
            self.render_finished.push(self.backend.create_semaphore()?);
        }
        self.images_in_flight = vec![None; image_count];
        Ok(())
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn frames_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn image_count(&self) -> usize {
        self.render_finished.len()
    }

    fn check_slot(&self, slot: usize) -> Result<(), BackendError> {
        if slot < self.in_flight.len() {
            Ok(())
        } else {
            Err(BackendError::SlotOutOfRange {
                index: slot,
                max: self.in_flight.len(),
            })
        }
    }

    /// Block until the slot's previous submission retired. The fence stays
    /// signaled until `reset_slot`, so waiting again before a reset returns
    /// immediately; after a reset, waiting without a submission never returns
    /// on a real device.
    pub fn wait_slot(&self, slot: usize) -> Result<()> {
        self.check_slot(slot)?;
        self.backend.wait_fence(self.in_flight[slot])
    }

    pub fn reset_slot(&self, slot: usize) -> Result<()> {
        self.check_slot(slot)?;
        self.backend.reset_fence(self.in_flight[slot])
    }

    pub fn in_flight_fence(&self, slot: usize) -> Result<vk::Fence, BackendError> {
        self.check_slot(slot)?;
        Ok(self.in_flight[slot])
    }

    pub fn image_available(&self, slot: usize) -> Result<vk::Semaphore, BackendError> {
        self.check_slot(slot)?;
        Ok(self.image_available[slot])
    }

    pub fn render_finished(&self, image_index: usize) -> Result<vk::Semaphore, BackendError> {
        self.render_finished
            .get(image_index)
            .copied()
            .ok_or(BackendError::SlotOutOfRange {
                index: image_index,
                max: self.render_finished.len(),
            })
    }

    /// Record that `slot` is about to submit work for `image_index`.
    /// Returns the different slot that last used this image, if any; its
    /// fence must be waited on before the image's command buffer is reused.
    pub fn claim_image(&mut self, image_index: usize, slot: usize) -> Result<Option<usize>, BackendError> {
        self.check_slot(slot)?;
        let max = self.images_in_flight.len();
        let entry = self
            .images_in_flight
            .get_mut(image_index)
            .ok_or(BackendError::SlotOutOfRange { index: image_index, max })?;
        let previous = entry.replace(slot);
        Ok(previous.filter(|&prev| prev != slot))
    }

    pub fn advance_frame(&mut self) {
        self.current_frame = (self.current_frame + 1) % self.in_flight.len();
    }
}

impl<B: SyncBackend> Drop for FrameSynchronizer<B> {
    fn drop(&mut self) {
        for &semaphore in self.image_available.iter().chain(&self.render_finished) {
            self.backend.destroy_semaphore(semaphore);
        }
        for &fence in &self.in_flight {
            self.backend.destroy_fence(fence);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ash::vk::Handle;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Fences are plain booleans; waiting on an unsignaled fence is an error
    /// instead of a hang.
    #[derive(Default)]
    pub(crate) struct MockSync {
        next: Mutex<u64>,
        fences: Mutex<HashMap<u64, bool>>,
        live_semaphores: Mutex<usize>,
    }

    impl MockSync {
        fn handle(&self) -> u64 {
            let mut next = self.next.lock();
            *next += 1;
            *next
        }

        pub(crate) fn is_signaled(&self, fence: vk::Fence) -> bool {
            self.fences.lock().get(&fence.as_raw()).copied().unwrap_or(false)
        }

        /// Stand-in for the GPU finishing a submission.
        pub(crate) fn signal(&self, fence: vk::Fence) {
            self.fences.lock().insert(fence.as_raw(), true);
        }

        pub(crate) fn live_fences(&self) -> usize {
            self.fences.lock().len()
        }

        pub(crate) fn live_semaphores(&self) -> usize {
            *self.live_semaphores.lock()
        }
    }

    impl SyncBackend for MockSync {
        fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
            let raw = self.handle();
            self.fences.lock().insert(raw, signaled);
            Ok(vk::Fence::from_raw(raw))
        }

        fn create_semaphore(&self) -> Result<vk::Semaphore> {
            *self.live_semaphores.lock() += 1;
            Ok(vk::Semaphore::from_raw(self.handle()))
        }

        fn wait_fence(&self, fence: vk::Fence) -> Result<()> {
            anyhow::ensure!(self.is_signaled(fence), "wait on unsignaled fence would block");
            Ok(())
        }

        fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
            self.fences.lock().insert(fence.as_raw(), false);
            Ok(())
        }

        fn destroy_fence(&self, fence: vk::Fence) {
            self.fences.lock().remove(&fence.as_raw());
        }

        fn destroy_semaphore(&self, _semaphore: vk::Semaphore) {
            *self.live_semaphores.lock() -= 1;
        }
    }

    #[test]
    fn wait_then_reset_leaves_fence_unsignaled() {
        let mock = Arc::new(MockSync::default());
        let sync = FrameSynchronizer::new(mock.clone(), 2, 3).unwrap();

        for slot in 0..2 {
            let fence = sync.in_flight_fence(slot).unwrap();
            assert!(mock.is_signaled(fence), "slots start signaled");
            sync.wait_slot(slot).unwrap();
            assert!(mock.is_signaled(fence), "waiting alone does not reset");
            sync.reset_slot(slot).unwrap();
            assert!(!mock.is_signaled(fence));
        }
    }

    #[test]
    fn aborted_tick_can_wait_again() {
        let mock = Arc::new(MockSync::default());
        let sync = FrameSynchronizer::new(mock.clone(), 2, 2).unwrap();

        // Acquire failed after the wait: no reset, so the retry does not block
        sync.wait_slot(0).unwrap();
        sync.wait_slot(0).unwrap();
    }

    #[test]
    fn second_wait_after_reset_without_submission_would_block() {
        let mock = Arc::new(MockSync::default());
        let sync = FrameSynchronizer::new(mock.clone(), 2, 2).unwrap();

        sync.wait_slot(0).unwrap();
        sync.reset_slot(0).unwrap();
        assert!(sync.wait_slot(0).is_err());

        mock.signal(sync.in_flight_fence(0).unwrap());
        sync.wait_slot(0).unwrap();
    }

    #[test]
    fn out_of_range_slot_is_rejected() {
        let sync = FrameSynchronizer::new(Arc::new(MockSync::default()), 2, 3).unwrap();
        let err = sync.wait_slot(2).unwrap_err();
        assert_eq!(
            err.downcast_ref::<BackendError>(),
            Some(&BackendError::SlotOutOfRange { index: 2, max: 2 })
        );
        assert!(sync.render_finished(3).is_err());
    }

    #[test]
    fn render_finished_sized_by_images_not_frames() {
        // Equal counts must not couple the two rings
        let mut sync = FrameSynchronizer::new(Arc::new(MockSync::default()), 3, 3).unwrap();
        assert_eq!(sync.frames_in_flight(), 3);
        assert_eq!(sync.image_count(), 3);

        sync.recreate_image_semaphores(5).unwrap();
        assert_eq!(sync.frames_in_flight(), 3);
        assert_eq!(sync.image_count(), 5);
        assert!(sync.render_finished(4).is_ok());
        assert!(sync.image_available(3).is_err());

        let sync = FrameSynchronizer::new(Arc::new(MockSync::default()), 2, 4).unwrap();
        assert_eq!(sync.image_count(), 4);
        assert_ne!(
            sync.render_finished(0).unwrap(),
            sync.render_finished(1).unwrap()
        );
    }

    #[test]
    fn advance_wraps_around() {
        let mut sync = FrameSynchronizer::new(Arc::new(MockSync::default()), 2, 3).unwrap();
        assert_eq!(sync.current_frame(), 0);
        sync.advance_frame();
        assert_eq!(sync.current_frame(), 1);
        sync.advance_frame();
        assert_eq!(sync.current_frame(), 0);
    }

    #[test]
    fn claim_image_reports_previous_other_slot() {
        let mut sync = FrameSynchronizer::new(Arc::new(MockSync::default()), 2, 3).unwrap();
        assert_eq!(sync.claim_image(1, 0), Ok(None));
        assert_eq!(sync.claim_image(1, 0), Ok(None));
        assert_eq!(sync.claim_image(1, 1), Ok(Some(0)));
        assert_eq!(sync.claim_image(0, 1), Ok(None));

        // Fresh semaphores after resize also forget image ownership
        sync.recreate_image_semaphores(3).unwrap();
        assert_eq!(sync.claim_image(1, 0), Ok(None));
    }

    #[test]
    fn drop_releases_every_object() {
        let mock = Arc::new(MockSync::default());
        {
            let mut sync = FrameSynchronizer::new(mock.clone(), 2, 3).unwrap();
            sync.recreate_image_semaphores(4).unwrap();
            assert_eq!(mock.live_semaphores(), 6);
            assert_eq!(mock.live_fences(), 2);
        }
        assert_eq!(mock.live_semaphores(), 0);
        assert_eq!(mock.live_fences(), 0);
    }
}
