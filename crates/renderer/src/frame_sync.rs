//! Frames-in-flight synchronization.
//!
//! This module provides the [`FrameSynchronizer`], which cycles through `N`
//! frame slots (2 or 3) so the CPU can record frame `k + 1` while the GPU is
//! still executing frame `k`.
//!
//! # Slot lifecycle
//!
//! ```text
//! Idle ──begin_frame──▶ Recording ──submit──▶ Submitted ──(fence)──▶ Idle
//! ```
//!
//! The only blocking points are inside [`FrameSynchronizer::begin_frame`]:
//!
//! 1. Wait on the slot's fence (the slot's previous submission has retired)
//! 2. Acquire the next swapchain image (signals the slot's acquire semaphore)
//! 3. Reset the fence; the slot is now `Recording`
//!
//! The fence is reset only after acquisition succeeds. An out-of-date
//! swapchain therefore leaves the fence signaled, and the retry after
//! recreation does not wait on a fence nothing will ever signal.
//!
//! GPU work for slot `i` in cycle `k + N` cannot start before the work for
//! slot `i` in cycle `k` has retired: the fence wait is the sole guard.
//!
//! # Backends
//!
//! The state machine is written against [`FrameBackend`]. The Vulkan
//! implementation is [`VulkanFrameBackend`]; tests drive the synchronizer with
//! an in-memory fake whose fences signal only when the test says so.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use vkdemo_rhi::command::{CommandBuffer, CommandPool};
use vkdemo_rhi::device::Device;
use vkdemo_rhi::swapchain::Swapchain;
use vkdemo_rhi::sync::{Fence, Semaphore};
use vkdemo_rhi::{RhiError, RhiResult};

/// State of one frame slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// The slot's previous submission (if any) has retired or was never made.
    Idle,
    /// The slot owns an acquired image and its command buffer is being recorded.
    Recording,
    /// Work was submitted; the slot's fence signals when it retires.
    Submitted,
}

impl SlotState {
    fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Recording => "Recording",
            Self::Submitted => "Submitted",
        }
    }
}

/// Per-slot GPU primitives driven by [`FrameSynchronizer`].
///
/// Every method addresses the resources of one slot. Implementations must
/// not reorder the calls the synchronizer makes.
pub trait FrameBackend {
    /// Block until the slot's fence is signaled or `timeout_ns` elapses.
    fn wait_fence(&mut self, slot: usize, timeout_ns: u64) -> RhiResult<()>;

    /// Return the slot's fence to the unsignaled state.
    fn reset_fence(&mut self, slot: usize) -> RhiResult<()>;

    /// Acquire a presentable image, signaling the slot's acquire semaphore.
    ///
    /// Returns `(image_index, suboptimal)`.
    fn acquire_image(&mut self, slot: usize, timeout_ns: u64) -> RhiResult<(u32, bool)>;

    /// Submit the slot's command buffer. The submission waits on the acquire
    /// semaphore at color-attachment output, signals the render-complete
    /// semaphore of `image_index`, and signals the slot's fence.
    fn submit(&mut self, slot: usize, image_index: u32) -> RhiResult<()>;

    /// Present `image_index` once its render-complete semaphore signals.
    ///
    /// Returns whether the swapchain is suboptimal.
    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<bool>;
}

/// Drives `N` frame slots through their lifecycle.
///
/// The synchronizer is single-threaded: it is owned by the render loop and
/// no two slots are ever recorded at the same time.
pub struct FrameSynchronizer<B> {
    backend: B,
    slots: Vec<SlotState>,
    current: usize,
    image_index: Option<u32>,
    timeout_ns: u64,
}

impl<B: FrameBackend> FrameSynchronizer<B> {
    /// Creates a synchronizer over `frames_in_flight` slots.
    ///
    /// The backend's fences must start signaled so the first wait per slot
    /// returns immediately.
    pub fn new(backend: B, frames_in_flight: usize, timeout_ns: u64) -> Self {
        let frames_in_flight = frames_in_flight.max(1);
        info!("Frame synchronizer created with {frames_in_flight} frames in flight");
        Self {
            backend,
            slots: vec![SlotState::Idle; frames_in_flight],
            current: 0,
            image_index: None,
            timeout_ns,
        }
    }

    /// Waits for the current slot to retire and acquires the next image.
    ///
    /// Returns the acquired swapchain image index.
    ///
    /// # Errors
    ///
    /// - [`RhiError::SwapchainOutOfDate`] when the surface changed; the slot
    ///   stays usable and the call can be retried after recreation.
    /// - [`RhiError::FrameTimeout`] when the fence or acquire wait times out.
    /// - [`RhiError::InvalidFrameState`] if the slot is already recording.
    pub fn begin_frame(&mut self) -> RhiResult<u32> {
        let slot = self.current;
        if self.slots[slot] == SlotState::Recording {
            return Err(self.invalid_state("Idle or Submitted"));
        }

        self.backend.wait_fence(slot, self.timeout_ns)?;
        self.slots[slot] = SlotState::Idle;

        let (image_index, suboptimal) = self.backend.acquire_image(slot, self.timeout_ns)?;
        if suboptimal {
            debug!("Swapchain suboptimal during acquire");
        }

        self.backend.reset_fence(slot)?;
        self.slots[slot] = SlotState::Recording;
        self.image_index = Some(image_index);
        Ok(image_index)
    }

    /// Submits the current slot's recorded work.
    pub fn submit(&mut self) -> RhiResult<()> {
        let slot = self.current;
        let image_index = match (self.slots[slot], self.image_index) {
            (SlotState::Recording, Some(index)) => index,
            _ => return Err(self.invalid_state("Recording")),
        };
        self.backend.submit(slot, image_index)?;
        self.slots[slot] = SlotState::Submitted;
        Ok(())
    }

    /// Presents the image acquired by [`begin_frame`](Self::begin_frame).
    ///
    /// Returns whether the swapchain is suboptimal and should be recreated.
    ///
    /// # Errors
    ///
    /// [`RhiError::SwapchainOutOfDate`] when the surface changed. The frame
    /// was still submitted, so [`advance`](Self::advance) must still be called.
    pub fn present(&mut self) -> RhiResult<bool> {
        let slot = self.current;
        let image_index = match (self.slots[slot], self.image_index) {
            (SlotState::Submitted, Some(index)) => index,
            _ => return Err(self.invalid_state("Submitted")),
        };
        self.backend.present(slot, image_index)
    }

    /// Moves to the next slot. Call exactly once per submitted frame.
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.slots.len();
        self.image_index = None;
    }

    /// Returns the current slot index.
    #[inline]
    pub fn current_slot(&self) -> usize {
        self.current
    }

    /// Returns the image acquired for the current slot, if recording.
    #[inline]
    pub fn image_index(&self) -> Option<u32> {
        self.image_index
    }

    #[inline]
    pub fn slot_state(&self, slot: usize) -> Option<SlotState> {
        self.slots.get(slot).copied()
    }

    /// Returns the number of frames in flight.
    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn invalid_state(&self, expected: &'static str) -> RhiError {
        RhiError::InvalidFrameState {
            slot: self.current,
            expected,
            actual: self.slots[self.current].name(),
        }
    }
}

/// Vulkan primitives for every frame slot, plus the swapchain they present to.
///
/// # Synchronization Flow
///
/// ```text
/// 1. Wait on in_flight[slot]
/// 2. Acquire image (signals image_available[slot])
/// 3. Reset in_flight[slot], record command_buffers[slot]
/// 4. Submit: wait image_available[slot], signal render_finished[image]
///    and in_flight[slot]
/// 5. Present: wait render_finished[image]
/// ```
///
/// Render-finished semaphores are indexed by swapchain image rather than by
/// slot: the presentation engine may still hold one after the slot's fence
/// has signaled.
pub struct VulkanFrameBackend {
    device: Arc<Device>,
    swapchain: Swapchain,
    _pool: CommandPool,
    command_buffers: Vec<CommandBuffer>,
    image_available: Vec<Semaphore>,
    render_finished: Vec<Semaphore>,
    in_flight: Vec<Fence>,
}

impl VulkanFrameBackend {
    /// Creates per-slot command buffers, semaphores and signaled fences.
    pub fn new(
        device: Arc<Device>,
        swapchain: Swapchain,
        frames_in_flight: usize,
    ) -> RhiResult<Self> {
        let family = device
            .queue_families()
            .graphics_family
            .ok_or(RhiError::NoSuitableGpu)?;
        let pool = CommandPool::new(device.clone(), family)?;
        let command_buffers = pool.allocate(frames_in_flight as u32)?;

        let mut image_available = Vec::with_capacity(frames_in_flight);
        let mut in_flight = Vec::with_capacity(frames_in_flight);
        for slot in 0..frames_in_flight {
            image_available.push(Semaphore::new(device.clone())?);
            // Signaled so the first wait on each slot returns immediately.
            in_flight.push(Fence::new(device.clone(), true)?);
            debug!("Created frame slot {slot}");
        }
        let render_finished = Self::create_semaphores(&device, swapchain.image_count())?;

        Ok(Self {
            device,
            swapchain,
            _pool: pool,
            command_buffers,
            image_available,
            render_finished,
            in_flight,
        })
    }

    fn create_semaphores(device: &Arc<Device>, count: usize) -> RhiResult<Vec<Semaphore>> {
        (0..count).map(|_| Semaphore::new(device.clone())).collect()
    }

    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Command buffer owned by `slot`.
    #[inline]
    pub fn command_buffer(&self, slot: usize) -> Option<&CommandBuffer> {
        self.command_buffers.get(slot)
    }

    /// Recreates the swapchain and every semaphore.
    ///
    /// Semaphores are replaced because a failed acquire or present can leave
    /// one with a pending signal operation.
    pub fn recreate_swapchain(&mut self, requested: vk::Extent2D) -> RhiResult<()> {
        self.swapchain.recreate(requested)?;
        self.image_available = Self::create_semaphores(&self.device, self.image_available.len())?;
        self.render_finished = Self::create_semaphores(&self.device, self.swapchain.image_count())?;
        info!("Reset all frame semaphores");
        Ok(())
    }

    fn fence(&self, slot: usize) -> RhiResult<&Fence> {
        self.in_flight.get(slot).ok_or(RhiError::SlotOutOfRange {
            index: slot,
            count: self.in_flight.len(),
        })
    }

    fn image_semaphore(&self, image_index: u32) -> RhiResult<&Semaphore> {
        self.render_finished
            .get(image_index as usize)
            .ok_or(RhiError::SlotOutOfRange {
                index: image_index as usize,
                count: self.render_finished.len(),
            })
    }
}

impl FrameBackend for VulkanFrameBackend {
    fn wait_fence(&mut self, slot: usize, timeout_ns: u64) -> RhiResult<()> {
        self.fence(slot)?.wait(timeout_ns)
    }

    fn reset_fence(&mut self, slot: usize) -> RhiResult<()> {
        self.fence(slot)?.reset()
    }

    fn acquire_image(&mut self, slot: usize, timeout_ns: u64) -> RhiResult<(u32, bool)> {
        let semaphore = self.image_available[slot].handle();
        self.swapchain.acquire_next_image(semaphore, timeout_ns)
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> RhiResult<()> {
        let waits = [vk::SemaphoreSubmitInfo::default()
            .semaphore(self.image_available[slot].handle())
            .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)];
        let signals = [vk::SemaphoreSubmitInfo::default()
            .semaphore(self.image_semaphore(image_index)?.handle())
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)];
        let command_buffers =
            [vk::CommandBufferSubmitInfo::default().command_buffer(self.command_buffers[slot].handle())];
        let submit = vk::SubmitInfo2::default()
            .wait_semaphore_infos(&waits)
            .command_buffer_infos(&command_buffers)
            .signal_semaphore_infos(&signals);

        // SAFETY: the command buffer was ended by the render manager and the
        // fence was reset in begin_frame.
        unsafe {
            self.device
                .submit_graphics(&[submit], self.fence(slot)?.handle())
        }
    }

    fn present(&mut self, _slot: usize, image_index: u32) -> RhiResult<bool> {
        let wait = self.image_semaphore(image_index)?.handle();
        self.swapchain
            .present(self.device.present_queue(), image_index, wait)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::mpsc;
    use std::sync::{Condvar, Mutex, PoisonError};
    use std::thread;
    use std::time::Duration;

    /// Host fence that signals only when the test completes it.
    #[derive(Default)]
    struct FakeFence {
        signaled: Mutex<bool>,
        cond: Condvar,
    }

    impl FakeFence {
        fn signaled() -> Arc<Self> {
            Arc::new(Self {
                signaled: Mutex::new(true),
                cond: Condvar::new(),
            })
        }

        fn complete(&self) {
            *self.signaled.lock().unwrap_or_else(PoisonError::into_inner) = true;
            self.cond.notify_all();
        }

        fn is_signaled(&self) -> bool {
            *self.signaled.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Wait(usize),
        Acquire(usize),
        Reset(usize),
        Submit(usize, u32),
        Present(usize, u32),
    }

    struct FakeBackend {
        fences: Vec<Arc<FakeFence>>,
        calls: Arc<Mutex<Vec<Call>>>,
        image_count: u32,
        next_image: u32,
        out_of_date_acquires: usize,
    }

    impl FakeBackend {
        fn new(slots: usize, image_count: u32) -> Self {
            Self {
                fences: (0..slots).map(|_| FakeFence::signaled()).collect(),
                calls: Arc::default(),
                image_count,
                next_image: 0,
                out_of_date_acquires: 0,
            }
        }

        fn record(&self, call: Call) {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(call);
        }
    }

    impl FrameBackend for FakeBackend {
        fn wait_fence(&mut self, slot: usize, timeout_ns: u64) -> RhiResult<()> {
            self.record(Call::Wait(slot));
            let fence = &self.fences[slot];
            let guard = fence.signaled.lock().unwrap_or_else(PoisonError::into_inner);
            let (_guard, result) = fence
                .cond
                .wait_timeout_while(guard, Duration::from_nanos(timeout_ns), |s| !*s)
                .unwrap_or_else(PoisonError::into_inner);
            if result.timed_out() {
                return Err(RhiError::FrameTimeout {
                    what: "fence",
                    timeout_ns,
                });
            }
            Ok(())
        }

        fn reset_fence(&mut self, slot: usize) -> RhiResult<()> {
            self.record(Call::Reset(slot));
            *self.fences[slot]
                .signaled
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = false;
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize, _timeout_ns: u64) -> RhiResult<(u32, bool)> {
            self.record(Call::Acquire(slot));
            if self.out_of_date_acquires > 0 {
                self.out_of_date_acquires -= 1;
                return Err(RhiError::SwapchainOutOfDate);
            }
            let index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Ok((index, false))
        }

        fn submit(&mut self, slot: usize, image_index: u32) -> RhiResult<()> {
            self.record(Call::Submit(slot, image_index));
            Ok(())
        }

        fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<bool> {
            self.record(Call::Present(slot, image_index));
            Ok(false)
        }
    }

    const TIMEOUT: u64 = 5_000_000_000;

    fn run_frame<B: FrameBackend>(sync: &mut FrameSynchronizer<B>) -> RhiResult<u32> {
        let index = sync.begin_frame()?;
        sync.submit()?;
        sync.present()?;
        sync.advance();
        Ok(index)
    }

    #[test]
    fn test_first_cycle_does_not_block() {
        let backend = FakeBackend::new(3, 3);
        let calls = backend.calls.clone();
        let mut sync = FrameSynchronizer::new(backend, 3, TIMEOUT);
        for expected in 0..3u32 {
            assert_eq!(run_frame(&mut sync).unwrap(), expected);
        }
        let calls = calls.lock().unwrap();
        assert_eq!(
            &calls[..5],
            &[
                Call::Wait(0),
                Call::Acquire(0),
                Call::Reset(0),
                Call::Submit(0, 0),
                Call::Present(0, 0)
            ]
        );
        assert_eq!(sync.current_slot(), 0);
    }

    #[test]
    fn test_each_slot_waited_once_per_cycle() {
        for n in 2..=3usize {
            let backend = FakeBackend::new(n, 4);
            let fences = backend.fences.clone();
            let calls = backend.calls.clone();
            let mut sync = FrameSynchronizer::new(backend, n, TIMEOUT);
            let cycles = 4;
            for frame in 0..n * cycles {
                let slot = sync.current_slot();
                assert_eq!(slot, frame % n);
                run_frame(&mut sync).unwrap();
                // GPU retires the frame right away.
                fences[slot].complete();
            }
            let calls = calls.lock().unwrap();
            for slot in 0..n {
                let waits = calls.iter().filter(|c| **c == Call::Wait(slot)).count();
                assert_eq!(waits, cycles, "slot {slot} with {n} frames in flight");
            }
        }
    }

    #[test]
    fn test_begin_frame_blocks_until_fence_completes() {
        let backend = FakeBackend::new(2, 2);
        let fences = backend.fences.clone();
        let mut sync = FrameSynchronizer::new(backend, 2, TIMEOUT);
        run_frame(&mut sync).unwrap();
        run_frame(&mut sync).unwrap();
        fences[1].complete();
        assert!(!fences[0].is_signaled());

        let (tx, rx) = mpsc::channel();
        let worker = thread::spawn(move || {
            let result = sync.begin_frame();
            tx.send(()).unwrap();
            (result, sync)
        });

        // Slot 0's fence is still pending: begin_frame must not return.
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        fences[0].complete();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let (result, sync) = worker.join().unwrap();
        assert_eq!(result.unwrap(), 0);
        assert_eq!(sync.current_slot(), 0);
        assert_eq!(sync.slot_state(0), Some(SlotState::Recording));
    }

    #[test]
    fn test_fence_wait_times_out() {
        let backend = FakeBackend::new(2, 2);
        let mut sync = FrameSynchronizer::new(backend, 2, 10_000_000);
        run_frame(&mut sync).unwrap();
        run_frame(&mut sync).unwrap();
        let err = sync.begin_frame().unwrap_err();
        assert!(matches!(err, RhiError::FrameTimeout { what: "fence", .. }));
    }

    #[test]
    fn test_out_of_date_acquire_keeps_fence_signaled() {
        let mut backend = FakeBackend::new(2, 2);
        backend.out_of_date_acquires = 1;
        let fences = backend.fences.clone();
        let mut sync = FrameSynchronizer::new(backend, 2, 10_000_000);

        let err = sync.begin_frame().unwrap_err();
        assert!(err.is_recoverable());
        assert!(fences[0].is_signaled());
        assert_eq!(sync.slot_state(0), Some(SlotState::Idle));

        // Retry after recreation must not time out on the fence.
        assert_eq!(sync.begin_frame().unwrap(), 0);
    }

    #[test]
    fn test_out_of_order_calls_are_rejected() {
        let backend = FakeBackend::new(2, 2);
        let mut sync = FrameSynchronizer::new(backend, 2, TIMEOUT);
        assert!(matches!(
            sync.submit(),
            Err(RhiError::InvalidFrameState { expected: "Recording", .. })
        ));
        sync.begin_frame().unwrap();
        assert!(matches!(
            sync.begin_frame(),
            Err(RhiError::InvalidFrameState { actual: "Recording", .. })
        ));
        assert!(matches!(
            sync.present(),
            Err(RhiError::InvalidFrameState { expected: "Submitted", .. })
        ));
    }

    #[test]
    fn test_vulkan_backend_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<VulkanFrameBackend>();
        assert_send::<FrameSynchronizer<VulkanFrameBackend>>();
    }
}
