//! Frame-synchronized deferred disposal.
//!
//! The GPU consumes command streams asynchronously, up to `frames_in_flight`
//! frames behind the CPU. A native object therefore cannot be destroyed the
//! moment its resource is disposed: an in-flight frame may still reference
//! it. Builders schedule the teardown here instead, and the frame driver
//! retires one slot per confirmed GPU frame.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │               DeferredDisposalQueue                │
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐          │
//! │  │ slot 0   │  │ slot 1   │  │ slot 2   │  ...     │
//! │  │ pending  │  │ pending  │  │ pending  │          │
//! │  └──────────┘  └──────────┘  └──────────┘          │
//! └───────────────────────────────────────────────────┘
//!
//! On dispose (frame F):
//!   1. Builder checks dependents, removes the resource from its table
//!   2. Teardown is appended to slot F % N
//!
//! On advance_frame (GPU finished the oldest frame):
//!   1. Frame index becomes F + 1
//!   2. Slot (F + 1) % N, filled N frames ago, is executed in order
//! ```
//!
//! A teardown scheduled during frame F runs on the advance that moves the
//! queue to frame F + N.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tether_core::{ArrayPool, PooledVec};

use crate::backend::{NativeBackend, NativeHandle, NativeKind};
use crate::config::MAX_FRAMES_IN_FLIGHT;
use crate::error::{ResourceError, ResourceResult};
use crate::resource::ResourceIdent;

/// A native object waiting for its frame slot to retire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredTeardown {
    /// Resource the native object belonged to.
    pub ident: ResourceIdent,
    pub kind: NativeKind,
    pub handle: NativeHandle,
}

struct QueueState {
    slots: Vec<PooledVec<DeferredTeardown>>,
    current_frame: u64,
    poisoned: bool,
}

/// Ring of per-frame teardown lists.
pub struct DeferredDisposalQueue {
    backend: Arc<dyn NativeBackend>,
    pool: Arc<ArrayPool<DeferredTeardown>>,
    frames_in_flight: usize,
    state: Mutex<QueueState>,
}

impl DeferredDisposalQueue {
    /// Create a queue with `frames_in_flight` slots (1 to [`MAX_FRAMES_IN_FLIGHT`]).
    pub fn new(backend: Arc<dyn NativeBackend>, frames_in_flight: usize) -> ResourceResult<Self> {
        if !(1..=MAX_FRAMES_IN_FLIGHT).contains(&frames_in_flight) {
            return Err(ResourceError::InvalidParameter(format!(
                "frames_in_flight must be between 1 and {MAX_FRAMES_IN_FLIGHT}, got {frames_in_flight}"
            )));
        }
        let pool = Arc::new(ArrayPool::new());
        let slots = (0..frames_in_flight)
            .map(|_| PooledVec::new_in(pool.clone()))
            .collect();
        Ok(Self {
            backend,
            pool,
            frames_in_flight,
            state: Mutex::new(QueueState {
                slots,
                current_frame: 0,
                poisoned: false,
            }),
        })
    }

    fn slot_index(&self, frame: u64) -> usize {
        (frame % self.frames_in_flight as u64) as usize
    }

    /// Number of frame slots; teardowns run this many frames after scheduling.
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Index of the frame currently being recorded.
    pub fn current_frame(&self) -> u64 {
        self.state.lock().current_frame
    }

    /// Number of teardowns waiting across all slots.
    pub fn pending_count(&self) -> usize {
        self.state.lock().slots.iter().map(PooledVec::len).sum()
    }

    /// Whether a deferred teardown has failed.
    pub fn is_poisoned(&self) -> bool {
        self.state.lock().poisoned
    }

    /// Queue a native teardown in the current frame's slot.
    pub fn schedule(
        &self,
        ident: ResourceIdent,
        kind: NativeKind,
        handle: NativeHandle,
    ) -> ResourceResult<()> {
        let mut state = self.state.lock();
        if state.poisoned {
            return Err(ResourceError::QueuePoisoned);
        }
        let frame = state.current_frame;
        let slot = self.slot_index(frame);
        state.slots[slot].push(DeferredTeardown {
            ident,
            kind,
            handle,
        });
        log::trace!("Scheduled teardown of {} ({} {}) in frame {}", ident, kind, handle, frame);
        Ok(())
    }

    /// Retire the oldest frame slot and execute its teardowns in order.
    ///
    /// Call once per GPU frame confirmed complete. Returns the number of
    /// teardowns executed. A failing teardown poisons the queue.
    pub fn advance_frame(&self) -> ResourceResult<usize> {
        let retiring = {
            let mut state = self.state.lock();
            if state.poisoned {
                return Err(ResourceError::QueuePoisoned);
            }
            state.current_frame += 1;
            let slot = self.slot_index(state.current_frame);
            std::mem::replace(&mut state.slots[slot], PooledVec::new_in(self.pool.clone()))
        };

        if !retiring.is_empty() {
            log::debug!(
                "Retiring {} deferred teardowns at frame {}",
                retiring.len(),
                self.current_frame()
            );
        }
        self.execute(&retiring)
    }

    /// Execute every pending teardown, oldest slot first.
    ///
    /// Runs even when poisoned; returns the first failure after attempting all.
    pub fn flush_all(&self) -> ResourceResult<usize> {
        let retiring: Vec<PooledVec<DeferredTeardown>> = {
            let mut state = self.state.lock();
            let current = state.current_frame;
            (1..=self.frames_in_flight as u64)
                .map(|offset| {
                    let slot = self.slot_index(current + offset);
                    std::mem::replace(&mut state.slots[slot], PooledVec::new_in(self.pool.clone()))
                })
                .collect()
        };

        let mut executed = 0;
        let mut first_error = None;
        for slot in &retiring {
            match self.execute(slot) {
                Ok(count) => executed += count,
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        if executed > 0 {
            log::debug!("Flushed {} deferred teardowns", executed);
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(executed),
        }
    }

    fn execute(&self, entries: &PooledVec<DeferredTeardown>) -> ResourceResult<usize> {
        let mut failure = None;
        for entry in entries {
            match self.backend.dispose(entry.kind, entry.handle) {
                Ok(()) => log::trace!("Destroyed {} {} of {}", entry.kind, entry.handle, entry.ident),
                Err(err) => {
                    log::error!(
                        "Deferred teardown of {} {} for {} failed, native state is unknown: {}",
                        entry.kind,
                        entry.handle,
                        entry.ident,
                        err
                    );
                    failure.get_or_insert(err);
                }
            }
        }
        match failure {
            Some(err) => {
                self.state.lock().poisoned = true;
                Err(ResourceError::native("deferred teardown", err))
            }
            None => Ok(entries.len()),
        }
    }
}

impl Drop for DeferredDisposalQueue {
    fn drop(&mut self) {
        if self.pending_count() > 0
            && let Err(err) = self.flush_all()
        {
            log::error!("Deferred disposal flush on drop failed: {}", err);
        }
    }
}

impl fmt::Debug for DeferredDisposalQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DeferredDisposalQueue")
            .field("frames_in_flight", &self.frames_in_flight)
            .field("current_frame", &state.current_frame)
            .field(
                "pending",
                &state.slots.iter().map(PooledVec::len).sum::<usize>(),
            )
            .field("poisoned", &state.poisoned)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, NativeRequest};
    use crate::resource::{ResourceHandle, markers};

    fn setup(frames_in_flight: usize) -> (Arc<DummyBackend>, DeferredDisposalQueue) {
        let backend = Arc::new(DummyBackend::new());
        let queue = DeferredDisposalQueue::new(backend.clone(), frames_in_flight).unwrap();
        (backend, queue)
    }

    fn scene(backend: &DummyBackend, raw: usize) -> (ResourceIdent, NativeHandle) {
        let native = backend.allocate(&NativeRequest::Scene).unwrap();
        (ResourceHandle::<markers::Scene>::from_usize(raw).ident(), native)
    }

    #[test]
    fn test_rejects_invalid_depth() {
        let backend: Arc<dyn NativeBackend> = Arc::new(DummyBackend::new());
        assert!(DeferredDisposalQueue::new(backend.clone(), 0).is_err());
        assert!(DeferredDisposalQueue::new(backend, MAX_FRAMES_IN_FLIGHT + 1).is_err());
    }

    #[test]
    fn test_teardown_runs_on_third_advance() {
        let (backend, queue) = setup(3);
        for _ in 0..10 {
            queue.advance_frame().unwrap();
        }
        assert_eq!(queue.current_frame(), 10);

        let (ident, native) = scene(&backend, 1);
        queue.schedule(ident, NativeKind::Scene, native).unwrap();

        assert_eq!(queue.advance_frame().unwrap(), 0);
        assert_eq!(queue.advance_frame().unwrap(), 0);
        assert!(backend.is_live(native));

        assert_eq!(queue.advance_frame().unwrap(), 1);
        assert!(!backend.is_live(native));
        assert_eq!(backend.teardown_count_of(NativeKind::Scene), 1);

        for _ in 0..6 {
            queue.advance_frame().unwrap();
        }
        assert_eq!(backend.teardown_count_of(NativeKind::Scene), 1);
    }

    #[test]
    fn test_slot_executes_in_schedule_order() {
        let (backend, queue) = setup(2);
        let scheduled: Vec<_> = (1..=4).map(|raw| scene(&backend, raw)).collect();
        for (ident, native) in &scheduled {
            queue.schedule(*ident, NativeKind::Scene, *native).unwrap();
        }
        assert_eq!(queue.pending_count(), 4);

        queue.advance_frame().unwrap();
        queue.advance_frame().unwrap();
        let order: Vec<_> = backend.teardown_log().into_iter().map(|(_, h)| h).collect();
        let expected: Vec<_> = scheduled.iter().map(|(_, h)| *h).collect();
        assert_eq!(order, expected);
        assert_eq!(queue.pending_count(), 0);
    }

    #[test]
    fn test_single_frame_in_flight_retires_next_advance() {
        let (backend, queue) = setup(1);
        let (ident, native) = scene(&backend, 1);
        queue.schedule(ident, NativeKind::Scene, native).unwrap();
        assert_eq!(queue.advance_frame().unwrap(), 1);
    }

    #[test]
    fn test_flush_all_runs_oldest_first() {
        let (backend, queue) = setup(3);
        let (older_ident, older) = scene(&backend, 1);
        queue.schedule(older_ident, NativeKind::Scene, older).unwrap();
        queue.advance_frame().unwrap();
        let (newer_ident, newer) = scene(&backend, 2);
        queue.schedule(newer_ident, NativeKind::Scene, newer).unwrap();

        assert_eq!(queue.flush_all().unwrap(), 2);
        let order: Vec<_> = backend.teardown_log().into_iter().map(|(_, h)| h).collect();
        assert_eq!(order, vec![older, newer]);
        assert_eq!(queue.pending_count(), 0);
    }

    #[test]
    fn test_drop_flushes_pending() {
        let backend = Arc::new(DummyBackend::new());
        let native = {
            let queue = DeferredDisposalQueue::new(backend.clone(), 3).unwrap();
            let (ident, native) = scene(&backend, 1);
            queue.schedule(ident, NativeKind::Scene, native).unwrap();
            native
        };
        assert!(!backend.is_live(native));
    }

    #[test]
    fn test_failed_teardown_poisons_queue() {
        let (backend, queue) = setup(1);
        let (first_ident, first) = scene(&backend, 1);
        let (second_ident, second) = scene(&backend, 2);
        queue.schedule(first_ident, NativeKind::Scene, first).unwrap();
        queue.schedule(second_ident, NativeKind::Scene, second).unwrap();

        backend.fail_next_dispose(NativeKind::Scene);
        let err = queue.advance_frame().unwrap_err();
        assert!(matches!(err, ResourceError::NativeInterop { .. }));
        assert!(queue.is_poisoned());
        assert!(backend.is_live(first));
        assert!(!backend.is_live(second));

        assert!(matches!(queue.advance_frame(), Err(ResourceError::QueuePoisoned)));
        assert!(matches!(
            queue.schedule(first_ident, NativeKind::Scene, first),
            Err(ResourceError::QueuePoisoned)
        ));
        assert_eq!(queue.pending_count(), 0);
    }

    static_assertions::assert_impl_all!(DeferredDisposalQueue: Send, Sync);
}
