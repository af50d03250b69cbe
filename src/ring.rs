use crate::invariants::{debug_assert_bounded_count, debug_assert_monotonic, debug_assert_power_of_two};
use crate::{Backoff, Metrics, MetricsSnapshot};
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::time::{Duration, Instant};

use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// MEMORY ORDERING
// =============================================================================
//
// Single-producer/single-consumer ring. `head`/`tail` are unbounded u64
// sequence numbers (not wrapped indices); physical index is `seq & mask`.
//
// Producer: loads `tail` Relaxed (only the producer writes it), consults its
// own `cached_head` (UnsafeCell, written only by the producer) before paying
// for an Acquire load of the real `head`. Publishes with a Release store to
// `tail` after writing the slot.
//
// Consumer: mirror image, with `cached_tail`.
//
// Both cached fields are plain `UnsafeCell<u64>`, not atomics: each has
// exactly one writer (the side that owns it), so no synchronization is
// needed to write them, only to read the other side's published counter.
// =============================================================================

/// A fixed-capacity, power-of-two-sized single-producer/single-consumer
/// queue of `T` (`spec.md` §3, §4.1).
///
/// At most one thread may call [`offer`](Self::offer) / [`offer_spin`](Self::offer_spin);
/// at most one thread may call [`poll`](Self::poll) / [`peek`](Self::peek) and
/// their `_unchecked` variants. Violating this is a logic error, not
/// necessarily a crash, but is not checked at runtime.
#[repr(C)]
pub struct RingBuffer<T> {
    tail: CachePadded<AtomicU64>,
    cached_head: CachePadded<UnsafeCell<u64>>,

    head: CachePadded<AtomicU64>,
    cached_tail: CachePadded<UnsafeCell<u64>>,

    mask: u64,
    capacity: usize,
    metrics: Metrics,

    buffer: UnsafeCell<Box<[MaybeUninit<T>]>>,
}

// SAFETY: all cross-thread access to `buffer` and the cached counters is
// mediated by the head/tail atomics' Acquire/Release protocol documented
// above; T being Send is sufficient for the ring itself to be Send/Sync.
unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send> Sync for RingBuffer<T> {}

impl<T> RingBuffer<T> {
    /// Creates a ring of (at least) `requested_capacity` slots, rounding up
    /// to the next power of two and logging a warning if rounding occurred
    /// (`spec.md` §4.1 rounding policy).
    pub fn new(requested_capacity: usize) -> Self {
        let capacity = requested_capacity.max(1).next_power_of_two();
        if capacity != requested_capacity {
            log::warn!(
                "ring capacity {requested_capacity} is not a power of two; rounding up to {capacity}"
            );
        }
        debug_assert_power_of_two!(capacity);

        let mut buffer = Vec::with_capacity(capacity);
        buffer.resize_with(capacity, MaybeUninit::uninit);

        Self {
            tail: CachePadded::new(AtomicU64::new(0)),
            cached_head: CachePadded::new(UnsafeCell::new(0)),
            head: CachePadded::new(AtomicU64::new(0)),
            cached_tail: CachePadded::new(UnsafeCell::new(0)),
            mask: (capacity - 1) as u64,
            capacity,
            metrics: Metrics::new(),
            buffer: UnsafeCell::new(buffer.into_boxed_slice()),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `tail - head`, safe to call from either side (each load is its own
    /// snapshot, so this is approximate under concurrent progress, which is
    /// the expected use: size-for-display, not a synchronization point).
    #[inline]
    pub fn size(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        tail.wrapping_sub(head) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.size() == self.capacity
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Appends `value` if the ring is not full; returns it back otherwise.
    pub fn offer(&self, value: T) -> Result<(), T> {
        let tail = self.tail.load(Ordering::Relaxed);
        // SAFETY: only the producer writes `cached_head`.
        let mut cached_head = unsafe { *self.cached_head.get() };

        if tail.wrapping_sub(cached_head) >= self.capacity as u64 {
            let head = self.head.load(Ordering::Acquire);
            unsafe {
                *self.cached_head.get() = head;
            }
            cached_head = head;
            if tail.wrapping_sub(cached_head) >= self.capacity as u64 {
                self.metrics.record_offer_rejected();
                return Err(value);
            }
        }

        debug_assert_bounded_count!(tail.wrapping_sub(cached_head), self.capacity as u64);

        let idx = (tail & self.mask) as usize;
        // SAFETY: slot at `idx` was vacated by the consumer (it lies beyond
        // `cached_head`, which is at most the real `head`), and only the
        // producer writes producer-owned slots.
        unsafe {
            (*self.buffer.get())[idx].write(value);
        }

        let new_tail = tail + 1;
        debug_assert_monotonic!("tail", tail, new_tail);
        self.tail.store(new_tail, Ordering::Release);
        self.metrics.record_offer();
        Ok(())
    }

    /// Like [`offer`](Self::offer), but spins (with adaptive backoff) up to
    /// `spin` before giving up. `spec.md` §4.1/§9 notes this capability
    /// exists on the ring but is not exercised by the outbound pipeline's
    /// hot path, which relies on growth instead.
    pub fn offer_spin(&self, mut value: T, spin: Duration) -> Result<(), T> {
        let deadline = Instant::now() + spin;
        let mut backoff = Backoff::new();
        loop {
            match self.offer(value) {
                Ok(()) => return Ok(()),
                Err(v) => value = v,
            }
            if Instant::now() >= deadline {
                return Err(value);
            }
            self.metrics.record_spin();
            backoff.snooze();
        }
    }

    /// Removes and returns the head element, if present.
    pub fn poll(&self) -> Option<T> {
        if self.is_empty_consumer_view() {
            return None;
        }
        Some(unsafe { self.poll_unchecked() })
    }

    /// Non-destructively inspects the head element, if present.
    pub fn peek(&self) -> Option<&T> {
        if self.is_empty_consumer_view() {
            return None;
        }
        Some(unsafe { self.peek_unchecked() })
    }

    /// Non-destructively inspects the head element mutably, if present.
    /// Used by the outbound pipeline to advance a queued [`crate::Slice`] in
    /// place during a partial drain.
    pub fn peek_mut(&self) -> Option<&mut T> {
        if self.is_empty_consumer_view() {
            return None;
        }
        Some(unsafe { self.peek_unchecked_mut() })
    }

    /// Removes and returns the head element without checking for emptiness.
    ///
    /// # Safety
    /// The caller must have already established `size() > 0` (typically via
    /// a single snapshot before a batch of dequeues), per `spec.md` §4.1 and
    /// §9's note on `peek_unchecked`/`poll_unchecked`.
    pub unsafe fn poll_unchecked(&self) -> T {
        let head = self.head.load(Ordering::Relaxed);
        let idx = (head & self.mask) as usize;
        let value = (*self.buffer.get())[idx].assume_init_read();
        let new_head = head + 1;
        debug_assert_monotonic!("head", head, new_head);
        self.head.store(new_head, Ordering::Release);
        self.metrics.record_poll();
        value
    }

    /// Non-destructively inspects the head element without checking for
    /// emptiness.
    ///
    /// # Safety
    /// Same precondition as [`poll_unchecked`](Self::poll_unchecked).
    pub unsafe fn peek_unchecked(&self) -> &T {
        let head = self.head.load(Ordering::Relaxed);
        let idx = (head & self.mask) as usize;
        (*self.buffer.get())[idx].assume_init_ref()
    }

    /// Non-destructively inspects the head element mutably, without
    /// checking for emptiness. Used by the outbound pipeline to advance a
    /// queued [`crate::Slice`] in place during a partial drain.
    ///
    /// # Safety
    /// Same precondition as [`poll_unchecked`](Self::poll_unchecked).
    pub unsafe fn peek_unchecked_mut(&self) -> &mut T {
        let head = self.head.load(Ordering::Relaxed);
        let idx = (head & self.mask) as usize;
        (*self.buffer.get())[idx].assume_init_mut()
    }

    fn is_empty_consumer_view(&self) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        // SAFETY: only the consumer writes `cached_tail`.
        let mut cached_tail = unsafe { *self.cached_tail.get() };
        if head >= cached_tail {
            let tail = self.tail.load(Ordering::Acquire);
            unsafe {
                *self.cached_tail.get() = tail;
            }
            cached_tail = tail;
        }
        head >= cached_tail
    }
}

impl<T> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        let mut seq = head;
        while seq < tail {
            let idx = (seq & self.mask) as usize;
            unsafe {
                (*self.buffer.get())[idx].assume_init_drop();
            }
            seq += 1;
        }
    }
}
