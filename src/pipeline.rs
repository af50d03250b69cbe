use crate::contract::{Interest, RegistrationKey};
use crate::error::{ClientError, ErrorEnvelope};
use crate::invariants::{debug_assert_byte_delta, debug_assert_write_interest_consistent};
use crate::ring::RingBuffer;
use crate::slice::Slice;
use crate::Metrics;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Capacity of the bounded error channel (`spec.md` §3, §6).
const ERROR_CHANNEL_CAPACITY: usize = 4;

/// Topology mutated only on the rare grow/rotate path, serialized by the
/// pipeline's mutex. Fast-path reads on either side go through the
/// producer's/reactor's own cached `Arc` instead of touching this.
struct Topology {
    offer_ring: Arc<RingBuffer<Slice>>,
    poll_ring: Arc<RingBuffer<Slice>>,
    retired_rings: RingBuffer<Arc<RingBuffer<Slice>>>,
}

/// Reactor-thread-exclusive accounting for the throttled publication of
/// `write_buffer_bytes` (`spec.md` §4.4).
struct ReactorAccounting {
    curr_write_buffer_bytes: i64,
    last_update: Instant,
}

/// The send-queue system of a [`crate::ClientEndpoint`]: a current offer-side
/// ring, a current poll-side ring, a ring-of-rings of retired offer rings
/// awaiting drain, and a recycling pool of [`Slice`]s (`spec.md` §3, §4.2).
pub struct OutboundPipeline {
    topology: Mutex<Topology>,

    // SAFETY: written only by the producer thread (the sole caller of
    // `try_enqueue`), mirroring the ring's own `cached_head` single-writer
    // discipline. Read by the producer's fast path to avoid the topology
    // mutex except on a ring-full transition.
    cached_offer_ring: UnsafeCell<Arc<RingBuffer<Slice>>>,
    // SAFETY: written only by the reactor thread (the sole caller of
    // `drain_into`/`rotate_poll_ring_if_empty`).
    cached_poll_ring: UnsafeCell<Arc<RingBuffer<Slice>>>,

    free_slices: RingBuffer<Slice>,

    max_ring_capacity: usize,
    max_sendbuffer_bytes: Option<u64>,
    write_count_update_interval: Duration,

    send_buffer_bytes: AtomicI64,
    write_buffer_bytes: AtomicI64,
    // SAFETY: written only by the reactor thread.
    reactor_accounting: UnsafeCell<ReactorAccounting>,

    write_interest_asserted: AtomicBool,
    unregistered: AtomicBool,

    error_channel: RingBuffer<ErrorEnvelope>,
    metrics: Metrics,
}

// SAFETY: the two `UnsafeCell` caches are each written by exactly one of the
// two threads that ever touch an `OutboundPipeline` (the producer and the
// reactor), per the single-producer/single-consumer discipline `spec.md`
// §5 documents; all other mutable state is either atomic or behind `topology`.
unsafe impl Send for OutboundPipeline {}
unsafe impl Sync for OutboundPipeline {}

impl OutboundPipeline {
    pub fn new(
        initial_capacity: usize,
        max_ring_capacity: usize,
        max_sendbuffer_bytes: Option<u64>,
        write_count_update_interval: Duration,
    ) -> Self {
        let first_ring = Arc::new(RingBuffer::new(initial_capacity));
        let retired_capacity = {
            let steps = max_ring_capacity
                .trailing_zeros()
                .saturating_sub(first_ring.capacity().trailing_zeros())
                + 1;
            steps.max(1) as usize
        };

        Self {
            topology: Mutex::new(Topology {
                offer_ring: first_ring.clone(),
                poll_ring: first_ring.clone(),
                retired_rings: RingBuffer::new(retired_capacity),
            }),
            cached_offer_ring: UnsafeCell::new(first_ring.clone()),
            cached_poll_ring: UnsafeCell::new(first_ring.clone()),
            free_slices: RingBuffer::new(first_ring.capacity()),
            max_ring_capacity,
            max_sendbuffer_bytes,
            write_count_update_interval,
            send_buffer_bytes: AtomicI64::new(0),
            write_buffer_bytes: AtomicI64::new(0),
            reactor_accounting: UnsafeCell::new(ReactorAccounting {
                curr_write_buffer_bytes: 0,
                last_update: Instant::now(),
            }),
            write_interest_asserted: AtomicBool::new(false),
            unregistered: AtomicBool::new(false),
            error_channel: RingBuffer::new(ERROR_CHANNEL_CAPACITY),
            metrics: Metrics::new(),
        }
    }

    pub fn metrics(&self) -> crate::MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn send_buffer_bytes(&self) -> i64 {
        self.send_buffer_bytes.load(Ordering::Acquire)
    }

    pub fn write_buffer_bytes(&self) -> i64 {
        self.write_buffer_bytes.load(Ordering::Acquire)
    }

    /// Wrap-safe `sendBufferBytes - writeBufferBytes`, handling the case
    /// where the signed counter has wrapped once (`spec.md` §4.2 step 1).
    fn pending_bytes(send: i64, write: i64) -> i64 {
        if send < 0 && write >= 0 {
            -(send + write)
        } else {
            send - write
        }
    }

    /// Enqueues `bytes[offset..offset + length]` for transmission
    /// (`spec.md` §4.2 `tryEnqueue`). Callable from the producer thread only.
    pub fn try_enqueue(
        &self,
        bytes: Arc<[u8]>,
        offset: usize,
        length: usize,
        key: &dyn RegistrationKey,
    ) -> Result<(), ClientError> {
        if self.unregistered.load(Ordering::Acquire) {
            return Err(ClientError::FatalOwnershipLost);
        }

        if let Some(max) = self.max_sendbuffer_bytes {
            let send = self.send_buffer_bytes.load(Ordering::Relaxed);
            let write = self.write_buffer_bytes.load(Ordering::Acquire);
            let pending = Self::pending_bytes(send, write);
            if (max as i64) - pending < length as i64 {
                return Err(ClientError::BackpressureRejection);
            }
        }

        let slice = match self.free_slices.poll() {
            Some(mut recycled) => {
                recycled.reset(bytes, offset, length);
                recycled
            }
            None => Slice::new(bytes, offset, length),
        };

        // SAFETY: producer-exclusive cache, this is the producer thread.
        let offer_ring = unsafe { (*self.cached_offer_ring.get()).clone() };
        match offer_ring.offer(slice) {
            Ok(()) => {
                self.ensure_write_interest(key);
                let before = self.send_buffer_bytes.fetch_add(length as i64, Ordering::Release);
                debug_assert_byte_delta!(before, before + length as i64, length);
                debug_assert_write_interest_consistent!(true, self.write_interest_asserted.load(Ordering::Relaxed));
                Ok(())
            }
            Err(rejected) => self.handle_full_offer_ring(rejected, length, key),
        }
    }

    fn handle_full_offer_ring(
        &self,
        slice: Slice,
        length: usize,
        key: &dyn RegistrationKey,
    ) -> Result<(), ClientError> {
        // `slice` is simply dropped on the rejection paths below: `free_slices`
        // has a single producer by construction (the drainer, which recycles
        // slices it has fully consumed) and a single consumer (this thread);
        // the producer thread returning a slice here would make it a second
        // producer and violate that discipline.
        if let Some(envelope) = self.error_channel.poll() {
            return Err(envelope.into_inner());
        }

        let current_capacity = unsafe { (*self.cached_offer_ring.get()).capacity() };
        if current_capacity >= self.max_ring_capacity {
            drop(slice);
            return Err(ClientError::BackpressureRejection);
        }

        let mut topology = self.topology.lock().unwrap();
        let old_offer = topology.offer_ring.clone();
        if !Arc::ptr_eq(&old_offer, &topology.poll_ring) {
            let _ = topology.retired_rings.offer(old_offer.clone());
        }

        let new_capacity = (old_offer.capacity() * 2).min(self.max_ring_capacity);
        let new_ring = Arc::new(RingBuffer::new(new_capacity));
        new_ring
            .offer(slice)
            .map_err(|_| ())
            .expect("freshly grown ring has room for the slice that triggered growth");

        topology.offer_ring = new_ring.clone();
        drop(topology);

        // SAFETY: producer-exclusive cache, this is the producer thread.
        unsafe {
            *self.cached_offer_ring.get() = new_ring;
        }
        self.metrics.record_growth();

        self.ensure_write_interest(key);
        let before = self.send_buffer_bytes.fetch_add(length as i64, Ordering::Release);
        debug_assert_byte_delta!(before, before + length as i64, length);
        debug_assert_write_interest_consistent!(true, self.write_interest_asserted.load(Ordering::Relaxed));
        Ok(())
    }

    /// Flips write interest on exactly once, the first time the pipeline
    /// transitions from idle to having data queued (`spec.md` §4.2: "under
    /// the pipeline monitor, if !writeInterestAsserted, set OP_WRITE, wake
    /// the selector, and set the flag").
    ///
    /// The flag is read lock-free first: once interest is asserted, every
    /// subsequent enqueue takes this fast path with no lock. Only the rare
    /// idle-to-sending transition pays for the topology mutex, and it must:
    /// `rotate_poll_ring_if_empty` clears the same flag under the same
    /// mutex after re-verifying the poll ring is still empty, so the two
    /// sides cannot interleave as "reactor observes empty, producer offers
    /// and asserts, reactor clears" — whichever of assert/clear runs first
    /// under the lock is the one the other observes.
    fn ensure_write_interest(&self, key: &dyn RegistrationKey) {
        if self.write_interest_asserted.load(Ordering::Acquire) {
            return;
        }
        let _topology = self.topology.lock().unwrap();
        if self
            .write_interest_asserted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            key.set_interest_ops(key.interest_ops() | Interest::WRITE);
            key.wakeup();
        }
    }

    /// Copies as many bytes as fit into `dst`, draining frames from the
    /// current poll ring in FIFO order (`spec.md` §4.2 "drain one frame").
    /// Callable from the reactor thread only. Returns the number of bytes
    /// copied.
    pub fn drain_into(&self, dst: &mut [u8]) -> usize {
        // SAFETY: reactor-exclusive cache, this is the reactor thread.
        let poll_ring = unsafe { &*self.cached_poll_ring.get() };
        let mut copied = 0;
        while copied < dst.len() {
            let Some(head) = poll_ring.peek_mut() else {
                break;
            };
            let remaining_dst = dst.len() - copied;
            if remaining_dst < head.len() {
                dst[copied..copied + remaining_dst].copy_from_slice(&head.as_bytes()[..remaining_dst]);
                head.advance(remaining_dst);
                copied += remaining_dst;
                break;
            }
            let n = head.len();
            dst[copied..copied + n].copy_from_slice(head.as_bytes());
            copied += n;
            // SAFETY: the ring was just observed non-empty via `peek_mut`,
            // and only this thread polls it.
            let drained = unsafe { poll_ring.poll_unchecked() };
            let _ = self.free_slices.offer(drained);
        }
        copied
    }

    /// Whether the current poll ring still has frames queued.
    pub fn poll_ring_is_empty(&self) -> bool {
        // SAFETY: reactor-exclusive cache, this is the reactor thread.
        unsafe { (*self.cached_poll_ring.get()).is_empty() }
    }

    /// Runs the poll-ring rotation logic of `spec.md` §4.2 once the staging
    /// buffer has been fully flushed and the poll ring observed empty.
    /// Returns `true` if the pipeline is now fully drained, in which case
    /// write interest has already been cleared.
    pub fn rotate_poll_ring_if_empty(&self, key: &dyn RegistrationKey) -> bool {
        if !self.poll_ring_is_empty() {
            return false;
        }

        let mut topology = self.topology.lock().unwrap();
        // Re-verify emptiness under the same monitor `ensure_write_interest`
        // uses for the producer-side flip: a `try_enqueue` on another
        // thread can land a slice into this very ring between the
        // lock-free check above and acquiring the lock here. Without this
        // recheck, a frame could be offered (and, seeing the flag still
        // `true`, skip re-asserting write interest) right before this call
        // clears it, stranding the frame with no write interest and no
        // pending wakeup.
        if !unsafe { (*self.cached_poll_ring.get()).is_empty() } {
            return false;
        }
        if Arc::ptr_eq(&topology.offer_ring, &topology.poll_ring) {
            self.write_interest_asserted.store(false, Ordering::Release);
            key.set_interest_ops(key.interest_ops() - Interest::WRITE);
            true
        } else if let Some(next) = topology.retired_rings.poll() {
            topology.poll_ring = next.clone();
            drop(topology);
            // SAFETY: reactor-exclusive cache, this is the reactor thread.
            unsafe {
                *self.cached_poll_ring.get() = next;
            }
            self.metrics.record_retirement();
            false
        } else {
            let offer = topology.offer_ring.clone();
            topology.poll_ring = offer.clone();
            drop(topology);
            unsafe {
                *self.cached_poll_ring.get() = offer;
            }
            false
        }
    }

    /// Adds `n` bytes to the throttled accumulator, publishing
    /// `write_buffer_bytes` only once `write_count_update_interval` has
    /// elapsed since the last publication (`spec.md` §4.4 step 1).
    pub fn account_write_throttled(&self, n: usize) {
        // SAFETY: reactor-exclusive state, this is the reactor thread.
        let accounting = unsafe { &mut *self.reactor_accounting.get() };
        accounting.curr_write_buffer_bytes += n as i64;
        if accounting.last_update.elapsed() >= self.write_count_update_interval {
            self.write_buffer_bytes
                .store(accounting.curr_write_buffer_bytes, Ordering::Release);
            accounting.last_update = Instant::now();
        }
    }

    /// Adds `n` bytes directly to `write_buffer_bytes`, bypassing the
    /// throttle. Used on the "more to write after a full buffer" branch of
    /// `spec.md` §4.4 step 2, which is already on the slow path.
    pub fn account_write_immediate(&self, n: usize) {
        let published = self.write_buffer_bytes.fetch_add(n as i64, Ordering::Release) + n as i64;
        // SAFETY: reactor-exclusive state, this is the reactor thread.
        let accounting = unsafe { &mut *self.reactor_accounting.get() };
        accounting.curr_write_buffer_bytes = published;
        accounting.last_update = Instant::now();
    }

    /// Deposits a reactor-thread error for later delivery to the producer
    /// (`spec.md` §4.5 `handleException`). Best-effort: if the bounded error
    /// channel is full, the oldest unread error is kept and this one is
    /// dropped rather than blocking the reactor thread.
    pub fn record_reactor_error(&self, error: ClientError) {
        let _ = self.error_channel.offer(ErrorEnvelope::new(error));
    }

    /// Marks the pipeline as no longer owning the socket: every subsequent
    /// `try_enqueue` call raises `FatalOwnershipLost` without mutating any
    /// counter (`spec.md` §4.5 `unregistered`, §8 invariant 6). Replaces the
    /// spec's literal "read-through sentinel ring" swap with a flag check,
    /// which gives the same observable contract — see `DESIGN.md`.
    pub fn mark_unregistered(&self) {
        self.unregistered.store(true, Ordering::Release);
    }

    pub fn is_unregistered(&self) -> bool {
        self.unregistered.load(Ordering::Acquire)
    }

    pub fn write_interest_asserted(&self) -> bool {
        self.write_interest_asserted.load(Ordering::Acquire)
    }

    /// Polls the error channel for the next pending reactor-thread error,
    /// if any (`spec.md` §4.5, §7).
    pub fn take_pending_error(&self) -> Option<ClientError> {
        self.error_channel.poll().map(ErrorEnvelope::into_inner)
    }
}

/// A narrow, reentrancy-safe handle passed into [`crate::ClientHandler`]
/// callbacks so they may call `send` back out without recovering a
/// self-referential endpoint handle (`spec.md` §4.3: "calling `send` from
/// within `read` is required to be safe").
///
/// Borrowing only the pipeline and the key (not the handler itself) is what
/// lets `ClientEndpoint` hand this out from inside a method that already
/// holds `&mut self.handler`: the two borrows are of disjoint fields.
pub struct SendHandle<'a, K: RegistrationKey> {
    pub(crate) pipeline: &'a OutboundPipeline,
    pub(crate) key: &'a K,
}

impl<'a, K: RegistrationKey> SendHandle<'a, K> {
    pub fn send(&self, bytes: Arc<[u8]>, offset: usize, length: usize) -> Result<(), ClientError> {
        self.pipeline.try_enqueue(bytes, offset, length, self.key)
    }

    pub fn send_all(&self, bytes: Arc<[u8]>) -> Result<(), ClientError> {
        let len = bytes.len();
        self.send(bytes, 0, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::Interest;
    use std::sync::atomic::AtomicU8;

    struct FakeKey {
        ops: AtomicU8,
        wakeups: AtomicU8,
    }

    impl FakeKey {
        fn new() -> Self {
            Self { ops: AtomicU8::new(0), wakeups: AtomicU8::new(0) }
        }
    }

    impl RegistrationKey for FakeKey {
        fn interest_ops(&self) -> Interest {
            Interest::from_bits_truncate(self.ops.load(Ordering::Relaxed))
        }
        fn set_interest_ops(&self, ops: Interest) {
            self.ops.store(ops.bits(), Ordering::Relaxed);
        }
        fn wakeup(&self) {
            self.wakeups.fetch_add(1, Ordering::Relaxed);
        }
        fn is_valid(&self) -> bool {
            true
        }
    }

    fn bytes(n: usize) -> Arc<[u8]> {
        Arc::from(vec![0xAB; n].into_boxed_slice())
    }

    #[test]
    fn enqueue_asserts_write_interest_once() {
        let pipeline = OutboundPipeline::new(16, 1024, None, Duration::from_millis(10));
        let key = FakeKey::new();
        assert!(pipeline.try_enqueue(bytes(4), 0, 4, &key).is_ok());
        assert!(pipeline.write_interest_asserted());
        assert_eq!(key.interest_ops(), Interest::WRITE);
        assert_eq!(key.wakeups.load(Ordering::Relaxed), 1);

        assert!(pipeline.try_enqueue(bytes(4), 0, 4, &key).is_ok());
        assert_eq!(key.wakeups.load(Ordering::Relaxed), 1, "interest flips only once");
    }

    #[test]
    fn drain_and_rotate_clears_interest_when_empty() {
        let pipeline = OutboundPipeline::new(16, 1024, None, Duration::from_millis(10));
        let key = FakeKey::new();
        pipeline.try_enqueue(bytes(8), 0, 8, &key).unwrap();

        let mut dst = [0u8; 16];
        let n = pipeline.drain_into(&mut dst);
        assert_eq!(n, 8);

        let drained = pipeline.rotate_poll_ring_if_empty(&key);
        assert!(drained);
        assert!(!pipeline.write_interest_asserted());
    }

    #[test]
    fn growth_accepts_frames_beyond_initial_capacity() {
        let pipeline = OutboundPipeline::new(4, 64, None, Duration::from_millis(10));
        let key = FakeKey::new();
        for _ in 0..20 {
            assert!(pipeline.try_enqueue(bytes(1), 0, 1, &key).is_ok());
        }
        assert!(pipeline.metrics().growths > 0);
    }

    #[test]
    fn unregistered_rejects_without_mutating_counters() {
        let pipeline = OutboundPipeline::new(16, 1024, None, Duration::from_millis(10));
        let key = FakeKey::new();
        pipeline.mark_unregistered();
        let before = pipeline.send_buffer_bytes();
        let result = pipeline.try_enqueue(bytes(4), 0, 4, &key);
        assert!(matches!(result, Err(ClientError::FatalOwnershipLost)));
        assert_eq!(pipeline.send_buffer_bytes(), before);
    }

    #[test]
    fn byte_cap_rejects_oversized_send() {
        let pipeline = OutboundPipeline::new(16, 1024, Some(10), Duration::from_millis(10));
        let key = FakeKey::new();
        assert!(pipeline.try_enqueue(bytes(10), 0, 10, &key).is_ok());
        let result = pipeline.try_enqueue(bytes(1), 0, 1, &key);
        assert!(matches!(result, Err(ClientError::BackpressureRejection)));
    }
}
