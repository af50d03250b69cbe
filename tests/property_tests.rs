use proptest::prelude::*;
use ringclient::RingBuffer;
use std::sync::Arc;

proptest! {
    /// `spec.md` §8 invariant 5: ring capacity is always a power of two and
    /// never shrinks below what was asked.
    #[test]
    fn prop_ring_capacity_is_power_of_two(requested in 1usize..=10_000) {
        let ring: RingBuffer<u32> = RingBuffer::new(requested);
        prop_assert!(ring.capacity().is_power_of_two());
        prop_assert!(ring.capacity() >= requested);
    }

    /// Bounded count: size never exceeds capacity regardless of offer order.
    #[test]
    fn prop_bounded_count(capacity_bits in 1u32..8, offers in 0usize..500) {
        let ring: RingBuffer<u32> = RingBuffer::new(1 << capacity_bits);
        let mut accepted = 0usize;
        for i in 0..offers {
            if ring.offer(i as u32).is_ok() {
                accepted += 1;
            }
            prop_assert!(ring.size() <= ring.capacity());
        }
        prop_assert!(accepted <= ring.capacity());
    }

    /// FIFO ordering: values come back out in the order they were offered.
    #[test]
    fn prop_fifo_ordering(values in prop::collection::vec(0u32..1000, 1..64)) {
        let ring: RingBuffer<u32> = RingBuffer::new(64);
        for &v in &values {
            ring.offer(v).unwrap();
        }
        let mut drained = Vec::new();
        while let Some(v) = ring.poll() {
            drained.push(v);
        }
        prop_assert_eq!(drained, values);
    }

    /// Offering past capacity never silently drops or reorders accepted items.
    #[test]
    fn prop_overflow_preserves_accepted_prefix(n in 1usize..200) {
        let ring: RingBuffer<u32> = RingBuffer::new(16);
        let mut accepted = Vec::new();
        for i in 0..n {
            if ring.offer(i as u32).is_ok() {
                accepted.push(i as u32);
            }
        }
        let mut drained = Vec::new();
        while let Some(v) = ring.poll() {
            drained.push(v);
        }
        prop_assert_eq!(drained, accepted);
    }
}

#[test]
fn arc_backed_slices_drop_cleanly_under_ring_drop() {
    let marker: Arc<()> = Arc::new(());
    let ring: RingBuffer<Arc<()>> = RingBuffer::new(8);
    for _ in 0..5 {
        ring.offer(marker.clone()).unwrap();
    }
    assert_eq!(Arc::strong_count(&marker), 6);
    drop(ring);
    assert_eq!(Arc::strong_count(&marker), 1);
}
