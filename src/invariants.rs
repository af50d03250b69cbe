//! Debug-only runtime checks for the invariants `SPEC_FULL.md` §8 lists.
//!
//! Active only under `#[cfg(debug_assertions)]`; zero cost in release builds.

// =============================================================================
// INV-RING-01: Bounded Count
// =============================================================================

/// `0 ≤ tail - head ≤ capacity`.
macro_rules! debug_assert_bounded_count {
    ($count:expr, $capacity:expr) => {
        debug_assert!(
            $count <= $capacity,
            "INV-RING-01 violated: count {} exceeds capacity {}",
            $count,
            $capacity
        )
    };
}

// =============================================================================
// INV-RING-02: Monotonic Progress
// =============================================================================

/// A sequence counter (head or tail) only increases.
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "INV-RING-02 violated: {} decreased from {} to {}",
            $name,
            $old,
            $new
        )
    };
}

// =============================================================================
// INV-RING-03: Power-of-two capacity
// =============================================================================

/// A ring's capacity is always a power of two (`SPEC_FULL.md` §8 invariant 5).
macro_rules! debug_assert_power_of_two {
    ($capacity:expr) => {
        debug_assert!(
            $capacity.is_power_of_two(),
            "INV-RING-03 violated: capacity {} is not a power of two",
            $capacity
        )
    };
}

// =============================================================================
// INV-PIPE-01: Write interest consistency
// =============================================================================

/// While any frame is queued or the staging buffer has residual bytes, write
/// interest must be asserted (`SPEC_FULL.md` §8 invariant 4).
macro_rules! debug_assert_write_interest_consistent {
    ($has_pending:expr, $asserted:expr) => {
        debug_assert!(
            !$has_pending || $asserted,
            "INV-PIPE-01 violated: pending data with write interest not asserted"
        )
    };
}

// =============================================================================
// INV-PIPE-02: Byte accounting monotonicity post-send
// =============================================================================

/// After a successful send of `len` bytes, the producer counter advanced by
/// exactly `len` (`SPEC_FULL.md` §8 invariant 1).
macro_rules! debug_assert_byte_delta {
    ($before:expr, $after:expr, $len:expr) => {
        debug_assert_eq!(
            $after.wrapping_sub($before),
            $len as i64,
            "INV-PIPE-02 violated: sendBufferBytes advanced by {} instead of {}",
            $after.wrapping_sub($before),
            $len
        )
    };
}

pub(crate) use debug_assert_bounded_count;
pub(crate) use debug_assert_byte_delta;
pub(crate) use debug_assert_monotonic;
pub(crate) use debug_assert_power_of_two;
pub(crate) use debug_assert_write_interest_consistent;
