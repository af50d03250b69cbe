use std::time::Duration;

/// Default upper bound on a single ring's capacity (`MAX_SENDBUFFER_SIZE`).
pub const DEFAULT_MAX_SENDBUFFER_SIZE: usize = 32_768;

/// Default throttle for publishing `write_buffer_bytes` to the producer side.
pub const DEFAULT_WRITE_COUNT_UPDATE_INTERVAL: Duration = Duration::from_millis(30_000);

/// Default requested initial send-ring capacity, independent of
/// `max_sendbuffer_size` (`spec` §6, §8 scenario 2: "Initial ring capacity
/// 1024, MAX_SENDBUFFER_SIZE = 4096" are two separate knobs).
pub const DEFAULT_REQUESTED_INITIAL_CAPACITY: usize = 1024;

/// One-shot, environment-injectable configuration for a [`crate::ClientEndpoint`].
///
/// Mirrors the ring-buffer family's `Config`: small, `Copy`, validated once at
/// construction rather than re-checked on every hot-path call.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    max_sendbuffer_size: usize,
    max_sendbuffer_bytes: Option<u64>,
    write_count_update_interval: Duration,
    requested_initial_capacity: usize,
}

impl Config {
    /// Builds a config, rounding `max_sendbuffer_size` up to a power of two
    /// and logging a warning if rounding was necessary (`spec` §6).
    ///
    /// `requested_initial_capacity` is the caller's hint for the first
    /// offer ring's size, independent of `max_sendbuffer_size` — the two
    /// are separate parameters per `spec` §8 scenario 2, and conflating
    /// them makes the pipeline's growth path unreachable whenever the
    /// caller leaves the initial size at its default.
    pub fn new(
        max_sendbuffer_size: usize,
        max_sendbuffer_bytes: Option<u64>,
        write_count_update_interval: Duration,
        requested_initial_capacity: usize,
    ) -> Self {
        let rounded = max_sendbuffer_size.max(1).next_power_of_two();
        if rounded != max_sendbuffer_size {
            log::warn!(
                "configured max_sendbuffer_size {max_sendbuffer_size} is not a power of two; rounding up to {rounded}"
            );
        }
        Self {
            max_sendbuffer_size: rounded,
            max_sendbuffer_bytes,
            write_count_update_interval,
            requested_initial_capacity,
        }
    }

    /// Upper bound on any single ring's capacity in the outbound pipeline.
    pub fn max_sendbuffer_size(&self) -> usize {
        self.max_sendbuffer_size
    }

    /// Byte cap on outstanding send data; `None` means unlimited accounting
    /// is disabled entirely (the idiomatic replacement for a magic sentinel).
    pub fn max_sendbuffer_bytes(&self) -> Option<u64> {
        self.max_sendbuffer_bytes
    }

    /// Throttle interval for publishing `write_buffer_bytes` cross-thread.
    pub fn write_count_update_interval(&self) -> Duration {
        self.write_count_update_interval
    }

    /// The caller's requested initial send-ring size, before rounding.
    pub fn requested_initial_capacity(&self) -> usize {
        self.requested_initial_capacity
    }

    /// Initial ring capacity for a requested size, per `spec` §6:
    /// `max(1024, ceil(requested / 1024) * 1024)`.
    pub fn initial_ring_capacity(requested: usize) -> usize {
        let rounded = ((requested + 1023) / 1024) * 1024;
        rounded.max(1024)
    }

    /// The actual initial offer-ring capacity this config produces: the
    /// requested size rounded per [`Self::initial_ring_capacity`], capped at
    /// `max_sendbuffer_size` (which may itself be smaller than the rounded
    /// request, e.g. for a tiny `max_sendbuffer_size` the ring simply starts
    /// at its maximum with no room to grow).
    pub fn initial_capacity(&self) -> usize {
        Self::initial_ring_capacity(self.requested_initial_capacity).min(self.max_sendbuffer_size)
    }

    /// A low-latency preset: small staging buffer, tight publication interval.
    pub fn low_latency() -> Self {
        Self::new(4096, None, Duration::from_millis(1_000), DEFAULT_REQUESTED_INITIAL_CAPACITY)
    }

    /// A high-throughput preset: large staging buffer, relaxed publication
    /// interval, and a larger initial ring to absorb bursts without paying
    /// for growth on the first burst.
    pub fn high_throughput() -> Self {
        Self::new(
            DEFAULT_MAX_SENDBUFFER_SIZE * 4,
            None,
            Duration::from_millis(60_000),
            DEFAULT_REQUESTED_INITIAL_CAPACITY * 4,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_SENDBUFFER_SIZE,
            None,
            DEFAULT_WRITE_COUNT_UPDATE_INTERVAL,
            DEFAULT_REQUESTED_INITIAL_CAPACITY,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_non_power_of_two() {
        let cfg = Config::new(1500, None, Duration::from_secs(1), DEFAULT_REQUESTED_INITIAL_CAPACITY);
        assert_eq!(cfg.max_sendbuffer_size(), 2048);
    }

    #[test]
    fn default_matches_documented_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.max_sendbuffer_size(), DEFAULT_MAX_SENDBUFFER_SIZE);
        assert_eq!(cfg.max_sendbuffer_bytes(), None);
        assert_eq!(cfg.requested_initial_capacity(), DEFAULT_REQUESTED_INITIAL_CAPACITY);
    }

    #[test]
    fn initial_ring_capacity_floor_and_rounding() {
        assert_eq!(Config::initial_ring_capacity(10), 1024);
        assert_eq!(Config::initial_ring_capacity(1024), 1024);
        assert_eq!(Config::initial_ring_capacity(1025), 2048);
    }

    /// `spec` §8 scenario 2: the initial ring capacity and `max_sendbuffer_size`
    /// are independent — a small initial request under a much larger max
    /// leaves room for the pipeline to grow.
    #[test]
    fn initial_capacity_is_independent_of_max_sendbuffer_size() {
        let cfg = Config::new(4096, None, Duration::from_millis(30_000), 1024);
        assert_eq!(cfg.initial_capacity(), 1024);
        assert_eq!(cfg.max_sendbuffer_size(), 4096);
    }

    /// When the requested initial capacity rounds above `max_sendbuffer_size`,
    /// the ring starts at the max instead (no room left to grow).
    #[test]
    fn initial_capacity_is_capped_at_max_sendbuffer_size() {
        let cfg = Config::new(2048, None, Duration::from_millis(30_000), 8192);
        assert_eq!(cfg.initial_capacity(), 2048);
    }
}
