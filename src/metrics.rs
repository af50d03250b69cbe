use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free hot-path counters for a [`crate::RingBuffer`] or an
/// [`crate::OutboundPipeline`]. Not part of `spec.md`, but present in every
/// hot-path structure the teacher ships — an ambient-stack addition.
#[derive(Debug, Default)]
pub struct Metrics {
    offers: AtomicU64,
    offers_rejected: AtomicU64,
    polls: AtomicU64,
    growths: AtomicU64,
    retirements: AtomicU64,
    spins: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_offer(&self) {
        self.offers.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_offer_rejected(&self) {
        self.offers_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_poll(&self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_growth(&self) {
        self.growths.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_retirement(&self) {
        self.retirements.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_spin(&self) {
        self.spins.fetch_add(1, Ordering::Relaxed);
    }

    /// A point-in-time, non-atomic snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            offers: self.offers.load(Ordering::Relaxed),
            offers_rejected: self.offers_rejected.load(Ordering::Relaxed),
            polls: self.polls.load(Ordering::Relaxed),
            growths: self.growths.load(Ordering::Relaxed),
            retirements: self.retirements.load(Ordering::Relaxed),
            spins: self.spins.load(Ordering::Relaxed),
        }
    }
}

/// A plain-data snapshot of [`Metrics`] taken at a single instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub offers: u64,
    pub offers_rejected: u64,
    pub polls: u64,
    pub growths: u64,
    pub retirements: u64,
    pub spins: u64,
}
