//! A non-blocking TCP client endpoint meant to be embedded in a
//! single-threaded reactor built around an OS readiness selector.
//!
//! The engineering weight of this crate is its outbound send pipeline: a
//! producer/consumer queue of byte slices ([`RingBuffer`]) drained into a
//! bounded staging buffer and flushed to a socket across many readiness
//! notifications, with dynamic growth, backpressure accounting, and
//! interest-set manipulation — all without per-send locking on the producer
//! side.
//!
//! # Module map
//!
//! - [`ring`] — the single-producer/single-consumer queue primitive.
//! - [`slice`] — the zero-copy byte-region view queued for transmission.
//! - [`pipeline`] — the outbound send-queue system built on top of rings.
//! - [`endpoint`] — the reactor-facing [`ClientEndpoint`], tying the
//!   pipeline, the staging buffer, and the read/write/lifecycle paths
//!   together.
//! - [`contract`] — the traits at the boundary with the (out of scope)
//!   reactor and the (out of scope) application protocol.
//! - [`error`] — the error taxonomy surfaced to the producer thread.
//! - [`config`], [`metrics`], [`backoff`] — ambient configuration, counters,
//!   and the adaptive wait strategy used by a bounded `offer`.
//!
//! The reactor/event loop itself, connection establishment, and application
//! framing are out of scope; only the contracts at those boundaries
//! ([`contract::RegistrationKey`], [`contract::ClientHandler`]) are defined
//! here.

mod backoff;
mod config;
mod contract;
mod endpoint;
mod error;
mod invariants;
mod metrics;
mod pipeline;
mod ring;
mod slice;

pub use backoff::Backoff;
pub use config::Config;
pub use contract::{ClientHandler, Interest, RegistrationKey};
pub use endpoint::{ClientEndpoint, EndpointState};
pub use error::{ClientError, ErrorEnvelope, ReactorError};
pub use metrics::{Metrics, MetricsSnapshot};
pub use pipeline::{OutboundPipeline, SendHandle};
pub use ring::RingBuffer;
pub use slice::Slice;
