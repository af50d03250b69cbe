use std::fmt;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// The error taxonomy an endpoint surfaces to the producer thread
/// (`spec.md` §7). The reactor thread never throws out of a readiness
/// callback — it collects `CollectedReactorError` into the error channel
/// instead, and the producer is the single point where user-visible errors
/// appear.
#[derive(Debug, Error, Clone)]
pub enum ClientError {
    /// `send` returned a rejection: the byte cap would be exceeded, or the
    /// pipeline is already at its maximum ring capacity and full. Non-fatal;
    /// the caller may retry later.
    #[error("send rejected: backpressure")]
    BackpressureRejection,

    /// Raised synchronously from `send` once the endpoint has been
    /// unregistered; it no longer owns the socket.
    #[error("client no longer owns the socket")]
    FatalOwnershipLost,

    /// An exception raised on the reactor thread during read/write, wrapped
    /// and deposited in the error channel, surfaced on the producer's next
    /// `send` slow path.
    #[error("reactor thread error: {0}")]
    CollectedReactorError(#[from] ReactorError),
}

/// A cloneable wrapper around an [`io::Error`] raised on the reactor thread,
/// so it can be stored in the bounded error channel and replayed to the
/// producer without requiring `io::Error: Clone` (it isn't).
#[derive(Debug, Clone)]
pub struct ReactorError(Arc<io::Error>);

impl ReactorError {
    pub fn new(source: io::Error) -> Self {
        Self(Arc::new(source))
    }

    pub fn source(&self) -> &io::Error {
        &self.0
    }
}

impl fmt::Display for ReactorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ReactorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

/// A reactor-thread error queued for later delivery to the producer
/// (`spec.md` §3, `errorChannel`).
#[derive(Debug, Clone)]
pub struct ErrorEnvelope {
    error: ClientError,
}

impl ErrorEnvelope {
    pub fn new(error: ClientError) -> Self {
        Self { error }
    }

    pub fn into_inner(self) -> ClientError {
        self.error
    }
}
