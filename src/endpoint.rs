use crate::contract::{ClientHandler, Interest, RegistrationKey};
use crate::error::{ClientError, ReactorError};
use crate::pipeline::{OutboundPipeline, SendHandle};
use std::io::{self, ErrorKind, Read, Write};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// `spec.md` §4.6 state machine: `New → Registered → Connected → (Sending ↔
/// Idle) → Disconnected → Unregistered`. `Sending`/`Idle` are not modeled as
/// separate states here — they are exactly `pipeline.write_interest_asserted()`,
/// which is already the authoritative signal §4.6 derives them from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EndpointState {
    New = 0,
    Registered = 1,
    Connected = 2,
    Disconnected = 3,
    Unregistered = 4,
}

impl EndpointState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::New,
            1 => Self::Registered,
            2 => Self::Connected,
            3 => Self::Disconnected,
            _ => Self::Unregistered,
        }
    }
}

/// The fill/flip/compact staging area between the outbound pipeline and the
/// socket (`spec.md` §3 `writeBuffer`, §9 "Direct buffer"). The discipline is
/// encoded as explicit state rather than a type hierarchy: `fill_pos` is the
/// high-water mark of written bytes, `read_pos` the low-water mark of
/// consumed ones.
struct StagingBuffer {
    data: Box<[u8]>,
    fill_pos: usize,
    read_pos: usize,
    reading: bool,
}

impl StagingBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            fill_pos: 0,
            read_pos: 0,
            reading: false,
        }
    }

    fn remaining_fill(&self) -> usize {
        debug_assert!(!self.reading, "remaining_fill called while in read mode");
        self.data.len() - self.fill_pos
    }

    /// Drains as much of `pipeline`'s poll ring as fits into the fillable
    /// region. Returns the number of bytes copied.
    fn fill_from(&mut self, pipeline: &OutboundPipeline) -> usize {
        debug_assert!(!self.reading, "fill_from called while in read mode");
        let n = pipeline.drain_into(&mut self.data[self.fill_pos..]);
        self.fill_pos += n;
        n
    }

    /// Switches from fill mode to read mode.
    fn flip(&mut self) {
        self.read_pos = 0;
        self.reading = true;
    }

    fn readable(&self) -> &[u8] {
        debug_assert!(self.reading, "readable() called while in fill mode");
        &self.data[self.read_pos..self.fill_pos]
    }

    fn consume(&mut self, n: usize) {
        debug_assert!(self.reading, "consume() called while in fill mode");
        self.read_pos += n;
    }

    fn is_read_exhausted(&self) -> bool {
        self.read_pos >= self.fill_pos
    }

    /// Moves any unread tail bytes to the front and returns to fill mode,
    /// for the "socket accepted fewer bytes than offered" case.
    fn compact(&mut self) {
        let remaining = self.fill_pos - self.read_pos;
        self.data.copy_within(self.read_pos..self.fill_pos, 0);
        self.fill_pos = remaining;
        self.read_pos = 0;
        self.reading = false;
    }

    /// Resets to an empty fill-mode buffer, for the "fully flushed" case.
    fn clear(&mut self) {
        self.fill_pos = 0;
        self.read_pos = 0;
        self.reading = false;
    }
}

/// The reactor-facing object: owns the staging buffer, the outbound
/// pipeline, the inbound read contract, interest-ops manipulation, and the
/// byte-accounting counters (`spec.md` §3, §4.3, §4.4, §4.5, §4.6).
///
/// `K` is the reactor's registration-key type; `S` is the socket type
/// (anything implementing [`Read`] + [`Write`], e.g. `std::net::TcpStream`).
pub struct ClientEndpoint<K: RegistrationKey, S: Read + Write> {
    socket: S,
    key: Option<Arc<K>>,
    handler: Box<dyn ClientHandler<K>>,
    pipeline: OutboundPipeline,
    staging: StagingBuffer,
    state: AtomicU8,
}

impl<K: RegistrationKey, S: Read + Write> ClientEndpoint<K, S> {
    pub fn new(
        socket: S,
        handler: Box<dyn ClientHandler<K>>,
        config: crate::Config,
    ) -> Self {
        let initial_capacity = config.initial_capacity();
        Self {
            socket,
            key: None,
            handler,
            pipeline: OutboundPipeline::new(
                initial_capacity,
                config.max_sendbuffer_size(),
                config.max_sendbuffer_bytes(),
                config.write_count_update_interval(),
            ),
            staging: StagingBuffer::new(initial_capacity.min(4096).max(256)),
            state: AtomicU8::new(EndpointState::New as u8),
        }
    }

    pub fn state(&self) -> EndpointState {
        EndpointState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, to: EndpointState) {
        self.state.store(to as u8, Ordering::Release);
    }

    /// The key is valid and the socket reports connected (`spec.md` §6
    /// `isConnected`).
    pub fn is_connected(&self) -> bool {
        self.state() == EndpointState::Connected
            && self.key.as_ref().is_some_and(|k| k.is_valid())
    }

    /// Enqueues `bytes` for transmission (`spec.md` §6 `send`). Safe to call
    /// reentrantly from within [`ClientHandler::read`].
    pub fn send(&self, bytes: Arc<[u8]>, offset: usize, length: usize) -> Result<(), ClientError> {
        let Some(key) = self.key.as_deref() else {
            return Err(ClientError::FatalOwnershipLost);
        };
        self.pipeline.try_enqueue(bytes, offset, length, key)
    }

    /// Convenience overload sending the whole slice.
    pub fn send_all(&self, bytes: Arc<[u8]>) -> Result<(), ClientError> {
        let len = bytes.len();
        self.send(bytes, 0, len)
    }

    // ------------------------------------------------------------------
    // Lifecycle hooks (`spec.md` §4.5)
    // ------------------------------------------------------------------

    pub fn registered(&mut self, key: Arc<K>) {
        debug_assert_eq!(self.state(), EndpointState::New);
        self.key = Some(key);
        self.transition(EndpointState::Registered);
    }

    pub fn connected(&mut self) {
        debug_assert_eq!(self.state(), EndpointState::Registered);
        self.transition(EndpointState::Connected);
        if let Some(key) = self.key.clone() {
            let handle = SendHandle { pipeline: &self.pipeline, key: key.as_ref() };
            self.handler.connected(&handle);
        }
    }

    fn disconnected(&mut self) {
        self.transition(EndpointState::Disconnected);
        self.handler.disconnected();
    }

    fn unregister(&mut self) {
        self.pipeline.mark_unregistered();
        self.transition(EndpointState::Unregistered);
    }

    /// Called on the reactor thread when an I/O error occurs outside a
    /// direct `send` call; wraps it and deposits it in the error channel
    /// (`spec.md` §4.5 `handleException`).
    pub fn handle_exception(&self, error: io::Error) {
        self.pipeline
            .record_reactor_error(ClientError::CollectedReactorError(ReactorError::new(error)));
    }

    // ------------------------------------------------------------------
    // Read path (`spec.md` §4.3)
    // ------------------------------------------------------------------

    /// Handles a readable reactor event.
    pub fn on_readable(&mut self) {
        if self.state() == EndpointState::Unregistered {
            return;
        }
        let n = {
            let buf = self.handler.buffer();
            match self.socket.read(buf) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(e) => {
                    self.handle_exception(e);
                    return;
                }
            }
        };

        match n {
            0 => {
                self.disconnected();
                self.unregister();
            }
            n => {
                if let Some(key) = self.key.clone() {
                    let handle = SendHandle { pipeline: &self.pipeline, key: key.as_ref() };
                    self.handler.read(n, &handle);
                } else {
                    log::warn!("read {n} bytes before the endpoint was registered; dropping");
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Write path (`spec.md` §4.4)
    // ------------------------------------------------------------------

    /// Handles a writable reactor event.
    pub fn on_writable(&mut self) {
        if self.state() == EndpointState::Unregistered {
            return;
        }

        if !self.pipeline.poll_ring_is_empty() && self.staging.remaining_fill() > 0 {
            let n = self.staging.fill_from(&self.pipeline);
            if n > 0 {
                self.pipeline.account_write_throttled(n);
            }
        }

        self.staging.flip();

        loop {
            if self.staging.is_read_exhausted() {
                self.staging.clear();
                if self.pipeline.poll_ring_is_empty() {
                    break;
                }
                let n = self.staging.fill_from(&self.pipeline);
                self.pipeline.account_write_immediate(n);
                if n == 0 {
                    // Only zero-length frames remained (valid per `spec.md`
                    // §3: `length ≥ 0`); they were drained and freed but
                    // contributed no bytes. `clear()` above already left the
                    // buffer in fill mode — stay there rather than `flip()`
                    // into read mode with nothing to read.
                    break;
                }
                self.staging.flip();
                continue;
            }

            match self.socket.write(self.staging.readable()) {
                Ok(0) => {
                    self.staging.compact();
                    return;
                }
                Ok(written) => {
                    self.staging.consume(written);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    self.staging.compact();
                    return;
                }
                Err(e) => {
                    self.handle_exception(e);
                    self.staging.compact();
                    return;
                }
            }
        }

        if let Some(key) = self.key.clone() {
            self.pipeline.rotate_poll_ring_if_empty(key.as_ref());
        }
    }

    /// Manipulates `OP_READ`; returns whether the call changed state
    /// (`spec.md` §6). Out of scope for the core pipeline, provided as a
    /// thin pass-through over the registration key.
    pub fn suspend_read_if_resumed(&self) -> bool {
        let Some(key) = &self.key else { return false };
        let ops = key.interest_ops();
        if ops.contains(Interest::READ) {
            key.set_interest_ops(ops - Interest::READ);
            true
        } else {
            false
        }
    }

    pub fn resume_read_if_suspended(&self) -> bool {
        let Some(key) = &self.key else { return false };
        let ops = key.interest_ops();
        if !ops.contains(Interest::READ) {
            key.set_interest_ops(ops | Interest::READ);
            true
        } else {
            false
        }
    }

    /// Polls the error channel for the next pending reactor-thread error,
    /// if any. `send`'s slow path already observes the same channel through
    /// `try_enqueue` (`spec.md` §4.5, §7); this is for direct inspection.
    pub fn take_pending_error(&self) -> Option<ClientError> {
        self.pipeline.take_pending_error()
    }

    /// A point-in-time snapshot of the outbound pipeline's counters (offers,
    /// rejections, growths, retirements, spins) — not part of `spec.md`, an
    /// ambient-stack observability addition (`DESIGN.md`).
    pub fn metrics(&self) -> crate::MetricsSnapshot {
        self.pipeline.metrics()
    }
}
