use bitflags::bitflags;

bitflags! {
    /// The set of readiness events a [`RegistrationKey`] should report,
    /// mirroring a selector's interest ops (`spec.md` Glossary).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Interest: u8 {
        const READ = 0b01;
        const WRITE = 0b10;
    }
}

/// The reactor-facing contract a [`crate::ClientEndpoint`] consumes
/// (`spec.md` §6, "Reactor contract"). The reactor/event loop itself is out
/// of scope; only this boundary is defined here.
///
/// Implementations typically wrap a selector-specific registration token
/// (e.g. an `mio::Token` paired with its `Registry`); this crate never names
/// a concrete selector.
pub trait RegistrationKey: Send + Sync {
    /// The interest ops currently registered for this key.
    fn interest_ops(&self) -> Interest;

    /// Replaces the registered interest ops.
    fn set_interest_ops(&self, ops: Interest);

    /// Wakes the reactor thread blocked in its readiness poll, so an
    /// interest change takes effect promptly rather than waiting for the
    /// next naturally occurring wakeup.
    fn wakeup(&self);

    /// Whether this key is still valid (the channel has not been closed and
    /// deregistered out from under it).
    fn is_valid(&self) -> bool;
}

/// The application-facing contract an embedder implements to interpret
/// inbound bytes (`spec.md` §6, "Subclass contract").
///
/// Parameterized over the concrete [`RegistrationKey`] so a `dyn
/// ClientHandler<K>` trait object remains usable from [`crate::ClientEndpoint`]
/// — an un-parameterized `impl RegistrationKey` in argument position would
/// make the trait's methods generic and therefore not object-safe.
pub trait ClientHandler<K: RegistrationKey>: Send {
    /// Returns a writable region to fill from the socket on the next
    /// readable event. Implementations typically reset and return a fixed
    /// scratch buffer.
    fn buffer(&mut self) -> &mut [u8];

    /// Called after `buffer()` has been filled with `n` bytes of inbound
    /// data. `send` is passed explicitly so it may be safely called back out
    /// from this handler (the idiomatic substitute for recovering a
    /// reentrant `self` handle through shared/interior mutability).
    fn read(&mut self, n: usize, send: &crate::pipeline::SendHandle<'_, K>);

    /// Optional notification once the endpoint transitions to `Connected`.
    fn connected(&mut self, _send: &crate::pipeline::SendHandle<'_, K>) {}

    /// Optional notification once the endpoint transitions to `Disconnected`.
    fn disconnected(&mut self) {}
}
