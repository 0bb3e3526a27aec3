//! # Transport Abstraction (spec component C1)
//!
//! A uniform, synchronous, non-blocking byte-oriented capability interface
//! with two concrete backends. Generalized from the teacher's
//! `ipc::IpcTransport` (`redhat-performance-rusty-comms`), which is the
//! async-`trait` single-capability-interface-with-multiple-implementations
//! pattern this module follows; made synchronous because the protocol
//! engine drives it from one dedicated OS thread performing non-blocking
//! syscalls directly (spec.md sections 4.1/4.2/5), rather than from a Tokio
//! reactor.
//!
//! ## Supported backends
//!
//! - [`UdpTransport`]: UDP datagrams with "learn on receive" endpoint
//!   discovery and optional broadcast.
//! - [`SerialTransport`]: a raw 8-N-1 serial line, fully non-blocking.

pub mod serial;
pub mod udp;

pub use serial::SerialTransport;
pub use udp::UdpTransport;

/// Maximum MAVLink v2 packet length, including an optional 13-byte
/// signature trailer (spec.md section 4.2).
pub const MAX_PACKET_LEN: usize = 280;

/// Capability interface shared by all transport backends.
///
/// All reads are non-blocking: `0` means "no data right now", a negative
/// return means "fatal error on this transport". Writes are best-effort and
/// may return a short count or a negative value on error.
pub trait Transport: Send {
    /// Opens the transport. Idempotent: calling `open` on an already-open
    /// transport is a no-op that returns `true`.
    fn open(&mut self) -> bool;

    /// Closes the transport. Safe to call on an already-closed transport.
    fn close(&mut self);

    /// Whether the transport is currently open.
    fn is_open(&self) -> bool;

    /// Non-blocking read. Returns the number of bytes read (`0` if none are
    /// currently available), or a negative value on a fatal error.
    fn read(&mut self, buf: &mut [u8]) -> isize;

    /// Best-effort write. Returns the number of bytes written, or a
    /// negative value on error.
    fn write(&mut self, buf: &[u8]) -> isize;
}
