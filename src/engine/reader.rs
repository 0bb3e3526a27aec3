//! Adapts a shared [`Transport`] to `std::io::Read` and `std::io::Write` for
//! the linked framing parser.

use std::io::{self, Read, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::transport::Transport;

/// Bridges the synchronous, non-blocking [`Transport`] capability to
/// `std::io::Read`, which `mavlink`'s `PeekReader` expects.
///
/// `Transport::read` returning `0` means "no data right now"; `Read`
/// reserves `Ok(0)` for end-of-stream, so it is translated to
/// `io::ErrorKind::WouldBlock` instead. A negative return is a fatal
/// transport error.
///
/// Holds the transport via the same `Arc<Mutex<_>>` the send path locks for
/// writes, but only for the duration of a single underlying `read` call,
/// never across the lifetime of the parser built on top of this reader. That
/// keeps the receive thread's framing state alive across loop iterations
/// (the parser owns this reader, not the other way around) without holding
/// the lock long enough to starve concurrent `send` callers.
pub struct TransportReader {
    transport: Arc<Mutex<Box<dyn Transport>>>,
}

impl TransportReader {
    pub fn new(transport: Arc<Mutex<Box<dyn Transport>>>) -> Self {
        Self { transport }
    }
}

impl Read for TransportReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.transport.lock().read(buf) {
            n if n > 0 => Ok(n as usize),
            0 => Err(io::Error::from(io::ErrorKind::WouldBlock)),
            _ => Err(io::Error::new(io::ErrorKind::Other, "transport read failed")),
        }
    }
}

/// The write-side counterpart of [`TransportReader`].
///
/// Unlike the reader, this borrows the transport directly rather than
/// through the shared `Arc<Mutex<_>>`: the send path already holds that
/// mutex as its transmit lock for the whole stamp-then-write critical
/// section (see `ProtocolEngine::send`), so re-locking here would deadlock.
pub struct TransportWriter<'a> {
    transport: &'a mut dyn Transport,
}

impl<'a> TransportWriter<'a> {
    pub fn new(transport: &'a mut dyn Transport) -> Self {
        Self { transport }
    }
}

impl Write for TransportWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.transport.write(buf) {
            n if n >= 0 => Ok(n as usize),
            _ => Err(io::Error::new(io::ErrorKind::Other, "transport write failed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
