//! Byte sources the ingestor reads from.

use std::io;

mod mock;
mod serial;

pub use mock::MockTransport;
pub use serial::SerialTransport;

/// A readable link to the ranging firmware.
pub trait Transport: Send {
    /// Read whatever is available into `buf`.
    ///
    /// Returns `Ok(0)` when the read timeout elapsed with nothing to
    /// read. Any `Err` is a link-level fault (device unplugged, permission
    /// revoked); the caller treats the transport as dead.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Name used in log lines.
    fn name(&self) -> &str {
        "transport"
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
