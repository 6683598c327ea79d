//! Blocking byte source abstraction
//!
//! The frame decoder only needs "fill this buffer or tell me the peer went
//! away". Anything implementing [`std::io::Read`] qualifies.

use std::io::{self, Read};

/// Result of trying to fill a buffer completely
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// Buffer filled
    Complete,
    /// Peer closed the stream after `received` bytes
    Closed { received: usize },
}

/// Reliable, ordered, blocking stream of bytes
pub trait ByteSource {
    /// Read exactly `buf.len()` bytes.
    ///
    /// Partial reads and `Interrupted` are retried. A zero-length read is
    /// reported as [`Fill::Closed`]; any other I/O error is returned.
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<Fill>;
}

impl<R: Read + ?Sized> ByteSource for R {
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<Fill> {
        let mut received = 0;
        while received < buf.len() {
            match self.read(&mut buf[received..]) {
                Ok(0) => return Ok(Fill::Closed { received }),
                Ok(n) => received += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(Fill::Complete)
    }
}
