use std::io::{ErrorKind, Write};
use std::thread;
use std::time::Duration;

use tracing::trace;

use crate::codec::Command;
use crate::error::{FrameError, Result};

/// Gap between bytes the ALU's UART receiver reliably keeps up with.
pub const DEFAULT_INTER_BYTE_DELAY: Duration = Duration::from_millis(2);

/// Writes frames to any `Write` stream one byte at a time.
///
/// Every byte is flushed on its own and followed by `inter_byte_delay`, so
/// the device never sees a burst. A send blocks the calling thread for about
/// `len × inter_byte_delay` and cannot be cancelled midway.
pub struct PacedWriter<T> {
    inner: T,
    inter_byte_delay: Duration,
}

impl<T: Write> PacedWriter<T> {
    /// Create a paced writer with the default inter-byte delay.
    pub fn new(inner: T) -> Self {
        Self::with_delay(inner, DEFAULT_INTER_BYTE_DELAY)
    }

    /// Create a paced writer with an explicit inter-byte delay.
    pub fn with_delay(inner: T, inter_byte_delay: Duration) -> Self {
        Self {
            inner,
            inter_byte_delay,
        }
    }

    /// Encode and send a command.
    pub fn send_command(&mut self, command: &Command) -> Result<()> {
        self.send_paced(&command.encode())
    }

    /// Send already-encoded bytes, paced.
    ///
    /// On failure the error reports how many bytes were already written. A
    /// byte that was written but failed to flush counts as written.
    pub fn send_paced(&mut self, frame: &[u8]) -> Result<()> {
        let total = frame.len();
        for (index, &byte) in frame.iter().enumerate() {
            match self.write_byte(byte) {
                Ok(()) => {}
                Err(ByteFailure::Closed) => {
                    return Err(FrameError::ConnectionClosed { sent: index, total })
                }
                Err(ByteFailure::Write(source)) => {
                    return Err(FrameError::WriteFailed {
                        sent: index,
                        total,
                        source,
                    })
                }
                Err(ByteFailure::Flush(source)) => {
                    return Err(FrameError::WriteFailed {
                        sent: index + 1,
                        total,
                        source,
                    })
                }
            }
            trace!(index, "tx byte {byte:02X}");
            thread::sleep(self.inter_byte_delay);
        }
        Ok(())
    }

    fn write_byte(&mut self, byte: u8) -> std::result::Result<(), ByteFailure> {
        loop {
            match self.inner.write(&[byte]) {
                Ok(0) => return Err(ByteFailure::Closed),
                Ok(_) => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(ByteFailure::Write(err)),
            }
        }
        self.flush_inner().map_err(ByteFailure::Flush)
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        self.flush_inner().map_err(FrameError::Io)
    }

    /// Current inter-byte delay.
    pub fn inter_byte_delay(&self) -> Duration {
        self.inter_byte_delay
    }

    /// Change the inter-byte delay for subsequent sends.
    pub fn set_inter_byte_delay(&mut self, delay: Duration) {
        self.inter_byte_delay = delay;
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

/// Where a single paced byte failed.
enum ByteFailure {
    Write(std::io::Error),
    Flush(std::io::Error),
    Closed,
}

/// Send `frame` over `writer` one byte at a time, sleeping `delay` after each.
pub fn send_paced<W: Write>(writer: &mut W, frame: &[u8], delay: Duration) -> Result<()> {
    PacedWriter::with_delay(writer, delay).send_paced(frame)
}
