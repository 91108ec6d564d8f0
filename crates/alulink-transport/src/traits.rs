use std::io::{Read, Write};

use serialport::SerialPort;

use crate::error::Result;

/// A byte source that can report how much input is queued without blocking.
///
/// The session receive loop polls this instead of issuing blocking reads, so
/// it can notice shutdown between polls.
pub trait PollRead: Read {
    /// Number of bytes that can be read right now without blocking.
    ///
    /// An error means the link is gone; callers treat it as terminal.
    fn bytes_available(&mut self) -> std::io::Result<usize>;
}

/// A connected link stream implementing Read + Write.
///
/// This is the fundamental I/O type returned by transport operations.
/// Usually this wraps an open serial port. On Unix it can also wrap one end
/// of a socket pair, which behaves like a null-modem cable.
pub struct LinkStream {
    inner: LinkStreamInner,
}

enum LinkStreamInner {
    Serial(Box<dyn SerialPort>),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Read for LinkStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            LinkStreamInner::Serial(port) => port.read(buf),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for LinkStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            LinkStreamInner::Serial(port) => port.write(buf),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            LinkStreamInner::Serial(port) => port.flush(),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl PollRead for LinkStream {
    fn bytes_available(&mut self) -> std::io::Result<usize> {
        match &self.inner {
            LinkStreamInner::Serial(port) => port
                .bytes_to_read()
                .map(|n| n as usize)
                .map_err(std::io::Error::from),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => unix_bytes_available(stream),
        }
    }
}

impl LinkStream {
    /// Create a LinkStream from an opened serial port.
    pub(crate) fn from_serial(port: Box<dyn SerialPort>) -> Self {
        Self {
            inner: LinkStreamInner::Serial(port),
        }
    }

    /// Create a LinkStream from a connected Unix stream.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: LinkStreamInner::Unix(stream),
        }
    }

    /// Create two connected streams, each end reading what the other writes.
    #[cfg(unix)]
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = std::os::unix::net::UnixStream::pair()?;
        Ok((Self::from_unix(left), Self::from_unix(right)))
    }

    /// Try to clone this stream (creates a new handle on the same device).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            LinkStreamInner::Serial(port) => Ok(Self::from_serial(port.try_clone()?)),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
        }
    }

    /// Device name of the underlying port, if known.
    pub fn name(&self) -> Option<String> {
        match &self.inner {
            LinkStreamInner::Serial(port) => port.name(),
            #[cfg(unix)]
            LinkStreamInner::Unix(_) => None,
        }
    }
}

impl std::fmt::Debug for LinkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            LinkStreamInner::Serial(port) => f
                .debug_struct("LinkStream")
                .field("type", &"serial")
                .field("name", &port.name())
                .finish(),
            #[cfg(unix)]
            LinkStreamInner::Unix(_) => f.debug_struct("LinkStream").field("type", &"unix").finish(),
        }
    }
}

/// Queued byte count for a Unix stream, reporting a hung-up peer as EOF.
#[cfg(unix)]
fn unix_bytes_available(stream: &std::os::unix::net::UnixStream) -> std::io::Result<usize> {
    use std::os::fd::AsRawFd;

    let fd = stream.as_raw_fd();
    let pending = fionread(fd)?;
    if pending > 0 {
        return Ok(pending);
    }

    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    // SAFETY: `pfd` is a valid, writable pollfd and the count matches; a zero
    // timeout makes this a non-blocking readiness probe.
    let rc = unsafe { libc::poll(&mut pfd, 1, 0) };
    if rc < 0 {
        return Err(std::io::Error::last_os_error());
    }

    if rc > 0 && pfd.revents & (libc::POLLIN | libc::POLLHUP) != 0 {
        // Data may have landed between the two probes.
        let pending = fionread(fd)?;
        if pending > 0 {
            return Ok(pending);
        }
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "peer closed the link",
        ));
    }

    Ok(0)
}

#[cfg(unix)]
fn fionread(fd: std::os::fd::RawFd) -> std::io::Result<usize> {
    let mut pending: libc::c_int = 0;
    // SAFETY: `pending` is a valid writable c_int, which is what FIONREAD
    // expects, and `fd` is an open socket owned by the caller.
    let rc = unsafe { libc::ioctl(fd, libc::FIONREAD, &mut pending as *mut libc::c_int) };
    if rc < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(pending.max(0) as usize)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn pair_reports_queued_bytes() {
        let (mut left, mut right) = LinkStream::pair().unwrap();
        assert_eq!(right.bytes_available().unwrap(), 0);

        left.write_all(&[0x05, 0x01, 0x99]).unwrap();
        left.flush().unwrap();
        assert_eq!(right.bytes_available().unwrap(), 3);

        let mut buf = [0u8; 3];
        right.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0x05, 0x01, 0x99]);
        assert_eq!(right.bytes_available().unwrap(), 0);
    }

    #[test]
    fn hung_up_peer_is_eof() {
        let (left, mut right) = LinkStream::pair().unwrap();
        drop(left);

        let err = right.bytes_available().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn clone_shares_the_link() {
        let (left, mut right) = LinkStream::pair().unwrap();
        let mut writer = left.try_clone().unwrap();

        writer.write_all(&[0xD1]).unwrap();
        let mut buf = [0u8; 1];
        right.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0xD1]);
        drop(left);
    }

    #[test]
    fn unix_stream_has_no_device_name() {
        let (left, _right) = LinkStream::pair().unwrap();
        assert!(left.name().is_none());
        assert!(format!("{left:?}").contains("unix"));
    }
}
