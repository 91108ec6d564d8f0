use bytes::{Buf, BytesMut};
use tracing::{debug, trace};

use crate::codec::{decode_response, ResponseFrame, RESPONSE_FRAME_LEN};

const INITIAL_BUFFER_CAPACITY: usize = 64;

/// What the framer does with bytes left over after a decode.
///
/// Responses carry no header, length or terminator, so framing is purely a
/// byte count threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FramingPolicy {
    /// Decode the first two buffered bytes, then clear the whole buffer.
    ///
    /// Anything past the first response in a chunk is dropped. This is the
    /// behavior existing hosts have always had, so it stays the default.
    #[default]
    ClearOnDecode,
    /// Decode every complete 2-byte window and keep a trailing odd byte.
    ///
    /// Deviates from existing hosts: recovers back-to-back responses, but an
    /// unpaired noise byte shifts every later frame until the link goes idle
    /// on an even boundary.
    Reframe,
}

/// Where the framer is between responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    /// Nothing buffered.
    Idle,
    /// One byte buffered, waiting for the second.
    Accumulating,
}

/// Turns a chunked byte stream into response frames.
///
/// Chunks may be any size. There is no garbage detection: once two bytes are
/// buffered they are a response.
#[derive(Debug)]
pub struct ResponseFramer {
    buf: BytesMut,
    policy: FramingPolicy,
    discarded: u64,
}

impl ResponseFramer {
    /// Create a framer with the default policy.
    pub fn new() -> Self {
        Self::with_policy(FramingPolicy::default())
    }

    /// Create a framer with an explicit policy.
    pub fn with_policy(policy: FramingPolicy) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            policy,
            discarded: 0,
        }
    }

    /// Feed one chunk of received bytes, returning the responses it completed.
    ///
    /// Under [`FramingPolicy::ClearOnDecode`] at most one response is
    /// returned per chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ResponseFrame> {
        if chunk.is_empty() {
            return Vec::new();
        }

        self.buf.extend_from_slice(chunk);
        trace!(len = chunk.len(), buffered = self.buf.len(), "rx chunk");

        match self.policy {
            FramingPolicy::ClearOnDecode => {
                let Some(frame) = decode_response(&self.buf) else {
                    return Vec::new();
                };
                let extra = self.buf.len() - RESPONSE_FRAME_LEN;
                if extra > 0 {
                    self.discarded += extra as u64;
                    debug!(
                        dropped = extra,
                        bytes = %hex(&self.buf[RESPONSE_FRAME_LEN..]),
                        "discarding bytes after response"
                    );
                }
                self.buf.clear();
                vec![frame]
            }
            FramingPolicy::Reframe => {
                let mut frames = Vec::with_capacity(self.buf.len() / RESPONSE_FRAME_LEN);
                while let Some(frame) = decode_response(&self.buf) {
                    self.buf.advance(RESPONSE_FRAME_LEN);
                    frames.push(frame);
                }
                frames
            }
        }
    }

    /// Current state.
    pub fn state(&self) -> FramerState {
        if self.buf.is_empty() {
            FramerState::Idle
        } else {
            FramerState::Accumulating
        }
    }

    /// Bytes waiting for the rest of a response.
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    /// Total bytes dropped after a decode since the framer was created.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Active framing policy.
    pub fn policy(&self) -> FramingPolicy {
        self.policy
    }
}

impl Default for ResponseFramer {
    fn default() -> Self {
        Self::new()
    }
}

/// Space-separated upper-case hex, as the device's test logs print it.
pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
