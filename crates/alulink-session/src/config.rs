use std::time::Duration;

use alulink_frame::{FramingPolicy, DEFAULT_INTER_BYTE_DELAY};

/// How long the receive loop sleeps between polls of the port.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Largest chunk the receive loop reads in one poll.
pub const DEFAULT_MAX_CHUNK: usize = 256;

/// Session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Gap after each transmitted byte. Default: 2ms.
    pub inter_byte_delay: Duration,
    /// Sleep between receive polls. Default: 200ms.
    pub poll_interval: Duration,
    /// Maximum bytes read per poll. Default: 256.
    pub max_chunk: usize,
    /// What the framer does with bytes after a response.
    pub framing: FramingPolicy,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            inter_byte_delay: DEFAULT_INTER_BYTE_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_chunk: DEFAULT_MAX_CHUNK,
            framing: FramingPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = LinkConfig::default();
        assert_eq!(cfg.inter_byte_delay, Duration::from_millis(2));
        assert_eq!(cfg.poll_interval, Duration::from_millis(200));
        assert_eq!(cfg.max_chunk, 256);
        assert_eq!(cfg.framing, FramingPolicy::ClearOnDecode);
    }
}
