use alulink_transport::SerialConfig;

use crate::config::LinkConfig;
use crate::error::Result;
use crate::session::LinkSession;

/// Open a serial port at the default line settings and start a session.
pub fn open(path: &str) -> Result<LinkSession> {
    open_with_config(&SerialConfig::new(path), LinkConfig::default())
}

/// Open a serial port with explicit configuration and start a session.
///
/// The port handle is cloned so the receive loop and senders never contend
/// for the same handle.
pub fn open_with_config(serial: &SerialConfig, config: LinkConfig) -> Result<LinkSession> {
    let stream = alulink_transport::open(serial)?;
    let reader = stream.try_clone()?;
    let name = stream.name().unwrap_or_else(|| serial.path.clone());
    LinkSession::from_parts(name, reader, stream, config)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::SessionError;

    #[test]
    fn open_missing_port_is_transport_error() {
        let path = format!("/dev/alulink-missing-{}", std::process::id());
        let err = open(&path).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Transport(alulink_transport::TransportError::Open { .. })
        ));
    }
}
