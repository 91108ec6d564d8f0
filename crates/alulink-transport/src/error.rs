/// Errors that can occur in serial transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the specified serial port.
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        source: serialport::Error,
    },

    /// Failed to enumerate serial ports.
    #[error("failed to list serial ports: {0}")]
    Enumerate(#[source] serialport::Error),

    /// An operation on an already-open port failed.
    #[error("serial port error: {0}")]
    Port(#[from] serialport::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
