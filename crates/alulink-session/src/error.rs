use std::time::Duration;

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] alulink_transport::TransportError),

    /// Frame-level error (validation or a failed paced write).
    #[error("frame error: {0}")]
    Frame(#[from] alulink_frame::FrameError),

    /// The receive loop stopped after a read failure.
    #[error("link lost: {0}")]
    LinkLost(String),

    /// No response arrived in time.
    #[error("no response after {0:?}")]
    Timeout(Duration),

    /// The receive thread could not be started.
    #[error("failed to start receive loop: {0}")]
    Spawn(std::io::Error),

    /// The receive thread panicked.
    #[error("receive loop panicked")]
    ReceiverPanicked,
}

pub type Result<T> = std::result::Result<T, SessionError>;
