use std::fmt;
use std::io;

use alulink_frame::FrameError;
use alulink_session::SessionError;
use alulink_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Open { ref source, .. }
            if source.kind == serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied) =>
        {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::InvalidOperand { .. }
        | FrameError::InvalidOpcode(_)
        | FrameError::UnknownOpcode(_) => CliError::usage(format!("{context}: {err}")),
        FrameError::WriteFailed { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
        FrameError::Io(source) => io_error(context, source),
    }
}

pub fn session_error(context: &str, err: SessionError) -> CliError {
    match err {
        SessionError::Transport(err) => transport_error(context, err),
        SessionError::Frame(err) => frame_error(context, err),
        SessionError::LinkLost(_) => CliError::new(FAILURE, format!("{context}: {err}")),
        SessionError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}
