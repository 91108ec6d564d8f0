//! Host-side controller for an FPGA ALU over a serial link.
//!
//! alulink encodes ALU commands, paces them onto a UART one byte at a time,
//! and decodes the 2-byte responses the device sends back.
//!
//! # Crate Structure
//!
//! - [`transport`]: Serial port access and the `LinkStream` byte stream
//! - [`frame`]: Opcodes, command/response codec, response framer, paced writer
//! - [`session`]: Link session with a background receive loop (behind `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use alulink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use alulink_frame::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use alulink_session::*;
}
