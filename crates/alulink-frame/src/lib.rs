//! Command and response framing for the FPGA ALU link.
//!
//! This is the core of alulink. The wire protocol is fixed-size and has no
//! length prefix or checksum:
//! - Execute: `0xCD, op1, op2, opcode` (host → device)
//! - Display: `0xD1` (host → device)
//! - Response: `result, flags` (device → host)
//!
//! Commands must leave the host one byte at a time with a gap between bytes,
//! because the device's UART receiver cannot absorb a burst.

pub mod codec;
pub mod error;
pub mod framer;
pub mod opcode;
pub mod writer;

pub use codec::{
    check_operand, decode_response, encode_command, encode_display_request, Command,
    ResponseFrame, COMMAND_FRAME_LEN, DISPLAY_FRAME_LEN, EXECUTE_HEADER, DISPLAY_REQUEST,
    FLAG_OVERFLOW, FLAG_ZERO, RESPONSE_FRAME_LEN,
};
pub use error::{FrameError, Result};
pub use framer::{hex, FramerState, FramingPolicy, ResponseFramer};
pub use opcode::Opcode;
pub use writer::{send_paced, PacedWriter, DEFAULT_INTER_BYTE_DELAY};
