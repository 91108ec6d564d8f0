use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::opcode::{Opcode, OPCODE_MASK};

/// First byte of an execute frame.
pub const EXECUTE_HEADER: u8 = 0xCD;

/// The whole display-request frame.
pub const DISPLAY_REQUEST: u8 = 0xD1;

/// Execute frame: header (1) + op1 (1) + op2 (1) + opcode (1) = 4 bytes.
pub const COMMAND_FRAME_LEN: usize = 4;

/// Display frame: a single request byte.
pub const DISPLAY_FRAME_LEN: usize = 1;

/// Response frame: result (1) + flags (1) = 2 bytes.
pub const RESPONSE_FRAME_LEN: usize = 2;

/// Flags bit set when the result is zero.
pub const FLAG_ZERO: u8 = 0b0000_0001;

/// Flags bit set when the operation overflowed.
pub const FLAG_OVERFLOW: u8 = 0b0000_0010;

/// A decoded ALU response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseFrame {
    /// Signed result of the last operation.
    pub result: i8,
    /// The result was zero.
    pub zero: bool,
    /// The operation overflowed.
    pub overflow: bool,
}

impl ResponseFrame {
    /// Create a response.
    pub fn new(result: i8, zero: bool, overflow: bool) -> Self {
        Self {
            result,
            zero,
            overflow,
        }
    }

    /// The two bytes the device sends for this response.
    ///
    /// Reserved flag bits are always zero.
    pub fn to_bytes(&self) -> [u8; RESPONSE_FRAME_LEN] {
        let mut flags = 0u8;
        if self.zero {
            flags |= FLAG_ZERO;
        }
        if self.overflow {
            flags |= FLAG_OVERFLOW;
        }
        [self.result as u8, flags]
    }
}

/// A host-to-device request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run `opcode` on two operands.
    Execute { op1: i8, op2: i8, opcode: Opcode },
    /// Ask for the result of the last operation.
    Display,
}

impl Command {
    /// Build an execute command, rejecting operands that do not fit in a byte.
    pub fn execute(op1: i64, op2: i64, opcode: Opcode) -> Result<Self> {
        Ok(Self::Execute {
            op1: check_operand(op1)?,
            op2: check_operand(op2)?,
            opcode,
        })
    }

    /// Append the wire bytes of this command to `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) {
        match *self {
            Command::Execute { op1, op2, opcode } => {
                dst.put_slice(&encode_command(op1, op2, opcode))
            }
            Command::Display => dst.put_slice(&encode_display_request()),
        }
    }

    /// The wire bytes of this command.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_size());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Number of bytes this command occupies on the wire.
    pub fn wire_size(&self) -> usize {
        match self {
            Command::Execute { .. } => COMMAND_FRAME_LEN,
            Command::Display => DISPLAY_FRAME_LEN,
        }
    }

    /// Short name for logs and output.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Execute { .. } => "execute",
            Command::Display => "display",
        }
    }
}

/// Narrow a caller-supplied operand to a signed byte.
pub fn check_operand(value: i64) -> Result<i8> {
    i8::try_from(value).map_err(|_| FrameError::InvalidOperand { value })
}

/// Encode an execute frame.
///
/// Wire format:
/// ```text
/// ┌────────┬─────────┬─────────┬──────────────────┐
/// │ 0xCD   │ op1     │ op2     │ opcode           │
/// │        │ (i8 2c) │ (i8 2c) │ (low 6 bits)     │
/// └────────┴─────────┴─────────┴──────────────────┘
/// ```
pub fn encode_command(op1: i8, op2: i8, opcode: Opcode) -> [u8; COMMAND_FRAME_LEN] {
    [
        EXECUTE_HEADER,
        op1 as u8,
        op2 as u8,
        opcode.code() & OPCODE_MASK,
    ]
}

/// Encode a display request.
pub fn encode_display_request() -> [u8; DISPLAY_FRAME_LEN] {
    [DISPLAY_REQUEST]
}

/// Decode a response from the front of `src`.
///
/// Returns `None` if fewer than two bytes are available; the caller should
/// keep accumulating. Bytes past the first two are not inspected.
pub fn decode_response(src: &[u8]) -> Option<ResponseFrame> {
    if src.len() < RESPONSE_FRAME_LEN {
        return None; // Need more data
    }

    let flags = src[1];
    Some(ResponseFrame {
        result: src[0] as i8,
        zero: flags & FLAG_ZERO != 0,
        overflow: flags & FLAG_OVERFLOW != 0,
    })
}
