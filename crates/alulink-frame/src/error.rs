/// Errors that can occur during frame encoding and transmission.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// An operand does not fit in a signed byte.
    #[error("operand {value} out of range (expected -128..=127)")]
    InvalidOperand { value: i64 },

    /// A numeric opcode is not one the ALU implements.
    #[error("invalid opcode 0b{0:06b}")]
    InvalidOpcode(u8),

    /// An opcode name is not one the ALU implements.
    #[error("unknown opcode {0:?} (expected ADD, SUB, AND, OR, XOR, SRA, SRL or NOR)")]
    UnknownOpcode(String),

    /// The transport failed partway through a frame.
    ///
    /// `sent` bytes of the frame are already on the wire.
    #[error("write failed after {sent} of {total} bytes: {source}")]
    WriteFailed {
        sent: usize,
        total: usize,
        source: std::io::Error,
    },

    /// An I/O error occurred outside a frame write.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport accepted zero bytes partway through a frame.
    #[error("connection closed after {sent} of {total} bytes")]
    ConnectionClosed { sent: usize, total: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
