//! Serial transport abstraction for the ALU link.
//!
//! Provides a unified byte stream over:
//! - A UART serial port (any platform `serialport` supports)
//! - A connected Unix socket pair (loopback testing and simulators)
//!
//! This is the lowest layer of alulink. Everything else builds on top of
//! the [`LinkStream`] type provided here.

pub mod error;
pub mod serial;
pub mod traits;

pub use error::{Result, TransportError};
pub use serial::{available_ports, open, PortInfo, PortKind, SerialConfig, DEFAULT_BAUD_RATE};
pub use traits::{LinkStream, PollRead};
