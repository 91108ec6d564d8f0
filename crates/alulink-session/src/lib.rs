//! Link session management for the FPGA ALU.
//!
//! This is the "just works" layer. Open a port, send execute and display
//! commands, and receive decoded responses from a background receive loop
//! through channels or callbacks.

pub mod config;
pub mod connector;
pub mod error;
pub mod event;
pub mod session;

pub use config::{LinkConfig, DEFAULT_MAX_CHUNK, DEFAULT_POLL_INTERVAL};
pub use connector::{open, open_with_config};
pub use error::{Result, SessionError};
pub use event::LinkEvent;
pub use session::LinkSession;
