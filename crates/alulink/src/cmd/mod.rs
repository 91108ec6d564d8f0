use std::time::Duration;

use alulink_session::{LinkConfig, LinkSession};
use alulink_transport::SerialConfig;
use clap::{Args, Subcommand};

use crate::exit::{session_error, CliError, CliResult};
use crate::output::OutputFormat;

pub mod display;
pub mod exec;
pub mod monitor;
pub mod opcodes;
pub mod ports;
pub mod send_byte;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run an ALU operation: `exec 5 ADD -3`.
    Exec(ExecArgs),
    /// Request the ALU's last result and print it.
    Display(DisplayArgs),
    /// Print responses as they arrive.
    Monitor(MonitorArgs),
    /// Send one raw byte (link bring-up).
    SendByte(SendByteArgs),
    /// List serial ports.
    Ports(PortsArgs),
    /// Print the opcode table.
    Opcodes(OpcodesArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Serial link settings shared by every command that talks to the device.
#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    /// Serial port the FPGA is attached to.
    #[arg(long, short = 'p', env = "ALULINK_PORT", global = true)]
    pub port: Option<String>,
    /// Line speed in baud.
    #[arg(long, env = "ALULINK_BAUD", default_value_t = alulink_transport::DEFAULT_BAUD_RATE, global = true)]
    pub baud: u32,
    /// Gap after each transmitted byte (e.g. 2ms).
    #[arg(long, env = "ALULINK_BYTE_DELAY", default_value = "2ms", global = true)]
    pub byte_delay: String,
}

impl LinkArgs {
    pub fn open_session(&self) -> CliResult<LinkSession> {
        let path = self.port.as_deref().ok_or_else(|| {
            CliError::usage("no serial port given (use --port or ALULINK_PORT)")
        })?;
        let serial = SerialConfig::new(path).with_baud_rate(self.baud);
        let config = LinkConfig {
            inter_byte_delay: parse_duration(&self.byte_delay, true)?,
            ..LinkConfig::default()
        };
        alulink_session::open_with_config(&serial, config)
            .map_err(|err| session_error(&format!("cannot open {path}"), err))
    }
}

pub fn run(command: Command, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Exec(args) => exec::run(args, link, format),
        Command::Display(args) => display::run(args, link, format),
        Command::Monitor(args) => monitor::run(args, link, format),
        Command::SendByte(args) => send_byte::run(args, link, format),
        Command::Ports(args) => ports::run(args, format),
        Command::Opcodes(args) => opcodes::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// First operand (-128..=127).
    #[arg(allow_negative_numbers = true)]
    pub op1: i64,
    /// Operation (ADD, SUB, AND, OR, XOR, SRA, SRL, NOR).
    pub opcode: String,
    /// Second operand (-128..=127).
    #[arg(allow_negative_numbers = true)]
    pub op2: i64,
    /// Also request the result and print it.
    #[arg(long)]
    pub show: bool,
    /// How long to wait for the result with --show (e.g. 2s, 500ms).
    #[arg(long, default_value = "2s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct DisplayArgs {
    /// How long to wait for the response (e.g. 2s, 500ms).
    #[arg(long, default_value = "2s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Exit after receiving N responses.
    #[arg(long)]
    pub count: Option<usize>,
    /// Also print raw received chunks.
    #[arg(long)]
    pub raw: bool,
}

#[derive(Args, Debug)]
pub struct SendByteArgs {
    /// Byte to send, decimal or 0x/0b/0o prefixed (e.g. 240, 0xF0).
    #[arg(default_value = "0xF0")]
    pub byte: String,
}

#[derive(Args, Debug, Default)]
pub struct PortsArgs {}

#[derive(Args, Debug, Default)]
pub struct OpcodesArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show build details.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `500ms`, `2s` or bare seconds. `allow_zero` permits `0ms`.
pub fn parse_duration(input: &str, allow_zero: bool) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;

    if value == 0 && !allow_zero {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s", false).unwrap(), Duration::from_secs(2));
        assert_eq!(
            parse_duration("150ms", false).unwrap(),
            Duration::from_millis(150)
        );
        assert_eq!(parse_duration("3", false).unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_zero_only_when_allowed() {
        assert!(parse_duration("0s", false).is_err());
        assert_eq!(parse_duration("0ms", true).unwrap(), Duration::ZERO);
    }

    #[test]
    fn parse_duration_rejects_garbage() {
        assert!(parse_duration("", false).is_err());
        assert!(parse_duration("fast", false).is_err());
        assert!(parse_duration("-1s", false).is_err());
    }

    #[test]
    fn missing_port_is_usage_error() {
        let link = LinkArgs {
            port: None,
            baud: 9600,
            byte_delay: "2ms".to_string(),
        };
        let err = link.open_session().unwrap_err();
        assert_eq!(err.code, crate::exit::USAGE);
    }
}
