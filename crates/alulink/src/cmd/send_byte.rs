use crate::cmd::{LinkArgs, SendByteArgs};
use crate::exit::{session_error, CliError, CliResult, SUCCESS};
use crate::output::{print_sent, OutputFormat};

pub fn run(args: SendByteArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let byte = parse_byte(&args.byte)?;
    let session = link.open_session()?;

    session
        .send_raw_byte(byte)
        .map_err(|err| session_error("send failed", err))?;
    print_sent("raw", &[byte], session.name(), format);

    session
        .shutdown()
        .map_err(|err| session_error("close failed", err))?;
    Ok(SUCCESS)
}

/// Accept decimal or a `0x`, `0b` or `0o` prefixed literal.
fn parse_byte(input: &str) -> CliResult<u8> {
    let text = input.trim();
    let lower = text.to_ascii_lowercase();
    let parsed = if let Some(digits) = lower.strip_prefix("0x") {
        u16::from_str_radix(digits, 16)
    } else if let Some(digits) = lower.strip_prefix("0b") {
        u16::from_str_radix(digits, 2)
    } else if let Some(digits) = lower.strip_prefix("0o") {
        u16::from_str_radix(digits, 8)
    } else {
        lower.parse::<u16>()
    };

    parsed
        .ok()
        .and_then(|value| u8::try_from(value).ok())
        .ok_or_else(|| CliError::usage(format!("not a byte (0-255): {input}")))
}
