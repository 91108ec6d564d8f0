use crate::cmd::{parse_duration, DisplayArgs, LinkArgs};
use crate::exit::{io_error, session_error, CliResult, SUCCESS};
use crate::output::{print_response, OutputFormat};

pub fn run(args: DisplayArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout, false)?;
    let session = link.open_session()?;

    let frame = session
        .request_result(timeout)
        .map_err(|err| session_error("no result", err))?;
    print_response(&frame, session.name(), format)
        .map_err(|err| io_error("stdout", err))?;

    session
        .shutdown()
        .map_err(|err| session_error("close failed", err))?;
    Ok(SUCCESS)
}
