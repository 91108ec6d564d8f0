use alulink_frame::{Command, Opcode};

use crate::cmd::{parse_duration, ExecArgs, LinkArgs};
use crate::exit::{frame_error, io_error, session_error, CliResult, SUCCESS};
use crate::output::{print_response, print_sent, OutputFormat};

pub fn run(args: ExecArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    // Everything is validated before the port is touched.
    let command = build_command(&args)?;
    let timeout = parse_duration(&args.timeout, false)?;

    let session = link.open_session()?;
    session
        .send(&command)
        .map_err(|err| session_error("send failed", err))?;
    print_sent(command.kind(), &command.encode(), session.name(), format);

    if args.show {
        let frame = session
            .request_result(timeout)
            .map_err(|err| session_error("no result", err))?;
        print_response(&frame, session.name(), format)
            .map_err(|err| io_error("stdout", err))?;
    }

    session
        .shutdown()
        .map_err(|err| session_error("close failed", err))?;
    Ok(SUCCESS)
}

fn build_command(args: &ExecArgs) -> CliResult<Command> {
    let opcode: Opcode = args
        .opcode
        .parse()
        .map_err(|err| frame_error("invalid operation", err))?;
    Command::execute(args.op1, args.op2, opcode).map_err(|err| frame_error("invalid operand", err))
}
