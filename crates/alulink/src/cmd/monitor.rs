use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::Duration;

use alulink_session::LinkEvent;
use tracing::info;

use crate::cmd::{LinkArgs, MonitorArgs};
use crate::exit::{io_error, session_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS};
use crate::output::{print_chunk, print_response, OutputFormat};

const WAKE_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: MonitorArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let session = link.open_session()?;
    let events = session.subscribe();
    info!(port = session.name(), "monitoring responses");

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let event = match events.recv_timeout(WAKE_INTERVAL) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match event {
            LinkEvent::Chunk(data) => {
                if args.raw {
                    print_chunk(&data, session.name(), format)
                        .map_err(|err| io_error("stdout", err))?;
                }
            }
            LinkEvent::Response(frame) => {
                print_response(&frame, session.name(), format)
                    .map_err(|err| io_error("stdout", err))?;
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
            LinkEvent::LinkLost(reason) => {
                return Err(CliError::new(FAILURE, format!("link lost: {reason}")));
            }
        }
    }

    session
        .shutdown()
        .map_err(|err| session_error("close failed", err))?;
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
