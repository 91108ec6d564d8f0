use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("alulink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: alulink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "target: {}",
        option_env!("ALULINK_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("default_baud: {}", alulink_transport::DEFAULT_BAUD_RATE);
    println!(
        "default_byte_delay_ms: {}",
        alulink_frame::DEFAULT_INTER_BYTE_DELAY.as_millis()
    );

    Ok(SUCCESS)
}
