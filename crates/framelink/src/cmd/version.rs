use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("framelink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: framelink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("FRAMELINK_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "rustc: {}",
        option_env!("FRAMELINK_RUSTC_VERSION").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "protocol: version={} max_payload={}",
        framelink_frame::PROTOCOL_VERSION,
        framelink_frame::MAX_PAYLOAD_LEN
    );
    println!(
        "features: client={}, cli=true, unix_sockets={}",
        cfg!(feature = "client"),
        cfg!(unix)
    );

    Ok(SUCCESS)
}
