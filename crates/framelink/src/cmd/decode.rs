use std::fs;

use framelink_frame::{DecodeState, FrameCodec};
use tracing::warn;

use crate::cmd::{parse_hex, DecodeArgs};
use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let wire = match (&args.hex, &args.file) {
        (Some(hex), _) => parse_hex(hex)?,
        (None, Some(path)) => fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?,
        (None, None) => Vec::new(),
    };

    let mut codec = FrameCodec::new();
    let mut errors = 0usize;
    for outcome in codec.feed(&wire) {
        match outcome {
            Ok(frame) => print_frame(&frame, format),
            Err(err) => {
                warn!(error = %err, "discarded frame");
                errors += 1;
            }
        }
    }

    let leftover = codec.state();
    if errors > 0 {
        return Err(CliError::new(
            DATA_INVALID,
            format!("{errors} frame(s) failed to decode"),
        ));
    }
    if leftover != DecodeState::SeekSof1 {
        return Err(CliError::new(
            DATA_INVALID,
            format!("input ends inside a frame (decoder state {leftover:?})"),
        ));
    }
    Ok(SUCCESS)
}
