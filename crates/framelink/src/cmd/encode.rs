use framelink_frame::{Frame, FrameCodec, MsgType};

use crate::cmd::{payload_bytes, EncodeArgs};
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_wire, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = payload_bytes(args.hex.as_deref(), args.text.as_deref())?;
    let frame = build_frame(args.kind.into(), args.msg_id, args.seq, payload)?;
    print_wire(&FrameCodec::new().encode(&frame), format);
    Ok(SUCCESS)
}

fn build_frame(msg_type: MsgType, msg_id: u16, seq: u16, payload: Vec<u8>) -> CliResult<Frame> {
    Frame::new(msg_type, payload)
        .map(|frame| frame.with_msg_id(msg_id).with_seq(seq))
        .map_err(|err| frame_error("cannot encode frame", err))
}

#[cfg(test)]
mod tests {
    use framelink_frame::MAX_PAYLOAD_LEN;

    use super::*;
    use crate::exit::DATA_INVALID;

    #[test]
    fn stamps_id_and_sequence() {
        let frame = build_frame(MsgType::Telemetry, 3, 9, b"t".to_vec()).expect("frame");
        assert_eq!(frame.msg_type(), MsgType::Telemetry);
        assert_eq!((frame.msg_id(), frame.seq()), (3, 9));
    }

    #[test]
    fn oversized_payload_is_data_invalid() {
        let err = build_frame(MsgType::Event, 0, 0, vec![0; MAX_PAYLOAD_LEN + 1])
            .expect_err("too large");
        assert_eq!(err.code, DATA_INVALID);
    }
}
