#![cfg(feature = "cli")]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Command, Output};
use std::thread;
use std::time::Duration;

use framelink::frame::{CommandPayload, Frame, FrameCodec, MsgType, ResponsePayload};

fn framelink(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_framelink"))
        .args(["--log-level", "error"])
        .args(args)
        .env_remove("FRAMELINK_CONFIG")
        .output()
        .expect("framelink should run")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout.lines().next().expect("one line of output");
    serde_json::from_str(line).expect("stdout should be JSON")
}

/// Fake device on a loopback port; `handler` runs on the accepted connection.
fn spawn_device<F>(handler: F) -> (String, thread::JoinHandle<()>)
where
    F: FnOnce(TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept client");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("read timeout");
        handler(stream);
    });
    (format!("tcp://{addr}"), handle)
}

/// Next non-heartbeat frame from the client, or `None` once it disconnects.
fn next_frame(stream: &mut TcpStream, codec: &mut FrameCodec) -> Option<Frame> {
    let mut buf = [0u8; 512];
    loop {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            return None;
        }
        for outcome in codec.feed(&buf[..n]) {
            let frame = outcome.expect("client frames should decode");
            if frame.msg_type() != MsgType::Alive {
                return Some(frame);
            }
        }
    }
}

fn drain(stream: &mut TcpStream) {
    let mut buf = [0u8; 512];
    while matches!(stream.read(&mut buf), Ok(n) if n > 0) {}
}

fn reply(stream: &mut TcpStream, codec: &FrameCodec, request: &Frame, response: ResponsePayload) {
    let frame = Frame::new(MsgType::Response, response.encode())
        .expect("response frame")
        .with_msg_id(request.msg_id());
    stream
        .write_all(&codec.encode(&frame))
        .expect("write response");
}

#[test]
fn encode_output_decodes_back() {
    let encoded = framelink(&[
        "--format", "json", "encode", "--type", "telemetry", "--seq", "5", "--text", "t=21",
    ]);
    assert!(encoded.status.success());
    let out = stdout_json(&encoded);
    let wire_hex = out["wire_hex"].as_str().expect("wire_hex").to_string();
    assert!(wire_hex.starts_with("a55a0104"));
    let wire = hex::decode(&wire_hex).expect("hex");
    let trailer = u16::from_le_bytes([wire[wire.len() - 2], wire[wire.len() - 1]]);
    assert_eq!(out["crc"], trailer);

    let decoded = framelink(&["--format", "json", "decode", &wire_hex]);
    assert!(decoded.status.success());
    let frame = stdout_json(&decoded);
    assert_eq!(frame["msg_type"], "TELEMETRY");
    assert_eq!(frame["seq"], 5);
    assert_eq!(frame["payload_text"], "t=21");
}

#[test]
fn decode_of_corrupt_frame_exits_60() {
    let wire = FrameCodec::new().encode(&Frame::new(MsgType::Event, b"boom".to_vec()).expect("frame"));
    let mut corrupt = wire.to_vec();
    let last = corrupt.len() - 1;
    corrupt[last] ^= 0xFF;

    let output = framelink(&["decode", &hex::encode(&corrupt)]);
    assert_eq!(output.status.code(), Some(60));

    let truncated = framelink(&["decode", &hex::encode(&wire[..wire.len() - 3])]);
    assert_eq!(truncated.status.code(), Some(60));
}

#[test]
fn send_prints_device_response() {
    let (endpoint, device) = spawn_device(|mut stream| {
        let mut codec = FrameCodec::new();
        let request = next_frame(&mut stream, &mut codec).expect("command frame");
        assert_eq!(request.msg_type(), MsgType::Command);
        let command = CommandPayload::parse(request.payload()).expect("command payload");
        assert_eq!(command.command_id, 0x10);
        assert_eq!(command.args.as_ref(), b"ping");
        reply(
            &mut stream,
            &codec,
            &request,
            ResponsePayload::ok(command.command_id, b"pong".to_vec()),
        );
        drain(&mut stream);
    });

    let output = framelink(&[
        "--format", "json", "send", &endpoint, "--no-alive", "-c", "0x10", "--text", "ping",
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let response = stdout_json(&output);
    assert_eq!(response["command_id"], 16);
    assert_eq!(response["status"], "OK");
    assert_eq!(response["data_text"], "pong");
    device.join().expect("device thread");
}

#[test]
fn rejected_command_exits_nonzero() {
    let (endpoint, device) = spawn_device(|mut stream| {
        let mut codec = FrameCodec::new();
        let request = next_frame(&mut stream, &mut codec).expect("command frame");
        reply(&mut stream, &codec, &request, ResponsePayload::rejected(7, 0x03, 42));
        drain(&mut stream);
    });

    let output = framelink(&["send", &endpoint, "--no-alive", "-c", "7"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("send failed"));
    device.join().expect("device thread");
}

#[test]
fn send_to_closed_port_is_transport_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        listener.local_addr().expect("local addr").port()
    };
    let endpoint = format!("127.0.0.1:{port}");
    let output = framelink(&["send", &endpoint, "-c", "1"]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn monitor_prints_telemetry_until_count() {
    let (endpoint, device) = spawn_device(|mut stream| {
        let codec = FrameCodec::new();
        for seq in 1..=2u16 {
            let frame = Frame::new(MsgType::Telemetry, format!("sample {seq}").into_bytes())
                .expect("telemetry")
                .with_seq(seq);
            stream.write_all(&codec.encode(&frame)).expect("write telemetry");
        }
        drain(&mut stream);
    });

    let output = framelink(&[
        "--format", "json", "monitor", &endpoint, "--no-alive", "--count", "2", "--duration",
        "10s",
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    let frames: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0]["payload_text"], "sample 1");
    assert_eq!(frames[1]["seq"], 2);
    device.join().expect("device thread");
}

#[test]
fn version_prints_package_version() {
    let output = framelink(&["version"]);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        format!("framelink {}", env!("CARGO_PKG_VERSION"))
    );
}
