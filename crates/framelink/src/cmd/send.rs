use std::time::Duration;

use framelink_client::{ClientConfig, ProtocolClient};
use framelink_frame::{CommandPayload, Frame};
#[cfg(unix)]
use framelink_transport::UnixTransport;
use framelink_transport::{TcpTransport, Transport};
use tracing::debug;

use crate::cmd::{parse_duration, payload_bytes, runtime, Endpoint, SendArgs};
use crate::exit::{client_error, frame_error, CliResult, SUCCESS};
use crate::output::{print_frame, print_response, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.link.client_config()?;
    let endpoint = args.link.endpoint()?;
    let timeout = parse_duration(&args.timeout)?;
    let payload = payload_bytes(args.hex.as_deref(), args.text.as_deref())?;
    let frame = Frame::command(CommandPayload::new(args.command_id, payload).encode())
        .map_err(|err| frame_error("invalid command", err))?;
    let request = Request {
        frame,
        timeout,
        unchecked: args.unchecked,
    };

    runtime()?.block_on(async move {
        match endpoint {
            Endpoint::Tcp(addr) => exchange(TcpTransport::tcp(addr), config, request, format).await,
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                exchange(UnixTransport::unix(path), config, request, format).await
            }
        }
    })
}

struct Request {
    frame: Frame,
    timeout: Duration,
    unchecked: bool,
}

async fn exchange<T: Transport>(
    transport: T,
    config: ClientConfig,
    request: Request,
    format: OutputFormat,
) -> CliResult<i32> {
    let client = ProtocolClient::with_config(transport, config)
        .map_err(|err| client_error("invalid configuration", err))?;
    client
        .start()
        .await
        .map_err(|err| client_error("connect failed", err))?;
    debug!(endpoint = client.transport().name(), "connected");

    let result = if request.unchecked {
        client
            .send_command(request.frame, Some(request.timeout))
            .await
            .map(|response| print_frame(&response, format))
    } else {
        client
            .send_command_checked(request.frame, Some(request.timeout))
            .await
            .map(|response| print_response(&response, format))
    };
    client.stop().await;

    result.map_err(|err| client_error("send failed", err))?;
    Ok(SUCCESS)
}
