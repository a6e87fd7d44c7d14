use std::time::Duration;

use framelink_client::{ClientConfig, ErrorCode, ErrorInfo, ProtocolClient, Severity};
use framelink_frame::Frame;
#[cfg(unix)]
use framelink_transport::UnixTransport;
use framelink_transport::{TcpTransport, Transport};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cmd::{parse_duration, runtime, Endpoint, MonitorArgs};
use crate::exit::{
    client_error, CliError, CliResult, HEALTH_CHECK_FAILED, SUCCESS, TRANSPORT_ERROR,
};
use crate::output::{print_frame, print_stats, OutputFormat};

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.link.client_config()?;
    let endpoint = args.link.endpoint()?;
    let limits = Limits {
        count: args.count,
        duration: args.duration.as_deref().map(parse_duration).transpose()?,
        stats: args.stats,
    };

    runtime()?.block_on(async move {
        match endpoint {
            Endpoint::Tcp(addr) => watch(TcpTransport::tcp(addr), config, limits, format).await,
            #[cfg(unix)]
            Endpoint::Unix(path) => watch(UnixTransport::unix(path), config, limits, format).await,
        }
    })
}

struct Limits {
    count: Option<usize>,
    duration: Option<Duration>,
    stats: bool,
}

enum Exit {
    Done,
    Interrupted,
    Fault(ErrorInfo),
}

async fn watch<T: Transport>(
    transport: T,
    config: ClientConfig,
    limits: Limits,
    format: OutputFormat,
) -> CliResult<i32> {
    let client = ProtocolClient::with_config(transport, config)
        .map_err(|err| client_error("invalid configuration", err))?;

    let (frame_tx, mut frames) = mpsc::unbounded_channel::<Frame>();
    client.on_telemetry(move |frame| {
        let _ = frame_tx.send(frame.clone());
    });
    let (fault_tx, mut faults) = mpsc::unbounded_channel::<ErrorInfo>();
    client.on_error(move |error| {
        if error.severity >= Severity::Error {
            let _ = fault_tx.send(error.clone());
        }
    });

    client
        .start()
        .await
        .map_err(|err| client_error("connect failed", err))?;
    info!(endpoint = client.transport().name(), "monitoring");

    let deadline = async {
        match limits.duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut printed = 0usize;
    let exit = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Exit::Interrupted,
            () = &mut deadline => break Exit::Done,
            Some(error) = faults.recv() => break Exit::Fault(error),
            Some(frame) = frames.recv() => {
                print_frame(&frame, format);
                printed = printed.saturating_add(1);
                if limits.count.is_some_and(|count| printed >= count) {
                    break Exit::Done;
                }
            }
        }
    };

    client.stop().await;
    if limits.stats {
        print_stats(&client.health(), &client.link_metrics(), format);
    }

    match exit {
        Exit::Done => Ok(SUCCESS),
        Exit::Interrupted => {
            debug!(printed, "interrupted");
            Ok(SUCCESS)
        }
        Exit::Fault(error) => Err(fault_error(&error)),
    }
}

fn fault_error(error: &ErrorInfo) -> CliError {
    let code = match error.code {
        ErrorCode::AliveTimeout => HEALTH_CHECK_FAILED,
        _ => TRANSPORT_ERROR,
    };
    CliError::new(code, format!("link lost: {error}"))
}
