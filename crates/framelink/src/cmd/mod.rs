use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use framelink_client::ClientConfig;
use framelink_frame::MsgType;

use crate::exit::{client_error, io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod monitor;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one command to a device and print its response.
    Send(SendArgs),
    /// Print telemetry and events received from a device.
    Monitor(MonitorArgs),
    /// Encode a frame and print its wire bytes.
    Encode(EncodeArgs),
    /// Decode wire bytes into frames.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Monitor(args) => monitor::run(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Connection options shared by the commands that talk to a device.
#[derive(Args, Debug)]
pub struct LinkArgs {
    /// Device endpoint: tcp://host:port, host:port or unix:///path.
    pub endpoint: String,
    /// JSON client configuration file.
    #[arg(long, value_name = "FILE", env = "FRAMELINK_CONFIG")]
    pub config: Option<PathBuf>,
    /// Do not send heartbeat frames.
    #[arg(long)]
    pub no_alive: bool,
}

impl LinkArgs {
    pub fn client_config(&self) -> CliResult<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let json = fs::read_to_string(path).map_err(|err| {
                    io_error(&format!("failed reading {}", path.display()), err)
                })?;
                ClientConfig::from_json(&json)
                    .map_err(|err| client_error(&format!("invalid config {}", path.display()), err))?
            }
            None => ClientConfig::default(),
        };
        if self.no_alive {
            config.enable_alive = false;
        }
        Ok(config)
    }

    pub fn endpoint(&self) -> CliResult<Endpoint> {
        Endpoint::parse(&self.endpoint)
    }
}

/// Where the device link lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp(String),
    #[cfg(unix)]
    Unix(PathBuf),
}

impl Endpoint {
    pub fn parse(input: &str) -> CliResult<Self> {
        let input = input.trim();
        if let Some(path) = input.strip_prefix("unix://") {
            return unix_endpoint(path);
        }
        let addr = input.strip_prefix("tcp://").unwrap_or(input);
        match addr.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(Self::Tcp(addr.to_string()))
            }
            _ => Err(CliError::new(
                USAGE,
                format!("invalid endpoint {input:?} (expected tcp://host:port or unix:///path)"),
            )),
        }
    }
}

#[cfg(unix)]
fn unix_endpoint(path: &str) -> CliResult<Endpoint> {
    if path.is_empty() {
        return Err(CliError::new(USAGE, "unix endpoint needs a socket path"));
    }
    Ok(Endpoint::Unix(PathBuf::from(path)))
}

#[cfg(not(unix))]
fn unix_endpoint(_path: &str) -> CliResult<Endpoint> {
    Err(CliError::new(
        USAGE,
        "unix socket endpoints are not supported on this platform",
    ))
}

pub fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Command identifier (decimal or 0x-prefixed hex).
    #[arg(long, short = 'c', value_parser = parse_u16)]
    pub command_id: u16,
    /// Command arguments as hex.
    #[arg(long, conflicts_with = "text")]
    pub hex: Option<String>,
    /// Command arguments as UTF-8 text.
    #[arg(long, conflicts_with = "hex")]
    pub text: Option<String>,
    /// Response timeout (e.g. 1s, 250ms).
    #[arg(long, default_value = "1s")]
    pub timeout: String,
    /// Print the raw response frame instead of checking its status.
    #[arg(long)]
    pub unchecked: bool,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Exit after printing N frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// Exit after this long (e.g. 30s, 500ms).
    #[arg(long)]
    pub duration: Option<String>,
    /// Print link health and metrics on exit.
    #[arg(long)]
    pub stats: bool,
}

/// Frame types that can be encoded from the command line.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum FrameKind {
    Alive,
    Command,
    Response,
    Telemetry,
    Event,
}

impl From<FrameKind> for MsgType {
    fn from(kind: FrameKind) -> Self {
        match kind {
            FrameKind::Alive => MsgType::Alive,
            FrameKind::Command => MsgType::Command,
            FrameKind::Response => MsgType::Response,
            FrameKind::Telemetry => MsgType::Telemetry,
            FrameKind::Event => MsgType::Event,
        }
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Message type.
    #[arg(long = "type", short = 't', value_enum, default_value = "command")]
    pub kind: FrameKind,
    /// Message id (decimal or 0x-prefixed hex).
    #[arg(long, default_value = "0", value_parser = parse_u16)]
    pub msg_id: u16,
    /// Sequence number (decimal or 0x-prefixed hex).
    #[arg(long, default_value = "0", value_parser = parse_u16)]
    pub seq: u16,
    /// Payload as hex.
    #[arg(long, conflicts_with = "text")]
    pub hex: Option<String>,
    /// Payload as UTF-8 text.
    #[arg(long, conflicts_with = "hex")]
    pub text: Option<String>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Wire bytes as hex.
    #[arg(conflicts_with = "file", required_unless_present = "file")]
    pub hex: Option<String>,
    /// Read wire bytes from a file.
    #[arg(long, value_name = "FILE")]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Payload bytes from mutually exclusive `--hex` / `--text` options.
pub fn payload_bytes(hex: Option<&str>, text: Option<&str>) -> CliResult<Vec<u8>> {
    if let Some(hex) = hex {
        return parse_hex(hex);
    }
    Ok(text.map(|text| text.as_bytes().to_vec()).unwrap_or_default())
}

/// Parse hex, ignoring whitespace and an optional `0x` prefix.
pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&digits).map_err(|err| CliError::new(USAGE, format!("invalid hex: {err}")))
}

pub fn parse_u16(input: &str) -> Result<u16, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(digits) => u16::from_str_radix(digits, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| format!("{input:?} is not a 16-bit number"))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    if millis {
        Ok(Duration::from_millis(value))
    } else {
        Ok(Duration::from_secs(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn parse_u16_accepts_decimal_and_hex() {
        assert_eq!(parse_u16("42"), Ok(42));
        assert_eq!(parse_u16("0x1F"), Ok(0x1F));
        assert!(parse_u16("70000").is_err());
        assert!(parse_u16("0xZZ").is_err());
    }

    #[test]
    fn parse_hex_ignores_prefix_and_whitespace() {
        assert_eq!(parse_hex("0xA5 5a 01").unwrap(), vec![0xA5, 0x5A, 0x01]);
        assert_eq!(parse_hex("").unwrap(), Vec::<u8>::new());
        assert_eq!(parse_hex("abc").unwrap_err().code, USAGE);
    }

    #[test]
    fn endpoints_parse_by_scheme() {
        assert_eq!(
            Endpoint::parse("tcp://127.0.0.1:5000").unwrap(),
            Endpoint::Tcp("127.0.0.1:5000".into())
        );
        assert_eq!(
            Endpoint::parse("localhost:7").unwrap(),
            Endpoint::Tcp("localhost:7".into())
        );
        assert!(Endpoint::parse("localhost").is_err());
        assert!(Endpoint::parse("tcp://:80").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn unix_endpoints_keep_the_path() {
        assert_eq!(
            Endpoint::parse("unix:///tmp/dev.sock").unwrap(),
            Endpoint::Unix(PathBuf::from("/tmp/dev.sock"))
        );
        assert!(Endpoint::parse("unix://").is_err());
    }

    #[test]
    fn no_alive_overrides_config() {
        let link = LinkArgs {
            endpoint: "127.0.0.1:1".into(),
            config: None,
            no_alive: true,
        };
        let config = link.client_config().expect("config");
        assert!(!config.enable_alive);
    }
}
