use std::time::Duration;

use clap::{Args, Subcommand};
use sl427_message::{Address, AdminAddress, Afn, CodedAddress};

use crate::exit::{message_error, CliError, CliResult};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod serve;
pub mod station;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a collection center and print every received message.
    Serve(ServeArgs),
    /// Run a monitoring station against a center.
    Station(StationArgs),
    /// Decode a hex-encoded wire frame.
    Decode(DecodeArgs),
    /// Build a wire frame and print it as hex.
    Encode(EncodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Station(args) => station::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(env = "SL427_LISTEN", default_value = "0.0.0.0:8000")]
    pub addr: String,
    /// Maximum concurrent station connections.
    #[arg(long, default_value = "100")]
    pub max_connections: usize,
    /// Password placed in acknowledgements (decimal or 0x-prefixed hex).
    #[arg(long, env = "SL427_PASSWORD", default_value = "0")]
    pub password: String,
    /// Close connections idle for this long (e.g. 90s, 500ms).
    #[arg(long)]
    pub idle_timeout: Option<String>,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct StationArgs {
    /// Center address to connect to.
    #[arg(env = "SL427_SERVER", default_value = "127.0.0.1:8000")]
    pub server: String,
    #[command(flatten)]
    pub address: AddressArgs,
    /// Heartbeat interval.
    #[arg(long, default_value = "30s")]
    pub heartbeat: String,
    /// Upload interval.
    #[arg(long, default_value = "60s")]
    pub interval: String,
    /// Connection timeout.
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
    /// Send one heartbeat and one upload, print the acknowledgements and exit.
    #[arg(long)]
    pub once: bool,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Wire frame as hex; spaces are ignored.
    pub hex: Vec<String>,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    #[command(flatten)]
    pub address: AddressArgs,
    /// Functional code by name (upload, alarm, ...) or number.
    #[arg(long, default_value = "upload")]
    pub afn: String,
    /// User AFN byte, required with `--afn user-defined`.
    #[arg(long)]
    pub user_afn: Option<String>,
    /// Build a center-to-station frame.
    #[arg(long)]
    pub downlink: bool,
    /// Command or type code (0-15).
    #[arg(long, default_value = "0")]
    pub code: String,
    /// Frame count (0-3).
    #[arg(long, default_value = "0")]
    pub frame_count: u8,
    /// Data field as hex.
    #[arg(long)]
    pub data: Option<String>,
    /// Password (decimal or 0x-prefixed hex); required for downlink.
    #[arg(long)]
    pub password: Option<String>,
    /// Append a time label with the current local time.
    #[arg(long)]
    pub time_label: bool,
}

/// Station address: an admin code with station id, or an 8-digit coded address.
#[derive(Args, Debug)]
pub struct AddressArgs {
    /// Six-digit administrative division code.
    #[arg(long, env = "SL427_ADMIN_CODE", default_value = "210525")]
    pub admin_code: String,
    /// Station id (1-65535).
    #[arg(long, env = "SL427_STATION_ID", default_value = "1")]
    pub station_id: u16,
    /// Coded address as 8 hex digits; overrides the admin code.
    #[arg(long, env = "SL427_CODED_ADDRESS")]
    pub coded: Option<String>,
}

impl AddressArgs {
    pub fn resolve(&self) -> CliResult<Address> {
        let address = match &self.coded {
            Some(coded) => Address::Coded(
                CodedAddress::from_hex(coded).map_err(|err| message_error("--coded", err))?,
            ),
            None => Address::Admin(
                AdminAddress::from_digits(&self.admin_code, self.station_id)
                    .map_err(|err| message_error("--admin-code", err))?,
            ),
        };
        Ok(address)
    }
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
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
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Hex bytes with optional `0x` prefix; whitespace is ignored.
pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let compact: String = input.split_whitespace().collect();
    let compact = compact
        .strip_prefix("0x")
        .or_else(|| compact.strip_prefix("0X"))
        .unwrap_or(&compact);
    hex::decode(compact).map_err(|err| CliError::usage(format!("invalid hex {input:?}: {err}")))
}

/// Decimal or `0x`-prefixed hex integer.
pub fn parse_number<T>(input: &str, what: &str) -> CliResult<T>
where
    T: TryFrom<u64>,
{
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(digits) => u64::from_str_radix(digits, 16),
        None => input.parse::<u64>(),
    };
    parsed
        .ok()
        .and_then(|value| T::try_from(value).ok())
        .ok_or_else(|| CliError::usage(format!("invalid {what}: {input}")))
}

pub fn parse_afn(input: &str) -> CliResult<Afn> {
    match Afn::from_name(input) {
        Some(afn) => Ok(afn),
        None => parse_number::<u8>(input, "AFN").map(Afn),
    }
}
