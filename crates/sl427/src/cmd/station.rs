use std::sync::mpsc;
use std::time::Duration;

use sl427_message::{DataItem, DataItemRegistry, DataPayload, DataValue};
use sl427_peer::{Station, StationConfig};
use tracing::info;

use crate::cmd::{parse_duration, StationArgs};
use crate::exit::{peer_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_message, MessageOutput, OutputFormat};

const ONCE_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

pub fn run(args: StationArgs, format: OutputFormat) -> CliResult<i32> {
    let mut config = StationConfig::new(args.address.resolve()?);
    config.heartbeat_interval = parse_duration(&args.heartbeat)?;
    config.upload_interval = parse_duration(&args.interval)?;
    config.connect_timeout = Some(parse_duration(&args.connect_timeout)?);
    if args.once {
        config.read_timeout = Some(ONCE_REPLY_TIMEOUT);
    }

    let mut station = Station::connect(args.server.as_str(), config)
        .map_err(|err| peer_error("connect failed", err))?;

    if args.once {
        return run_once(&mut station, &args.server, format);
    }

    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;

    station
        .start(sample_payload)
        .map_err(|err| peer_error("start failed", err))?;
    info!(station = %station.address(), server = %args.server, "station running, Ctrl-C to stop");

    let _ = stop_rx.recv();
    station.stop();

    let snap = station.metrics();
    info!(
        sent = snap.sent,
        received = snap.received,
        dropped = snap.dropped,
        "station summary"
    );
    Ok(SUCCESS)
}

/// One heartbeat and one upload, each waiting for its acknowledgement.
fn run_once(station: &mut Station, server: &str, format: OutputFormat) -> CliResult<i32> {
    let registry = DataItemRegistry::with_station_defaults();

    station
        .send_heartbeat()
        .map_err(|err| peer_error("heartbeat failed", err))?;
    let ack = station
        .recv()
        .map_err(|err| peer_error("heartbeat not acknowledged", err))?;
    let wire = ack.frame.to_bytes();
    print_message(
        &MessageOutput::new(&ack.message, &wire, server, &registry),
        &wire,
        format,
    );

    station
        .upload(&sample_payload())
        .map_err(|err| peer_error("upload failed", err))?;
    let ack = station
        .recv()
        .map_err(|err| peer_error("upload not acknowledged", err))?;
    let wire = ack.frame.to_bytes();
    print_message(
        &MessageOutput::new(&ack.message, &wire, server, &registry),
        &wire,
        format,
    );

    station.stop();
    Ok(SUCCESS)
}

/// Fixed sample readings stamped with the current local time.
fn sample_payload() -> DataPayload {
    DataPayload::new(
        chrono::Local::now().naive_local(),
        vec![
            DataItem::new(1001, DataValue::Int32(12_345)),
            DataItem::new(1002, DataValue::Int32(5_678)),
            DataItem::new(1003, DataValue::Int16(723)),
            DataItem::new(1004, DataValue::Int16(2_456)),
            DataItem::new(1005, DataValue::Text("normal".to_string())),
        ],
    )
}
