use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

use sl427_message::{DataItemRegistry, UserData};
use sl427_peer::{AckHandler, CenterServer, FrameHandler, Received, ServerConfig, ServerHandle};
use tracing::info;

use crate::cmd::{parse_duration, parse_number, ServeArgs};
use crate::exit::{peer_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_message, MessageOutput, OutputFormat};

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    if args.max_connections == 0 {
        return Err(CliError::usage("--max-connections must be at least 1"));
    }
    let password: u16 = parse_number(&args.password, "password")?;
    let read_timeout = args
        .idle_timeout
        .as_deref()
        .map(parse_duration)
        .transpose()?;

    let config = ServerConfig {
        max_connections: args.max_connections,
        read_timeout,
        password,
        ..ServerConfig::default()
    };
    let server =
        CenterServer::bind(args.addr.as_str(), config).map_err(|err| peer_error("bind failed", err))?;
    let handle = server.shutdown_handle();
    install_ctrlc_handler(handle.clone())?;

    info!(addr = %server.local_addr(), "center listening");

    let printer = PrintingHandler {
        ack: AckHandler::new(password),
        registry: DataItemRegistry::with_station_defaults(),
        format,
        limit: args.count,
        printed: AtomicUsize::new(0),
        handle,
    };
    server
        .serve(printer)
        .map_err(|err| peer_error("serve failed", err))?;

    let snap = server.metrics();
    info!(
        received = snap.received,
        sent = snap.sent,
        dropped = snap.dropped,
        "center summary"
    );
    Ok(SUCCESS)
}

/// Prints every message, answers with the acknowledgement handler and stops
/// the server once the print limit is reached.
struct PrintingHandler {
    ack: AckHandler,
    registry: DataItemRegistry,
    format: OutputFormat,
    limit: Option<usize>,
    printed: AtomicUsize,
    handle: ServerHandle,
}

impl FrameHandler for PrintingHandler {
    fn handle(&self, peer: SocketAddr, received: &Received) -> sl427_peer::Result<Option<UserData>> {
        let wire = received.frame.to_bytes();
        let out = MessageOutput::new(&received.message, &wire, &peer.to_string(), &self.registry);
        print_message(&out, &wire, self.format);

        let reply = self.ack.handle(peer, received);

        let printed = self.printed.fetch_add(1, Ordering::SeqCst) + 1;
        if self.limit.is_some_and(|limit| printed >= limit) {
            self.handle.shutdown();
        }
        reply
    }
}

fn install_ctrlc_handler(handle: ServerHandle) -> CliResult<()> {
    ctrlc::set_handler(move || {
        handle.shutdown();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
