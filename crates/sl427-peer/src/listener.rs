use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use sl427_frame::{hex_dump, FrameConfig};
use sl427_transport::{LinkStream, TcpTransport};
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::error::{PeerError, Result};
use crate::handler::FrameHandler;
use crate::metrics::{LinkMetrics, MetricsSnapshot};

/// Center-side server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub max_connections: usize,
    /// Idle limit per connection; `None` waits forever.
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    /// Password placed in downlink replies.
    pub password: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            read_timeout: None,
            write_timeout: Some(Duration::from_secs(30)),
            password: 0,
        }
    }
}

impl ServerConfig {
    fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
        }
    }
}

struct RegisteredConnection {
    stream: LinkStream,
    worker: Option<JoinHandle<()>>,
}

struct Shared {
    running: AtomicBool,
    connections: Mutex<HashMap<SocketAddr, RegisteredConnection>>,
    metrics: Arc<LinkMetrics>,
    local_addr: SocketAddr,
}

impl Shared {
    fn connections(&self) -> MutexGuard<'_, HashMap<SocketAddr, RegisteredConnection>> {
        // Entries are inserted and removed whole, so a poisoned map is still consistent.
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Wake every worker blocked in a read. Replies being written still go
    /// out; each worker closes its connection as it exits.
    fn stop_reading_all(&self) {
        for (peer, entry) in self.connections().iter() {
            if let Err(err) = entry.stream.shutdown_read() {
                debug!(%peer, error = %err, "closing connection failed");
            }
        }
    }
}

/// Collection-center server: one worker thread per station connection.
pub struct CenterServer {
    transport: TcpTransport,
    config: ServerConfig,
    shared: Arc<Shared>,
}

/// Stops a running [`CenterServer`] from another thread.
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<Shared>,
}

impl CenterServer {
    /// Bind the listening socket. Nothing is accepted until [`CenterServer::serve`].
    pub fn bind(addr: impl ToSocketAddrs + std::fmt::Display, config: ServerConfig) -> Result<Self> {
        let transport = TcpTransport::bind(addr)?;
        let shared = Arc::new(Shared {
            running: AtomicBool::new(true),
            connections: Mutex::new(HashMap::new()),
            metrics: Arc::new(LinkMetrics::new()),
            local_addr: transport.local_addr(),
        });
        Ok(Self {
            transport,
            config,
            shared,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Number of live registered connections.
    pub fn connection_count(&self) -> usize {
        self.shared.connections().len()
    }

    /// Traffic counters summed over all connections.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    pub fn shutdown_handle(&self) -> ServerHandle {
        ServerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Accept connections until shut down, dispatching every decoded message
    /// to `handler`. Returns once all workers have exited.
    pub fn serve<H>(&self, handler: H) -> Result<()>
    where
        H: FrameHandler + 'static,
    {
        let handler: Arc<dyn FrameHandler> = Arc::new(handler);
        info!(addr = %self.local_addr(), max = self.config.max_connections, "center serving");

        while self.shared.running.load(Ordering::SeqCst) {
            let (stream, peer) = match self.transport.accept() {
                Ok(accepted) => accepted,
                Err(err) => {
                    if !self.shared.running.load(Ordering::SeqCst) {
                        break;
                    }
                    warn!(error = %err, "accept failed");
                    continue;
                }
            };
            if !self.shared.running.load(Ordering::SeqCst) {
                let _ = stream.shutdown();
                break;
            }
            if let Err(err) = self.admit(stream, peer, Arc::clone(&handler)) {
                warn!(%peer, error = %err, "connection refused");
            }
        }

        self.shared.stop_reading_all();
        let workers: Vec<_> = self
            .shared
            .connections()
            .values_mut()
            .filter_map(|entry| entry.worker.take())
            .collect();
        for worker in workers {
            if worker.join().is_err() {
                warn!("connection worker panicked");
            }
        }
        self.shared.connections().clear();
        info!("center stopped");
        Ok(())
    }

    fn admit(
        &self,
        stream: LinkStream,
        peer: SocketAddr,
        handler: Arc<dyn FrameHandler>,
    ) -> Result<()> {
        let registry_stream = stream.try_clone()?;
        {
            let mut connections = self.shared.connections();
            if connections.len() >= self.config.max_connections {
                let _ = stream.shutdown();
                return Err(PeerError::ConnectionLimit(self.config.max_connections));
            }
            connections.insert(
                peer,
                RegisteredConnection {
                    stream: registry_stream,
                    worker: None,
                },
            );
        }

        let conn = match Connection::from_link(
            stream,
            self.config.frame_config(),
            Arc::clone(&self.shared.metrics),
        ) {
            Ok(conn) => conn,
            Err(err) => {
                self.shared.connections().remove(&peer);
                return Err(err);
            }
        };

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(format!("sl427-conn-{peer}"))
            .spawn(move || {
                run_connection(conn, peer, handler.as_ref(), &shared);
                shared.connections().remove(&peer);
            });

        match spawned {
            Ok(worker) => {
                if let Some(entry) = self.shared.connections().get_mut(&peer) {
                    entry.worker = Some(worker);
                }
                info!(%peer, "station connected");
                Ok(())
            }
            Err(err) => {
                if let Some(entry) = self.shared.connections().remove(&peer) {
                    let _ = entry.stream.shutdown();
                }
                Err(PeerError::Transport(err.into()))
            }
        }
    }
}

impl ServerHandle {
    /// Stop accepting and reading, then wake the accept loop. Connections
    /// close once their workers exit. Safe to call more than once.
    pub fn shutdown(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("center shutting down");
        self.shared.stop_reading_all();
        // Unblock the pending accept.
        let mut wake = self.shared.local_addr;
        if wake.ip().is_unspecified() {
            wake.set_ip(match wake {
                SocketAddr::V4(_) => Ipv4Addr::LOCALHOST.into(),
                SocketAddr::V6(_) => Ipv6Addr::LOCALHOST.into(),
            });
        }
        let _ = TcpTransport::connect(wake, Some(Duration::from_secs(1)));
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }
}

fn run_connection(
    mut conn: Connection<LinkStream>,
    peer: SocketAddr,
    handler: &dyn FrameHandler,
    shared: &Shared,
) {
    while shared.running.load(Ordering::SeqCst) {
        let received = match conn.recv() {
            Ok(received) => received,
            Err(PeerError::Disconnected(_)) => {
                info!(%peer, "station disconnected");
                return;
            }
            Err(err) if err.is_recoverable() => {
                warn!(%peer, error = %err, raw = %hex_dump(conn.last_attempt()), "dropping bad frame");
                continue;
            }
            Err(err) => {
                if shared.running.load(Ordering::SeqCst) {
                    warn!(%peer, error = %err, raw = %hex_dump(conn.last_attempt()), "closing connection");
                }
                return;
            }
        };

        let reply = match handler.handle(peer, &received) {
            Ok(reply) => reply,
            Err(err) => {
                conn.metrics().record_drop();
                warn!(%peer, error = %err, message = %received.message, "handler rejected message");
                continue;
            }
        };

        if let Some(reply) = reply {
            if let Err(err) = conn.send(&reply) {
                if err.is_recoverable() {
                    warn!(%peer, error = %err, "reply not sent");
                    continue;
                }
                warn!(%peer, error = %err, "write failed, closing connection");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use sl427_frame::{FrameReader, FrameWriter};
    use sl427_message::{code, Address, AdminAddress, Afn, Control, Direction, UserData};

    use super::*;
    use crate::handler::AckHandler;

    const HEARTBEAT_WIRE: [u8; 12] = [
        0x68, 0x07, 0x68, 0x80, 0x21, 0x05, 0x25, 0x04, 0xD2, 0xC0, 0x18, 0x16,
    ];

    fn start(config: ServerConfig) -> (SocketAddr, ServerHandle, JoinHandle<CenterServer>) {
        let server = CenterServer::bind("127.0.0.1:0", config).expect("server should bind");
        let addr = server.local_addr();
        let handle = server.shutdown_handle();
        let password = server.config().password;
        let thread = thread::spawn(move || {
            server
                .serve(AckHandler::new(password))
                .expect("serve should finish cleanly");
            server
        });
        (addr, handle, thread)
    }

    fn client(addr: SocketAddr) -> Connection<LinkStream> {
        let stream = TcpTransport::connect(addr, Some(Duration::from_secs(2)))
            .expect("client should connect");
        let config = FrameConfig {
            read_timeout: Some(Duration::from_secs(5)),
            write_timeout: Some(Duration::from_secs(5)),
        };
        Connection::from_link(stream, config, Arc::new(LinkMetrics::new()))
            .expect("client connection should build")
    }

    fn heartbeat() -> UserData {
        UserData::new(
            Control::uplink(code::CONFIRM),
            Address::Admin(AdminAddress::new([0x21, 0x05, 0x25], 1234).expect("valid address")),
            Afn::UPLOAD,
        )
    }

    #[test]
    fn acknowledges_uplink() {
        let (addr, handle, server) = start(ServerConfig {
            password: 0x0102,
            ..ServerConfig::default()
        });

        let mut station = client(addr);
        station.send(&heartbeat()).expect("heartbeat should send");
        let ack = station.recv().expect("ack should arrive");

        assert_eq!(ack.message.control.direction(), Direction::Downlink);
        assert_eq!(ack.message.address, heartbeat().address);
        assert_eq!(ack.message.password, Some(0x0102));

        handle.shutdown();
        let server = server.join().expect("server thread should finish");
        assert_eq!(server.connection_count(), 0);
        let snap = server.metrics();
        assert_eq!((snap.received, snap.sent), (1, 1));
    }

    #[test]
    fn bad_frame_is_dropped_and_connection_survives() {
        let (addr, handle, server) = start(ServerConfig::default());

        let mut raw = TcpTransport::connect(addr, Some(Duration::from_secs(2)))
            .expect("client should connect");
        raw.set_read_timeout(Some(Duration::from_secs(5)))
            .expect("timeout should set");
        let mut corrupt = HEARTBEAT_WIRE;
        corrupt[10] ^= 0x01;
        let mut wire = vec![0x00, 0xFF];
        wire.extend_from_slice(&corrupt);
        wire.extend_from_slice(&HEARTBEAT_WIRE);
        raw.write_all(&wire).expect("wire bytes should send");

        let mut reader = FrameReader::new(raw.try_clone().expect("stream should clone"));
        let ack = reader.read_frame().expect("ack should arrive after the bad frame");
        let ack = UserData::from_frame(&ack).expect("ack should decode");
        assert_eq!(ack.control.code(), code::CONFIRM);

        handle.shutdown();
        let server = server.join().expect("server thread should finish");
        let snap = server.metrics();
        assert_eq!((snap.received, snap.dropped), (1, 1));
    }

    #[test]
    fn refuses_connections_over_the_limit() {
        let (addr, handle, server) = start(ServerConfig {
            max_connections: 1,
            ..ServerConfig::default()
        });

        let mut first = client(addr);
        first.send(&heartbeat()).expect("first station should send");
        first.recv().expect("first station should be acknowledged");

        let mut second = client(addr);
        let _ = second.send(&heartbeat());
        assert!(second.recv().is_err(), "second station should be closed");

        // The first connection is still served.
        first.send(&heartbeat()).expect("first station should send again");
        first.recv().expect("first station should be acknowledged again");

        handle.shutdown();
        server.join().expect("server thread should finish");
    }

    #[test]
    fn shutdown_closes_live_connections() {
        let (addr, handle, server) = start(ServerConfig::default());

        let mut station = client(addr);
        station.send(&heartbeat()).expect("heartbeat should send");
        station.recv().expect("ack should arrive");

        handle.shutdown();
        assert!(!handle.is_running());
        handle.shutdown();
        server.join().expect("server thread should finish");

        assert!(station.recv().is_err(), "connection should be closed");
    }

    #[test]
    fn frames_split_across_writes() {
        let (addr, handle, server) = start(ServerConfig::default());

        let stream = TcpTransport::connect(addr, Some(Duration::from_secs(2)))
            .expect("client should connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("timeout should set");
        let mut writer = stream.try_clone().expect("stream should clone");
        writer.write_all(&HEARTBEAT_WIRE[..5]).expect("first half should send");
        writer.flush().expect("flush");
        thread::sleep(Duration::from_millis(50));
        writer.write_all(&HEARTBEAT_WIRE[5..]).expect("second half should send");

        let mut reader = FrameReader::new(stream);
        reader.read_frame().expect("ack should arrive");

        // A second message framed by the library writer also goes through.
        let mut framed = FrameWriter::new(writer);
        framed
            .send(&heartbeat().encode())
            .expect("framed heartbeat should send");
        reader.read_frame().expect("second ack should arrive");

        handle.shutdown();
        server.join().expect("server thread should finish");
    }
}
