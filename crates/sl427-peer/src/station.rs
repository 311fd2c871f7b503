use std::net::ToSocketAddrs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use sl427_frame::{hex_dump, FrameConfig, FrameError, FrameReader, FrameWriter};
use sl427_message::{code, Address, Afn, Control, DataPayload, TimeLabel, UserData};
use sl427_transport::{LinkStream, TcpTransport};
use tracing::{debug, info, warn};

use crate::connection::Received;
use crate::error::{PeerError, Result};
use crate::metrics::{LinkMetrics, MetricsSnapshot};

/// Station-side client configuration.
#[derive(Debug, Clone)]
pub struct StationConfig {
    pub address: Address,
    pub heartbeat_interval: Duration,
    pub upload_interval: Duration,
    pub connect_timeout: Option<Duration>,
    /// Limit for [`Station::recv`]; the background reader keeps waiting
    /// through timeouts. A frame cut by a timeout is completed by the next
    /// read.
    pub read_timeout: Option<Duration>,
    /// A send that stalls this long closes the link.
    pub write_timeout: Option<Duration>,
    /// Type code placed in the control field of uploads.
    pub upload_code: u8,
}

impl StationConfig {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            heartbeat_interval: Duration::from_secs(30),
            upload_interval: Duration::from_secs(60),
            connect_timeout: Some(Duration::from_secs(5)),
            read_timeout: None,
            write_timeout: Some(Duration::from_secs(10)),
            upload_code: code::WATER_LEVEL,
        }
    }
}

/// Writer and 2-bit frame count, updated together under one lock.
struct Outbound {
    writer: FrameWriter<LinkStream>,
    frame_count: u8,
}

struct Link {
    address: Address,
    upload_code: u8,
    outbound: Mutex<Outbound>,
    metrics: Arc<LinkMetrics>,
    stopped: AtomicBool,
}

impl Link {
    fn send_with(&self, build: impl FnOnce(u8) -> Result<UserData>) -> Result<UserData> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(PeerError::Shutdown);
        }
        let mut outbound = self.outbound.lock().map_err(|_| PeerError::Shutdown)?;
        let count = outbound.frame_count;
        let message = build(count)?;
        let frame = message.to_frame()?;
        if let Err(err) = outbound.writer.write_frame(&frame) {
            if err.is_timeout() {
                // A partial frame may be on the wire; the link cannot be reused.
                warn!(station = %self.address, "center stopped reading, closing link");
                if let Err(close) = outbound.writer.get_ref().shutdown() {
                    debug!(error = %close, "closing stalled link failed");
                }
            }
            return Err(err.into());
        }
        outbound.frame_count = (count + 1) % 4;
        drop(outbound);

        self.metrics.record_send();
        debug!(station = %self.address, %message, raw = %hex_dump(&frame.to_bytes()), "sent");
        Ok(message)
    }

    fn heartbeat(&self) -> Result<UserData> {
        self.send_with(|count| {
            let control = Control::uplink(code::CONFIRM).with_frame_count(count);
            Ok(UserData::new(control, self.address, Afn::UPLOAD))
        })
    }

    fn upload(&self, payload: &DataPayload) -> Result<UserData> {
        let data = payload.encode()?;
        let label = TimeLabel::from_datetime(&payload.timestamp, 0);
        self.send_with(|count| {
            let control = Control::uplink(self.upload_code).with_frame_count(count);
            Ok(UserData::new(control, self.address, Afn::UPLOAD)
                .with_data(data)
                .with_time_label(label))
        })
    }
}

/// A monitoring station connected to a center.
///
/// Heartbeats and uploads share one writer, so frames from the periodic
/// tasks never interleave on the wire.
pub struct Station {
    link: Arc<Link>,
    stream: LinkStream,
    reader: Option<FrameReader<LinkStream>>,
    config: StationConfig,
    stops: Vec<Sender<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Station {
    /// Connect to the center at `server`.
    pub fn connect(server: impl ToSocketAddrs + std::fmt::Display, config: StationConfig) -> Result<Self> {
        config.address.validate()?;
        let stream = TcpTransport::connect(&server, config.connect_timeout)?;
        let frame_config = FrameConfig {
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
        };
        let writer = FrameWriter::with_config_link(stream.try_clone()?, frame_config.clone())?;
        let reader = FrameReader::with_config_link(stream.try_clone()?, frame_config)?;

        info!(station = %config.address, %server, "station connected");

        Ok(Self {
            link: Arc::new(Link {
                address: config.address,
                upload_code: config.upload_code,
                outbound: Mutex::new(Outbound {
                    writer,
                    frame_count: 0,
                }),
                metrics: Arc::new(LinkMetrics::new()),
                stopped: AtomicBool::new(false),
            }),
            stream,
            reader: Some(reader),
            config,
            stops: Vec::new(),
            tasks: Vec::new(),
        })
    }

    pub fn address(&self) -> Address {
        self.config.address
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    /// Send one heartbeat and return the message sent.
    pub fn send_heartbeat(&self) -> Result<UserData> {
        self.link.heartbeat()
    }

    /// Send one data upload and return the message sent.
    pub fn upload(&self, payload: &DataPayload) -> Result<UserData> {
        self.link.upload(payload)
    }

    /// Read the next message from the center.
    ///
    /// Fails with [`PeerError::ReceiverDetached`] once [`Station::start`] has
    /// handed the reader to its background task.
    pub fn recv(&mut self) -> Result<Received> {
        let reader = self.reader.as_mut().ok_or(PeerError::ReceiverDetached)?;
        let frame = match reader.read_frame() {
            Ok(frame) => frame,
            Err(FrameError::ConnectionClosed) => {
                return Err(PeerError::Disconnected(self.config.address.to_string()))
            }
            Err(err) => return Err(err.into()),
        };
        let received = Received::from_frame(frame)?;
        self.link.metrics.record_receive();
        Ok(received)
    }

    /// Start the heartbeat, upload and acknowledgement tasks.
    ///
    /// `source` is called once per upload interval for the payload to send.
    pub fn start<F>(&mut self, source: F) -> Result<()>
    where
        F: Fn() -> DataPayload + Send + 'static,
    {
        if self.link.stopped.load(Ordering::SeqCst) {
            return Err(PeerError::Shutdown);
        }
        let reader = self.reader.take().ok_or(PeerError::ReceiverDetached)?;

        let link = Arc::clone(&self.link);
        self.spawn_periodic("heartbeat", self.config.heartbeat_interval, move || {
            link.heartbeat().map(drop)
        })?;

        let link = Arc::clone(&self.link);
        self.spawn_periodic("upload", self.config.upload_interval, move || {
            link.upload(&source()).map(drop)
        })?;

        let link = Arc::clone(&self.link);
        let acks = thread::Builder::new()
            .name("sl427-station-acks".to_string())
            .spawn(move || read_acks(reader, &link))
            .map_err(|err| PeerError::Transport(err.into()))?;
        self.tasks.push(acks);

        info!(station = %self.config.address, "station tasks started");
        Ok(())
    }

    fn spawn_periodic<F>(&mut self, name: &'static str, interval: Duration, tick: F) -> Result<()>
    where
        F: Fn() -> Result<()> + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let address = self.config.address;
        let task = thread::Builder::new()
            .name(format!("sl427-station-{name}"))
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if let Err(err) = tick() {
                            if matches!(err, PeerError::Shutdown) {
                                return;
                            }
                            warn!(station = %address, task = name, error = %err, "periodic send failed");
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                }
            })
            .map_err(|err| PeerError::Transport(err.into()))?;
        self.stops.push(stop_tx);
        self.tasks.push(task);
        Ok(())
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.link.metrics.snapshot()
    }

    pub fn is_stopped(&self) -> bool {
        self.link.stopped.load(Ordering::SeqCst)
    }

    /// Stop the tasks, close the connection and wait for the tasks to exit.
    /// Safe to call more than once.
    pub fn stop(&mut self) {
        if self.link.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stops.clear();
        if let Err(err) = self.stream.shutdown() {
            debug!(error = %err, "closing station link failed");
        }
        for task in self.tasks.drain(..) {
            if task.join().is_err() {
                warn!("station task panicked");
            }
        }
        info!(station = %self.config.address, "station stopped");
    }
}

impl Drop for Station {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_acks(mut reader: FrameReader<LinkStream>, link: &Link) {
    loop {
        let frame = match reader.read_frame() {
            Ok(frame) => frame,
            Err(err) if err.is_recoverable() => {
                link.metrics.record_drop();
                warn!(error = %err, raw = %hex_dump(reader.last_attempt()), "dropping bad frame");
                continue;
            }
            // The reader keeps any partial frame and resumes it.
            Err(err) if err.is_timeout() && !link.stopped.load(Ordering::SeqCst) => continue,
            Err(err) => {
                if !link.stopped.load(Ordering::SeqCst) {
                    warn!(error = %err, "center link closed");
                }
                return;
            }
        };
        match UserData::from_frame(&frame) {
            Ok(message) => {
                link.metrics.record_receive();
                debug!(station = %link.address, %message, "received from center");
            }
            Err(err) => {
                link.metrics.record_drop();
                warn!(error = %err, raw = %hex_dump(&frame.to_bytes()), "undecodable reply");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::net::SocketAddr;
    use std::time::Instant;

    use chrono::NaiveDate;
    use sl427_message::{AdminAddress, DataItem, DataValue, Direction};

    use super::*;
    use crate::connection::Connection;
    use crate::handler::AckHandler;
    use crate::listener::{CenterServer, ServerConfig, ServerHandle};

    fn address() -> Address {
        Address::Admin(AdminAddress::new([0x21, 0x05, 0x25], 1234).expect("valid address"))
    }

    fn payload() -> DataPayload {
        let ts = NaiveDate::from_ymd_opt(2024, 6, 15)
            .and_then(|d| d.and_hms_opt(10, 30, 5))
            .expect("valid timestamp");
        DataPayload::new(
            ts,
            vec![
                DataItem::new(1001, DataValue::Int32(12345)),
                DataItem::new(1005, DataValue::Text("normal".to_string())),
            ],
        )
    }

    fn center() -> (SocketAddr, ServerHandle, JoinHandle<CenterServer>) {
        let server = CenterServer::bind("127.0.0.1:0", ServerConfig::default())
            .expect("server should bind");
        let addr = server.local_addr();
        let handle = server.shutdown_handle();
        let thread = thread::spawn(move || {
            server
                .serve(AckHandler::new(0x00AA))
                .expect("serve should finish cleanly");
            server
        });
        (addr, handle, thread)
    }

    fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if check() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        check()
    }

    #[test]
    fn heartbeat_and_upload_are_acknowledged() {
        let (addr, handle, server) = center();
        let mut station =
            Station::connect(addr, StationConfig::new(address())).expect("station should connect");

        let sent = station.send_heartbeat().expect("heartbeat should send");
        assert_eq!(sent.control.code(), code::CONFIRM);
        assert_eq!(sent.control.frame_count(), 0);
        let ack = station.recv().expect("heartbeat ack should arrive");
        assert_eq!(ack.message.control.direction(), Direction::Downlink);
        assert_eq!(ack.message.control.frame_count(), 0);
        assert_eq!(ack.message.password, Some(0x00AA));

        let sent = station.upload(&payload()).expect("upload should send");
        assert_eq!(sent.control.code(), code::WATER_LEVEL);
        assert_eq!(sent.control.frame_count(), 1);
        assert!(sent.time_label.is_some());
        let ack = station.recv().expect("upload ack should arrive");
        assert_eq!(ack.message.control.frame_count(), 1);

        let snap = station.metrics();
        assert_eq!((snap.sent, snap.received), (2, 2));

        station.stop();
        handle.shutdown();
        server.join().expect("server thread should finish");
    }

    #[test]
    fn frame_count_wraps_at_four() {
        let (addr, handle, server) = center();
        let station =
            Station::connect(addr, StationConfig::new(address())).expect("station should connect");

        let counts: Vec<u8> = (0..6)
            .map(|_| {
                station
                    .send_heartbeat()
                    .expect("heartbeat should send")
                    .control
                    .frame_count()
            })
            .collect();
        assert_eq!(counts, vec![0, 1, 2, 3, 0, 1]);

        drop(station);
        handle.shutdown();
        server.join().expect("server thread should finish");
    }

    #[test]
    fn upload_decodes_on_the_center() {
        let listener = TcpTransport::bind("127.0.0.1:0").expect("listener should bind");
        let addr = listener.local_addr();
        let center = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("center should accept");
            let mut conn =
                Connection::from_link(stream, FrameConfig::default(), Arc::new(LinkMetrics::new()))
                    .expect("center connection should build");
            conn.recv().expect("upload should arrive").message
        });

        let station =
            Station::connect(addr, StationConfig::new(address())).expect("station should connect");
        station.upload(&payload()).expect("upload should send");

        let message = center.join().expect("center thread should finish");
        assert_eq!(message.address, address());
        assert_eq!(
            message.time_label,
            Some(TimeLabel::from_datetime(&payload().timestamp, 0))
        );
        let decoded = DataPayload::decode(&message.data).expect("payload should decode");
        assert_eq!(decoded, payload());
    }

    #[test]
    fn periodic_tasks_run_until_stopped() {
        let (addr, handle, server) = center();
        let mut config = StationConfig::new(address());
        config.heartbeat_interval = Duration::from_millis(20);
        config.upload_interval = Duration::from_millis(30);
        let mut station = Station::connect(addr, config).expect("station should connect");

        station.start(payload).expect("tasks should start");
        assert!(matches!(station.recv(), Err(PeerError::ReceiverDetached)));

        let link = Arc::clone(&station.link);
        let acked = wait_until(Duration::from_secs(5), || {
            let snap = link.metrics.snapshot();
            snap.sent >= 4 && snap.received >= 2
        });
        assert!(acked, "periodic frames should be sent and acknowledged");

        station.stop();
        assert!(station.is_stopped());
        assert!(matches!(station.send_heartbeat(), Err(PeerError::Shutdown)));
        station.stop();

        handle.shutdown();
        server.join().expect("server thread should finish");
    }

    #[test]
    fn start_twice_is_rejected() {
        let (addr, handle, server) = center();
        let mut config = StationConfig::new(address());
        config.heartbeat_interval = Duration::from_secs(60);
        config.upload_interval = Duration::from_secs(60);
        let mut station = Station::connect(addr, config).expect("station should connect");

        station.start(payload).expect("first start should succeed");
        assert!(matches!(
            station.start(payload),
            Err(PeerError::ReceiverDetached)
        ));

        station.stop();
        handle.shutdown();
        server.join().expect("server thread should finish");
    }

    #[test]
    fn recv_times_out_when_center_is_silent() {
        let listener = TcpTransport::bind("127.0.0.1:0").expect("listener should bind");
        let addr = listener.local_addr();
        let mut config = StationConfig::new(address());
        config.read_timeout = Some(Duration::from_millis(100));

        let mut station = Station::connect(addr, config).expect("station should connect");
        let (_silent, _) = listener.accept().expect("center should accept");

        let err = station.recv().expect_err("silent center should time out");
        assert!(matches!(err, PeerError::Frame(FrameError::Io(_))));
        assert!(!err.is_recoverable());
    }

    /// Accept one station and return the center's framed connection plus a
    /// raw handle for writing partial frames.
    fn raw_center(listener: &TcpTransport) -> (Connection<LinkStream>, LinkStream) {
        let (stream, _) = listener.accept().expect("center should accept");
        let raw = stream.try_clone().expect("stream should clone");
        let conn = Connection::from_link(stream, FrameConfig::default(), Arc::new(LinkMetrics::new()))
            .expect("center connection should build");
        (conn, raw)
    }

    fn ack_wire(conn: &mut Connection<LinkStream>) -> Vec<u8> {
        let uplink = conn.recv().expect("uplink should arrive").message;
        AckHandler::new(0x00AA)
            .ack_for(&uplink)
            .to_frame_bytes()
            .expect("ack should encode")
            .to_vec()
    }

    #[test]
    fn recv_completes_reply_split_across_timeout() {
        let listener = TcpTransport::bind("127.0.0.1:0").expect("listener should bind");
        let addr = listener.local_addr();
        let mut config = StationConfig::new(address());
        config.read_timeout = Some(Duration::from_millis(100));

        let mut station = Station::connect(addr, config).expect("station should connect");
        let (mut conn, mut raw) = raw_center(&listener);

        station.send_heartbeat().expect("heartbeat should send");
        let ack = ack_wire(&mut conn);

        raw.write_all(&ack[..5]).expect("first half should write");
        let err = station.recv().expect_err("half a reply should time out");
        assert!(err.is_timeout());

        raw.write_all(&ack[5..]).expect("second half should write");
        let reply = station.recv().expect("second half should complete the reply");
        assert_eq!(reply.message.control.direction(), Direction::Downlink);
        assert_eq!(reply.message.password, Some(0x00AA));
    }

    #[test]
    fn background_reader_keeps_reply_split_across_timeout() {
        let listener = TcpTransport::bind("127.0.0.1:0").expect("listener should bind");
        let addr = listener.local_addr();
        let mut config = StationConfig::new(address());
        config.read_timeout = Some(Duration::from_millis(50));
        config.heartbeat_interval = Duration::from_secs(60);
        config.upload_interval = Duration::from_secs(60);

        let mut station = Station::connect(addr, config).expect("station should connect");
        let (mut conn, mut raw) = raw_center(&listener);
        station.start(payload).expect("tasks should start");

        station.send_heartbeat().expect("heartbeat should send");
        let ack = ack_wire(&mut conn);
        raw.write_all(&ack[..5]).expect("first half should write");
        thread::sleep(Duration::from_millis(200));
        raw.write_all(&ack[5..]).expect("second half should write");

        let link = Arc::clone(&station.link);
        let received = wait_until(Duration::from_secs(5), || link.metrics.snapshot().received == 1);
        assert!(received, "split reply should be read as one frame");
        assert_eq!(station.metrics().dropped, 0);

        station.stop();
    }

    #[test]
    fn stalled_center_trips_write_timeout() {
        let listener = TcpTransport::bind("127.0.0.1:0").expect("listener should bind");
        let addr = listener.local_addr();
        let mut config = StationConfig::new(address());
        config.write_timeout = Some(Duration::from_millis(50));

        let mut station = Station::connect(addr, config).expect("station should connect");
        // Accepted but never read from.
        let (_silent, _) = listener.accept().expect("center should accept");

        let deadline = Instant::now() + Duration::from_secs(20);
        let err = loop {
            match station.upload(&payload()) {
                Ok(_) => assert!(Instant::now() < deadline, "write timeout never surfaced"),
                Err(err) => break err,
            }
        };
        assert!(err.is_timeout(), "unexpected error: {err}");

        // The stalled link is closed rather than reused.
        assert!(station.send_heartbeat().is_err());
        station.stop();
        assert!(station.is_stopped());
    }

    #[test]
    fn connect_refused_is_transport_error() {
        let addr = {
            let listener = TcpTransport::bind("127.0.0.1:0").expect("listener should bind");
            listener.local_addr()
        };
        let result = Station::connect(addr, StationConfig::new(address()));
        assert!(matches!(result, Err(PeerError::Transport(_))));
    }
}
