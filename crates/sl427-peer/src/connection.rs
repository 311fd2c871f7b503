use std::io::{Read, Write};
use std::sync::Arc;

use sl427_frame::{hex_dump, Frame, FrameConfig, FrameError, FrameReader, FrameWriter};
use sl427_message::UserData;
use sl427_transport::LinkStream;
use tracing::{debug, trace};

use crate::error::{PeerError, Result};
use crate::metrics::LinkMetrics;

/// A frame read off the link together with its decoded user data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub frame: Frame,
    pub message: UserData,
}

impl Received {
    pub fn from_frame(frame: Frame) -> Result<Self> {
        let message = UserData::from_frame(&frame)?;
        Ok(Self { frame, message })
    }
}

/// One framed link: a reader and a writer over the two halves of a stream.
pub struct Connection<S> {
    label: String,
    reader: FrameReader<S>,
    writer: FrameWriter<S>,
    metrics: Arc<LinkMetrics>,
}

impl<S: Read + Write> Connection<S> {
    /// Build from separate read and write handles to the same link.
    pub fn new(label: impl Into<String>, read_half: S, write_half: S) -> Self {
        Self::with_metrics(label, read_half, write_half, Arc::new(LinkMetrics::new()))
    }

    pub fn with_metrics(
        label: impl Into<String>,
        read_half: S,
        write_half: S,
        metrics: Arc<LinkMetrics>,
    ) -> Self {
        Self {
            label: label.into(),
            reader: FrameReader::new(read_half),
            writer: FrameWriter::new(write_half),
            metrics,
        }
    }

    /// Read the next frame and decode its user data.
    ///
    /// Frames or messages that fail to decode are counted as dropped. A clean
    /// end of stream is reported as [`PeerError::Disconnected`].
    pub fn recv(&mut self) -> Result<Received> {
        let frame = match self.reader.read_frame() {
            Ok(frame) => frame,
            Err(FrameError::ConnectionClosed) => {
                return Err(PeerError::Disconnected(self.label.clone()))
            }
            Err(err) => {
                if err.is_recoverable() {
                    self.metrics.record_drop();
                }
                return Err(err.into());
            }
        };

        match Received::from_frame(frame) {
            Ok(received) => {
                self.metrics.record_receive();
                debug!(peer = %self.label, message = %received.message, "received message");
                Ok(received)
            }
            Err(err) => {
                self.metrics.record_drop();
                Err(err)
            }
        }
    }

    /// Encode and send one message.
    pub fn send(&mut self, message: &UserData) -> Result<()> {
        let frame = message.to_frame()?;
        self.writer.write_frame(&frame)?;
        self.metrics.record_send();
        debug!(peer = %self.label, %message, "sent message");
        Ok(())
    }

    /// Frame and send a raw user-data region.
    pub fn send_raw(&mut self, user_data: &[u8]) -> Result<()> {
        self.writer.send(user_data)?;
        self.metrics.record_send();
        trace!(peer = %self.label, raw = %hex_dump(user_data), "sent raw user data");
        Ok(())
    }

    /// Bytes of the last frame attempt, for logging failures.
    pub fn last_attempt(&self) -> &[u8] {
        self.reader.last_attempt()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn metrics(&self) -> &Arc<LinkMetrics> {
        &self.metrics
    }

    pub fn skipped_bytes(&self) -> u64 {
        self.reader.skipped_bytes()
    }
}

impl Connection<LinkStream> {
    /// Split a link stream into framed halves and apply the timeouts.
    pub fn from_link(
        stream: LinkStream,
        config: FrameConfig,
        metrics: Arc<LinkMetrics>,
    ) -> Result<Self> {
        let label = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let read_half = stream.try_clone()?;
        let reader = FrameReader::with_config_link(read_half, config.clone())?;
        let writer = FrameWriter::with_config_link(stream, config)?;

        Ok(Self {
            label,
            reader,
            writer,
            metrics,
        })
    }

    /// Close both directions; a read blocked on another clone returns.
    pub fn shutdown(&self) -> Result<()> {
        self.writer.get_ref().shutdown()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use sl427_message::{Address, AdminAddress, Afn, Control};

    use super::*;

    const HEARTBEAT_WIRE: [u8; 12] = [
        0x68, 0x07, 0x68, 0x80, 0x21, 0x05, 0x25, 0x04, 0xD2, 0xC0, 0x18, 0x16,
    ];

    fn heartbeat() -> UserData {
        UserData::new(
            Control::uplink(0),
            Address::Admin(AdminAddress::new([0x21, 0x05, 0x25], 1234).expect("valid address")),
            Afn::UPLOAD,
        )
    }

    fn cursor_conn(input: Vec<u8>) -> Connection<Cursor<Vec<u8>>> {
        Connection::new("test", Cursor::new(input), Cursor::new(Vec::new()))
    }

    #[test]
    fn recv_decodes_frame_and_message() {
        let mut conn = cursor_conn(HEARTBEAT_WIRE.to_vec());
        let received = conn.recv().expect("heartbeat should decode");

        assert_eq!(received.message, heartbeat());
        assert_eq!(received.frame.to_bytes().as_ref(), &HEARTBEAT_WIRE);
        assert_eq!(conn.metrics().snapshot().received, 1);
    }

    #[test]
    fn clean_eof_is_disconnected() {
        let mut conn = cursor_conn(Vec::new());
        assert!(matches!(conn.recv(), Err(PeerError::Disconnected(label)) if label == "test"));
    }

    #[test]
    fn bad_checksum_is_recoverable_and_counted() {
        let mut input = HEARTBEAT_WIRE.to_vec();
        input[10] ^= 0x01;
        input.extend_from_slice(&HEARTBEAT_WIRE);
        let mut conn = cursor_conn(input);

        let err = conn.recv().expect_err("corrupt frame should fail");
        assert!(err.is_recoverable());
        assert_eq!(conn.last_attempt().len(), HEARTBEAT_WIRE.len());

        conn.recv().expect("next frame should decode");
        let snap = conn.metrics().snapshot();
        assert_eq!((snap.received, snap.dropped), (1, 1));
    }

    #[test]
    fn undecodable_user_data_is_dropped() {
        // Valid envelope, but only three bytes of user data.
        let frame = Frame::new(vec![0x80, 0x21, 0x05]).expect("frame should build");
        let mut conn = cursor_conn(frame.to_bytes().to_vec());

        let err = conn.recv().expect_err("short user data should fail");
        assert!(matches!(err, PeerError::Message(_)));
        assert!(err.is_recoverable());
        assert_eq!(conn.metrics().snapshot().dropped, 1);
    }

    #[test]
    fn incomplete_frame_is_fatal() {
        let mut conn = cursor_conn(HEARTBEAT_WIRE[..8].to_vec());
        let err = conn.recv().expect_err("truncated frame should fail");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn send_writes_wire_bytes() {
        let mut conn = cursor_conn(Vec::new());
        conn.send(&heartbeat()).expect("send should succeed");
        conn.send_raw(&[0x80, 0x21, 0x05, 0x25, 0x04, 0xD2, 0xC0])
            .expect("raw send should succeed");

        let written = conn.writer.get_ref().get_ref().clone();
        assert_eq!(&written[..12], &HEARTBEAT_WIRE);
        assert_eq!(&written[12..], &HEARTBEAT_WIRE);
        assert_eq!(conn.metrics().snapshot().sent, 2);
    }

    #[test]
    fn link_roundtrip() {
        let listener = sl427_transport::TcpTransport::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr();

        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut conn = Connection::from_link(
                stream,
                FrameConfig::default(),
                Arc::new(LinkMetrics::new()),
            )
            .expect("server connection");
            let received = conn.recv().expect("server recv");
            conn.send(&received.message).expect("server echo");
        });

        let stream = sl427_transport::TcpTransport::connect(addr, None).expect("connect");
        let mut client = Connection::from_link(
            stream,
            FrameConfig::default(),
            Arc::new(LinkMetrics::new()),
        )
        .expect("client connection");
        client.send(&heartbeat()).expect("client send");
        let echoed = client.recv().expect("client recv");
        assert_eq!(echoed.message, heartbeat());

        server.join().expect("server thread");
        client.shutdown().expect("shutdown");
    }
}
