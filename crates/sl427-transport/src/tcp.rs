use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::LinkStream;

/// TCP listening endpoint of a collection center.
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Bind and listen on a TCP address such as `0.0.0.0:8000`.
    ///
    /// Port `0` picks an ephemeral port; use [`TcpTransport::local_addr`] to
    /// find out which.
    pub fn bind(addr: impl ToSocketAddrs + std::fmt::Display) -> Result<Self> {
        let shown = addr.to_string();
        let listener = TcpListener::bind(&addr).map_err(|e| TransportError::Bind {
            addr: shown.clone(),
            source: e,
        })?;
        let local_addr = listener.local_addr().map_err(|e| TransportError::Bind {
            addr: shown,
            source: e,
        })?;

        info!(%local_addr, "listening on tcp");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<(LinkStream, SocketAddr)> {
        let (stream, addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%addr, "accepted connection");
        Ok((LinkStream::from_tcp(stream), addr))
    }

    /// Connect to a listening center (blocking).
    ///
    /// With a timeout, each resolved address is tried in turn until one
    /// connects within the limit.
    pub fn connect(
        addr: impl ToSocketAddrs + std::fmt::Display,
        timeout: Option<Duration>,
    ) -> Result<LinkStream> {
        let shown = addr.to_string();
        let stream = match timeout {
            None => TcpStream::connect(&addr).map_err(|e| TransportError::Connect {
                addr: shown.clone(),
                source: e,
            })?,
            Some(timeout) => connect_timeout(&addr, &shown, timeout)?,
        };
        // Frames are small and latency matters more than throughput.
        stream.set_nodelay(true)?;
        debug!(addr = %shown, "connected over tcp");
        Ok(LinkStream::from_tcp(stream))
    }

    /// The address this transport is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Switch the listener between blocking and polling accept.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.listener
            .set_nonblocking(nonblocking)
            .map_err(Into::into)
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

fn connect_timeout(
    addr: &impl ToSocketAddrs,
    shown: &str,
    timeout: Duration,
) -> Result<TcpStream> {
    let addrs = addr.to_socket_addrs().map_err(|e| TransportError::Connect {
        addr: shown.to_string(),
        source: e,
    })?;

    let mut last_err = None;
    for candidate in addrs {
        match TcpStream::connect_timeout(&candidate, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }

    match last_err {
        Some(source) => Err(TransportError::Connect {
            addr: shown.to_string(),
            source,
        }),
        None => Err(TransportError::Unresolved(shown.to_string())),
    }
}
