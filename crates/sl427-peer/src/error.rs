/// Errors that can occur in peer operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] sl427_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] sl427_frame::FrameError),

    /// User data did not decode or validate.
    #[error("message error: {0}")]
    Message(#[from] sl427_message::MessageError),

    /// Peer disconnected.
    #[error("peer disconnected: {0}")]
    Disconnected(String),

    /// The server is already holding its maximum number of connections.
    #[error("connection limit of {0} reached")]
    ConnectionLimit(usize),

    /// The station or server has been stopped.
    #[error("shut down")]
    Shutdown,

    /// Incoming frames are consumed by the background receive task.
    #[error("receiver is owned by the background task")]
    ReceiverDetached,
}

impl PeerError {
    /// A bad frame or message; the connection itself is still usable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            PeerError::Frame(err) => err.is_recoverable(),
            PeerError::Message(sl427_message::MessageError::Frame(err)) => err.is_recoverable(),
            PeerError::Message(_) => true,
            _ => false,
        }
    }

    /// A read or write deadline expired.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PeerError::Frame(err) if err.is_timeout())
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;
