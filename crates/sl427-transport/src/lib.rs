//! TCP transport for SL427 telemetry links.
//!
//! Stations dial the collection center over TCP and hold the connection open.
//! This is the lowest layer of the workspace: everything else reads and
//! writes through the [`LinkStream`] type provided here.

pub mod error;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
pub use tcp::TcpTransport;
pub use traits::LinkStream;
