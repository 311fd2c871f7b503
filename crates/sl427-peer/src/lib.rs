//! Center and station roles for SL427 links.
//!
//! The center side accepts station connections, decodes every frame into
//! user data and hands it to a [`FrameHandler`], writing back whatever reply
//! the handler returns. The station side connects to a center, sends
//! heartbeats and data uploads on timers, and reads the confirmations.

pub mod connection;
pub mod error;
pub mod handler;
pub mod listener;
pub mod metrics;
pub mod station;

pub use connection::{Connection, Received};
pub use error::{PeerError, Result};
pub use handler::{AckHandler, FrameHandler};
pub use listener::{CenterServer, ServerConfig, ServerHandle};
pub use metrics::{LinkMetrics, MetricsSnapshot};
pub use station::{Station, StationConfig};
