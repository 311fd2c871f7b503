//! SL427 hydrology telemetry protocol.
//!
//! Monitoring stations report to a collection center over long-lived TCP
//! connections using `68 L 68 <user data> CS 16` frames. This crate gathers
//! the layers of the workspace under one roof.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP listener and link streams
//! - [`frame`]: BCD, checksum, frame codec and stream framer
//! - [`message`]: address, control field, AFN, time label and user data
//! - [`peer`]: center server and station client (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use sl427_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use sl427_frame::*;
}

/// Re-export message types.
pub mod message {
    pub use sl427_message::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use sl427_peer::*;
}
