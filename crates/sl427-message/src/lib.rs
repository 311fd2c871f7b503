//! SL427 user-data model.
//!
//! Decodes the user-data region of a frame into control field, station
//! address, functional code and the optional trailing sub-fields, and builds
//! it back. Also carries the data-item payload used by uploads and the
//! registry that formats item values for display.

pub mod address;
pub mod afn;
pub mod control;
pub mod error;
pub mod payload;
pub mod registry;
pub mod time_label;
pub mod user_data;

pub use address::{Address, AdminAddress, CodedAddress, StationKind, ADDRESS_LEN};
pub use afn::Afn;
pub use control::{code, Control, Direction};
pub use error::{MessageError, Result};
pub use payload::{DataItem, DataPayload, DataValue};
pub use registry::{DataItemDef, DataItemRegistry};
pub use time_label::{TimeLabel, TIME_LABEL_LEN};
pub use user_data::{UserData, PASSWORD_LEN};
