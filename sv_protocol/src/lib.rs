#![warn(unused_extern_crates)]

//! Codec for the surveyor's mixed standard/proprietary NMEA sentences: checksums,
//! degrees-minutes conversion, telemetry parsing and waypoint mission assembly.
//!
//! Everything here is synchronous and free of shared state, so it can be called from any task.

pub mod checksum;
pub mod clock;
pub mod commands;
pub mod coordinates;
pub mod mission;
pub mod parser;
pub mod sentence;
pub mod types;

pub use checksum::{compute_checksum, verify_checksum};
pub use clock::{Clock, ManualClock, SystemClock};
pub use commands::{ControlCommand, ControlMode};
pub use coordinates::{degrees_to_nmea, nmea_to_degrees};
pub use mission::{assemble_mission, Mission};
pub use parser::{
    decode_gga, dispatch, extract_attitude, extract_by_prefix, extract_command_status,
    extract_gga, parse_attitude, parse_command_status, parse_coordinates, parse_proprietary,
    Dispatcher, SentenceKind,
};
pub use sentence::{build_sentence, build_waypoint_payload};
pub use types::{Axis, ChecksumMode, Coordinate, FieldMap, FieldValue, Fix, ProtocolError};
