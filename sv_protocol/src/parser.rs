use std::sync::Arc;

use chrono::{Datelike, NaiveDateTime, Timelike};
use tracing::{event, Level};

use crate::checksum::verify_checksum;
use crate::clock::{Clock, SystemClock};
use crate::commands::ControlMode;
use crate::coordinates::nmea_to_degrees;
use crate::sentence::CRLF;
use crate::types::{ChecksumMode, FieldMap, FieldValue, Fix, ProtocolError};

pub const GGA_PREFIX: &str = "$GPGGA";
pub const ATTITUDE_PREFIX: &str = "$PSEAA";
pub const COMMAND_STATUS_PREFIX: &str = "$PSEAD";

pub const LATITUDE: &str = "Latitude";
pub const LONGITUDE: &str = "Longitude";
pub const CONTROL_MODE: &str = "Control Mode";
pub const DAY: &str = "Day";
pub const TIME: &str = "Time";

pub const ATTITUDE_FIELDS: [&str; 9] = [
    "Pitch (degrees)",
    "Roll (degrees)",
    "Heading (degrees Magnetic)",
    "Heave",
    "Temperature in electronics box (degrees C)",
    "Acceleration x, forward (G)",
    "Acceleration y, starboard (G)",
    "Acceleration z, down (G)",
    "Yaw rate [degrees/s]",
];

pub const COMMAND_STATUS_FIELDS: [&str; 4] = [
    CONTROL_MODE,
    "Heading (degrees Magnetic)",
    "Thrust (% Thrust)",
    "Thrust difference (% Thrust)",
];

const UNKNOWN_MODE: &str = "Unknown";

// First CRLF-separated line of the blob that starts with `prefix`
pub fn extract_by_prefix<'a>(blob: &'a str, prefix: &str) -> Option<&'a str> {
    blob.split(CRLF).find(|line| line.starts_with(prefix))
}

pub fn extract_gga(blob: &str) -> Option<&str> {
    extract_by_prefix(blob, GGA_PREFIX)
}

pub fn extract_attitude(blob: &str) -> Option<&str> {
    extract_by_prefix(blob, ATTITUDE_PREFIX)
}

pub fn extract_command_status(blob: &str) -> Option<&str> {
    extract_by_prefix(blob, COMMAND_STATUS_PREFIX)
}

// drops the `*CC` suffix and any line ending
fn strip_checksum(sentence: &str) -> &str {
    let sentence = sentence.trim_end_matches(['\r', '\n']);
    match sentence.split_once('*') {
        Some((body, _)) => body,
        None => sentence,
    }
}

// Decodes the position of a GGA sentence into the explicit fix state
pub fn decode_gga(sentence: &str) -> Result<Fix, ProtocolError> {
    let fields: Vec<&str> = strip_checksum(sentence).split(',').collect();

    if fields.len() < 6 || !fields[0].starts_with('$') || !fields[0].ends_with("GGA") {
        return Err(ProtocolError::MalformedSentence(sentence.to_string()));
    }

    let (lat, lat_hemisphere, lon, lon_hemisphere) = (fields[2], fields[3], fields[4], fields[5]);

    if lat.trim().is_empty() || lon.trim().is_empty() {
        return Ok(Fix::NoFix);
    }

    let latitude = axis_degrees(lat, lat_hemisphere)?;
    let longitude = axis_degrees(lon, lon_hemisphere)?;

    if latitude == 0.0 && longitude == 0.0 {
        return Ok(Fix::ZeroFix);
    }

    Ok(Fix::Position {
        latitude,
        longitude,
    })
}

// an axis without a direction letter reads as 0.0
fn axis_degrees(value: &str, hemisphere: &str) -> Result<f64, ProtocolError> {
    if hemisphere.trim().is_empty() {
        return Ok(0.0);
    }
    nmea_to_degrees(value, hemisphere)
}

pub fn try_parse_coordinates(sentence: &str) -> Result<FieldMap, ProtocolError> {
    event!(Level::DEBUG, "Parsing GGA message: {}", sentence);

    let fix = decode_gga(sentence)?;

    match fix {
        Fix::Position {
            latitude,
            longitude,
        } => {
            event!(
                Level::DEBUG,
                "Successfully parsed coordinates: Latitude = {}, Longitude = {}",
                latitude,
                longitude
            );
        }
        Fix::NoFix | Fix::ZeroFix => {
            event!(
                Level::WARN,
                "Parsed GGA message contains invalid coordinates ({:?}): {}",
                fix,
                sentence
            );
        }
    }

    let (latitude, longitude) = fix.latitude_longitude();

    let mut map = FieldMap::new();
    map.insert(LATITUDE.to_string(), FieldValue::Numeric(latitude));
    map.insert(LONGITUDE.to_string(), FieldValue::Numeric(longitude));
    Ok(map)
}

/// Latitude and longitude of a GGA sentence. A missing or zero fix still yields both keys at 0.0,
/// anything unparsable yields an empty map.
pub fn parse_coordinates(sentence: Option<&str>) -> FieldMap {
    let Some(sentence) = sentence.filter(|s| !s.is_empty()) else {
        event!(Level::WARN, "Received an empty or None GGA message");
        return FieldMap::new();
    };

    try_parse_coordinates(sentence).unwrap_or_else(|e| {
        event!(
            Level::ERROR,
            "Failed to extract valid coordinates from GGA message {}: {}",
            sentence,
            e
        );
        FieldMap::new()
    })
}

// Splits a proprietary sentence into its fields (talker and checksum removed), transforms
// each field and pairs the values with `field_names` until either runs out.
pub fn try_parse_proprietary<F>(
    sentence: &str,
    field_names: &[&str],
    value_transform: F,
) -> Result<FieldMap, ProtocolError>
where
    F: Fn(&str) -> Result<FieldValue, ProtocolError>,
{
    event!(Level::DEBUG, "Receiving proprietary message: {}", sentence);

    let sentence = sentence.trim_end_matches(['\r', '\n']);

    let mut parts: Vec<&str> = sentence.split(',').skip(1).collect();
    let last = parts
        .pop()
        .ok_or_else(|| ProtocolError::MalformedSentence(sentence.to_string()))?;
    parts.push(last.split('*').next().unwrap_or_default());

    let values = parts
        .into_iter()
        .map(value_transform)
        .collect::<Result<Vec<FieldValue>, ProtocolError>>()?;

    Ok(field_names
        .iter()
        .zip(values)
        .map(|(name, value)| (name.to_string(), value))
        .collect())
}

pub fn parse_proprietary<F>(sentence: Option<&str>, field_names: &[&str], value_transform: F) -> FieldMap
where
    F: Fn(&str) -> Result<FieldValue, ProtocolError>,
{
    let Some(sentence) = sentence.filter(|s| !s.is_empty()) else {
        event!(Level::WARN, "Received empty or None proprietary message");
        return FieldMap::new();
    };

    try_parse_proprietary(sentence, field_names, value_transform).unwrap_or_else(|e| {
        event!(
            Level::ERROR,
            "Error processing proprietary message {}: {}",
            sentence,
            e
        );
        FieldMap::new()
    })
}

fn parse_float(field: &str) -> Result<f64, ProtocolError> {
    field
        .trim()
        .parse::<f64>()
        .map_err(|_| ProtocolError::InvalidNumber(field.to_string()))
}

// Empty fields are 0.0, everything else must be a number
pub fn attitude_value(field: &str) -> Result<FieldValue, ProtocolError> {
    if field.is_empty() {
        return Ok(FieldValue::Numeric(0.0));
    }
    parse_float(field).map(FieldValue::Numeric)
}

// Numbers stay numbers, anything else is looked up in the control mode table
pub fn command_status_value(field: &str) -> Result<FieldValue, ProtocolError> {
    if field.is_empty() {
        return Ok(FieldValue::Numeric(0.0));
    }

    match parse_float(field) {
        Ok(v) => Ok(FieldValue::Numeric(v)),
        Err(_) => Ok(FieldValue::Mode(
            ControlMode::from_code(field)
                .map(|m| m.label())
                .unwrap_or(UNKNOWN_MODE)
                .to_string(),
        )),
    }
}

pub fn try_parse_attitude(sentence: &str) -> Result<FieldMap, ProtocolError> {
    try_parse_proprietary(sentence, &ATTITUDE_FIELDS, attitude_value)
}

pub fn parse_attitude(sentence: Option<&str>) -> FieldMap {
    parse_proprietary(sentence, &ATTITUDE_FIELDS, attitude_value)
}

pub fn try_parse_command_status(sentence: &str) -> Result<FieldMap, ProtocolError> {
    try_parse_proprietary(sentence, &COMMAND_STATUS_FIELDS, command_status_value)
}

pub fn parse_command_status(sentence: Option<&str>) -> FieldMap {
    parse_proprietary(sentence, &COMMAND_STATUS_FIELDS, command_status_value)
}

// The sentence types the dispatcher understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentenceKind {
    Gga,
    Attitude,
    CommandStatus,
}

impl SentenceKind {
    pub const ALL: [SentenceKind; 3] = [
        SentenceKind::Gga,
        SentenceKind::Attitude,
        SentenceKind::CommandStatus,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            SentenceKind::Gga => GGA_PREFIX,
            SentenceKind::Attitude => ATTITUDE_PREFIX,
            SentenceKind::CommandStatus => COMMAND_STATUS_PREFIX,
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        SentenceKind::ALL.into_iter().find(|k| k.prefix() == prefix)
    }

    pub fn parser(&self) -> fn(&str) -> Result<FieldMap, ProtocolError> {
        match self {
            SentenceKind::Gga => try_parse_coordinates,
            SentenceKind::Attitude => try_parse_attitude,
            SentenceKind::CommandStatus => try_parse_command_status,
        }
    }

    pub fn extract<'a>(&self, blob: &'a str) -> Option<&'a str> {
        extract_by_prefix(blob, self.prefix())
    }
}

// the first six characters of a line select its parser
fn line_prefix(line: &str) -> &str {
    match line.char_indices().nth(6) {
        Some((i, _)) => &line[..i],
        None => line,
    }
}

/// Turns raw telemetry blobs into one merged field map, stamped with the injected clock
#[derive(Clone)]
pub struct Dispatcher {
    checksum: ChecksumMode,
    clock: Arc<dyn Clock>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Dispatcher::new(ChecksumMode::Lenient, Arc::new(SystemClock))
    }
}

impl Dispatcher {
    pub fn new(checksum: ChecksumMode, clock: Arc<dyn Clock>) -> Self {
        Dispatcher { checksum, clock }
    }

    pub fn checksum_mode(&self) -> ChecksumMode {
        self.checksum
    }

    // Parses a single line. Unknown prefixes give an empty map, strict mode rejects bad checksums.
    pub fn decode_line(&self, line: &str) -> Result<FieldMap, ProtocolError> {
        let prefix = line_prefix(line);
        event!(Level::DEBUG, "Processing message with prefix: {}", prefix);

        match SentenceKind::from_prefix(prefix) {
            Some(kind) => {
                verify_checksum(line, self.checksum)?;
                kind.parser()(line)
            }
            None => Ok(FieldMap::new()),
        }
    }

    pub fn dispatch(&self, blob: &str) -> FieldMap {
        let mut attributes = date_stamp(self.clock.now());

        for line in blob.split(CRLF) {
            match self.decode_line(line) {
                Ok(map) => attributes.extend(map),
                Err(e) => {
                    event!(Level::ERROR, "Dropping telemetry line {:?}: {}", line, e);
                }
            }
        }

        event!(Level::DEBUG, "Attributes updated: {:?}", attributes);
        attributes
    }
}

// Merges every known sentence of the blob, using local time and lenient checksums
pub fn dispatch(blob: &str) -> FieldMap {
    Dispatcher::default().dispatch(blob)
}

// `Day` as YYYYMMDD and `Time` as HHMMSS
pub fn date_stamp(now: NaiveDateTime) -> FieldMap {
    let day = now.year() as i64 * 10_000 + now.month() as i64 * 100 + now.day() as i64;
    let time = now.hour() as i64 * 10_000 + now.minute() as i64 * 100 + now.second() as i64;

    let mut map = FieldMap::new();
    map.insert(DAY.to_string(), FieldValue::Integer(day));
    map.insert(TIME.to_string(), FieldValue::Integer(time));
    map
}
