use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Parsed value of a single telemetry field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Numeric(f64),
    Integer(i64),
    Mode(String),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Numeric(v) => Some(*v),
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Mode(_) => None,
        }
    }

    pub fn as_mode(&self) -> Option<&str> {
        match self {
            FieldValue::Mode(m) => Some(m.as_str()),
            _ => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "{}", v),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Mode(m) => write!(f, "{}", m),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Numeric(v)
    }
}

impl From<&str> for FieldValue {
    fn from(m: &str) -> Self {
        FieldValue::Mode(m.to_string())
    }
}

// Semantic field name to parsed value, built fresh per parse call
pub type FieldMap = BTreeMap<String, FieldValue>;

// Outcome of decoding the position part of a GGA sentence
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Fix {
    // latitude or longitude field is empty
    NoFix,
    // both coordinates decode to exactly 0.0
    ZeroFix,
    Position { latitude: f64, longitude: f64 },
}

impl Fix {
    pub fn latitude_longitude(&self) -> (f64, f64) {
        match self {
            Fix::NoFix | Fix::ZeroFix => (0.0, 0.0),
            Fix::Position {
                latitude,
                longitude,
            } => (*latitude, *longitude),
        }
    }
}

// Whether received sentences must carry a matching checksum
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumMode {
    #[default]
    Lenient,
    Strict,
}

impl std::str::FromStr for ChecksumMode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(ChecksumMode::Lenient),
            "strict" => Ok(ChecksumMode::Strict),
            _ => Err(ProtocolError::MalformedSentence(format!(
                "unknown checksum mode '{}'",
                s
            ))),
        }
    }
}

// Which coordinate a degrees value belongs to, sets the degree width and hemisphere letters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Latitude,
    Longitude,
}

// A position in signed decimal degrees, south and west negative
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ProtocolError> {
        let coordinate = Coordinate {
            latitude,
            longitude,
        };
        coordinate.validate()?;
        Ok(coordinate)
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        if !self.latitude.is_finite()
            || !self.longitude.is_finite()
            || self.latitude.abs() > 90.0
            || self.longitude.abs() > 180.0
        {
            return Err(ProtocolError::InvalidCoordinate {
                latitude: self.latitude,
                longitude: self.longitude,
            });
        }
        Ok(())
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((latitude, longitude): (f64, f64)) -> Self {
        Coordinate {
            latitude,
            longitude,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    MalformedSentence(String),
    InvalidNumber(String),
    InvalidHemisphere(String),
    MissingChecksum(String),
    ChecksumMismatch { expected: String, found: String },
    InvalidCoordinate { latitude: f64, longitude: f64 },
    EmptyMission,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedSentence(s) => write!(f, "Malformed sentence: {}", s),
            Self::InvalidNumber(s) => write!(f, "Field is not a number: '{}'", s),
            Self::InvalidHemisphere(s) => write!(f, "Unknown hemisphere: '{}'", s),
            Self::MissingChecksum(s) => write!(f, "Sentence has no checksum: {}", s),
            Self::ChecksumMismatch { expected, found } => write!(
                f,
                "Checksum mismatch, computed {} but sentence carries {}",
                expected, found
            ),
            Self::InvalidCoordinate {
                latitude,
                longitude,
            } => write!(f, "Invalid coordinate ({}, {})", latitude, longitude),
            Self::EmptyMission => write!(f, "Mission has no waypoints"),
        }
    }
}

impl std::error::Error for ProtocolError {}
