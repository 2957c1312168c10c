use tracing::{event, Level};

use crate::checksum::compute_checksum;
use crate::commands::ControlCommand;
use crate::coordinates::degrees_to_nmea;
use crate::sentence::{build_sentence, build_waypoint_payload, CRLF};
use crate::types::{Axis, Coordinate, ProtocolError};

pub const DEFAULT_THROTTLE: u8 = 20;

// `PSEAR,0,000,TTT,0,000`, the first line of every mission script
pub fn mission_header(throttle: u8) -> String {
    format!("PSEAR,0,000,{:03},0,000", throttle)
}

// A complete waypoint upload. Built once by `assemble_mission` and never changed afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Mission {
    throttle: u8,
    waypoints: Vec<Coordinate>,
    sentences: Vec<String>,
}

/// Builds the mission for `waypoints`. A given `erp` becomes waypoint 0 and shifts the others by one.
pub fn assemble_mission(
    waypoints: &[Coordinate],
    erp: Option<Coordinate>,
    throttle: u8,
) -> Result<Mission, ProtocolError> {
    if waypoints.is_empty() {
        return Err(ProtocolError::EmptyMission);
    }

    let all: Vec<Coordinate> = erp.into_iter().chain(waypoints.iter().copied()).collect();

    let sentences = all
        .iter()
        .enumerate()
        .map(|(index, coordinate)| {
            coordinate.validate()?;
            let (lat, lat_hemisphere) = degrees_to_nmea(coordinate.latitude, Axis::Latitude);
            let (lon, lon_hemisphere) = degrees_to_nmea(coordinate.longitude, Axis::Longitude);
            Ok(build_sentence(&build_waypoint_payload(
                &lat,
                lat_hemisphere,
                &lon,
                lon_hemisphere,
                index,
            )))
        })
        .collect::<Result<Vec<String>, ProtocolError>>()?;

    event!(
        Level::DEBUG,
        "Assembled mission with {} waypoints (erp: {}) at throttle {}",
        sentences.len(),
        erp.is_some(),
        throttle
    );

    Ok(Mission {
        throttle,
        waypoints: all,
        sentences,
    })
}

impl Mission {
    pub fn throttle(&self) -> u8 {
        self.throttle
    }

    // All waypoints in upload order, the ERP first when there is one
    pub fn waypoints(&self) -> &[Coordinate] {
        &self.waypoints
    }

    pub fn waypoint_sentences(&self) -> &[String] {
        &self.sentences
    }

    pub fn header_line(&self) -> String {
        let header = mission_header(self.throttle);
        format!("{}*{}{}", header, compute_checksum(&header), CRLF)
    }

    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.sentences.len() + 1);
        lines.push(self.header_line());
        lines.extend(self.sentences.iter().cloned());
        lines
    }

    pub fn line_count(&self) -> usize {
        self.sentences.len() + 1
    }

    // Script text as stored in `.sea` mission files
    pub fn to_script(&self) -> String {
        self.lines().concat()
    }

    // what goes over the wire: file download start, framed head line, waypoints, file download end
    pub fn upload_sequence(&self, max_thrust: f64) -> Vec<String> {
        let mut sequence = Vec::with_capacity(self.line_count() + 2);
        sequence.push(
            ControlCommand::StartFileDownload {
                lines: self.line_count(),
            }
            .sentence(max_thrust),
        );
        // on the wire the head line is a framed sentence like every other
        sequence.push(build_sentence(&mission_header(self.throttle)));
        sequence.extend(self.sentences.iter().cloned());
        sequence.push(ControlCommand::EndFileDownload.sentence(max_thrust));
        sequence
    }
}

impl std::fmt::Display for Mission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_script())
    }
}
