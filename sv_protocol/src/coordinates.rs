use crate::types::{Axis, ProtocolError};

/// Converts signed decimal degrees to the NMEA degrees-minutes text (`DDMM.MMMM` or `DDDMM.MMMM`)
/// and the hemisphere letter. The sign only survives in the hemisphere.
pub fn degrees_to_nmea(value: f64, axis: Axis) -> (String, char) {
    let abs = value.abs();

    let mut degrees = abs.trunc();
    let mut minutes = ((abs - degrees) * 60.0 * 10_000.0).round() / 10_000.0;

    // 59.99996 rounds to 60.0000, which is the next degree
    if minutes >= 60.0 {
        degrees += 1.0;
        minutes -= 60.0;
    }

    let formatted = match axis {
        Axis::Latitude => format!("{:02}{:07.4}", degrees as u32, minutes),
        Axis::Longitude => format!("{:03}{:07.4}", degrees as u32, minutes),
    };

    (formatted, hemisphere(value, axis))
}

pub fn hemisphere(value: f64, axis: Axis) -> char {
    match (axis, value >= 0.0) {
        (Axis::Latitude, true) => 'N',
        (Axis::Latitude, false) => 'S',
        (Axis::Longitude, true) => 'E',
        (Axis::Longitude, false) => 'W',
    }
}

/// Inverse of [`degrees_to_nmea`]: the last two integer digits are whole minutes,
/// everything in front of them is degrees. `S` and `W` make the result negative.
pub fn nmea_to_degrees(value: &str, hemisphere: &str) -> Result<f64, ProtocolError> {
    let value = value.trim();

    let sign = match hemisphere.trim() {
        "N" | "E" => 1.0,
        "S" | "W" => -1.0,
        other => return Err(ProtocolError::InvalidHemisphere(other.to_string())),
    };

    if !value.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(ProtocolError::InvalidNumber(value.to_string()));
    }

    let int_end = value.find('.').unwrap_or(value.len());
    if int_end < 3 {
        return Err(ProtocolError::InvalidNumber(value.to_string()));
    }

    let degrees: f64 = value[..int_end - 2]
        .parse()
        .map_err(|_| ProtocolError::InvalidNumber(value.to_string()))?;
    let minutes: f64 = value[int_end - 2..]
        .parse()
        .map_err(|_| ProtocolError::InvalidNumber(value.to_string()))?;

    if minutes >= 60.0 {
        return Err(ProtocolError::InvalidNumber(value.to_string()));
    }

    Ok(sign * (degrees + minutes / 60.0))
}
