use crate::checksum::compute_checksum;

pub const CRLF: &str = "\r\n";

// Wraps a payload into a complete `$PAYLOAD*CC\r\n` sentence
pub fn build_sentence(payload: &str) -> String {
    format!("${}*{}{}", payload, compute_checksum(payload), CRLF)
}

// OIWPL payload for one waypoint, still to be wrapped by `build_sentence`
pub fn build_waypoint_payload(
    lat: &str,
    lat_hemisphere: char,
    lon: &str,
    lon_hemisphere: char,
    index: usize,
) -> String {
    format!(
        "OIWPL,{},{},{},{},{}",
        lat, lat_hemisphere, lon, lon_hemisphere, index
    )
}
