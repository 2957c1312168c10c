use std::{fs, path::Path};

use anyhow::anyhow;
use tracing::{event, Level};

use sv_protocol::{Coordinate, Mission};

use crate::recorder::split_csv_line;

/// Reads waypoints from a CSV file with a header row
pub fn read_waypoints_csv(path: impl AsRef<Path>) -> anyhow::Result<Vec<Coordinate>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|e| anyhow!("Cannot read waypoint file {:?}: {}", path, e))?;

    let waypoints = parse_waypoints_csv(&text)?;
    event!(
        Level::INFO,
        "Read {} waypoints from {:?}",
        waypoints.len(),
        path
    );
    Ok(waypoints)
}

/// Takes the `Latitude`/`Longitude` (or lowercase) columns, otherwise the first two
pub fn parse_waypoints_csv(text: &str) -> anyhow::Result<Vec<Coordinate>> {
    let mut lines = text
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty());

    let Some(header) = lines.next() else {
        return Ok(Vec::new());
    };
    let header: Vec<String> = split_csv_line(header)
        .into_iter()
        .map(|column| column.trim().to_string())
        .collect();

    let position = |name: &str| header.iter().position(|column| column == name);
    let (lat_column, lon_column) = match (position("Latitude"), position("Longitude")) {
        (Some(lat), Some(lon)) => (lat, lon),
        _ => match (position("latitude"), position("longitude")) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => {
                event!(
                    Level::WARN,
                    "Assuming first column to be Latitude and second to be Longitude"
                );
                (0, 1)
            }
        },
    };

    lines
        .enumerate()
        .map(|(row, line)| {
            let fields = split_csv_line(line);
            let field = |column: usize| -> anyhow::Result<f64> {
                let value = fields
                    .get(column)
                    .ok_or_else(|| anyhow!("Row {} has no column {}", row + 1, column + 1))?;
                value
                    .trim()
                    .parse()
                    .map_err(|_| anyhow!("Row {}: {:?} is not a number", row + 1, value))
            };

            Ok(Coordinate::new(field(lat_column)?, field(lon_column)?)?)
        })
        .collect()
}

/// Writes the mission script as a `.sea` file
pub fn write_mission_file(path: impl AsRef<Path>, mission: &Mission) -> anyhow::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    fs::write(path, mission.to_script())?;
    event!(
        Level::INFO,
        "Mission with {} lines written to {:?}",
        mission.line_count(),
        path
    );
    Ok(())
}
