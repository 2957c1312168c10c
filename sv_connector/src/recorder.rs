use std::{
    fs::{self, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use chrono::{NaiveDate, NaiveDateTime};
use itertools::Itertools;
use tracing::{event, Level};

use sv_protocol::{Clock, FieldMap};

use crate::types::AppStateProxy;

// Appends field maps as rows to one CSV file per day. A key that is not in the current
// header starts a new file `<YYYYMMDD><postfix>_<HHMMSS>.csv` with the widened header.
pub struct CsvRecorder {
    dir: PathBuf,
    postfix: String,
    interval: chrono::Duration,
    clock: Arc<dyn Clock>,
    last_saved: Option<NaiveDateTime>,
    active: Option<ActiveFile>,
}

struct ActiveFile {
    day: NaiveDate,
    path: PathBuf,
    columns: Vec<String>,
}

impl CsvRecorder {
    pub fn new(
        dir: impl Into<PathBuf>,
        postfix: impl Into<String>,
        interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        CsvRecorder {
            dir: dir.into(),
            postfix: postfix.into(),
            interval: chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::zero()),
            clock,
            last_saved: None,
            active: None,
        }
    }

    /// `<dir>/<YYYYMMDD><postfix>.csv`
    pub fn file_path(&self, now: NaiveDateTime) -> PathBuf {
        self.dir
            .join(format!("{}{}.csv", now.format("%Y%m%d"), self.postfix))
    }

    fn widened_file_path(&self, now: NaiveDateTime) -> PathBuf {
        self.dir.join(format!(
            "{}{}_{}.csv",
            now.format("%Y%m%d"),
            self.postfix,
            now.format("%H%M%S")
        ))
    }

    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        match self.last_saved {
            Some(last) => now - last >= self.interval,
            None => true,
        }
    }

    /// Appends one row, unless the map is empty or the previous row is too recent.
    /// Returns the file written to.
    pub fn save(&mut self, data: &FieldMap) -> anyhow::Result<Option<PathBuf>> {
        if data.is_empty() {
            event!(Level::DEBUG, "No values to be appended to the CSV");
            return Ok(None);
        }

        let now = self.clock.now();
        if !self.is_due(now) {
            return Ok(None);
        }

        fs::create_dir_all(&self.dir)?;

        let active = match self.active.take() {
            Some(active) if active.day == now.date() => active,
            _ => {
                let path = self.file_path(now);
                let columns = read_header(&path)?.unwrap_or_default();
                ActiveFile {
                    day: now.date(),
                    path,
                    columns,
                }
            }
        };
        let active = self.file_for(active, data, now)?;

        let row = active
            .columns
            .iter()
            .map(|column| {
                data.get(column)
                    .map(|v| csv_field(&v.to_string()))
                    .unwrap_or_default()
            })
            .join(",");
        append_line(&active.path, &row)?;

        let path = active.path.clone();
        self.active = Some(active);
        self.last_saved = Some(now);
        Ok(Some(path))
    }

    // makes sure the file has a header that covers every key of `data`
    fn file_for(
        &self,
        active: ActiveFile,
        data: &FieldMap,
        now: NaiveDateTime,
    ) -> anyhow::Result<ActiveFile> {
        if active.columns.is_empty() {
            let columns: Vec<String> = data.keys().cloned().collect();
            write_header(&active.path, &columns)?;
            event!(Level::INFO, "Started recording to {:?}", active.path);
            return Ok(ActiveFile { columns, ..active });
        }

        let new_keys: Vec<String> = data
            .keys()
            .filter(|k| !active.columns.contains(k))
            .cloned()
            .collect();
        if new_keys.is_empty() {
            return Ok(active);
        }

        let path = self.widened_file_path(now);
        let mut columns = active.columns;
        columns.extend(new_keys.iter().cloned());

        event!(
            Level::WARN,
            "New values {:?} have no column in {:?}, continuing in {:?}",
            new_keys,
            active.path,
            path
        );

        match read_header(&path)? {
            Some(existing) if existing == columns => {}
            _ => write_header(&path, &columns)?,
        }

        Ok(ActiveFile {
            day: active.day,
            path,
            columns,
        })
    }
}

fn write_header(path: &Path, columns: &[String]) -> anyhow::Result<()> {
    append_line(path, &columns.iter().map(|k| csv_field(k)).join(","))
}

fn append_line(path: &Path, line: &str) -> anyhow::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\r\n")?;
    Ok(())
}

fn read_header(path: &Path) -> anyhow::Result<Option<Vec<String>>> {
    if !path.is_file() {
        return Ok(None);
    }

    let mut first_line = String::new();
    BufReader::new(fs::File::open(path)?).read_line(&mut first_line)?;

    let first_line = first_line.trim_end_matches(['\r', '\n']);
    if first_line.is_empty() {
        return Ok(None);
    }

    Ok(Some(split_csv_line(first_line)))
}

// quote fields that contain separators or quotes, like "Acceleration x, forward (G)"
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub(crate) fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', _) => in_quotes = !in_quotes,
            (',', false) => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);

    fields
}

/// Records the merged state at the given interval
pub async fn record_state(
    app_state_proxy: AppStateProxy,
    mut recorder: CsvRecorder,
    interval: Duration,
) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let state = app_state_proxy.get_state().await?;
        if let Err(e) = recorder.save(&state) {
            event!(Level::ERROR, "Error while recording the state: {:?}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use sv_protocol::{FieldValue, ManualClock};

    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "sv_connector_{}_{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 17)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn row(pairs: &[(&str, FieldValue)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_split_csv_line() {
        assert_eq!(
            split_csv_line("Day,\"Acceleration x, forward (G)\",\"say \"\"hi\"\"\","),
            vec!["Day", "Acceleration x, forward (G)", "say \"hi\"", ""]
        );
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("plain"), "plain");
    }

    #[test]
    fn test_rows_follow_the_header() {
        let dir = temp_dir("rows");
        let clock = Arc::new(ManualClock::new(start()));
        let mut recorder = CsvRecorder::new(&dir, "_test", Duration::from_secs(1), clock.clone());

        let path = recorder
            .save(&row(&[
                ("Acceleration x, forward (G)", FieldValue::Numeric(0.5)),
                ("Latitude", FieldValue::Numeric(41.9)),
            ]))
            .unwrap()
            .unwrap();
        assert_eq!(path, dir.join("20240517_test.csv"));

        clock.advance(chrono::Duration::seconds(2));
        let second = recorder
            .save(&row(&[("Latitude", FieldValue::Numeric(42.0))]))
            .unwrap()
            .unwrap();
        assert_eq!(second, path);

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec!["\"Acceleration x, forward (G)\",Latitude", "0.5,41.9", ",42"]
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_late_keys_start_a_wider_file() {
        let dir = temp_dir("widen");
        let clock = Arc::new(ManualClock::new(start()));
        let mut recorder = CsvRecorder::new(&dir, "", Duration::from_secs(1), clock.clone());

        let first = recorder
            .save(&row(&[("Latitude", FieldValue::Numeric(41.9))]))
            .unwrap()
            .unwrap();

        // the sonde comes online after the first row was written
        clock.advance(chrono::Duration::seconds(2));
        let second = recorder
            .save(&row(&[
                ("Latitude", FieldValue::Numeric(42.0)),
                ("pH", FieldValue::Numeric(7.9)),
            ]))
            .unwrap()
            .unwrap();
        assert_eq!(second, dir.join("20240517_100002.csv"));

        clock.advance(chrono::Duration::seconds(2));
        let third = recorder
            .save(&row(&[
                ("Latitude", FieldValue::Numeric(42.1)),
                ("pH", FieldValue::Numeric(8.0)),
            ]))
            .unwrap()
            .unwrap();
        assert_eq!(third, second);

        assert_eq!(fs::read_to_string(&first).unwrap().lines().count(), 2);
        let text = fs::read_to_string(&second).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["Latitude,pH", "42,7.9", "42.1,8"]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_saves_are_rate_limited_by_the_clock() {
        let dir = temp_dir("rate");
        let clock = Arc::new(ManualClock::new(start()));
        let mut recorder = CsvRecorder::new(&dir, "", Duration::from_secs(1), clock.clone());
        let data = row(&[("Heave", FieldValue::Numeric(0.1))]);

        assert!(recorder.save(&data).unwrap().is_some());
        clock.advance(chrono::Duration::milliseconds(500));
        assert!(recorder.save(&data).unwrap().is_none());
        clock.advance(chrono::Duration::milliseconds(500));
        assert!(recorder.save(&data).unwrap().is_some());

        assert!(recorder.save(&FieldMap::new()).unwrap().is_none());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_new_day_new_file() {
        let dir = temp_dir("day");
        let clock = Arc::new(ManualClock::new(start()));
        let mut recorder = CsvRecorder::new(&dir, "", Duration::from_secs(1), clock.clone());
        let data = row(&[("Heave", FieldValue::Numeric(0.1))]);

        let first = recorder.save(&data).unwrap().unwrap();
        clock.advance(chrono::Duration::days(1));
        let second = recorder.save(&data).unwrap().unwrap();

        assert_ne!(first, second);
        assert_eq!(fs::read_to_string(&second).unwrap().lines().count(), 2);

        let _ = fs::remove_dir_all(&dir);
    }
}
