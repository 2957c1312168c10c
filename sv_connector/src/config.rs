use std::{env, path::PathBuf, str::FromStr, time::Duration};

use sv_protocol::ChecksumMode;

#[derive(Debug, Clone)]
pub struct Config {
    pub surveyor_address: String, // vehicle telemetry/command socket
    pub http_address: String,
    pub exo2_url: Option<String>, // no sonde polling when unset
    pub record: bool,
    pub record_interval: Duration, // minimum time between two recorded rows
    pub out_dir: PathBuf,
    pub csv_postfix: String,
    pub checksum_mode: ChecksumMode,
    pub max_thrust: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config::from_lookup(|key| env::var(key).ok())
    }
}

impl Config {
    /// Builds the config from a key lookup, falling back to defaults for missing or unparsable values
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Config {
            surveyor_address: lookup("SURVEYOR_ADDRESS")
                .unwrap_or("192.168.0.50:8003".to_string()),
            http_address: lookup("SURVEYOR_HTTP_ADDRESS").unwrap_or("0.0.0.0:3100".to_string()),
            exo2_url: lookup("EXO2_URL").filter(|url| !url.trim().is_empty()),
            record: parsed(&lookup, "SURVEYOR_RECORD").unwrap_or(true),
            record_interval: Duration::from_millis(
                parsed(&lookup, "SURVEYOR_RECORD_INTERVAL_MS").unwrap_or(1000),
            ),
            out_dir: PathBuf::from(lookup("SURVEYOR_OUT_DIR").unwrap_or("./out".to_string())),
            csv_postfix: lookup("SURVEYOR_CSV_POSTFIX").unwrap_or_default(),
            checksum_mode: parsed(&lookup, "SURVEYOR_CHECKSUM").unwrap_or_default(),
            max_thrust: parsed::<f64, _>(&lookup, "SURVEYOR_MAX_THROTTLE")
                .map(f64::abs)
                .unwrap_or(70.0),
        }
    }
}

fn parsed<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key)?;
    match value.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::event!(
                tracing::Level::WARN,
                "Ignoring invalid value {:?} for {}, using the default",
                value,
                key
            );
            None
        }
    }
}
