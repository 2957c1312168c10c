use std::time::Duration;

use anyhow::anyhow;
use tracing::{event, Level};

use sv_protocol::{FieldMap, FieldValue};

use crate::types::AppStateProxy;

const PARA_ATTEMPTS: usize = 10;
const PARA_RETRY_DELAY: Duration = Duration::from_millis(200);

// parameter codes the sonde reports in its `para` answer, with the name and unit of the value
const PARAMETERS: [(u16, &str); 65] = [
    (1, "Temperature (C)"),
    (2, "Temperature (F)"),
    (3, "Temperature (K)"),
    (4, "Conductivity (mS/cm)"),
    (5, "Conductivity (uS/cm)"),
    (6, "Specific Conductance (mS/cm)"),
    (7, "Specific Conductance (uS/cm)"),
    (10, "TDS (g/L)"),
    (12, "Salinity (PPT)"),
    (17, "pH (mV)"),
    (18, "pH"),
    (19, "ORP (mV)"),
    (20, "Pressure (psia)"),
    (21, "Pressure (psig)"),
    (22, "Depth (m)"),
    (23, "Depth (ft)"),
    (28, "Battery (V)"),
    (37, "Turbidity (NTU)"),
    (47, "NH3 (Ammonia) (mg/L)"),
    (48, "NH4 (Ammonium) (mg/L)"),
    (51, "Date (DDMMYY)"),
    (52, "Date (MMDDYY)"),
    (53, "Date (YYMMDD)"),
    (54, "Time (HHMMSS)"),
    (95, "TDS (kg/L)"),
    (101, "NO3 (Nitrate) (mV)"),
    (106, "NO3 (Nitrate) (mg/L)"),
    (108, "NH4 (Ammonium) (mV)"),
    (110, "TDS (mg/L)"),
    (112, "Chloride (mg/L)"),
    (145, "Chloride (mV)"),
    (190, "TSS (mg/L)"),
    (191, "TSS (g/L)"),
    (193, "Chlorophyll (ug/L)"),
    (194, "Chlorophyll (RFU)"),
    (201, "PAR (Channel 1)"),
    (202, "PAR (Channel 2)"),
    (204, "Rhodamine (ug/L)"),
    (211, "ODO (%Sat)"),
    (212, "ODO (mg/L)"),
    (214, "ODO (%Sat Local)"),
    (215, "TAL-PC (cells/mL)"),
    (216, "BGA-PC (RFU)"),
    (217, "TAL-PE (cells/mL)"),
    (218, "BGA-PE (RFU)"),
    (223, "Turbidity (FNU)"),
    (224, "Turbidity (Raw)"),
    (225, "BGA-PC (ug/L)"),
    (226, "BGA-PE (ug/L)"),
    (227, "fDOM (RFU)"),
    (228, "fDOM (QSU)"),
    (229, "Wiper Position (V)"),
    (230, "External Power (V)"),
    (231, "BGA-PC (Raw)"),
    (232, "BGA-PE (Raw)"),
    (233, "fDOM (Raw)"),
    (234, "Chlorophyll (Raw)"),
    (235, "Potassium (mV)"),
    (236, "Potassium (mg/L)"),
    (237, "nLF Conductivity (mS/cm)"),
    (238, "nLF Conductivity (uS/cm)"),
    (239, "Wiper Peak Current (mA)"),
    (240, "Vertical Position (m)"),
    (241, "Vertical Position (ft)"),
    (242, "Chlorophyll (cells/mL)"),
];

pub fn parameter_name(code: u16) -> Option<&'static str> {
    PARAMETERS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// Parses the whitespace separated codes of a `para` answer into (code, name) pairs
pub fn parse_parameters(text: &str) -> anyhow::Result<Vec<(u16, String)>> {
    let codes = text
        .split_whitespace()
        .map(|code| {
            code.parse::<u16>()
                .map_err(|_| anyhow!("Parameter code is not an integer: {:?}", code))
        })
        .collect::<anyhow::Result<Vec<u16>>>()?;

    if codes.is_empty() {
        return Err(anyhow!("Sonde returned no parameters"));
    }

    Ok(codes
        .into_iter()
        .map(|code| {
            let name = match parameter_name(code) {
                Some(name) => name.to_string(),
                None => {
                    event!(Level::WARN, "Unknown Exo2 parameter code {}", code);
                    format!("Parameter {}", code)
                }
            };
            (code, name)
        })
        .collect())
}

/// Pairs a `data` answer with the parameter names, value by value
pub fn parse_data(text: &str, parameters: &[(u16, String)]) -> anyhow::Result<FieldMap> {
    let values: Vec<&str> = text.split_whitespace().collect();

    if values.len() != parameters.len() {
        return Err(anyhow!(
            "Sonde returned {} values for {} parameters",
            values.len(),
            parameters.len()
        ));
    }

    parameters
        .iter()
        .zip(values)
        .map(|((_, name), value)| {
            let value: f64 = value
                .parse()
                .map_err(|_| anyhow!("Sonde value for {} is not a number: {:?}", name, value))?;
            Ok((name.clone(), FieldValue::Numeric(value)))
        })
        .collect()
}

// the sonde bridge answers either in plain text or wrapped in a small json object
fn unwrap_body(body: String) -> String {
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(serde_json::Value::Object(map)) => ["data", "response", "message"]
            .iter()
            .find_map(|key| map.get(*key).and_then(|v| v.as_str()).map(str::to_string))
            .unwrap_or(body),
        _ => body,
    }
}

/// Client for the HTTP bridge in front of the Exo2 sonde's serial port
pub struct Exo2Client {
    client: reqwest::Client,
    url: String,
    parameters: Vec<(u16, String)>,
}

impl Exo2Client {
    /// Initializes the bridge and asks which parameters the sonde reports
    pub async fn connect(base_url: &str) -> anyhow::Result<Self> {
        let mut exo2 = Exo2Client {
            client: reqwest::Client::new(),
            url: format!("{}/data", base_url.trim_end_matches('/')),
            parameters: Vec::new(),
        };

        let init = exo2.command("init").await?;
        event!(Level::INFO, "Exo2 bridge at {}: {}", exo2.url, init.trim());

        for attempt in 1..=PARA_ATTEMPTS {
            let answer = exo2.command("para").await?;
            match parse_parameters(&answer) {
                Ok(parameters) => {
                    event!(
                        Level::INFO,
                        "Exo2 reports {} parameters",
                        parameters.len()
                    );
                    exo2.parameters = parameters;
                    return Ok(exo2);
                }
                Err(e) => {
                    event!(
                        Level::WARN,
                        "Attempt {} to read the Exo2 parameters failed: {}",
                        attempt,
                        e
                    );
                    tokio::time::sleep(PARA_RETRY_DELAY).await;
                }
            }
        }

        Err(anyhow!(
            "No parameter list from the Exo2 after {} attempts",
            PARA_ATTEMPTS
        ))
    }

    /// Sends a raw sonde command and returns its answer
    pub async fn command(&self, command: &str) -> anyhow::Result<String> {
        let body = self
            .client
            .post(&self.url)
            .body(command.to_string())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        Ok(unwrap_body(body))
    }

    pub async fn get_data(&self) -> anyhow::Result<FieldMap> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_data(&unwrap_body(body), &self.parameters)
    }

    pub fn parameters(&self) -> &[(u16, String)] {
        &self.parameters
    }
}

/// Polls the sonde and merges every reading into the state
pub async fn poll_exo2(
    url: String,
    app_state_proxy: AppStateProxy,
    interval: Duration,
) -> anyhow::Result<()> {
    let exo2 = Exo2Client::connect(&url).await?;

    loop {
        match exo2.get_data().await {
            Ok(data) => {
                app_state_proxy.add_value_to_state(data).await?;
            }
            Err(e) => event!(Level::WARN, "Error reading the Exo2: {:?}", e),
        }

        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{routing::get, Json, Router};
    use sv_protocol::SystemClock;
    use tokio::sync::mpsc;

    use super::*;
    use crate::types::AppState;

    // stands in for the sonde bridge, answering commands in json and data in plain text
    async fn spawn_bridge() -> String {
        async fn data() -> &'static str {
            "20.5 33.1 7.9 141347"
        }

        async fn command(body: String) -> Json<serde_json::Value> {
            match body.as_str() {
                "init" => Json(serde_json::json!({"message": "Connection Initialized"})),
                "para" => Json(serde_json::json!({"response": "1 6 18 54"})),
                _ => Json(serde_json::json!({"response": ""})),
            }
        }

        let app = Router::new().route("/data", get(data).post(command));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move { axum::serve(listener, app).await });
        base
    }

    #[test]
    fn test_parse_parameters() {
        let parameters = parse_parameters("1 18 999").unwrap();
        assert_eq!(
            parameters,
            vec![
                (1, "Temperature (C)".to_string()),
                (18, "pH".to_string()),
                (999, "Parameter 999".to_string()),
            ]
        );
        assert!(parse_parameters("#").is_err());
        assert!(parse_parameters("").is_err());
    }

    #[test]
    fn test_parse_data() {
        let parameters = parse_parameters("1 2").unwrap();
        let data = parse_data(" 10.5  50.9 ", &parameters).unwrap();
        assert_eq!(data.get("Temperature (C)"), Some(&FieldValue::Numeric(10.5)));
        assert_eq!(data.get("Temperature (F)"), Some(&FieldValue::Numeric(50.9)));

        assert!(parse_data("10.5", &parameters).is_err());
        assert!(parse_data("10.5 abc", &parameters).is_err());
    }

    #[test]
    fn test_unwrap_body() {
        assert_eq!(unwrap_body("1 2 3".to_string()), "1 2 3");
        assert_eq!(unwrap_body(r#"{"data": "4.5"}"#.to_string()), "4.5");
        assert_eq!(unwrap_body("17".to_string()), "17");
    }

    #[tokio::test]
    async fn test_client_against_bridge() {
        let base = spawn_bridge().await;
        let exo2 = Exo2Client::connect(&base).await.unwrap();

        assert_eq!(exo2.parameters().len(), 4);

        let data = exo2.get_data().await.unwrap();
        assert_eq!(data.get("Temperature (C)"), Some(&FieldValue::Numeric(20.5)));
        assert_eq!(data.get("pH"), Some(&FieldValue::Numeric(7.9)));
        assert_eq!(data.get("Time (HHMMSS)"), Some(&FieldValue::Numeric(141347.0)));
    }

    #[tokio::test]
    async fn test_poll_merges_into_state() {
        let base = spawn_bridge().await;
        let (tx_state, rx_state) = mpsc::channel(8);
        let (tx_command, _rx_command) = mpsc::channel(8);
        tokio::spawn(AppState::new(rx_state, Arc::new(SystemClock)).process());
        let proxy = AppStateProxy::new(tx_state, tx_command, 70.0);

        let poller = tokio::spawn(poll_exo2(base, proxy.clone(), Duration::from_millis(10)));

        let mut state = FieldMap::new();
        for _ in 0..100 {
            state = proxy.get_state().await.unwrap();
            if !state.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        poller.abort();

        assert_eq!(
            state.get("Specific Conductance (mS/cm)"),
            Some(&FieldValue::Numeric(33.1))
        );
    }
}
