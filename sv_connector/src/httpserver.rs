use serde::{Deserialize, Serialize};

use axum::{
    extract::State,
    http::{Method, StatusCode},
    routing::{get, post},
    Json, Router,
};

use tower_http::cors::{Any, CorsLayer};
use tracing::{event, Level};

use sv_protocol::{assemble_mission, ControlCommand, Coordinate};

use super::{types::AppStateProxy, utils};

type ErrorResponse = (StatusCode, Json<serde_json::Value>);

// define the routes and attach the state proxy
pub fn router(app_state: AppStateProxy) -> Router {
    let cors = CorsLayer::new()
        // allow `GET` and `POST` when accessing the resource
        .allow_methods([Method::GET, Method::POST])
        // allow requests from any origin
        .allow_origin(Any);

    Router::new()
        .route("/", get(root))
        .route("/api/v1/state", get(get_state))
        .route("/api/v1/control_mode", get(get_control_mode))
        .route("/api/v1/command", post(send_command))
        .route("/api/v1/waypoints", post(send_waypoints))
        .layer(utils::return_trace_layer())
        .layer(cors)
        .with_state(app_state)
}

// bind the address and serve until a shutdown signal arrives
pub async fn run_server(app_state: AppStateProxy, address: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(address).await?;

    event!(
        Level::INFO,
        "sv_connector server started to listen on address {:?}",
        listener.local_addr()?
    );

    axum::serve(listener, router(app_state))
        .with_graceful_shutdown(utils::shutdown_signal())
        .await?;

    Ok(())
}

// basic handler that responds with a static string - can be used as a heart beat
async fn root() -> &'static str {
    "Hello, Surveyor!"
}

fn error_response(status: StatusCode, message: impl ToString) -> ErrorResponse {
    (
        status,
        Json(serde_json::json!({
            "status": "error",
            "message": message.to_string(),
        })),
    )
}

// struct to receive commands over http
#[derive(Debug, Deserialize, Serialize)]
pub struct SendCommand {
    pub command: String,
    pub thrust: Option<f64>,
    pub thrust_diff: Option<f64>,
    pub degrees: Option<f64>,
    pub lines: Option<usize>,
}

impl SendCommand {
    // Ok(None) for a command name we do not know
    fn to_command(&self) -> Result<Option<ControlCommand>, String> {
        let required = |value: Option<f64>, name: &str| {
            value.ok_or_else(|| format!("command '{}' needs '{}'", self.command, name))
        };

        let command = match self.command.as_str() {
            "standby" => ControlCommand::Standby,
            "thruster" => ControlCommand::Thruster {
                thrust: required(self.thrust, "thrust")?,
                thrust_diff: self.thrust_diff.unwrap_or(0.0),
            },
            "heading" => ControlCommand::Heading {
                thrust: required(self.thrust, "thrust")?,
                degrees: required(self.degrees, "degrees")?,
            },
            "waypoint" => ControlCommand::Waypoint,
            "erp" => ControlCommand::GoToErp,
            "station_keep" => ControlCommand::StationKeep,
            "start_file_download" => ControlCommand::StartFileDownload {
                lines: self
                    .lines
                    .ok_or_else(|| format!("command '{}' needs 'lines'", self.command))?,
            },
            "end_file_download" => ControlCommand::EndFileDownload,
            _ => return Ok(None),
        };

        Ok(Some(command))
    }
}

// receive a command and queue it for the vehicle
async fn send_command(
    State(app_state_proxy): State<AppStateProxy>,
    Json(payload): Json<SendCommand>,
) -> Result<StatusCode, ErrorResponse> {
    let command = match payload.to_command() {
        Ok(Some(command)) => command,
        Ok(None) => {
            event!(Level::WARN, "Unknown command received: {:?}", payload.command);
            return Ok(StatusCode::NOT_IMPLEMENTED);
        }
        Err(message) => return Err(error_response(StatusCode::BAD_REQUEST, message)),
    };

    match app_state_proxy.send_command(command).await {
        Ok(()) => Ok(StatusCode::OK),
        Err(e) => {
            event!(Level::ERROR, "Cannot send command: {:?}", e);
            Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e))
        }
    }
}

// struct to receive a waypoint mission over http, coordinates as [latitude, longitude]
#[derive(Debug, Deserialize, Serialize)]
pub struct SendWaypoints {
    pub waypoints: Vec<(f64, f64)>,
    pub erp: Option<(f64, f64)>,
    pub throttle: f64,
}

// assemble the mission and queue the upload
async fn send_waypoints(
    State(app_state_proxy): State<AppStateProxy>,
    Json(payload): Json<SendWaypoints>,
) -> Result<Json<serde_json::Value>, ErrorResponse> {
    let waypoints: Vec<Coordinate> = payload.waypoints.iter().copied().map(Coordinate::from).collect();
    let erp = payload.erp.map(Coordinate::from);

    let max_throttle = app_state_proxy.max_thrust.abs().min(u8::MAX as f64);
    let throttle = if payload.throttle.is_nan() {
        0.0
    } else {
        payload.throttle.clamp(0.0, max_throttle)
    };

    let mission = assemble_mission(&waypoints, erp, throttle as u8)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e))?;

    let response = serde_json::json!({
        "status": "success",
        "throttle": mission.throttle(),
        "lines": mission.line_count(),
    });

    if let Err(e) = app_state_proxy.send_mission(mission).await {
        event!(Level::ERROR, "Cannot send mission: {:?}", e);
        return Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e));
    }

    Ok(Json(response))
}

// get the current state from the app and serve as a JSON
async fn get_state(
    State(app_state_proxy): State<AppStateProxy>,
) -> Result<Json<serde_json::Value>, ErrorResponse> {
    let state = app_state_proxy
        .get_state()
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e))?;
    let last_updated = app_state_proxy
        .get_last_updated()
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    let mut json = serde_json::to_value(state)
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e))?;
    let last_updated = last_updated.map(|t| t.format("%Y-%m-%dT%H:%M:%S%.3f").to_string());
    if let Some(map) = json.as_object_mut() {
        map.insert(
            "last_updated_timestamp".to_string(),
            serde_json::json!(last_updated),
        );
    }

    Ok(Json(json))
}

async fn get_control_mode(
    State(app_state_proxy): State<AppStateProxy>,
) -> Result<Json<serde_json::Value>, ErrorResponse> {
    let control_mode = app_state_proxy
        .get_control_mode()
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    Ok(Json(serde_json::json!({ "control_mode": control_mode })))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sv_protocol::{parser::CONTROL_MODE, FieldMap, FieldValue, SystemClock};
    use tokio::sync::mpsc;

    use super::*;
    use crate::types::{AppState, Outbound};

    async fn spawn_server() -> (String, AppStateProxy, mpsc::Receiver<Outbound>) {
        let (tx_state, rx_state) = mpsc::channel(8);
        let (tx_command, rx_command) = mpsc::channel(8);
        tokio::spawn(AppState::new(rx_state, Arc::new(SystemClock)).process());
        let proxy = AppStateProxy::new(tx_state, tx_command, 70.0);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let app = router(proxy.clone());
        tokio::spawn(async move { axum::serve(listener, app).await });

        (base, proxy, rx_command)
    }

    #[tokio::test]
    async fn test_heartbeat_and_state() {
        let (base, proxy, _rx) = spawn_server().await;
        let client = reqwest::Client::new();

        let body = client.get(&base).send().await.unwrap().text().await.unwrap();
        assert_eq!(body, "Hello, Surveyor!");

        let mut values = FieldMap::new();
        values.insert(CONTROL_MODE.to_string(), FieldValue::from("Standby"));
        values.insert("Latitude".to_string(), FieldValue::Numeric(41.9));
        proxy.add_value_to_state(values).await.unwrap();

        let state: serde_json::Value = client
            .get(format!("{}/api/v1/state", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(state["Control Mode"], "Standby");
        assert_eq!(state["Latitude"], 41.9);
        assert!(state["last_updated_timestamp"].is_string());

        let mode: serde_json::Value = client
            .get(format!("{}/api/v1/control_mode", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(mode["control_mode"], "Standby");
    }

    #[tokio::test]
    async fn test_commands() {
        let (base, _proxy, mut rx) = spawn_server().await;
        let client = reqwest::Client::new();
        let url = format!("{}/api/v1/command", base);

        let res = client
            .post(&url)
            .json(&serde_json::json!({"command": "heading", "thrust": 30.0, "degrees": 90.0}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::OK);
        match rx.recv().await {
            Some(Outbound::Command(ControlCommand::Heading { thrust, degrees })) => {
                assert_eq!((thrust, degrees), (30.0, 90.0));
            }
            other => panic!("unexpected outbound: {:?}", other),
        }

        let res = client
            .post(&url)
            .json(&serde_json::json!({"command": "heading", "thrust": 30.0}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body["status"], "error");

        let res = client
            .post(&url)
            .json(&serde_json::json!({"command": "barrel_roll"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::NOT_IMPLEMENTED);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_waypoints() {
        let (base, _proxy, mut rx) = spawn_server().await;
        let client = reqwest::Client::new();
        let url = format!("{}/api/v1/waypoints", base);

        let res = client
            .post(&url)
            .json(&serde_json::json!({
                "waypoints": [[25.5, -80.75], [25.6, -80.70]],
                "erp": [25.4, -80.8],
                "throttle": 95.0,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body["throttle"], 70);
        assert_eq!(body["lines"], 4);

        match rx.recv().await {
            Some(Outbound::Mission(mission)) => {
                assert_eq!(mission.throttle(), 70);
                assert_eq!(mission.waypoints().len(), 3);
            }
            other => panic!("unexpected outbound: {:?}", other),
        }

        let res = client
            .post(&url)
            .json(&serde_json::json!({"waypoints": [], "throttle": 20.0}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::BAD_REQUEST);

        let res = client
            .post(&url)
            .json(&serde_json::json!({"waypoints": [[95.0, 0.0]], "throttle": 20.0}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::BAD_REQUEST);
    }
}
