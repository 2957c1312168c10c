use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use tokio::sync::mpsc;
use tracing::{event, Level};

use sv_protocol::{Clock, Dispatcher, SystemClock};

use self::{
    config::Config,
    recorder::CsvRecorder,
    types::{AppState, AppStateProxy},
};

pub mod config;
pub mod exo2;
pub mod httpserver;
pub mod missionfile;
pub mod recorder;
pub mod surveyorlink;
pub mod types;
pub mod utils;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run_app(config: Config) -> anyhow::Result<()> {
    event!(Level::INFO, "Connecting to the surveyor at {}", config.surveyor_address);

    let stream = tokio::time::timeout(
        CONNECT_TIMEOUT,
        tokio::net::TcpStream::connect(&config.surveyor_address),
    )
    .await
    .map_err(|_| anyhow!("Timed out connecting to {}", config.surveyor_address))??;
    let (reader, writer) = stream.into_split();

    event!(Level::INFO, "Connected to the surveyor at {}", config.surveyor_address);

    // set up a channel for vehicle commands, and state signals
    let (tx_command, rx_command) = mpsc::channel(32);
    let (tx_state, rx_state) = mpsc::channel(32);

    // set up the app state and a proxy, that is linked through a channel. we can then clone and share the proxy with all the different processes
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let app_state: AppState = AppState::new(rx_state, clock.clone());
    let app_state_proxy: AppStateProxy =
        AppStateProxy::new(tx_state, tx_command, config.max_thrust);

    let dispatcher = Dispatcher::new(config.checksum_mode, clock.clone());

    let recording = async {
        if config.record {
            let recorder = CsvRecorder::new(
                &config.out_dir,
                &config.csv_postfix,
                config.record_interval,
                clock.clone(),
            );
            recorder::record_state(app_state_proxy.clone(), recorder, config.record_interval).await
        } else {
            std::future::pending().await
        }
    };

    let sonde = async {
        match &config.exo2_url {
            Some(url) => {
                exo2::poll_exo2(url.clone(), app_state_proxy.clone(), config.record_interval).await
            }
            None => std::future::pending().await,
        }
    };

    tokio::select! {

        // process that runs on the app state, that will listen to the signals from the proxy and processes these
        _ = app_state.process() => { Err(anyhow!("State actor stopped")) }

        // process that reads telemetry from the vehicle, and updates the state accordingly
        res = surveyorlink::listen_to_surveyor(reader, app_state_proxy.clone(), dispatcher) => { res }

        // process that listens to incoming commands (through the http server), and sends them to the vehicle
        res = surveyorlink::listen_to_send_commands(writer, rx_command, config.max_thrust) => { res }

        // process that runs an http server, to share state and receive commands and missions
        res = httpserver::run_server(app_state_proxy.clone(), &config.http_address) => { res }

        // process that appends the state to the daily csv file
        res = recording => { res }

        // process that polls the water quality sonde
        res = sonde => { res }
    }
}
