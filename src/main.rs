use crossterm::event::{Event, EventStream, KeyCode};
use futures::StreamExt;
use tracing::event;

use sv_connector::{config::Config, missionfile, utils};
use sv_protocol::{assemble_mission, mission::DEFAULT_THROTTLE};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    utils::start_tracing_subscriber();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("mission") {
        return write_mission(&args[1..]);
    }

    logo();

    let config = Config::default();

    tokio::select! {
        res = sv_connector::run_app(config) => {
            if let Err(e) = res {
                event!(tracing::Level::ERROR, "Connector stopped: {:?}", e);
            }
        },

        // process that runs a terminal, that looks for input (eg "q" press)
        // this is the process that will run to completion and then the tokio::select will cancel the rest
        _ = run_terminal() => { }
    }

    event!(tracing::Level::INFO, "Surveyor closed");
    Ok(())
}

// surveyor mission <waypoints.csv> <out.sea> [erp.csv] [throttle]
fn write_mission(args: &[String]) -> anyhow::Result<()> {
    let (Some(waypoints_path), Some(out_path)) = (args.first(), args.get(1)) else {
        anyhow::bail!("usage: surveyor mission <waypoints.csv> <out.sea> [erp.csv] [throttle]");
    };

    let waypoints = missionfile::read_waypoints_csv(waypoints_path)?;

    // only the first row of the erp file is used
    let erp = match args.get(2) {
        Some(path) => missionfile::read_waypoints_csv(path)?.first().copied(),
        None => None,
    };

    let throttle = match args.get(3) {
        Some(value) => value.parse::<u8>()?,
        None => DEFAULT_THROTTLE,
    };

    let mission = assemble_mission(&waypoints, erp, throttle)?;
    missionfile::write_mission_file(out_path, &mission)?;

    Ok(())
}

// listens to terminal inputs, and breaks on "q"
async fn run_terminal() -> Result<(), ()> {
    let mut reader = EventStream::new();

    while let Some(maybe_event) = reader.next().await {
        match maybe_event {
            Ok(event) => {
                if event == Event::Key(KeyCode::Char('q').into()) {
                    break;
                }
            }
            Err(e) => println!("Error: {:?}\r", e),
        }
    }

    Ok(())
}

fn logo() {
    println!(
        r"
   _____
  / ___/__  ________   _____  __  ______  _____
  \__ \/ / / / ___/ | / / _ \/ / / / __ \/ ___/
 ___/ / /_/ / /   | |/ /  __/ /_/ / /_/ / /
/____/\__,_/_/    |___/\___/\__, /\____/_/
                           /____/         v0.1
    ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
    "
    );
}
