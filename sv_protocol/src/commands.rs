use serde::{Deserialize, Serialize};

use crate::sentence::build_sentence;

// Vehicle control modes as reported in the first PSEAD field and set through PSEAC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ControlMode {
    Standby,
    Thruster,
    Heading,
    Speed,
    StationKeep,
    RiverNav,
    Waypoint,
    Autopilot,
    CompassCal,
    GoToErp,
    Depth,
    GravityVectorDirection,
    FileDownload,
    BootLoader,
}

impl ControlMode {
    pub const ALL: [ControlMode; 14] = [
        ControlMode::Standby,
        ControlMode::Thruster,
        ControlMode::Heading,
        ControlMode::Speed,
        ControlMode::StationKeep,
        ControlMode::RiverNav,
        ControlMode::Waypoint,
        ControlMode::Autopilot,
        ControlMode::CompassCal,
        ControlMode::GoToErp,
        ControlMode::Depth,
        ControlMode::GravityVectorDirection,
        ControlMode::FileDownload,
        ControlMode::BootLoader,
    ];

    pub fn from_code(code: &str) -> Option<Self> {
        ControlMode::ALL.into_iter().find(|m| m.code() == code)
    }

    pub fn code(&self) -> &'static str {
        match self {
            ControlMode::Standby => "L",
            ControlMode::Thruster => "T",
            ControlMode::Heading => "C",
            ControlMode::Speed => "G",
            ControlMode::StationKeep => "R",
            ControlMode::RiverNav => "N",
            ControlMode::Waypoint => "W",
            ControlMode::Autopilot => "I",
            ControlMode::CompassCal => "3",
            ControlMode::GoToErp => "H",
            ControlMode::Depth => "D",
            ControlMode::GravityVectorDirection => "S",
            ControlMode::FileDownload => "F",
            ControlMode::BootLoader => "!",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ControlMode::Standby => "Standby",
            ControlMode::Thruster => "Thruster",
            ControlMode::Heading => "Heading",
            ControlMode::Speed => "Speed",
            ControlMode::StationKeep => "Station Keep",
            ControlMode::RiverNav => "River Nav",
            ControlMode::Waypoint => "Waypoint",
            ControlMode::Autopilot => "Autopilot",
            ControlMode::CompassCal => "Compass Cal",
            ControlMode::GoToErp => "Go To ERP",
            ControlMode::Depth => "Depth",
            ControlMode::GravityVectorDirection => "Gravity Vector Direction",
            ControlMode::FileDownload => "File Download",
            ControlMode::BootLoader => "Boot Loader",
        }
    }
}

// A command to be sent to the vehicle as a PSEAC sentence
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCommand {
    Standby,
    Thruster { thrust: f64, thrust_diff: f64 },
    Heading { thrust: f64, degrees: f64 },
    Waypoint,
    GoToErp,
    StationKeep,
    StartFileDownload { lines: usize },
    EndFileDownload,
}

impl ControlCommand {
    // PSEAC payload, with thrust values clipped to `max_thrust` and truncated to integers
    pub fn payload(&self, max_thrust: f64) -> String {
        let max_thrust = max_thrust.abs();

        match self {
            ControlCommand::Standby => "PSEAC,L,0,0,0,".to_string(),
            ControlCommand::Thruster {
                thrust,
                thrust_diff,
            } => {
                let thrust = clip(*thrust, -max_thrust, max_thrust);
                let thrust_diff = clip(*thrust_diff, -max_thrust, max_thrust);
                format!("PSEAC,T,0,{},{},", thrust as i64, thrust_diff as i64)
            }
            ControlCommand::Heading { thrust, degrees } => {
                let thrust = clip(*thrust, 0.0, max_thrust);
                let degrees = clip(*degrees, 0.0, 360.0);
                format!("PSEAC,C,{},{},,", degrees as i64, thrust as i64)
            }
            ControlCommand::Waypoint => "PSEAC,W,0,0,0,".to_string(),
            ControlCommand::GoToErp => "PSEAC,H,0,0,0,".to_string(),
            ControlCommand::StationKeep => "PSEAC,R,,,,".to_string(),
            ControlCommand::StartFileDownload { lines } => {
                format!("PSEAC,F,{},000,000,", lines)
            }
            ControlCommand::EndFileDownload => "PSEAC,F,000,000,000".to_string(),
        }
    }

    pub fn sentence(&self, max_thrust: f64) -> String {
        build_sentence(&self.payload(max_thrust))
    }

    // The file download commands need the vehicle to switch modes before the next line
    pub fn is_file_download(&self) -> bool {
        matches!(
            self,
            ControlCommand::StartFileDownload { .. } | ControlCommand::EndFileDownload
        )
    }
}

// NaN is treated as zero
fn clip(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        return min.max(0.0_f64.min(max));
    }
    value.clamp(min, max)
}
