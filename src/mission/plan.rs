use std::time::Duration;

use super::types::WaypointAction;
use crate::config::ExecutorConfig;
use crate::link::VehicleCommand;

/// Commands to send for one waypoint and how long to wait afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandPlan {
    pub commands: Vec<VehicleCommand>,
    pub wait: Duration,
}

impl CommandPlan {
    fn new(commands: Vec<VehicleCommand>, wait: Duration) -> Self {
        Self { commands, wait }
    }
}

impl WaypointAction {
    pub fn plan(&self, timing: &ExecutorConfig) -> CommandPlan {
        match *self {
            WaypointAction::Takeoff => {
                CommandPlan::new(vec![VehicleCommand::Takeoff], timing.takeoff_settle)
            }
            WaypointAction::Land => CommandPlan::new(vec![VehicleCommand::Land], timing.land_settle),
            WaypointAction::MoveTo { x, y, z, speed } => CommandPlan::new(
                vec![VehicleCommand::GoTo {
                    x,
                    y,
                    z,
                    speed: speed.unsigned_abs(),
                }],
                travel_time(x, y, z, speed, timing.max_move_wait),
            ),
            WaypointAction::Hover { duration_seconds } => CommandPlan::new(
                vec![],
                // beyond what Duration holds means "hover until aborted"
                Duration::try_from_secs_f64(duration_seconds).unwrap_or(Duration::MAX),
            ),
            // zero degrees still goes out as a clockwise turn
            WaypointAction::Rotate { degrees } if degrees >= 0 => CommandPlan::new(
                vec![VehicleCommand::RotateClockwise(degrees.unsigned_abs())],
                timing.rotate_settle,
            ),
            WaypointAction::Rotate { degrees } => CommandPlan::new(
                vec![VehicleCommand::RotateCounterClockwise(degrees.unsigned_abs())],
                timing.rotate_settle,
            ),
            WaypointAction::CapturePhoto => {
                CommandPlan::new(vec![VehicleCommand::CapturePhoto], timing.capture_delay)
            }
            WaypointAction::StartVideo => {
                CommandPlan::new(vec![VehicleCommand::StartVideo], Duration::ZERO)
            }
            WaypointAction::StopVideo => {
                CommandPlan::new(vec![VehicleCommand::StopVideo], Duration::ZERO)
            }
        }
    }
}

/// Straight-line distance over speed, never longer than `cap`.
fn travel_time(x: i32, y: i32, z: i32, speed: i32, cap: Duration) -> Duration {
    if speed <= 0 {
        return cap;
    }
    let distance = (f64::from(x).powi(2) + f64::from(y).powi(2) + f64::from(z).powi(2)).sqrt();
    Duration::try_from_secs_f64(distance / f64::from(speed))
        .unwrap_or(cap)
        .min(cap)
}
