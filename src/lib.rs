//! Flight-control core for a text-SDK quadcopter.
//!
//! [`link::VehicleLink`] owns the command channel, [`executor::MissionExecutor`]
//! walks a [`mission::Mission`] one waypoint at a time, and
//! [`safety::SafetyMonitor`] polls telemetry on its own task and aborts the
//! running mission when a critical rule is violated.

pub mod config;
pub mod controller;
pub mod error;
pub mod executor;
pub mod link;
pub mod logging;
pub mod mission;
pub mod perception;
pub mod safety;
pub mod telemetry;

pub use config::FlightConfig;
pub use controller::{FlightController, FlightEvent};
pub use error::{ConfigError, ExecutionError, LinkError, MissionError};
pub use executor::states::{AbortReason, ExecutionState};
pub use executor::{AbortHandle, MissionExecutor};
pub use link::VehicleLink;
pub use mission::{Mission, Waypoint, WaypointAction};
pub use safety::SafetyMonitor;
pub use telemetry::TelemetrySnapshot;
