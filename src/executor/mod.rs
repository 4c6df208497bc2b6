//! Sequential mission execution with fail-fast and boundary aborts.

use std::sync::Arc;

use futures::future;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream_ext::StreamOpsExt;
use tracing::{debug, error, info, warn};

use crate::config::ExecutorConfig;
use crate::error::{ExecutionError, LinkError};
use crate::link::{VehicleCommand, VehicleLink};
use crate::mission::{Mission, VisionConfirmation};
use crate::perception::Perception;
use crate::telemetry::TelemetrySnapshot;

pub mod abort;
pub mod events;
pub mod states;

pub use abort::AbortHandle;
use abort::Control;
use events::*;
use states::ExecutionState;

const EVENT_CAPACITY: usize = 64;

/// Runs one mission at a time against a [`VehicleLink`].
pub struct MissionExecutor {
    link: Arc<VehicleLink>,
    control: Arc<Control>,
    config: ExecutorConfig,
    events: broadcast::Sender<MissionEvent>,
    perception: Option<Arc<dyn Perception>>,
}

/// Resets the executor when an execution future is dropped half way.
struct Outstanding<'a> {
    control: &'a Control,
    armed: bool,
}

impl Drop for Outstanding<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("mission execution dropped before finishing");
            self.control.finish(ExecutionState::Failed {
                reason: "execution cancelled".to_string(),
            });
        }
    }
}

impl MissionExecutor {
    pub fn new(link: Arc<VehicleLink>, config: ExecutorConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            link,
            control: Arc::new(Control::new()),
            config,
            events,
            perception: None,
        }
    }

    pub fn with_perception(mut self, perception: Arc<dyn Perception>) -> Self {
        self.perception = Some(perception);
        self
    }

    pub fn state(&self) -> ExecutionState {
        self.control.state()
    }

    /// Current state followed by every change, including the terminal
    /// state a mission passes through on its way back to `Idle`.
    pub fn watch_state(&self) -> BoxStream<'static, ExecutionState> {
        let (current, transitions) = self.control.subscribe();
        stream::once(future::ready(current))
            .chain(BroadcastStream::new(transitions).filter_map(|t| future::ready(t.ok())))
            .distinct_until_changed()
            .boxed()
    }

    /// Terminal state of the previous execution.
    pub fn last_outcome(&self) -> Option<ExecutionState> {
        self.control.last_outcome()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MissionEvent> {
        self.events.subscribe()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            control: self.control.clone(),
            link: self.link.clone(),
            command_timeout: self.config.command_timeout,
        }
    }

    pub async fn emergency_stop(&self) -> Result<(), LinkError> {
        self.abort_handle().emergency_stop().await
    }

    pub async fn get_telemetry(&self) -> Result<TelemetrySnapshot, LinkError> {
        self.link.get_telemetry().await
    }

    fn emit(&self, event: MissionEvent) {
        // nobody listening is fine
        let _ = self.events.send(event);
    }

    /// Walk the mission's waypoints in order.
    ///
    /// The first failing command ends the mission; later waypoints are
    /// never sent. A pending abort is honoured between waypoints.
    pub async fn execute_mission(&self, mission: &Mission) -> Result<(), ExecutionError> {
        self.control.begin(mission.name())?;
        let mut outstanding = Outstanding {
            control: &self.control,
            armed: true,
        };
        let name = mission.name().to_string();
        info!(mission = %name, waypoints = mission.len(), "mission started");
        self.emit(MissionEvent::MissionStarted(MissionStartedEvent {
            mission: name.clone(),
            waypoints: mission.len(),
        }));

        let result = self.run(mission).await;

        let terminal = match &result {
            Ok(()) => {
                info!(mission = %name, "mission completed");
                self.emit(MissionEvent::MissionCompleted(MissionCompletedEvent {
                    mission: name,
                }));
                ExecutionState::Completed
            }
            Err(ExecutionError::Aborted(reason)) => {
                warn!(mission = %name, %reason, "mission aborted");
                self.emit(MissionEvent::MissionAborted(MissionAbortedEvent {
                    mission: name,
                    reason: reason.clone(),
                }));
                ExecutionState::Aborting {
                    reason: reason.clone(),
                }
            }
            Err(err) => {
                error!(mission = %name, error = %err, "mission failed");
                self.emit(MissionEvent::MissionFailed(MissionFailedEvent {
                    mission: name,
                    reason: err.to_string(),
                }));
                ExecutionState::Failed {
                    reason: err.to_string(),
                }
            }
        };
        outstanding.armed = false;
        self.control.finish(terminal);
        result
    }

    async fn run(&self, mission: &Mission) -> Result<(), ExecutionError> {
        for (index, waypoint) in mission.waypoints().iter().enumerate() {
            self.boundary().await?;
            self.control.advance(index);

            let action = waypoint.action.to_string();
            info!(mission = mission.name(), waypoint = index, %action, "executing waypoint");
            self.emit(MissionEvent::WaypointStarted(WaypointStartedEvent {
                mission: mission.name().to_string(),
                waypoint: index,
                action,
            }));

            let plan = waypoint.action.plan(&self.config);
            for command in plan.commands {
                if let Err(source) = self
                    .link
                    .send_command(command, self.config.command_timeout)
                    .await
                {
                    // an emergency stop racing the command wins
                    if self.control.is_abort_pending() {
                        self.boundary().await?;
                    }
                    return Err(ExecutionError::CommandFailed {
                        waypoint: index,
                        source,
                    });
                }
            }

            debug!(waypoint = index, wait = ?plan.wait, "settling");
            self.control.wait_or_abort(plan.wait).await;
            self.boundary().await?;

            if let Some(confirm) = &waypoint.confirm {
                self.confirm(index, confirm).await?;
            }

            self.emit(MissionEvent::WaypointReached(WaypointReachedEvent {
                mission: mission.name().to_string(),
                waypoint: index,
            }));
        }
        self.boundary().await
    }

    /// Consume a pending abort: enter `Aborting` and stop the vehicle.
    async fn boundary(&self) -> Result<(), ExecutionError> {
        let pending = match self.control.take_abort() {
            Some(pending) => pending,
            None => return Ok(()),
        };
        warn!(reason = %pending.reason, "abort taken at waypoint boundary");
        if pending.emergency_sent {
            self.control.emergencies_settled().await;
        } else if let Err(err) = self
            .link
            .send_command(VehicleCommand::Emergency, self.config.command_timeout)
            .await
        {
            error!(error = %err, "emergency command failed while aborting");
        }
        Err(ExecutionError::Aborted(pending.reason))
    }

    async fn confirm(
        &self,
        waypoint: usize,
        confirm: &VisionConfirmation,
    ) -> Result<(), ExecutionError> {
        let not_confirmed = || ExecutionError::VisionNotConfirmed {
            waypoint,
            label: confirm.label.clone(),
        };
        let perception = self.perception.as_ref().ok_or_else(not_confirmed)?;
        let frame = perception
            .current_frame()
            .await
            .ok_or_else(not_confirmed)?;
        let detections = perception.detect_objects(&frame).await;
        match detections.iter().find(|object| confirm.matches(object)) {
            Some(object) => {
                debug!(waypoint, label = %object.label, confidence = object.confidence, "confirmed");
                Ok(())
            }
            None => {
                warn!(waypoint, label = %confirm.label, seen = detections.len(), "target not seen");
                Err(not_confirmed())
            }
        }
    }
}
