use std::sync::Arc;

use tokio::sync::broadcast::error::TryRecvError;
use tokio::{select, time::interval};
use tracing::{info, warn};

use crate::config::FlightConfig;
use crate::error::{ExecutionError, LinkError};
use crate::executor::events::MissionEvent;
use crate::executor::states::ExecutionState;
use crate::executor::{AbortHandle, MissionExecutor};
use crate::link::{Connector, VehicleLink};
use crate::mission::Mission;
use crate::safety::{SafetyEvent, SafetyMonitor, Violation};
use crate::telemetry::TelemetrySnapshot;

/// Progress seen by whoever drives a flight.
#[derive(Debug, Clone, PartialEq)]
pub enum FlightEvent {
    Mission(MissionEvent),
    Safety(SafetyEvent),
    /// Periodic telemetry from the safety monitor.
    Status(TelemetrySnapshot),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Preflight {
    pub snapshot: TelemetrySnapshot,
    /// Hard abort limits are breached; do not take off.
    pub abort: bool,
    pub violations: Vec<Violation>,
}

/// Wires link, executor and safety monitor together for one vehicle.
pub struct FlightController {
    config: FlightConfig,
    link: Arc<VehicleLink>,
    executor: MissionExecutor,
    monitor: SafetyMonitor,
}

impl FlightController {
    pub fn new(config: FlightConfig, connector: Arc<dyn Connector>) -> Self {
        let link = Arc::new(
            VehicleLink::with_connector(connector)
                .with_timeouts(config.link.connect_timeout, config.link.telemetry_timeout),
        );
        let executor = MissionExecutor::new(link.clone(), config.executor.clone());
        let monitor = SafetyMonitor::new(link.clone(), executor.abort_handle(), config.safety.clone());
        Self {
            config,
            link,
            executor,
            monitor,
        }
    }

    pub fn config(&self) -> &FlightConfig {
        &self.config
    }

    pub fn executor(&self) -> &MissionExecutor {
        &self.executor
    }

    pub fn monitor(&self) -> &SafetyMonitor {
        &self.monitor
    }

    pub async fn connect(&self) -> Result<(), LinkError> {
        let link = &self.config.link;
        self.link.connect(&link.host, link.port).await?;
        info!(host = %link.host, port = link.port, "vehicle connected");
        Ok(())
    }

    pub fn state(&self) -> ExecutionState {
        self.executor.state()
    }

    pub async fn telemetry(&self) -> Result<TelemetrySnapshot, LinkError> {
        self.link.get_telemetry().await
    }

    /// Query telemetry once and judge it against the safety configuration.
    pub async fn preflight(&self) -> Result<Preflight, LinkError> {
        let snapshot = self.telemetry().await?;
        Ok(Preflight {
            abort: self.monitor.should_abort_mission(&snapshot),
            violations: self.monitor.evaluate(&snapshot),
            snapshot,
        })
    }

    pub fn start_monitoring(&self) -> bool {
        self.monitor.start_monitoring()
    }

    pub async fn stop_monitoring(&self) {
        self.monitor.stop_monitoring().await
    }

    /// Handle for interrupting a flight from another task.
    pub fn abort_handle(&self) -> AbortHandle {
        self.executor.abort_handle()
    }

    pub async fn emergency_stop(&self) -> Result<(), LinkError> {
        self.executor.emergency_stop().await
    }

    /// Execute `mission` with the safety monitor running, reporting
    /// progress to `on_event` until the mission ends.
    pub async fn fly(
        &self,
        mission: &Mission,
        mut on_event: impl FnMut(FlightEvent),
    ) -> Result<(), ExecutionError> {
        let mut progress = self.executor.subscribe();
        let mut safety = self.monitor.subscribe();
        let mut status = interval(self.config.safety.poll_period);
        self.monitor.start_monitoring();

        let execution = self.executor.execute_mission(mission);
        tokio::pin!(execution);

        let result = loop {
            select! {
                result = &mut execution => break result,
                Ok(event) = progress.recv() => on_event(FlightEvent::Mission(event)),
                Ok(event) = safety.recv() => on_event(FlightEvent::Safety(event)),
                _ = status.tick() => {
                    if let Some(snapshot) = self.monitor.latest() {
                        on_event(FlightEvent::Status(snapshot));
                    }
                },
            }
        };

        loop {
            match progress.try_recv() {
                Ok(event) => on_event(FlightEvent::Mission(event)),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "progress events dropped");
                }
                Err(_) => break,
            }
        }
        result
    }

    /// Stop the monitor and close the link.
    pub async fn shutdown(&self) {
        self.monitor.stop_monitoring().await;
        self.link.disconnect().await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::link::sim::SimulatedVehicle;
    use crate::mission::WaypointAction;

    fn controller(vehicle: &SimulatedVehicle) -> FlightController {
        FlightController::new(FlightConfig::default(), Arc::new(vehicle.clone()))
    }

    #[tokio::test(start_paused = true)]
    async fn flies_and_reports_progress() {
        let vehicle = SimulatedVehicle::new();
        let controller = controller(&vehicle);
        controller.connect().await.unwrap();

        let mission = Mission::from_actions(
            "short hop",
            vec![
                WaypointAction::Takeoff,
                WaypointAction::Hover {
                    duration_seconds: 3.0,
                },
                WaypointAction::Land,
            ],
        )
        .unwrap();

        let mut seen = vec![];
        controller
            .fly(&mission, |event| seen.push(event))
            .await
            .unwrap();

        let mission_events: Vec<_> = seen
            .iter()
            .filter_map(|event| match event {
                FlightEvent::Mission(event) => Some(event),
                _ => None,
            })
            .collect();
        assert_eq!(mission_events.len(), 8);
        assert!(matches!(
            mission_events.last(),
            Some(MissionEvent::MissionCompleted(_))
        ));
        assert!(seen.iter().any(|e| matches!(e, FlightEvent::Status(_))));
        assert!(controller.monitor().is_monitoring());

        controller.shutdown().await;
        assert!(!controller.monitor().is_monitoring());
        assert!(controller.telemetry().await.is_err());
    }

    #[tokio::test]
    async fn preflight_flags_depleted_battery() {
        let vehicle = SimulatedVehicle::new();
        vehicle.set_battery(10);
        let controller = controller(&vehicle);
        controller.connect().await.unwrap();

        let check = controller.preflight().await.unwrap();
        assert!(check.abort);
        assert_eq!(check.violations.len(), 1);
        assert_eq!(check.violations[0].rule, "Battery");
        assert_eq!(check.snapshot.battery_percent, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn emergency_stop_from_another_task() {
        let vehicle = SimulatedVehicle::new();
        let controller = controller(&vehicle);
        controller.connect().await.unwrap();
        let mission = Mission::from_actions(
            "long hover",
            vec![
                WaypointAction::Takeoff,
                WaypointAction::Hover {
                    duration_seconds: 120.0,
                },
                WaypointAction::Land,
            ],
        )
        .unwrap();

        let handle = controller.abort_handle();
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            handle.emergency_stop().await
        });
        let result = controller.fly(&mission, |_| {}).await;

        assert!(matches!(result, Err(ExecutionError::Aborted(_))));
        stopper.await.unwrap().unwrap();
        assert_eq!(vehicle.count("emergency"), 1);
        assert_eq!(vehicle.count("land"), 0);
        controller.shutdown().await;
    }
}
