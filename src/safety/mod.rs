use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{Escalation, SafetyConfig};
use crate::executor::AbortHandle;
use crate::link::VehicleLink;
use crate::telemetry::TelemetrySnapshot;

pub mod events;
pub mod rules;

pub use events::SafetyEvent;
pub use rules::{should_abort_mission, AbortThresholds, Metric, SafetyRule, Severity, Violation};

const EVENT_CAPACITY: usize = 64;

struct Shared {
    link: Arc<VehicleLink>,
    abort: AbortHandle,
    config: SafetyConfig,
    events: broadcast::Sender<SafetyEvent>,
    latest: Mutex<Option<TelemetrySnapshot>>,
}

struct MonitorTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Periodic telemetry poll that turns critical rule violations into aborts.
pub struct SafetyMonitor {
    shared: Arc<Shared>,
    task: Mutex<Option<MonitorTask>>,
}

async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    while !*stop.borrow_and_update() {
        if stop.changed().await.is_err() {
            return;
        }
    }
}

impl SafetyMonitor {
    pub fn new(link: Arc<VehicleLink>, abort: AbortHandle, config: SafetyConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                link,
                abort,
                config,
                events,
                latest: Mutex::new(None),
            }),
            task: Mutex::new(None),
        }
    }

    /// Pre-flight check against the hard abort limits.
    pub fn should_abort_mission(&self, snapshot: &TelemetrySnapshot) -> bool {
        should_abort_mission(snapshot, &self.shared.config.hard_abort)
    }

    pub fn evaluate(&self, snapshot: &TelemetrySnapshot) -> Vec<Violation> {
        rules::evaluate(&self.shared.config.rules, snapshot)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SafetyEvent> {
        self.shared.events.subscribe()
    }

    /// Last snapshot a poll returned successfully.
    pub fn latest(&self) -> Option<TelemetrySnapshot> {
        self.shared.latest.lock().clone()
    }

    pub fn is_monitoring(&self) -> bool {
        self.task.lock().is_some()
    }

    /// Spawn the polling loop. Returns false if it is already running.
    pub fn start_monitoring(&self) -> bool {
        let mut task = self.task.lock();
        if task.is_some() {
            return false;
        }
        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(poll_loop(self.shared.clone(), stop_rx));
        *task = Some(MonitorTask { stop, handle });
        true
    }

    /// Signal the loop and wait until it has exited.
    pub async fn stop_monitoring(&self) {
        let task = self.task.lock().take();
        if let Some(MonitorTask { stop, handle }) = task {
            stop.send_replace(true);
            if let Err(err) = handle.await {
                error!(error = %err, "safety monitor task ended abnormally");
            }
        }
    }
}

impl Drop for SafetyMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.stop.send_replace(true);
        }
    }
}

async fn poll_loop(shared: Arc<Shared>, mut stop: watch::Receiver<bool>) {
    let mut ticker = interval(shared.config.poll_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut latched = HashSet::new();
    info!(period = ?shared.config.poll_period, rules = shared.config.rules.len(), "safety monitor started");

    loop {
        tokio::select! {
            biased;
            _ = stop_requested(&mut stop) => break,
            _ = ticker.tick() => {}
        }
        let polled = tokio::select! {
            biased;
            _ = stop_requested(&mut stop) => break,
            polled = shared.link.get_telemetry() => polled,
        };
        match polled {
            Ok(snapshot) => shared.inspect(snapshot, &mut latched).await,
            Err(err) => {
                warn!(error = %err, "telemetry poll skipped");
                shared.emit(SafetyEvent::PollSkipped {
                    reason: err.to_string(),
                });
            }
        }
    }
    info!("safety monitor stopped");
}

impl Shared {
    fn emit(&self, event: SafetyEvent) {
        let _ = self.events.send(event);
    }

    async fn inspect(&self, snapshot: TelemetrySnapshot, latched: &mut HashSet<String>) {
        debug!(
            battery = snapshot.battery_percent,
            gps = snapshot.gps_satellite_count,
            altitude = snapshot.altitude_meters,
            "telemetry"
        );
        let violations = rules::evaluate(&self.config.rules, &snapshot);
        *self.latest.lock() = Some(snapshot);

        latched.retain(|rule| violations.iter().any(|v| &v.rule == rule));
        for violation in violations {
            if latched.insert(violation.rule.clone()) {
                if violation.is_critical() {
                    error!(%violation, "critical safety violation");
                    self.emit(SafetyEvent::Critical(violation.clone()));
                } else {
                    warn!(%violation, "safety warning");
                    self.emit(SafetyEvent::Warning(violation.clone()));
                }
            }
            if violation.is_critical() {
                self.escalate(&violation).await;
            }
        }
    }

    /// Offered every cycle while the violation lasts; the executor accepts
    /// it once per mission.
    async fn escalate(&self, violation: &Violation) {
        let reason = violation.abort_reason();
        match self.config.escalation {
            Escalation::Boundary => {
                self.abort.request_abort(reason);
            }
            Escalation::Immediate => {
                if let Err(err) = self.abort.abort_immediately(reason).await {
                    error!(error = %err, "immediate abort not acknowledged");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::ExecutorConfig;
    use crate::executor::MissionExecutor;
    use crate::link::sim::{Fault, SimulatedVehicle};

    async fn monitor(vehicle: &SimulatedVehicle, config: SafetyConfig) -> SafetyMonitor {
        let link = Arc::new(VehicleLink::new(vehicle.clone()));
        link.connect("sim", 8889).await.unwrap();
        let executor = MissionExecutor::new(link.clone(), ExecutorConfig::default());
        SafetyMonitor::new(link, executor.abort_handle(), config)
    }

    #[tokio::test]
    async fn pre_flight_verdict_uses_hard_limits() {
        let vehicle = SimulatedVehicle::new();
        let monitor = monitor(&vehicle, SafetyConfig::default()).await;
        let snapshot = |battery, gps| TelemetrySnapshot {
            battery_percent: battery,
            gps_satellite_count: gps,
            ..Default::default()
        };
        assert!(monitor.should_abort_mission(&snapshot(10, 5)));
        assert!(monitor.should_abort_mission(&snapshot(50, 1)));
        assert!(!monitor.should_abort_mission(&snapshot(50, 5)));
        // 18 % is below the critical rule but above the hard limit
        assert!(!monitor.should_abort_mission(&snapshot(18, 5)));
        assert_eq!(monitor.evaluate(&snapshot(18, 5)).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_is_idempotent_and_stop_waits_for_exit() {
        let vehicle = SimulatedVehicle::new();
        let monitor = monitor(&vehicle, SafetyConfig::default()).await;
        assert!(monitor.start_monitoring());
        assert!(!monitor.start_monitoring());
        assert!(monitor.is_monitoring());

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(monitor.latest().map(|s| s.battery_percent), Some(85));

        monitor.stop_monitoring().await;
        assert!(!monitor.is_monitoring());
        let polls = vehicle.frames().len();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(vehicle.frames().len(), polls);

        // stopping twice is harmless, restarting works
        monitor.stop_monitoring().await;
        assert!(monitor.start_monitoring());
        monitor.stop_monitoring().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_stalled_poll_returns_promptly() {
        let vehicle = SimulatedVehicle::new();
        vehicle.fail_on("telemetry?", Fault::Silent);
        let monitor = monitor(&vehicle, SafetyConfig::default()).await;
        monitor.start_monitoring();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = tokio::time::Instant::now();
        tokio::time::timeout(Duration::from_secs(1), monitor.stop_monitoring())
            .await
            .expect("monitor did not stop within one poll period");
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_polls_are_skipped() {
        let vehicle = SimulatedVehicle::new();
        vehicle.fail_on("telemetry?", Fault::Garbled);
        let monitor = monitor(&vehicle, SafetyConfig::default()).await;
        let mut events = monitor.subscribe();
        monitor.start_monitoring();

        for _ in 0..2 {
            assert!(matches!(
                events.recv().await,
                Ok(SafetyEvent::PollSkipped { .. })
            ));
        }
        vehicle.clear_faults();
        vehicle.set_temperature(70.0);
        loop {
            match events.recv().await.unwrap() {
                SafetyEvent::PollSkipped { .. } => continue,
                event => {
                    assert_eq!(event.violation().map(|v| v.rule.as_str()), Some("Temperature"));
                    break;
                }
            }
        }
        assert!(monitor.is_monitoring());
        monitor.stop_monitoring().await;
    }

    #[tokio::test(start_paused = true)]
    async fn violations_are_reported_once_per_episode() {
        let vehicle = SimulatedVehicle::new();
        vehicle.set_temperature(70.0);
        let monitor = monitor(&vehicle, SafetyConfig::default()).await;
        let mut events = monitor.subscribe();
        monitor.start_monitoring();

        tokio::time::sleep(Duration::from_millis(3500)).await;
        vehicle.set_temperature(30.0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        vehicle.set_temperature(65.0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        monitor.stop_monitoring().await;

        let mut warnings = 0;
        while let Ok(event) = events.try_recv() {
            if let SafetyEvent::Warning(violation) = event {
                assert_eq!(violation.rule, "Temperature");
                warnings += 1;
            }
        }
        assert_eq!(warnings, 2);
    }
}
