use std::sync::Arc;
use std::time::Duration;

use flightcore::config::{Escalation, ExecutorConfig, SafetyConfig};
use flightcore::link::sim::SimulatedVehicle;
use flightcore::safety::SafetyEvent;
use flightcore::{
    AbortReason, ExecutionError, ExecutionState, Mission, MissionExecutor, SafetyMonitor,
    VehicleLink, WaypointAction,
};
use tokio::time::Instant;

struct Rig {
    vehicle: SimulatedVehicle,
    executor: Arc<MissionExecutor>,
    monitor: SafetyMonitor,
}

async fn rig(safety: SafetyConfig) -> Rig {
    let vehicle = SimulatedVehicle::new();
    let link = Arc::new(VehicleLink::new(vehicle.clone()));
    link.connect("sim", 8889).await.unwrap();
    let executor = Arc::new(MissionExecutor::new(link.clone(), ExecutorConfig::default()));
    let monitor = SafetyMonitor::new(link, executor.abort_handle(), safety);
    Rig {
        vehicle,
        executor,
        monitor,
    }
}

fn patrol() -> Mission {
    Mission::from_actions(
        "patrol",
        vec![
            WaypointAction::Takeoff,
            WaypointAction::MoveTo {
                x: 200,
                y: 0,
                z: 0,
                speed: 50,
            },
            WaypointAction::Hover {
                duration_seconds: 30.0,
            },
            WaypointAction::MoveTo {
                x: -200,
                y: 0,
                z: 0,
                speed: 50,
            },
            WaypointAction::Land,
        ],
    )
    .unwrap()
}

fn battery_low() -> AbortReason {
    AbortReason::SafetyViolation {
        rule: "Battery".into(),
        value: 12.0,
        threshold: 20.0,
    }
}

#[tokio::test(start_paused = true)]
async fn critical_battery_aborts_at_next_boundary() {
    let rig = rig(SafetyConfig::default()).await;
    let mut safety = rig.monitor.subscribe();
    rig.monitor.start_monitoring();

    let run = {
        let executor = rig.executor.clone();
        tokio::spawn(async move { executor.execute_mission(&patrol()).await })
    };
    tokio::time::sleep(Duration::from_secs(12)).await;
    rig.vehicle.set_battery(12);

    let result = run.await.unwrap();
    assert_eq!(result, Err(ExecutionError::Aborted(battery_low())));
    assert_eq!(
        rig.executor.last_outcome(),
        Some(ExecutionState::Aborting {
            reason: battery_low()
        })
    );

    // the condition persists, but the mission is only stopped once
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(rig.vehicle.count("emergency"), 1);
    assert_eq!(rig.vehicle.count("land"), 0);
    assert_eq!(
        rig.vehicle.commands(),
        vec!["takeoff", "go 200 0 0 50", "emergency"]
    );

    let mut criticals = 0;
    while let Ok(event) = safety.try_recv() {
        if let SafetyEvent::Critical(violation) = event {
            assert_eq!(violation.rule, "Battery");
            criticals += 1;
        }
    }
    assert_eq!(criticals, 1);
    rig.monitor.stop_monitoring().await;
}

#[tokio::test(start_paused = true)]
async fn immediate_escalation_stops_without_waiting() {
    let rig = rig(SafetyConfig {
        escalation: Escalation::Immediate,
        ..Default::default()
    })
    .await;
    rig.monitor.start_monitoring();

    let run = {
        let executor = rig.executor.clone();
        tokio::spawn(async move { executor.execute_mission(&patrol()).await })
    };
    tokio::time::sleep(Duration::from_secs(12)).await;
    let lowered = Instant::now();
    rig.vehicle.set_gps(1);

    let result = run.await.unwrap();
    assert!(lowered.elapsed() <= Duration::from_secs(2));
    assert!(matches!(
        result,
        Err(ExecutionError::Aborted(AbortReason::SafetyViolation { ref rule, .. })) if rule == "GPS Signal"
    ));
    assert_eq!(rig.vehicle.count("emergency"), 1);
    rig.monitor.stop_monitoring().await;
}

#[tokio::test(start_paused = true)]
async fn warnings_do_not_interrupt() {
    let rig = rig(SafetyConfig::default()).await;
    rig.vehicle.set_temperature(72.0);
    let mut safety = rig.monitor.subscribe();
    rig.monitor.start_monitoring();

    rig.executor.execute_mission(&patrol()).await.unwrap();
    rig.monitor.stop_monitoring().await;

    assert_eq!(rig.vehicle.count("land"), 1);
    assert_eq!(rig.vehicle.count("emergency"), 0);
    assert!(matches!(safety.try_recv(), Ok(SafetyEvent::Warning(_))));
}

#[tokio::test(start_paused = true)]
async fn monitor_and_executor_share_the_link_one_request_at_a_time() {
    let rig = rig(SafetyConfig {
        poll_period: Duration::from_millis(200),
        ..Default::default()
    })
    .await;
    rig.vehicle.set_latency(Duration::from_millis(150));
    rig.monitor.start_monitoring();

    rig.executor.execute_mission(&patrol()).await.unwrap();
    rig.monitor.stop_monitoring().await;

    assert_eq!(rig.vehicle.max_in_flight(), 1);
    assert!(rig.vehicle.frames().iter().filter(|f| *f == "telemetry?").count() > 10);
    assert_eq!(
        rig.vehicle.commands(),
        vec!["takeoff", "go 200 0 0 50", "go -200 0 0 50", "land"]
    );
}

#[tokio::test(start_paused = true)]
async fn retry_after_abort_with_remaining_waypoints() {
    let rig = rig(SafetyConfig::default()).await;
    let handle = rig.executor.abort_handle();
    let run = {
        let executor = rig.executor.clone();
        tokio::spawn(async move { executor.execute_mission(&patrol()).await })
    };
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(handle.request_abort(AbortReason::EmergencyStop));
    assert!(run.await.unwrap().is_err());
    assert!(rig.executor.state().is_idle());

    let remainder = Mission::from_actions("patrol-rest", vec![WaypointAction::Land]).unwrap();
    rig.executor.execute_mission(&remainder).await.unwrap();
    assert_eq!(rig.executor.last_outcome(), Some(ExecutionState::Completed));
}

#[test]
fn invalid_moves_never_reach_an_executor() {
    let err = Mission::from_actions(
        "bad",
        vec![WaypointAction::MoveTo {
            x: 10,
            y: 0,
            z: 0,
            speed: 0,
        }],
    )
    .unwrap_err();
    assert_eq!(
        err,
        flightcore::MissionError::NonPositiveSpeed { index: 0, speed: 0 }
    );
}
