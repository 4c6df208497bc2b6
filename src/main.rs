use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::{select, signal};
use tracing::{error, info, warn};

use flightcore::controller::{FlightController, FlightEvent};
use flightcore::executor::events::MissionEvent;
use flightcore::link::sim::SimulatedVehicle;
use flightcore::link::{Connector, UdpConnector};
use flightcore::logging::{init_tracing, LogFormat};
use flightcore::safety::SafetyEvent;
use flightcore::{ExecutionError, FlightConfig, Mission, Waypoint, WaypointAction};

const CONFIG_CANDIDATES: &[&str] = &["flightcore.toml", "/etc/flightcore/flightcore.toml"];

#[derive(Parser)]
#[command(name = "flightcore", version, about = "Mission executor with safety interlocks")]
struct Cli {
    /// Configuration file; defaults to the first of flightcore.toml and
    /// /etc/flightcore/flightcore.toml that exists.
    #[arg(long, global = true, env = "FLIGHTCORE_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fly a mission with the safety monitor running.
    Run {
        #[command(flatten)]
        source: MissionSource,
        #[command(flatten)]
        vehicle: VehicleArgs,
        /// Skip the pre-flight telemetry check.
        #[arg(long)]
        no_preflight: bool,
    },
    /// Validate a mission file and print the commands it expands to.
    Check {
        #[arg(long)]
        mission: PathBuf,
    },
    /// Print current telemetry and the pre-flight verdict.
    Status {
        #[command(flatten)]
        vehicle: VehicleArgs,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct MissionSource {
    /// JSON mission document.
    #[arg(long)]
    mission: Option<PathBuf>,
    /// Fly the built-in square survey pattern.
    #[arg(long)]
    survey: bool,
}

#[derive(Args)]
struct VehicleArgs {
    /// Talk to an in-process simulated vehicle instead of the network.
    #[arg(long)]
    simulate: bool,
    /// Battery level the simulated vehicle reports.
    #[arg(long, requires = "simulate", value_parser = clap::value_parser!(u8).range(0..=100))]
    sim_battery: Option<u8>,
}

impl VehicleArgs {
    fn connector(&self) -> Arc<dyn Connector> {
        if self.simulate {
            let vehicle = SimulatedVehicle::new();
            if let Some(battery) = self.sim_battery {
                vehicle.set_battery(battery);
            }
            info!("using simulated vehicle");
            Arc::new(vehicle)
        } else {
            Arc::new(UdpConnector)
        }
    }
}

fn survey_mission() -> Result<Mission> {
    let leg = |x, y| WaypointAction::MoveTo {
        x,
        y,
        z: 50,
        speed: 50,
    };
    let waypoints = vec![
        WaypointAction::Takeoff,
        WaypointAction::Hover {
            duration_seconds: 2.0,
        },
        leg(100, 0),
        WaypointAction::CapturePhoto,
        leg(100, 100),
        WaypointAction::CapturePhoto,
        leg(0, 100),
        WaypointAction::CapturePhoto,
        leg(0, 0),
        WaypointAction::Land,
    ];
    Ok(Mission::new(
        "Survey Mission",
        waypoints.into_iter().map(Waypoint::new).collect(),
    )?)
}

impl MissionSource {
    fn load(&self) -> Result<Mission> {
        match &self.mission {
            Some(path) => Mission::load(path),
            None => survey_mission(),
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<FlightConfig> {
    match path {
        Some(path) => FlightConfig::from_path(path.clone()),
        None => FlightConfig::load(CONFIG_CANDIDATES),
    }
}

fn print_event(event: FlightEvent) {
    match event {
        FlightEvent::Mission(MissionEvent::WaypointStarted(e)) => {
            println!("[{}] waypoint {}: {}", e.mission, e.waypoint, e.action)
        }
        FlightEvent::Mission(MissionEvent::MissionCompleted(e)) => {
            println!("[{}] completed", e.mission)
        }
        FlightEvent::Mission(MissionEvent::MissionAborted(e)) => {
            println!("[{}] ABORTED: {}", e.mission, e.reason)
        }
        FlightEvent::Mission(MissionEvent::MissionFailed(e)) => {
            println!("[{}] failed: {}", e.mission, e.reason)
        }
        FlightEvent::Mission(_) => {}
        FlightEvent::Safety(SafetyEvent::Warning(v)) => println!("  warning: {}", v),
        FlightEvent::Safety(SafetyEvent::Critical(v)) => println!("  CRITICAL: {}", v),
        FlightEvent::Safety(SafetyEvent::PollSkipped { .. }) => {}
        FlightEvent::Status(s) => println!(
            "  battery {}% | alt {:.1} m | gps {} | {:.0} °C",
            s.battery_percent, s.altitude_meters, s.gps_satellite_count, s.temperature_celsius
        ),
    }
}

async fn run(
    config: FlightConfig,
    source: MissionSource,
    vehicle: VehicleArgs,
    no_preflight: bool,
) -> Result<()> {
    let mission = source.load()?;
    let controller = FlightController::new(config, vehicle.connector());
    controller
        .connect()
        .await
        .context("failed to connect to vehicle")?;

    if !no_preflight {
        let check = controller.preflight().await.context("pre-flight check")?;
        if check.abort {
            controller.shutdown().await;
            bail!(
                "pre-flight check failed: battery {}%, {} satellites",
                check.snapshot.battery_percent,
                check.snapshot.gps_satellite_count
            );
        }
    }

    println!("flying '{}' ({} waypoints)", mission.name(), mission.len());
    let flight = controller.fly(&mission, print_event);
    tokio::pin!(flight);
    let result = loop {
        select! {
            result = &mut flight => break result,
            interrupted = signal::ctrl_c() => {
                if let Err(err) = interrupted {
                    error!(error = %err, "unable to listen for ctrl-c");
                    continue;
                }
                warn!("interrupted, sending emergency stop");
                // the flight future must keep running for the stop to get a turn on the link
                let handle = controller.abort_handle();
                tokio::spawn(async move {
                    if let Err(err) = handle.emergency_stop().await {
                        error!(error = %err, "emergency stop failed");
                    }
                });
            }
        }
    };
    controller.shutdown().await;

    match result {
        Ok(()) => Ok(()),
        Err(ExecutionError::Aborted(reason)) => bail!("mission aborted: {}", reason),
        Err(err) => Err(err).context("mission failed"),
    }
}

fn check(config: &FlightConfig, path: PathBuf) -> Result<()> {
    let mission = Mission::load(&path)?;
    println!("'{}': {} waypoints", mission.name(), mission.len());
    for (index, waypoint) in mission.waypoints().iter().enumerate() {
        let plan = waypoint.action.plan(&config.executor);
        let commands: Vec<String> = plan.commands.iter().map(|c| c.encode()).collect();
        println!(
            "{:>3}. {:<28} [{}] wait {:?}{}",
            index,
            waypoint.action.to_string(),
            commands.join(", "),
            plan.wait,
            waypoint
                .confirm
                .as_ref()
                .map(|c| format!(", confirm '{}' >= {}", c.label, c.min_confidence))
                .unwrap_or_default()
        );
    }
    Ok(())
}

async fn status(config: FlightConfig, vehicle: VehicleArgs) -> Result<()> {
    let controller = FlightController::new(config, vehicle.connector());
    controller
        .connect()
        .await
        .context("failed to connect to vehicle")?;
    let check = controller.preflight().await;
    controller.shutdown().await;
    let check = check.context("telemetry query failed")?;

    let s = &check.snapshot;
    println!("battery      {}%", s.battery_percent);
    println!("altitude     {:.1} m", s.altitude_meters);
    println!("speed        {:.1} m/s", s.speed_meters_per_second);
    println!("temperature  {:.0} °C", s.temperature_celsius);
    println!("flying       {}", s.is_flying);
    println!("satellites   {}", s.gps_satellite_count);
    for violation in &check.violations {
        println!("violation    {}", violation);
    }
    println!(
        "pre-flight   {}",
        if check.abort { "NO-GO" } else { "go" }
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Run {
            source,
            vehicle,
            no_preflight,
        } => run(config, source, vehicle, no_preflight).await,
        Command::Check { mission } => check(&config, mission),
        Command::Status { vehicle } => status(config, vehicle).await,
    }
}
