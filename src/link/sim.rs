//! In-process vehicle speaking the text SDK.
//!
//! Backs `--simulate` runs of the binary and the test suites. Every frame it
//! receives is recorded, telemetry can be changed at any time and individual
//! commands can be made to fail.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::transport::{Connector, Transport};
use crate::telemetry::TelemetrySnapshot;

/// How the simulated vehicle misbehaves for a given command keyword.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// Answer with an `error ...` frame.
    Reject(String),
    /// Never answer.
    Silent,
    /// Answer with something that is neither `ok` nor an error.
    Garbled,
}

struct VehicleState {
    frames: Vec<String>,
    telemetry: TelemetrySnapshot,
    faults: HashMap<String, Fault>,
    latency: Duration,
    reachable: bool,
    sessions: usize,
}

#[derive(Clone)]
pub struct SimulatedVehicle {
    state: Arc<Mutex<VehicleState>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl Default for SimulatedVehicle {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedVehicle {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(VehicleState {
                frames: Vec::new(),
                telemetry: TelemetrySnapshot {
                    battery_percent: 85,
                    gps_satellite_count: 5,
                    ..Default::default()
                },
                faults: HashMap::new(),
                latency: Duration::ZERO,
                reachable: true,
                sessions: 0,
            })),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_battery(&self, percent: u8) {
        self.state.lock().telemetry.battery_percent = percent;
    }

    pub fn set_gps(&self, satellites: u32) {
        self.state.lock().telemetry.gps_satellite_count = satellites;
    }

    pub fn set_temperature(&self, celsius: f64) {
        self.state.lock().telemetry.temperature_celsius = celsius;
    }

    pub fn set_altitude(&self, meters: f64) {
        self.state.lock().telemetry.altitude_meters = meters;
    }

    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().reachable = reachable;
    }

    /// Misbehave on every frame whose keyword equals `keyword`.
    pub fn fail_on(&self, keyword: &str, fault: Fault) {
        self.state.lock().faults.insert(keyword.to_string(), fault);
    }

    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.state.lock().telemetry.clone()
    }

    /// Every frame received, handshakes and telemetry queries included.
    pub fn frames(&self) -> Vec<String> {
        self.state.lock().frames.clone()
    }

    /// Received frames that command the vehicle, without handshakes and
    /// telemetry queries.
    pub fn commands(&self) -> Vec<String> {
        self.state
            .lock()
            .frames
            .iter()
            .filter(|f| f.as_str() != "command" && !f.ends_with('?'))
            .cloned()
            .collect()
    }

    pub fn count(&self, keyword: &str) -> usize {
        self.commands()
            .iter()
            .filter(|f| f.split_whitespace().next() == Some(keyword))
            .count()
    }

    pub fn sessions_opened(&self) -> usize {
        self.state.lock().sessions
    }

    /// Highest number of requests observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn apply(telemetry: &mut TelemetrySnapshot, frame: &str) {
        let mut tokens = frame.split_whitespace();
        match tokens.next() {
            Some("takeoff") => {
                telemetry.is_flying = true;
                telemetry.altitude_meters = telemetry.altitude_meters.max(1.0);
            }
            Some("land") | Some("emergency") => {
                telemetry.is_flying = false;
                telemetry.altitude_meters = 0.0;
                telemetry.speed_meters_per_second = 0.0;
            }
            Some("go") => {
                let z = tokens.nth(2).and_then(|z| z.parse::<f64>().ok()).unwrap_or(0.0);
                telemetry.altitude_meters = (telemetry.altitude_meters + z / 100.0).max(0.0);
            }
            _ => {}
        }
    }

    fn answer(&self, frame: &str) -> (Duration, Option<Fault>, Vec<u8>) {
        let mut state = self.state.lock();
        state.frames.push(frame.to_string());
        let keyword = frame.split_whitespace().next().unwrap_or_default();
        let fault = state.faults.get(keyword).cloned();
        if fault.is_none() {
            Self::apply(&mut state.telemetry, frame);
        }
        let reply = if keyword == "telemetry?" {
            let mut telemetry = state.telemetry.clone();
            telemetry.captured_at = chrono::Utc::now();
            telemetry.to_record().into_bytes()
        } else {
            b"ok".to_vec()
        };
        (state.latency, fault, reply)
    }
}

#[async_trait]
impl Connector for SimulatedVehicle {
    async fn open(&self, host: &str, port: u16) -> io::Result<Box<dyn Transport>> {
        let mut state = self.state.lock();
        if !state.reachable {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("no simulated vehicle at {}:{}", host, port),
            ));
        }
        state.sessions += 1;
        Ok(Box::new(self.clone()))
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for SimulatedVehicle {
    async fn request(&self, frame: &[u8]) -> io::Result<Vec<u8>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let frame = String::from_utf8_lossy(frame).trim().to_string();
        let (latency, fault, reply) = self.answer(&frame);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match fault {
            None => Ok(reply),
            Some(Fault::Reject(message)) => Ok(message.into_bytes()),
            Some(Fault::Garbled) => Ok(b"\x07?".to_vec()),
            Some(Fault::Silent) => futures::future::pending().await,
        }
    }
}
