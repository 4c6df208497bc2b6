use std::fmt;

use serde::{Deserialize, Serialize};

use crate::executor::states::AbortReason;
use crate::telemetry::TelemetrySnapshot;

/// Telemetry quantity a rule watches, and which side of the threshold is unsafe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    BatteryPercent,
    GpsSatellites,
    AltitudeMeters,
    TemperatureCelsius,
    SpeedMetersPerSecond,
}

impl Metric {
    pub fn read(&self, snapshot: &TelemetrySnapshot) -> f64 {
        match self {
            Metric::BatteryPercent => f64::from(snapshot.battery_percent),
            Metric::GpsSatellites => f64::from(snapshot.gps_satellite_count),
            Metric::AltitudeMeters => snapshot.altitude_meters,
            Metric::TemperatureCelsius => snapshot.temperature_celsius,
            Metric::SpeedMetersPerSecond => snapshot.speed_meters_per_second,
        }
    }

    /// Battery and satellites are floors, everything else a ceiling.
    pub fn is_floor(&self) -> bool {
        matches!(self, Metric::BatteryPercent | Metric::GpsSatellites)
    }

    fn breached(&self, value: f64, threshold: f64) -> bool {
        if self.is_floor() {
            value < threshold
        } else {
            value > threshold
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyRule {
    pub name: String,
    pub metric: Metric,
    pub threshold: f64,
    pub severity: Severity,
}

impl SafetyRule {
    pub fn new(name: impl Into<String>, metric: Metric, threshold: f64, severity: Severity) -> Self {
        Self {
            name: name.into(),
            metric,
            threshold,
            severity,
        }
    }

    pub fn critical(name: impl Into<String>, metric: Metric, threshold: f64) -> Self {
        Self::new(name, metric, threshold, Severity::Critical)
    }

    pub fn warning(name: impl Into<String>, metric: Metric, threshold: f64) -> Self {
        Self::new(name, metric, threshold, Severity::Warning)
    }

    pub fn check(&self, snapshot: &TelemetrySnapshot) -> Option<Violation> {
        let value = self.metric.read(snapshot);
        self.metric
            .breached(value, self.threshold)
            .then(|| Violation {
                rule: self.name.clone(),
                metric: self.metric,
                value,
                threshold: self.threshold,
                severity: self.severity,
            })
    }
}

/// Battery < 20 % and fewer than 3 satellites abort; altitude above 120 m
/// and temperature above 60 °C only warn.
pub fn default_rules() -> Vec<SafetyRule> {
    vec![
        SafetyRule::critical("Battery", Metric::BatteryPercent, 20.0),
        SafetyRule::critical("GPS Signal", Metric::GpsSatellites, 3.0),
        SafetyRule::warning("Altitude", Metric::AltitudeMeters, 120.0),
        SafetyRule::warning("Temperature", Metric::TemperatureCelsius, 60.0),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub rule: String,
    pub metric: Metric,
    pub value: f64,
    pub threshold: f64,
    pub severity: Severity,
}

impl Violation {
    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }

    pub fn abort_reason(&self) -> AbortReason {
        AbortReason::SafetyViolation {
            rule: self.rule.clone(),
            value: self.value,
            threshold: self.threshold,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = if self.metric.is_floor() { "below" } else { "above" };
        write!(
            f,
            "{} {} {} {}",
            self.rule, self.value, side, self.threshold
        )
    }
}

/// Every rule breached by `snapshot`, in rule order.
pub fn evaluate(rules: &[SafetyRule], snapshot: &TelemetrySnapshot) -> Vec<Violation> {
    rules.iter().filter_map(|rule| rule.check(snapshot)).collect()
}

/// Hard limits below which a mission must not run at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortThresholds {
    pub battery_percent: u8,
    pub gps_satellites: u32,
}

impl Default for AbortThresholds {
    fn default() -> Self {
        Self {
            battery_percent: 15,
            gps_satellites: 2,
        }
    }
}

impl AbortThresholds {
    pub fn should_abort(&self, snapshot: &TelemetrySnapshot) -> bool {
        should_abort_mission(snapshot, self)
    }
}

pub fn should_abort_mission(snapshot: &TelemetrySnapshot, limits: &AbortThresholds) -> bool {
    snapshot.battery_percent < limits.battery_percent
        || snapshot.gps_satellite_count < limits.gps_satellites
}
