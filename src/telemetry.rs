use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::LinkError;

/// Point-in-time reading of the vehicle's status. One instance per poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    pub battery_percent: u8,
    pub altitude_meters: f64,
    pub speed_meters_per_second: f64,
    pub temperature_celsius: f64,
    pub is_flying: bool,
    pub gps_satellite_count: u32,
    pub captured_at: DateTime<Utc>,
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        Self {
            battery_percent: 100,
            altitude_meters: 0.0,
            speed_meters_per_second: 0.0,
            temperature_celsius: 25.0,
            is_flying: false,
            gps_satellite_count: 8,
            captured_at: Utc::now(),
        }
    }
}

impl TelemetrySnapshot {
    /// Parse a `key:value;` state record as sent by the vehicle.
    ///
    /// Unknown keys are ignored; every known key is required.
    pub fn parse(record: &str) -> Result<Self, LinkError> {
        let fields: HashMap<&str, &str> = record
            .trim()
            .split(';')
            .filter(|pair| !pair.trim().is_empty())
            .filter_map(|pair| pair.split_once(':'))
            .map(|(k, v)| (k.trim(), v.trim()))
            .collect();

        let battery: u8 = field(&fields, "bat")?;
        if battery > 100 {
            return Err(LinkError::InvalidResponse(format!(
                "battery reading {} out of range",
                battery
            )));
        }
        let flying: u8 = field(&fields, "fly")?;

        Ok(Self {
            battery_percent: battery,
            altitude_meters: field::<f64>(&fields, "alt")?.max(0.0),
            speed_meters_per_second: field::<f64>(&fields, "spd")?.abs(),
            temperature_celsius: field(&fields, "temp")?,
            is_flying: flying != 0,
            gps_satellite_count: field(&fields, "gps")?,
            captured_at: Utc::now(),
        })
    }

    /// Inverse of [`TelemetrySnapshot::parse`].
    pub fn to_record(&self) -> String {
        format!(
            "bat:{};alt:{:.2};spd:{:.2};temp:{:.1};fly:{};gps:{};",
            self.battery_percent,
            self.altitude_meters,
            self.speed_meters_per_second,
            self.temperature_celsius,
            u8::from(self.is_flying),
            self.gps_satellite_count
        )
    }
}

fn field<T: FromStr>(fields: &HashMap<&str, &str>, key: &str) -> Result<T, LinkError> {
    let raw = fields
        .get(key)
        .ok_or_else(|| LinkError::InvalidResponse(format!("telemetry is missing '{}'", key)))?;
    raw.parse()
        .map_err(|_| LinkError::InvalidResponse(format!("telemetry field {}={}", key, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_state_record() {
        let snapshot =
            TelemetrySnapshot::parse("bat:85;alt:12.5;spd:3.20;temp:41;fly:1;gps:7;pitch:0;\r\n")
                .unwrap();
        assert_eq!(snapshot.battery_percent, 85);
        assert_eq!(snapshot.altitude_meters, 12.5);
        assert_eq!(snapshot.speed_meters_per_second, 3.2);
        assert_eq!(snapshot.temperature_celsius, 41.0);
        assert!(snapshot.is_flying);
        assert_eq!(snapshot.gps_satellite_count, 7);
    }

    #[test]
    fn clamps_negative_altitude() {
        let snapshot =
            TelemetrySnapshot::parse("bat:50;alt:-0.3;spd:0;temp:20;fly:0;gps:4;").unwrap();
        assert_eq!(snapshot.altitude_meters, 0.0);
    }

    #[test]
    fn rejects_incomplete_or_garbled_records() {
        assert!(matches!(
            TelemetrySnapshot::parse("bat:85;alt:1;"),
            Err(LinkError::InvalidResponse(_))
        ));
        assert!(matches!(
            TelemetrySnapshot::parse("bat:high;alt:1;spd:0;temp:20;fly:0;gps:4;"),
            Err(LinkError::InvalidResponse(_))
        ));
        assert!(matches!(
            TelemetrySnapshot::parse("bat:180;alt:1;spd:0;temp:20;fly:0;gps:4;"),
            Err(LinkError::InvalidResponse(_))
        ));
    }

    #[test]
    fn record_reparses() {
        let snapshot = TelemetrySnapshot {
            battery_percent: 64,
            altitude_meters: 3.5,
            is_flying: true,
            ..Default::default()
        };
        let parsed = TelemetrySnapshot::parse(&snapshot.to_record()).unwrap();
        assert_eq!(parsed.battery_percent, 64);
        assert_eq!(parsed.altitude_meters, 3.5);
        assert!(parsed.is_flying);
    }
}
