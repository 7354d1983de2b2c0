use std::time::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::constants::{
    CLOSE_DEADLINE, DEVICE_NAME_PREFIX, SCAN_TIMEOUT, SERIAL_DATA_UUID, SERIAL_SERVICE_UUID, WRITE_DEADLINE,
};

// Longest timer or deadline accepted from the config file (one year). Larger values are clamped so
// that adding them to the current instant cannot overflow.
const MAX_CONFIG_MILLIS: u64 = 365 * 24 * 60 * 60 * 1000;

fn config_millis(millis: u64) -> Duration {
    Duration::from_millis(millis.min(MAX_CONFIG_MILLIS))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceConfig {
    // peripherals whose advertised name starts with this prefix are accepted
    pub name_prefix: String,
    // ... as are peripherals advertising this service
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
    pub scan_timeout_ms: u64,
    pub write_deadline_ms: u64,
    // how long tearing down a link may take before it is abandoned
    pub close_deadline_ms: u64,
}

impl DeviceConfig {
    pub fn scan_timeout(&self) -> Duration {
        config_millis(self.scan_timeout_ms)
    }

    pub fn write_deadline(&self) -> Duration {
        config_millis(self.write_deadline_ms)
    }

    pub fn close_deadline(&self) -> Duration {
        config_millis(self.close_deadline_ms)
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            name_prefix: DEVICE_NAME_PREFIX.to_string(),
            service_uuid: SERIAL_SERVICE_UUID,
            characteristic_uuid: SERIAL_DATA_UUID,
            scan_timeout_ms: SCAN_TIMEOUT,
            write_deadline_ms: WRITE_DEADLINE,
            close_deadline_ms: CLOSE_DEADLINE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelemetryConfig {
    pub interval_ms: u64,
    pub history_capacity: usize,
    // generate readings locally instead of waiting for the device to report them
    pub simulate: bool,
}

impl TelemetryConfig {
    pub fn interval(&self) -> Duration {
        config_millis(self.interval_ms)
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            interval_ms: 3000,
            history_capacity: 30,
            simulate: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertConfig {
    // °C, readings strictly above raise an alert
    pub temperature_max: f64,
    // %RH, readings strictly below raise an alert
    pub humidity_min: f64,
    pub on_duration_limit_secs: u64,
    pub check_interval_ms: u64,
}

impl AlertConfig {
    pub fn on_duration_limit(&self) -> Duration {
        Duration::from_secs(self.on_duration_limit_secs)
    }

    pub fn check_interval(&self) -> Duration {
        config_millis(self.check_interval_ms)
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        AlertConfig {
            temperature_max: 35.0,
            humidity_min: 30.0,
            on_duration_limit_secs: 20 * 60,
            check_interval_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub device: DeviceConfig,
    pub telemetry: TelemetryConfig,
    pub alerts: AlertConfig,
}
