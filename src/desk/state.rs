use std::fmt;
use tokio::time::Instant;

use crate::desk::alerts::Alert;
use crate::desk::telemetry::TelemetrySample;
use crate::device::types::ConnectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Switch {
    Desk,
    Heater,
}

impl fmt::Display for Switch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            Switch::Desk => "desk",
            Switch::Heater => "heater",
        };

        write!(f, "{}", result)
    }
}

/// Mood light color. Channels are expected in 0..=255 but are not validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RgbColor {
    pub r: i32,
    pub g: i32,
    pub b: i32,
}

impl Default for RgbColor {
    fn default() -> Self {
        RgbColor { r: 128, g: 0, b: 255 }
    }
}

/// Last commanded state of the desk device.
///
/// A switch is on exactly when it has an on-since instant, so the two can not disagree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceState {
    desk_on_since: Option<Instant>,
    heater_on_since: Option<Instant>,
    color: RgbColor,
}

impl DeviceState {
    pub fn desk_on(&self) -> bool {
        self.desk_on_since.is_some()
    }

    pub fn desk_on_since(&self) -> Option<Instant> {
        self.desk_on_since
    }

    pub fn heater_on(&self) -> bool {
        self.heater_on_since.is_some()
    }

    pub fn heater_on_since(&self) -> Option<Instant> {
        self.heater_on_since
    }

    pub fn color(&self) -> RgbColor {
        self.color
    }

    pub fn is_on(&self, switch: Switch) -> bool {
        self.on_since(switch).is_some()
    }

    pub fn on_since(&self, switch: Switch) -> Option<Instant> {
        match switch {
            Switch::Desk => self.desk_on_since,
            Switch::Heater => self.heater_on_since,
        }
    }

    pub(crate) fn set_switch(&mut self, switch: Switch, on: bool, now: Instant) {
        let since = if on { Some(now) } else { None };
        match switch {
            Switch::Desk => self.desk_on_since = since,
            Switch::Heater => self.heater_on_since = since,
        }
    }

    pub(crate) fn set_color(&mut self, color: RgbColor) {
        self.color = color;
    }
}

/// Everything the presentation layer may read, published as one immutable value.
#[derive(Debug, Clone)]
pub struct PanelSnapshot {
    pub connection_state: ConnectionState,
    pub device_name: Option<String>,
    // oldest first
    pub history: Vec<TelemetrySample>,
    pub device_state: DeviceState,
    // newest first
    pub alerts: Vec<Alert>,
}

impl PanelSnapshot {
    pub fn latest_sample(&self) -> Option<&TelemetrySample> {
        self.history.last()
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state == ConnectionState::Connected
    }
}

impl Default for PanelSnapshot {
    fn default() -> Self {
        PanelSnapshot {
            connection_state: ConnectionState::Disconnected,
            device_name: None,
            history: Vec::new(),
            device_state: DeviceState::default(),
            alerts: Vec::new(),
        }
    }
}
