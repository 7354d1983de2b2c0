use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, SystemTime};

use crate::config::types::AlertConfig;
use crate::desk::state::Switch;
use crate::desk::telemetry::TelemetrySample;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertKind {
    Temperature,
    Humidity,
    DeskTimeout,
    HeaterTimeout,
    Custom,
}

impl AlertKind {
    pub fn timeout_for(switch: Switch) -> Self {
        match switch {
            Switch::Desk => AlertKind::DeskTimeout,
            Switch::Heater => AlertKind::HeaterTimeout,
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            AlertKind::Temperature => "temperature",
            AlertKind::Humidity => "humidity",
            AlertKind::DeskTimeout => "desk_timeout",
            AlertKind::HeaterTimeout => "heater_timeout",
            AlertKind::Custom => "custom",
        };

        write!(f, "{}", result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlertId(pub u64);

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub id: AlertId,
    pub kind: AlertKind,
    pub message: String,
    pub created_at: SystemTime,
}

/// Newest-first list of alerts. Alerts are only ever added or removed, never edited.
#[derive(Debug, Clone, Default)]
pub struct AlertList {
    alerts: VecDeque<Alert>,
    next_id: u64,
}

impl AlertList {
    pub fn push(&mut self, kind: AlertKind, message: String, created_at: SystemTime) -> &Alert {
        self.next_id += 1;
        self.alerts.push_front(Alert {
            id: AlertId(self.next_id),
            kind,
            message,
            created_at,
        });
        &self.alerts[0]
    }

    /// Remove the alert with `id`. Returns false if there was none.
    pub fn remove(&mut self, id: AlertId) -> bool {
        match self.alerts.iter().position(|alert| alert.id == id) {
            Some(index) => {
                self.alerts.remove(index);
                true
            },
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.alerts.clear();
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Alert> {
        self.alerts.iter().cloned().collect()
    }
}

/// Derives alerts from telemetry samples and switch on-durations.
#[derive(Debug, Clone)]
pub struct AlertPolicy {
    config: AlertConfig,
}

impl AlertPolicy {
    pub fn new(config: AlertConfig) -> Self {
        AlertPolicy { config }
    }

    pub fn check_interval(&self) -> Duration {
        self.config.check_interval()
    }

    /// Alerts raised by a single sample. Every qualifying sample produces its alerts again.
    pub fn evaluate_sample(&self, sample: &TelemetrySample) -> Vec<(AlertKind, String)> {
        let mut alerts = Vec::new();

        if sample.temperature > self.config.temperature_max {
            alerts.push((
                AlertKind::Temperature,
                format!("High temperature detected: {:.1}°C", sample.temperature),
            ));
        }

        if sample.humidity < self.config.humidity_min {
            alerts.push((
                AlertKind::Humidity,
                format!("Low humidity detected: {:.1}%", sample.humidity),
            ));
        }

        alerts
    }

    /// The timeout alert for `switch` when it has been on for at least the configured limit.
    pub fn evaluate_on_duration(&self, switch: Switch, on_for: Duration) -> Option<(AlertKind, String)> {
        if on_for < self.config.on_duration_limit() {
            return None;
        }

        let minutes = self.config.on_duration_limit_secs / 60;
        Some((
            AlertKind::timeout_for(switch),
            format!("Your {} has been ON for more than {} minutes", switch, minutes),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desk::telemetry::Reading;

    fn sample(temperature: f64, humidity: f64) -> TelemetrySample {
        TelemetrySample::new(Reading { temperature, humidity }, SystemTime::now())
    }

    fn kinds(alerts: &[(AlertKind, String)]) -> Vec<AlertKind> {
        alerts.iter().map(|(kind, _)| *kind).collect()
    }

    #[test]
    fn temperature_threshold_is_exclusive() {
        let policy = AlertPolicy::new(AlertConfig::default());

        assert!(policy.evaluate_sample(&sample(35.0, 50.0)).is_empty());

        let alerts = policy.evaluate_sample(&sample(36.24, 50.0));
        assert_eq!(kinds(&alerts), vec![AlertKind::Temperature]);
        assert_eq!(alerts[0].1, "High temperature detected: 36.2°C");
    }

    #[test]
    fn humidity_threshold_is_exclusive() {
        let policy = AlertPolicy::new(AlertConfig::default());

        assert!(policy.evaluate_sample(&sample(20.0, 30.0)).is_empty());

        let alerts = policy.evaluate_sample(&sample(20.0, 25.0));
        assert_eq!(kinds(&alerts), vec![AlertKind::Humidity]);
        assert_eq!(alerts[0].1, "Low humidity detected: 25.0%");
    }

    #[test]
    fn one_sample_can_raise_both() {
        let policy = AlertPolicy::new(AlertConfig::default());
        let alerts = policy.evaluate_sample(&sample(40.0, 10.0));
        assert_eq!(kinds(&alerts), vec![AlertKind::Temperature, AlertKind::Humidity]);
    }

    #[test]
    fn on_duration_limit_is_inclusive() {
        let policy = AlertPolicy::new(AlertConfig::default());

        assert_eq!(policy.evaluate_on_duration(Switch::Desk, Duration::from_secs(19 * 60 + 59)), None);

        let (kind, message) = policy.evaluate_on_duration(Switch::Desk, Duration::from_secs(20 * 60)).unwrap();
        assert_eq!(kind, AlertKind::DeskTimeout);
        assert_eq!(message, "Your desk has been ON for more than 20 minutes");

        let (kind, message) = policy.evaluate_on_duration(Switch::Heater, Duration::from_secs(45 * 60)).unwrap();
        assert_eq!(kind, AlertKind::HeaterTimeout);
        assert_eq!(message, "Your heater has been ON for more than 20 minutes");
    }

    #[test]
    fn list_is_newest_first_and_removal_is_by_id() {
        let mut list = AlertList::default();
        let first = list.push(AlertKind::Custom, "first".to_string(), SystemTime::now()).id;
        let second = list.push(AlertKind::Custom, "second".to_string(), SystemTime::now()).id;
        assert_ne!(first, second);

        let messages: Vec<_> = list.to_vec().into_iter().map(|alert| alert.message).collect();
        assert_eq!(messages, vec!["second", "first"]);

        assert!(list.remove(first));
        assert!(!list.remove(first));
        assert_eq!(list.len(), 1);

        list.clear();
        list.clear();
        assert!(list.is_empty());
    }

    #[test]
    fn identical_alerts_are_not_deduplicated() {
        let mut list = AlertList::default();
        list.push(AlertKind::Temperature, "same".to_string(), SystemTime::now());
        list.push(AlertKind::Temperature, "same".to_string(), SystemTime::now());
        assert_eq!(list.len(), 2);
    }
}
