use std::fmt::Write;
use std::time::Duration;
use tokio::time::Instant;

use crate::desk::alerts::{Alert, AlertId};
use crate::desk::state::{PanelSnapshot, Switch};
use crate::device::types::ConnectionState;

fn format_on_duration(since: Instant, now: Instant) -> String {
    let elapsed = now.saturating_duration_since(since);
    humantime::format_duration(Duration::from_secs(elapsed.as_secs())).to_string()
}

fn format_switch(snapshot: &PanelSnapshot, switch: Switch, now: Instant) -> String {
    match snapshot.device_state.on_since(switch) {
        Some(since) => format!("{}: ON for {}", switch, format_on_duration(since, now)),
        None => format!("{}: OFF", switch),
    }
}

pub fn format_connection(snapshot: &PanelSnapshot) -> String {
    match (&snapshot.connection_state, &snapshot.device_name) {
        (ConnectionState::Connected, Some(name)) => format!("Connection: {} ({})", snapshot.connection_state, name),
        (state, _) => format!("Connection: {}", state),
    }
}

pub fn format_alert(alert: &Alert) -> String {
    format!(
        "#{} [{}] {} ({})",
        alert.id,
        alert.kind,
        alert.message,
        humantime::format_rfc3339_seconds(alert.created_at),
    )
}

pub fn format_alerts(snapshot: &PanelSnapshot) -> String {
    if snapshot.alerts.is_empty() {
        return "No alerts".to_string();
    }

    let mut out = String::new();
    for alert in &snapshot.alerts {
        let _ = writeln!(out, "{}", format_alert(alert));
    }
    out.truncate(out.trim_end().len());
    out
}

pub fn format_status(snapshot: &PanelSnapshot, now: Instant) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", format_connection(snapshot));

    match snapshot.latest_sample() {
        Some(sample) => {
            let _ = writeln!(
                out,
                "Latest reading: {:.1}°C, {:.1}% at {} ({} samples kept)",
                sample.temperature,
                sample.humidity,
                humantime::format_rfc3339_seconds(sample.timestamp),
                snapshot.history.len(),
            );
        },
        None => {
            let _ = writeln!(out, "Latest reading: none");
        },
    }

    let _ = writeln!(out, "{}", format_switch(snapshot, Switch::Desk, now));
    let _ = writeln!(out, "{}", format_switch(snapshot, Switch::Heater, now));
    let color = snapshot.device_state.color();
    let _ = writeln!(out, "Light: {}, {}, {}", color.r, color.g, color.b);
    let _ = write!(out, "Alerts: {}", snapshot.alerts.len());
    out
}

/// Turns successive snapshots into the lines worth printing unprompted.
#[derive(Debug, Default)]
pub struct ChangeReporter {
    connection_state: Option<ConnectionState>,
    newest_alert: Option<AlertId>,
}

impl ChangeReporter {
    pub fn new(initial: &PanelSnapshot) -> Self {
        ChangeReporter {
            connection_state: Some(initial.connection_state),
            newest_alert: initial.alerts.first().map(|alert| alert.id),
        }
    }

    pub fn changes(&mut self, snapshot: &PanelSnapshot) -> Vec<String> {
        let mut lines = Vec::new();

        if self.connection_state != Some(snapshot.connection_state) {
            self.connection_state = Some(snapshot.connection_state);
            lines.push(format_connection(snapshot));
        }

        let newest_alert = self.newest_alert;
        let fresh: Vec<&Alert> = snapshot.alerts.iter()
            .take_while(|alert| newest_alert.map_or(true, |newest| alert.id > newest))
            .collect();

        // alerts are newest first, print them in the order they were raised
        for alert in fresh.iter().rev() {
            lines.push(format!("Alert {}", format_alert(alert)));
        }
        if let Some(alert) = fresh.first() {
            self.newest_alert = Some(alert.id);
        }

        lines
    }
}
