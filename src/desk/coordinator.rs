//! The device state coordinator: turns user intents into wire commands, owns the application
//! visible desk state and runs the alerting policy over telemetry and switch on-durations.
//!
//! Everything runs on one task. Connectivity events are handled before queued commands, timer
//! ticks last, and a fresh [`PanelSnapshot`] is published after every step.

use std::time::{Duration, SystemTime};
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::channel::oneshot;
use futures::future::pending;
use futures::StreamExt;
use log::{debug, error, info, warn};
use tokio::spawn;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, Interval};
use tokio_util::sync::CancellationToken;

use crate::config::types::Config;
use crate::desk::alerts::{AlertId, AlertKind, AlertList, AlertPolicy};
use crate::desk::protocol::WireCommand;
use crate::desk::state::{DeviceState, PanelSnapshot, RgbColor, Switch};
use crate::desk::telemetry::{parse_records, Reading, TelemetryHistory, TelemetrySample};
use crate::device::service::Connectivity;
use crate::device::types::{ConnectionState, ConnectivityEvent, DeviceHandle, ListenerId};
use crate::error::{CommandError, ConnectError};
use crate::sim::telemetry_sim::SampleSource;

enum CoordinatorCommand {
    Toggle { switch: Switch, on: Option<bool>, reply: oneshot::Sender<Result<bool, CommandError>> },
    SetColor { color: RgbColor, reply: oneshot::Sender<Result<(), CommandError>> },
    ClearAlert { id: AlertId, reply: oneshot::Sender<bool> },
    ClearAllAlerts { reply: oneshot::Sender<()> },
    RaiseAlert { message: String, reply: oneshot::Sender<AlertId> },
    // answered once every event queued before it has been handled
    Barrier { reply: oneshot::Sender<()> },
}

/// Handle to the coordinator task; this is the whole surface the presentation layer uses.
#[derive(Clone)]
pub struct DeskCoordinator {
    commands: UnboundedSender<CoordinatorCommand>,
    connectivity: Connectivity,
    snapshot: watch::Receiver<PanelSnapshot>,
}

impl DeskCoordinator {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> CoordinatorCommand) -> Result<T, CommandError> {
        let (reply, receiver) = oneshot::channel();
        let _ = self.commands.unbounded_send(make(reply));
        receiver.await.map_err(|_| CommandError::CoordinatorStopped)
    }

    async fn barrier(&self) {
        let _ = self.request(|reply| CoordinatorCommand::Barrier { reply }).await;
    }

    /// Connect to the desk device. Once this returns the published snapshot reflects the outcome.
    pub async fn connect(&self) -> Result<(), ConnectError> {
        let result = self.connectivity.connect().await;
        self.barrier().await;
        result
    }

    pub async fn disconnect(&self) {
        self.connectivity.disconnect().await;
        self.barrier().await;
    }

    /// Switch the desk power to `on`, or flip it when `None`. Returns the new state.
    pub async fn toggle_desk(&self, on: Option<bool>) -> Result<bool, CommandError> {
        self.request(|reply| CoordinatorCommand::Toggle { switch: Switch::Desk, on, reply }).await?
    }

    pub async fn toggle_heater(&self, on: Option<bool>) -> Result<bool, CommandError> {
        self.request(|reply| CoordinatorCommand::Toggle { switch: Switch::Heater, on, reply }).await?
    }

    /// Set the mood light. Channels are sent as given; keeping them in 0..=255 is up to the caller.
    pub async fn set_color(&self, color: RgbColor) -> Result<(), CommandError> {
        self.request(|reply| CoordinatorCommand::SetColor { color, reply }).await?
    }

    /// Remove one alert. Returns false if no alert has this id.
    pub async fn clear_alert(&self, id: AlertId) -> Result<bool, CommandError> {
        self.request(|reply| CoordinatorCommand::ClearAlert { id, reply }).await
    }

    pub async fn clear_all_alerts(&self) -> Result<(), CommandError> {
        self.request(|reply| CoordinatorCommand::ClearAllAlerts { reply }).await
    }

    pub async fn raise_alert(&self, message: String) -> Result<AlertId, CommandError> {
        self.request(|reply| CoordinatorCommand::RaiseAlert { message, reply }).await
    }

    pub fn snapshot(&self) -> PanelSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PanelSnapshot> {
        self.snapshot.clone()
    }
}

enum Wake {
    Shutdown,
    Connectivity(Option<ConnectivityEvent>),
    Command(Option<CoordinatorCommand>),
    TelemetryTick,
    OnDurationCheck(Switch),
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        },
        None => pending().await,
    }
}

fn at_least_a_millisecond(period: Duration) -> Duration {
    period.max(Duration::from_millis(1))
}

struct CoordinatorTask {
    connectivity: Connectivity,
    policy: AlertPolicy,
    telemetry_interval: Duration,
    source: Option<Box<dyn SampleSource>>,

    connection_state: ConnectionState,
    device_name: Option<String>,
    history: TelemetryHistory,
    device_state: DeviceState,
    alerts: AlertList,
    publisher: watch::Sender<PanelSnapshot>,

    // each timer exists only while its state holds, see `sync_timers`
    telemetry_tick: Option<Interval>,
    desk_check: Option<Interval>,
    heater_check: Option<Interval>,
}

impl CoordinatorTask {
    fn check_timer(&mut self, switch: Switch) -> &mut Option<Interval> {
        match switch {
            Switch::Desk => &mut self.desk_check,
            Switch::Heater => &mut self.heater_check,
        }
    }

    fn sync_timers(&mut self) {
        let connected = self.connection_state == ConnectionState::Connected;

        if !connected || self.source.is_none() {
            self.telemetry_tick = None;
        } else if self.telemetry_tick.is_none() {
            debug!("Starting telemetry intake");
            // first tick completes immediately
            self.telemetry_tick = Some(interval(at_least_a_millisecond(self.telemetry_interval)));
        }

        let period = at_least_a_millisecond(self.policy.check_interval());
        for switch in [Switch::Desk, Switch::Heater] {
            let active = connected && self.device_state.is_on(switch);
            let timer = self.check_timer(switch);

            if !active {
                *timer = None;
            } else if timer.is_none() {
                *timer = Some(interval_at(Instant::now() + period, period));
            }
        }
    }

    fn publish(&self) {
        self.publisher.send_replace(PanelSnapshot {
            connection_state: self.connection_state,
            device_name: self.device_name.clone(),
            history: self.history.to_vec(),
            device_state: self.device_state.clone(),
            alerts: self.alerts.to_vec(),
        });
    }

    fn raise(&mut self, kind: AlertKind, message: String) -> AlertId {
        let alert = self.alerts.push(kind, message, SystemTime::now());
        warn!("Alert [{}]: {}", alert.kind, alert.message);
        alert.id
    }

    fn intake(&mut self, reading: Reading) {
        let sample = TelemetrySample::new(reading, SystemTime::now());
        self.history.push(sample);

        for (kind, message) in self.policy.evaluate_sample(&sample) {
            self.raise(kind, message);
        }
    }

    fn handle_state_change(&mut self, state: ConnectionState, device: Option<DeviceHandle>) {
        self.connection_state = state;
        self.device_name = device.map(|device| device.name);

        match state {
            ConnectionState::Connected => {
                info!("Connected to {}", self.device_name.as_deref().unwrap_or("device"));
                // new session, new history
                self.history.clear();
            },
            ConnectionState::Connecting => debug!("Connecting..."),
            ConnectionState::Disconnected => info!("Disconnected from device"),
            ConnectionState::Error => error!("Connection error"),
        }
    }

    fn handle_connectivity_event(&mut self, event: ConnectivityEvent) {
        match event {
            ConnectivityEvent::StateChange { state, device } => self.handle_state_change(state, device),
            ConnectivityEvent::Data(data) => {
                if self.connection_state != ConnectionState::Connected {
                    return;
                }

                for record in parse_records(&data) {
                    match record {
                        Ok(reading) => self.intake(reading),
                        Err(err) => debug!("Ignoring received data {:?}: {}", data, err),
                    }
                }
            },
        }
    }

    async fn toggle(&mut self, switch: Switch, on: Option<bool>) -> Result<bool, CommandError> {
        let target = on.unwrap_or(!self.device_state.is_on(switch));
        let now = Instant::now();
        let command = WireCommand::Switch { switch, on: target };

        // state only changes after the write went out, so a failure needs no rollback
        if let Err(err) = self.connectivity.send(&command.to_string()).await {
            warn!("Failed to control {}: {}", switch, err);
            return Err(err.into());
        }

        self.device_state.set_switch(switch, target, now);
        // restart the on-duration cadence from the new on-since instant
        *self.check_timer(switch) = None;
        info!("{} turned {}", switch, if target { "ON" } else { "OFF" });
        Ok(target)
    }

    async fn set_color(&mut self, color: RgbColor) -> Result<(), CommandError> {
        if let Err(err) = self.connectivity.send(&WireCommand::Rgb(color).to_string()).await {
            warn!("Failed to set RGB color: {}", err);
            return Err(err.into());
        }

        self.device_state.set_color(color);
        Ok(())
    }

    async fn handle_command(&mut self, command: CoordinatorCommand) {
        match command {
            CoordinatorCommand::Toggle { switch, on, reply } => {
                let result = self.toggle(switch, on).await;
                let _ = reply.send(result);
            },
            CoordinatorCommand::SetColor { color, reply } => {
                let result = self.set_color(color).await;
                let _ = reply.send(result);
            },
            CoordinatorCommand::ClearAlert { id, reply } => {
                let _ = reply.send(self.alerts.remove(id));
            },
            CoordinatorCommand::ClearAllAlerts { reply } => {
                self.alerts.clear();
                let _ = reply.send(());
            },
            CoordinatorCommand::RaiseAlert { message, reply } => {
                let id = self.raise(AlertKind::Custom, message);
                let _ = reply.send(id);
            },
            CoordinatorCommand::Barrier { reply } => {
                let _ = reply.send(());
            },
        }
    }

    fn telemetry_tick(&mut self) {
        let reading = self.source.as_mut().and_then(|source| source.next_reading());
        if let Some(reading) = reading {
            self.intake(reading);
        }
    }

    fn check_on_duration(&mut self, switch: Switch) {
        let Some(since) = self.device_state.on_since(switch) else {
            return;
        };

        if let Some((kind, message)) = self.policy.evaluate_on_duration(switch, since.elapsed()) {
            self.raise(kind, message);
        }
    }

    async fn run(
        mut self,
        cancel: CancellationToken,
        mut commands: UnboundedReceiver<CoordinatorCommand>,
        mut events: UnboundedReceiver<ConnectivityEvent>,
        listener_id: ListenerId,
    ) {
        // the listener is registered first, so later transitions arrive as events
        match self.connectivity.status().await {
            Ok((state, device)) => self.handle_state_change(state, device),
            Err(err) => warn!("Could not query connection state: {}", err),
        }
        self.sync_timers();
        self.publish();

        'mainloop: loop {
            let wake = tokio::select! {
                biased;
                _ = cancel.cancelled() => Wake::Shutdown,
                event = events.next() => Wake::Connectivity(event),
                command = commands.next() => Wake::Command(command),
                _ = next_tick(&mut self.telemetry_tick) => Wake::TelemetryTick,
                _ = next_tick(&mut self.desk_check) => Wake::OnDurationCheck(Switch::Desk),
                _ = next_tick(&mut self.heater_check) => Wake::OnDurationCheck(Switch::Heater),
            };

            match wake {
                Wake::Shutdown | Wake::Command(None) => break 'mainloop,
                Wake::Connectivity(None) => {
                    warn!("Connectivity service stopped");
                    break 'mainloop;
                },
                Wake::Connectivity(Some(event)) => self.handle_connectivity_event(event),
                Wake::Command(Some(command)) => self.handle_command(command).await,
                Wake::TelemetryTick => self.telemetry_tick(),
                Wake::OnDurationCheck(switch) => self.check_on_duration(switch),
            }

            self.sync_timers();
            self.publish();
        }

        info!("Device coordinator stopping");
        self.connectivity.unregister_listener(listener_id);
    }
}

pub fn desk_coordinator(
    connectivity: Connectivity,
    config: &Config,
    source: Option<Box<dyn SampleSource>>,
    cancel: CancellationToken,
) -> (DeskCoordinator, JoinHandle<()>) {
    let (listener_id, events) = connectivity.listen();
    let (command_sender, command_receiver) = unbounded::<CoordinatorCommand>();
    let (publisher, snapshot) = watch::channel(PanelSnapshot::default());

    let task = CoordinatorTask {
        connectivity: connectivity.clone(),
        policy: AlertPolicy::new(config.alerts.clone()),
        telemetry_interval: config.telemetry.interval(),
        source,
        connection_state: ConnectionState::Disconnected,
        device_name: None,
        history: TelemetryHistory::new(config.telemetry.history_capacity),
        device_state: DeviceState::default(),
        alerts: AlertList::default(),
        publisher,
        telemetry_tick: None,
        desk_check: None,
        heater_check: None,
    };
    let handle = spawn(task.run(cancel, command_receiver, events, listener_id));

    let coordinator = DeskCoordinator {
        commands: command_sender,
        connectivity,
        snapshot,
    };
    (coordinator, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use tokio::time::sleep;

    use crate::device::mock::{MockController, MockTransport};
    use crate::device::service::connectivity_service;
    use crate::error::SendError;
    use crate::sim::telemetry_sim::SyntheticSource;

    struct ScriptedSource(VecDeque<Reading>);

    impl SampleSource for ScriptedSource {
        fn next_reading(&mut self) -> Option<Reading> {
            self.0.pop_front()
        }
    }

    fn scripted(readings: &[(f64, f64)]) -> Option<Box<dyn SampleSource>> {
        let readings = readings
            .iter()
            .map(|&(temperature, humidity)| Reading { temperature, humidity })
            .collect();
        Some(Box::new(ScriptedSource(readings)))
    }

    fn start(source: Option<Box<dyn SampleSource>>) -> (DeskCoordinator, MockController, CancellationToken) {
        let (transport, controller) = MockTransport::new();
        let cancel = CancellationToken::new();
        let config = Config::default();
        let (connectivity, _) = connectivity_service(Arc::new(transport), &config.device, cancel.clone());
        let (coordinator, _) = desk_coordinator(connectivity, &config, source, cancel.clone());
        (coordinator, controller, cancel)
    }

    fn count(snapshot: &PanelSnapshot, kind: AlertKind) -> usize {
        snapshot.alerts.iter().filter(|alert| alert.kind == kind).count()
    }

    #[tokio::test(start_paused = true)]
    async fn hot_sample_raises_one_temperature_alert() {
        let (coordinator, _controller, _cancel) = start(scripted(&[(36.2, 45.0)]));
        coordinator.connect().await.unwrap();

        let mut rx = coordinator.subscribe();
        let snapshot = rx.wait_for(|s| !s.history.is_empty()).await.unwrap().clone();

        assert_eq!(snapshot.alerts.len(), 1);
        assert_eq!(snapshot.alerts[0].kind, AlertKind::Temperature);
        assert!(snapshot.alerts[0].message.contains("36.2"));
        assert_eq!(snapshot.latest_sample().map(|s| s.temperature), Some(36.2));
    }

    #[tokio::test(start_paused = true)]
    async fn samples_within_limits_raise_nothing() {
        let (coordinator, _controller, _cancel) = start(scripted(&[(35.0, 30.0), (20.0, 29.9)]));
        coordinator.connect().await.unwrap();

        let mut rx = coordinator.subscribe();
        let snapshot = rx.wait_for(|s| s.history.len() == 2).await.unwrap().clone();

        assert_eq!(count(&snapshot, AlertKind::Temperature), 0);
        assert_eq!(count(&snapshot, AlertKind::Humidity), 1);
        assert_eq!(snapshot.alerts[0].message, "Low humidity detected: 29.9%");
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_desk_without_argument_turns_it_on() {
        let (coordinator, controller, _cancel) = start(None);
        coordinator.connect().await.unwrap();

        let called_at = Instant::now();
        assert!(coordinator.toggle_desk(None).await.unwrap());

        let state = coordinator.snapshot().device_state;
        assert!(state.desk_on());
        assert_eq!(state.desk_on_since(), Some(called_at));
        assert_eq!(controller.writes(), vec!["D_ON".to_string()]);

        assert!(!coordinator.toggle_desk(None).await.unwrap());
        let state = coordinator.snapshot().device_state;
        assert!(!state.desk_on());
        assert_eq!(state.desk_on_since(), None);
        assert_eq!(controller.writes(), vec!["D_ON".to_string(), "D_OFF".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn on_since_tracks_the_switch_over_any_sequence() {
        let (coordinator, _controller, _cancel) = start(None);
        coordinator.connect().await.unwrap();

        let steps = [None, Some(true), Some(true), None, Some(false), None, Some(false)];
        for (index, step) in steps.into_iter().enumerate() {
            if index % 2 == 0 {
                coordinator.toggle_desk(step).await.unwrap();
            } else {
                coordinator.toggle_heater(step).await.unwrap();
            }

            let state = coordinator.snapshot().device_state;
            assert_eq!(state.desk_on(), state.desk_on_since().is_some());
            assert_eq!(state.heater_on(), state.heater_on_since().is_some());
            sleep(Duration::from_secs(1)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_send_leaves_state_unchanged() {
        let (coordinator, controller, _cancel) = start(None);

        let result = coordinator.toggle_heater(None).await;
        assert!(matches!(result, Err(CommandError::Send { source: SendError::NotConnected })));
        assert!(!coordinator.snapshot().device_state.heater_on());

        coordinator.connect().await.unwrap();
        controller.fail_writes(true);
        assert!(coordinator.set_color(RgbColor { r: 1, g: 2, b: 3 }).await.is_err());
        assert_eq!(coordinator.snapshot().device_state.color(), RgbColor::default());
        assert!(coordinator.toggle_desk(Some(true)).await.is_err());
        assert!(!coordinator.snapshot().device_state.desk_on());
    }

    #[tokio::test(start_paused = true)]
    async fn set_color_is_not_clamped() {
        let (coordinator, controller, _cancel) = start(None);
        coordinator.connect().await.unwrap();

        let color = RgbColor { r: 300, g: -5, b: 10 };
        coordinator.set_color(color).await.unwrap();

        assert_eq!(controller.writes(), vec!["RGB:300,-5,10".to_string()]);
        assert_eq!(coordinator.snapshot().device_state.color(), color);
    }

    #[tokio::test(start_paused = true)]
    async fn desk_timeout_repeats_every_check_after_the_limit() {
        let (coordinator, _controller, _cancel) = start(None);
        coordinator.connect().await.unwrap();
        coordinator.toggle_desk(None).await.unwrap();

        sleep(Duration::from_secs(19 * 60 + 30)).await;
        assert_eq!(count(&coordinator.snapshot(), AlertKind::DeskTimeout), 0);

        sleep(Duration::from_secs(60)).await;
        let snapshot = coordinator.snapshot();
        assert_eq!(count(&snapshot, AlertKind::DeskTimeout), 1);
        assert_eq!(snapshot.alerts[0].message, "Your desk has been ON for more than 20 minutes");

        sleep(Duration::from_secs(5 * 60)).await;
        assert_eq!(count(&coordinator.snapshot(), AlertKind::DeskTimeout), 6);
        assert_eq!(count(&coordinator.snapshot(), AlertKind::HeaterTimeout), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn turning_the_switch_off_stops_its_checks() {
        let (coordinator, _controller, _cancel) = start(None);
        coordinator.connect().await.unwrap();
        coordinator.toggle_heater(Some(true)).await.unwrap();

        sleep(Duration::from_secs(20 * 60 + 30)).await;
        assert_eq!(count(&coordinator.snapshot(), AlertKind::HeaterTimeout), 1);

        coordinator.toggle_heater(Some(false)).await.unwrap();
        sleep(Duration::from_secs(10 * 60)).await;
        assert_eq!(count(&coordinator.snapshot(), AlertKind::HeaterTimeout), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn switching_on_again_restarts_the_on_duration() {
        let (coordinator, _controller, _cancel) = start(None);
        coordinator.connect().await.unwrap();
        coordinator.toggle_heater(Some(true)).await.unwrap();

        sleep(Duration::from_secs(15 * 60)).await;
        coordinator.toggle_heater(Some(true)).await.unwrap();

        sleep(Duration::from_secs(15 * 60 + 30)).await;
        assert_eq!(count(&coordinator.snapshot(), AlertKind::HeaterTimeout), 0);

        sleep(Duration::from_secs(5 * 60)).await;
        assert_eq!(count(&coordinator.snapshot(), AlertKind::HeaterTimeout), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_stops_telemetry_and_checks_but_keeps_state() {
        let (coordinator, _controller, _cancel) = start(Some(Box::new(SyntheticSource::with_seed(3))));
        coordinator.connect().await.unwrap();
        coordinator.toggle_desk(Some(true)).await.unwrap();
        coordinator.set_color(RgbColor { r: 10, g: 20, b: 30 }).await.unwrap();

        sleep(Duration::from_secs(10)).await;
        assert_eq!(coordinator.snapshot().history.len(), 4);
        assert_eq!(coordinator.snapshot().device_name.as_deref(), Some("HC-05"));

        coordinator.disconnect().await;
        let before = coordinator.snapshot();
        assert_eq!(before.connection_state, ConnectionState::Disconnected);
        assert_eq!(before.device_name, None);
        assert!(before.device_state.desk_on());
        assert_eq!(before.device_state.color(), RgbColor { r: 10, g: 20, b: 30 });

        sleep(Duration::from_secs(30 * 60)).await;
        let after = coordinator.snapshot();
        assert_eq!(after.history.len(), before.history.len());
        assert_eq!(after.alerts.len(), before.alerts.len());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_starts_an_empty_history() {
        let (coordinator, _controller, _cancel) = start(Some(Box::new(SyntheticSource::with_seed(5))));
        coordinator.connect().await.unwrap();
        sleep(Duration::from_secs(7)).await;
        assert_eq!(coordinator.snapshot().history.len(), 3);

        coordinator.disconnect().await;
        coordinator.connect().await.unwrap();

        let mut rx = coordinator.subscribe();
        let snapshot = rx.wait_for(|s| s.is_connected() && !s.history.is_empty()).await.unwrap().clone();
        assert_eq!(snapshot.history.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn history_is_capped_at_thirty() {
        let (coordinator, _controller, _cancel) = start(Some(Box::new(SyntheticSource::with_seed(9))));
        coordinator.connect().await.unwrap();

        sleep(Duration::from_secs(3 * 40)).await;
        let history = coordinator.snapshot().history;
        assert_eq!(history.len(), 30);
        assert!(history.windows(2).all(|pair| pair[0].timestamp <= pair[1].timestamp));
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_telemetry_is_parsed_into_samples() {
        let (coordinator, controller, _cancel) = start(None);
        coordinator.connect().await.unwrap();

        assert!(controller.push_data("TEMP:36.5,HUM:20\n"));
        assert!(controller.push_data("garbage"));

        let mut rx = coordinator.subscribe();
        let snapshot = rx.wait_for(|s| !s.history.is_empty()).await.unwrap().clone();
        assert_eq!(snapshot.history.len(), 1);
        assert_eq!(count(&snapshot, AlertKind::Temperature), 1);
        assert_eq!(count(&snapshot, AlertKind::Humidity), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn peer_drop_is_published_as_disconnected() {
        let (coordinator, controller, _cancel) = start(None);
        coordinator.connect().await.unwrap();
        coordinator.toggle_desk(Some(true)).await.unwrap();

        assert!(controller.drop_link());
        let mut rx = coordinator.subscribe();
        let snapshot = rx.wait_for(|s| s.connection_state == ConnectionState::Disconnected).await.unwrap().clone();
        assert_eq!(snapshot.device_name, None);

        sleep(Duration::from_secs(30 * 60)).await;
        assert_eq!(count(&coordinator.snapshot(), AlertKind::DeskTimeout), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn link_failure_is_published_as_error_and_stops_timers() {
        let (coordinator, controller, _cancel) = start(Some(Box::new(SyntheticSource::with_seed(11))));
        coordinator.connect().await.unwrap();
        coordinator.toggle_desk(Some(true)).await.unwrap();
        coordinator.toggle_heater(Some(true)).await.unwrap();
        sleep(Duration::from_secs(4)).await;

        assert!(controller.fail_link("gatt notification error"));
        let mut rx = coordinator.subscribe();
        let before = rx.wait_for(|s| s.connection_state == ConnectionState::Error).await.unwrap().clone();
        assert_eq!(before.device_name, None);
        assert_eq!(controller.closes(), 1);
        assert!(before.device_state.desk_on());
        assert!(before.device_state.heater_on());

        sleep(Duration::from_secs(30 * 60)).await;
        let after = coordinator.snapshot();
        assert_eq!(after.history.len(), before.history.len());
        assert_eq!(count(&after, AlertKind::DeskTimeout), 0);
        assert_eq!(count(&after, AlertKind::HeaterTimeout), 0);
        assert_eq!(after.alerts.len(), before.alerts.len());
    }

    #[tokio::test(start_paused = true)]
    async fn huge_check_interval_does_not_stop_the_coordinator() {
        let (transport, _controller) = MockTransport::new();
        let cancel = CancellationToken::new();
        let mut config = Config::default();
        config.alerts.check_interval_ms = u64::MAX;
        let (connectivity, _) = connectivity_service(Arc::new(transport), &config.device, cancel.clone());
        let (coordinator, _) = desk_coordinator(connectivity, &config, None, cancel.clone());

        coordinator.connect().await.unwrap();
        assert!(coordinator.toggle_desk(None).await.unwrap());
        sleep(Duration::from_secs(60 * 60)).await;

        assert!(!coordinator.toggle_desk(None).await.unwrap());
        assert_eq!(count(&coordinator.snapshot(), AlertKind::DeskTimeout), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connect_is_published_as_error() {
        let (coordinator, controller, _cancel) = start(None);
        controller.script_connect(Err(ConnectError::UnsupportedPlatform));

        let result = coordinator.connect().await;
        assert!(matches!(result, Err(ConnectError::UnsupportedPlatform)));
        assert_eq!(coordinator.snapshot().connection_state, ConnectionState::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn alerts_can_be_cleared_one_by_one_or_all_at_once() {
        let (coordinator, _controller, _cancel) = start(None);

        let first = coordinator.raise_alert("first".to_string()).await.unwrap();
        let second = coordinator.raise_alert("second".to_string()).await.unwrap();
        let _third = coordinator.raise_alert("third".to_string()).await.unwrap();

        assert!(coordinator.clear_alert(second).await.unwrap());
        assert!(!coordinator.clear_alert(second).await.unwrap());

        let messages: Vec<_> = coordinator.snapshot().alerts.into_iter().map(|alert| alert.message).collect();
        assert_eq!(messages, vec!["third", "first"]);
        assert_eq!(coordinator.snapshot().alerts[1].id, first);
        assert_eq!(coordinator.snapshot().alerts[0].kind, AlertKind::Custom);

        coordinator.clear_all_alerts().await.unwrap();
        assert!(coordinator.snapshot().alerts.is_empty());
        coordinator.clear_all_alerts().await.unwrap();
        assert!(coordinator.snapshot().alerts.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_coordinator_reports_it() {
        let (coordinator, _controller, cancel) = start(None);
        cancel.cancel();
        sleep(Duration::from_millis(1)).await;

        assert!(matches!(coordinator.toggle_desk(None).await, Err(CommandError::CoordinatorStopped)));
    }
}
