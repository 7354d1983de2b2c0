use std::sync::Arc;
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio::time::{sleep, Duration, Instant};

use crate::config::types::DeviceConfig;
use crate::device::constants::{SCAN_POLL_DELAY, UNKNOWN_DEVICE_NAME};
use crate::device::transport::{Connection, Link, Transport};
use crate::device::types::{DeviceHandle, LinkEvent};
use crate::error::{ConnectError, DeviceError};

/// Bluetooth LE backend for HC-05 / HM-10 style serial modules.
pub struct BtleTransport {
    config: DeviceConfig,
}

impl BtleTransport {
    pub fn new(config: DeviceConfig) -> Self {
        BtleTransport { config }
    }
}

impl Transport for BtleTransport {
    fn open(&self) -> BoxFuture<'static, Result<Connection, ConnectError>> {
        let config = self.config.clone();
        open_connection(config).boxed()
    }
}

fn matches_filter(config: &DeviceConfig, local_name: Option<&str>, services: &[uuid::Uuid]) -> bool {
    // Some environments ignore the scan filter, so make sure to check the service uuid again
    let name_matches = local_name
        .map(|name| name.starts_with(&config.name_prefix))
        .unwrap_or(false);

    name_matches || services.contains(&config.service_uuid)
}

async fn find_peripheral(config: &DeviceConfig, adapters: &[Adapter]) -> Option<(Adapter, Peripheral, DeviceHandle)> {
    for adapter in adapters {
        let peripherals = match adapter.peripherals().await {
            Ok(v) => v,
            Err(err) => {
                warn!("Failed to query BLE adapter for peripherals: {}", err);
                continue;
            },
        };

        for peripheral in peripherals {
            match peripheral.properties().await {
                Err(err) => {
                    warn!("Could not query peripheral for properties: {:?}", err);
                },
                Ok(None) => {
                    debug!("Peripheral has no properties");
                },
                Ok(Some(properties)) => {
                    if matches_filter(config, properties.local_name.as_deref(), &properties.services) {
                        info!(
                            "Using peripheral {} {:?} {}",
                            properties.address,
                            properties.local_name,
                            properties.services.len(),
                        );

                        let device = DeviceHandle {
                            id: properties.address.to_string(),
                            name: properties.local_name.unwrap_or_else(|| UNKNOWN_DEVICE_NAME.to_string()),
                        };
                        return Some((adapter.clone(), peripheral, device));
                    }
                },
            }
        }
    }

    None
}

// The platform filter would drop peripherals that only advertise a matching name, the
// name-prefix OR service selection happens in `matches_filter` instead.
fn discovery_scan_filter() -> ScanFilter {
    ScanFilter::default()
}

/// Keeps adapters scanning while alive. Scanning is stopped when the guard is dropped, which also
/// covers a connect attempt that errors out or is dropped mid-scan by `disconnect()`.
struct ScanGuard {
    adapters: Vec<Adapter>,
}

impl ScanGuard {
    async fn start(adapters: &[Adapter]) -> Result<Self, ConnectError> {
        let filter = discovery_scan_filter();
        let mut guard = ScanGuard { adapters: Vec::with_capacity(adapters.len()) };

        for adapter in adapters {
            info!("Scanning using adapter {}...", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
            adapter.start_scan(filter.clone()).await?;
            guard.adapters.push(adapter.clone());
        }

        Ok(guard)
    }

    async fn stop(mut self) {
        // adapters not yet stopped stay in the guard in case this future is dropped
        while let Some(adapter) = self.adapters.pop() {
            if let Err(err) = adapter.stop_scan().await {
                warn!("Failed to stop scanning: {:?}", err);
            }
        }
    }
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        let adapters = std::mem::take(&mut self.adapters);
        if adapters.is_empty() {
            return;
        }

        let Ok(runtime) = Handle::try_current() else {
            warn!("Can not stop scanning, no runtime");
            return;
        };

        debug!("Scan abandoned, stopping it");
        runtime.spawn(async move {
            for adapter in adapters {
                if let Err(err) = adapter.stop_scan().await {
                    warn!("Failed to stop scanning: {:?}", err);
                }
            }
        });
    }
}

/// Disconnects the peripheral when dropped, unless it was handed over with `into_inner`.
struct PeripheralGuard {
    peripheral: Peripheral,
    armed: bool,
}

impl PeripheralGuard {
    fn new(peripheral: Peripheral) -> Self {
        PeripheralGuard { peripheral, armed: true }
    }

    fn into_inner(mut self) -> Peripheral {
        self.armed = false;
        self.peripheral.clone()
    }
}

impl Drop for PeripheralGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let Ok(runtime) = Handle::try_current() else {
            warn!("Can not disconnect from peripheral, no runtime");
            return;
        };

        debug!("Connect attempt abandoned, disconnecting from peripheral");
        let peripheral = self.peripheral.clone();
        runtime.spawn(async move {
            if let Err(err) = peripheral.disconnect().await {
                debug!("Failed to disconnect after a failed connect: {:?}", err);
            }
        });
    }
}

// Stands in for a device chooser: scan for a bounded time and take the first match.
async fn choose_peripheral(config: &DeviceConfig, adapters: &[Adapter]) -> Result<(Adapter, Peripheral, DeviceHandle), ConnectError> {
    let scan = ScanGuard::start(adapters).await?;

    let deadline = Instant::now() + config.scan_timeout();
    let chosen = loop {
        if let Some(found) = find_peripheral(config, adapters).await {
            break Some(found);
        }

        if Instant::now() >= deadline {
            break None;
        }

        sleep(Duration::from_millis(SCAN_POLL_DELAY)).await;
    };

    scan.stop().await;
    chosen.ok_or(ConnectError::NoDeviceSelected)
}

async fn connect_peripheral(config: &DeviceConfig, peripheral: &Peripheral) -> Result<Characteristic, DeviceError> {
    info!("Connecting to peripheral...");
    peripheral.connect().await?;

    info!("Connected; Discovering services...");
    peripheral.discover_services().await?;

    let service = peripheral
        .services()
        .into_iter()
        .find(|service| service.uuid == config.service_uuid)
        .ok_or(DeviceError::MissingService)?;

    let characteristic = service
        .characteristics
        .into_iter()
        .find(|characteristic| characteristic.uuid == config.characteristic_uuid)
        .ok_or(DeviceError::MissingCharacteristic)?;

    info!("Subscribing to characteristic {:?} {:?}", service.uuid, characteristic.uuid);
    peripheral.subscribe(&characteristic).await?;
    Ok(characteristic)
}

async fn open_connection(config: DeviceConfig) -> Result<Connection, ConnectError> {
    let manager = Manager::new().await.map_err(|err| {
        warn!("Failed to create bluetooth manager: {:?}", err);
        ConnectError::UnsupportedPlatform
    })?;

    let adapters = manager.adapters().await.map_err(|err| {
        warn!("Failed to list bluetooth adapters: {:?}", err);
        ConnectError::UnsupportedPlatform
    })?;

    if adapters.is_empty() {
        return Err(ConnectError::UnsupportedPlatform);
    }

    let (adapter, peripheral, device) = choose_peripheral(&config, &adapters).await?;

    // subscribe to adapter events before connecting so that an early drop is not missed
    let central_events = adapter.events().await?;

    // from here on every early return (or a dropped attempt) disconnects the peripheral
    let guard = PeripheralGuard::new(peripheral);

    let characteristic = match connect_peripheral(&config, &guard.peripheral).await {
        Ok(v) => v,
        Err(err) => {
            warn!("Connecting to peripheral failed: {:?}", err);
            return Err(err.into());
        },
    };

    let notifications = guard.peripheral.notifications().await?;
    let peripheral = guard.into_inner();

    let data_uuid = characteristic.uuid;
    let data_events = notifications
        .filter_map(move |notification| async move {
            if notification.uuid == data_uuid {
                Some(LinkEvent::Data(notification.value))
            } else {
                None
            }
        })
        .chain(stream::once(async { LinkEvent::Dropped }));

    let peripheral_id = peripheral.id();
    let drop_events = central_events.filter_map(move |event| {
        let dropped = matches!(&event, CentralEvent::DeviceDisconnected(id) if *id == peripheral_id);
        async move {
            if dropped { Some(LinkEvent::Dropped) } else { None }
        }
    });

    let link = BtleLink {
        peripheral,
        characteristic,
    };

    info!("Peripheral ready");
    Ok(Connection {
        device,
        link: Arc::new(link),
        events: stream::select(data_events, drop_events).boxed(),
    })
}

struct BtleLink {
    peripheral: Peripheral,
    characteristic: Characteristic,
}

impl Link for BtleLink {
    fn write(&self, payload: Vec<u8>) -> BoxFuture<'static, Result<(), DeviceError>> {
        let peripheral = self.peripheral.clone();
        let characteristic = self.characteristic.clone();

        let write_type = if characteristic.properties.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE) {
            WriteType::WithoutResponse
        } else {
            WriteType::WithResponse
        };

        async move {
            peripheral.write(&characteristic, &payload, write_type).await?;
            Ok(())
        }.boxed()
    }

    fn close(&self) -> BoxFuture<'static, Result<(), DeviceError>> {
        let peripheral = self.peripheral.clone();

        async move {
            if peripheral.is_connected().await? {
                info!("Disconnecting from peripheral");
                peripheral.disconnect().await?;
            }
            Ok(())
        }.boxed()
    }
}
