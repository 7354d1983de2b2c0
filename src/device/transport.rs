use std::sync::Arc;
use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::device::types::{DeviceHandle, LinkEvent};
use crate::error::{ConnectError, DeviceError};

/// A radio backend able to choose a peripheral and open a link to it.
pub trait Transport: Send + Sync {
    /// Choose a peripheral, connect, discover the serial characteristic and subscribe to its
    /// notifications. Every suspension point of a connect attempt lives inside this future.
    fn open(&self) -> BoxFuture<'static, Result<Connection, ConnectError>>;
}

/// An open, subscribed link to a single peripheral.
pub trait Link: Send + Sync {
    /// Perform a single write of `payload` to the data characteristic.
    fn write(&self, payload: Vec<u8>) -> BoxFuture<'static, Result<(), DeviceError>>;

    /// Tear down the link. Must be safe to call after the peer already dropped it.
    fn close(&self) -> BoxFuture<'static, Result<(), DeviceError>>;
}

pub struct Connection {
    pub device: DeviceHandle,
    pub link: Arc<dyn Link>,
    // inbound data and lifecycle events of the link, in the order they occurred
    pub events: BoxStream<'static, LinkEvent>,
}
