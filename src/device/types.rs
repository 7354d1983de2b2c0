use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        };

        write!(f, "{}", result)
    }
}

/// Identity of the peripheral behind an open link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    pub id: String,
    pub name: String,
}

/// Events broadcast by the connectivity service to its listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectivityEvent {
    StateChange {
        state: ConnectionState,
        // only present when `state` is `Connected`
        device: Option<DeviceHandle>,
    },
    Data(String),
}

/// Events produced by an open link, consumed by the connectivity service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Data(Vec<u8>),
    // the peer closed the link
    Dropped,
    // unexpected I/O failure on the link
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);
