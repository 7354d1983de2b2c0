//! The connectivity service: owns the single link to the desk device, runs the connection state
//! machine and broadcasts state changes and inbound data to registered listeners.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::channel::oneshot;
use futures::future::{pending, BoxFuture};
use futures::stream::BoxStream;
use futures::StreamExt;
use indexmap::IndexMap;
use log::{debug, error, info, warn};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;

use crate::config::types::DeviceConfig;
use crate::device::transport::{Connection, Link, Transport};
use crate::device::types::{ConnectionState, ConnectivityEvent, DeviceHandle, LinkEvent, ListenerId};
use crate::error::{ConnectError, SendError};

enum Request {
    Connect { reply: oneshot::Sender<Result<(), ConnectError>> },
    Disconnect { reply: oneshot::Sender<()> },
    Link { reply: oneshot::Sender<Option<Arc<dyn Link>>> },
    Status { reply: oneshot::Sender<(ConnectionState, Option<DeviceHandle>)> },
    Register { id: ListenerId, sender: UnboundedSender<ConnectivityEvent> },
    Unregister { id: ListenerId },
}

/// Handle to the connectivity service task. Cheap to clone.
#[derive(Clone)]
pub struct Connectivity {
    requests: UnboundedSender<Request>,
    next_listener_id: Arc<AtomicU64>,
    write_deadline: Duration,
}

impl Connectivity {
    fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Request) -> oneshot::Receiver<T> {
        let (reply, receiver) = oneshot::channel();
        // if the service has stopped the reply sender is dropped and the receiver reports Canceled
        let _ = self.requests.unbounded_send(make(reply));
        receiver
    }

    /// Open a link to a device. A no-op when already connected; joins the pending attempt when
    /// a connect is already in flight.
    pub async fn connect(&self) -> Result<(), ConnectError> {
        self.request(|reply| Request::Connect { reply })
            .await
            .unwrap_or(Err(ConnectError::ServiceStopped))
    }

    /// Close the link (or abort a pending connect). Always succeeds.
    pub async fn disconnect(&self) {
        let _ = self.request(|reply| Request::Disconnect { reply }).await;
    }

    /// Single best-effort write of `payload`. No retry, no acknowledgment.
    pub async fn send(&self, payload: &str) -> Result<(), SendError> {
        let link = self.request(|reply| Request::Link { reply })
            .await
            .map_err(|_| SendError::ServiceStopped)?
            .ok_or(SendError::NotConnected)?;

        debug!("Sending {:?}", payload);
        match timeout(self.write_deadline, link.write(payload.as_bytes().to_vec())).await {
            Err(_) => {
                warn!("Sending to data characteristic took too long");
                Err(SendError::WriteTimeout)
            },
            Ok(Err(err)) => {
                warn!("Failed to send to data characteristic: {:?}", err);
                Err(err.into())
            },
            Ok(Ok(())) => Ok(()),
        }
    }

    pub async fn status(&self) -> Result<(ConnectionState, Option<DeviceHandle>), ConnectError> {
        self.request(|reply| Request::Status { reply })
            .await
            .map_err(|_| ConnectError::ServiceStopped)
    }

    /// Add `sender` to the broadcast set. Events are delivered in the order they occurred.
    pub fn register_listener(&self, sender: UnboundedSender<ConnectivityEvent>) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        let _ = self.requests.unbounded_send(Request::Register { id, sender });
        id
    }

    pub fn unregister_listener(&self, id: ListenerId) {
        let _ = self.requests.unbounded_send(Request::Unregister { id });
    }

    /// Convenience wrapper around [`Connectivity::register_listener`] creating the channel.
    pub fn listen(&self) -> (ListenerId, UnboundedReceiver<ConnectivityEvent>) {
        let (tx, rx) = unbounded();
        (self.register_listener(tx), rx)
    }
}

struct Attempt {
    future: BoxFuture<'static, Result<Connection, ConnectError>>,
    waiters: Vec<oneshot::Sender<Result<(), ConnectError>>>,
}

struct Session {
    link: Arc<dyn Link>,
    events: BoxStream<'static, LinkEvent>,
}

enum Wake {
    Shutdown,
    Request(Option<Request>),
    Attempt(Result<Connection, ConnectError>),
    Link(Option<LinkEvent>),
}

async fn next_attempt_result(attempt: &mut Option<Attempt>) -> Result<Connection, ConnectError> {
    match attempt {
        Some(attempt) => (&mut attempt.future).await,
        None => pending().await,
    }
}

async fn next_link_event(session: &mut Option<Session>) -> Option<LinkEvent> {
    match session {
        Some(session) => session.events.next().await,
        None => pending().await,
    }
}

struct ConnectivityTask {
    transport: Arc<dyn Transport>,
    state: ConnectionState,
    device: Option<DeviceHandle>,
    listeners: IndexMap<ListenerId, UnboundedSender<ConnectivityEvent>>,
    attempt: Option<Attempt>,
    session: Option<Session>,
    close_deadline: Duration,
}

impl ConnectivityTask {
    fn broadcast(&mut self, event: ConnectivityEvent) {
        self.listeners.retain(|id, sender| {
            let delivered = sender.unbounded_send(event.clone()).is_ok();
            if !delivered {
                debug!("Removing listener {:?}, receiver is gone", id);
            }
            delivered
        });
    }

    fn transition(&mut self, state: ConnectionState) {
        self.state = state;
        if state != ConnectionState::Connected {
            self.device = None;
        }

        let device = self.device.clone();
        self.broadcast(ConnectivityEvent::StateChange { state, device });
    }

    async fn close_session(&mut self) {
        if let Some(session) = self.session.take() {
            match timeout(self.close_deadline, session.link.close()).await {
                Err(_) => warn!("Closing the link took too long, abandoning it"),
                Ok(Err(err)) => warn!("Failed to close link: {:?}", err),
                Ok(Ok(())) => {},
            }
        }
    }

    async fn handle_request(&mut self, request: Request) {
        match request {
            Request::Connect { reply } => {
                if self.state == ConnectionState::Connected {
                    let _ = reply.send(Ok(()));
                    return;
                }

                if let Some(attempt) = &mut self.attempt {
                    attempt.waiters.push(reply);
                    return;
                }

                info!("Connect requested");
                self.attempt = Some(Attempt {
                    future: self.transport.open(),
                    waiters: vec![reply],
                });
                self.transition(ConnectionState::Connecting);
            },
            Request::Disconnect { reply } => {
                if let Some(attempt) = self.attempt.take() {
                    info!("Connect attempt cancelled");
                    for waiter in attempt.waiters {
                        let _ = waiter.send(Err(ConnectError::Cancelled));
                    }
                }

                self.close_session().await;

                if self.state != ConnectionState::Disconnected {
                    info!("Disconnected");
                    self.transition(ConnectionState::Disconnected);
                }
                let _ = reply.send(());
            },
            Request::Link { reply } => {
                let link = self.session.as_ref().map(|session| session.link.clone());
                let _ = reply.send(link);
            },
            Request::Status { reply } => {
                let _ = reply.send((self.state, self.device.clone()));
            },
            Request::Register { id, sender } => {
                self.listeners.insert(id, sender);
            },
            Request::Unregister { id } => {
                self.listeners.shift_remove(&id);
            },
        }
    }

    fn finish_attempt(&mut self, result: Result<Connection, ConnectError>) {
        let waiters = self.attempt.take().map(|attempt| attempt.waiters).unwrap_or_default();

        let reply = match result {
            Ok(connection) => {
                info!("Connected to {} ({})", connection.device.name, connection.device.id);
                self.device = Some(connection.device);
                self.session = Some(Session {
                    link: connection.link,
                    events: connection.events,
                });
                self.transition(ConnectionState::Connected);
                Ok(())
            },
            Err(err) => {
                error!("Bluetooth connection error: {}", err);
                self.transition(ConnectionState::Error);
                Err(err)
            },
        };

        for waiter in waiters {
            let _ = waiter.send(reply.clone());
        }
    }

    async fn handle_link_event(&mut self, event: Option<LinkEvent>) {
        match event {
            Some(LinkEvent::Data(bytes)) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                self.broadcast(ConnectivityEvent::Data(text));
            },
            Some(LinkEvent::Dropped) | None => {
                warn!("Connection lost");
                self.session = None;
                self.transition(ConnectionState::Disconnected);
            },
            Some(LinkEvent::Failed(reason)) => {
                error!("Link failure: {}", reason);
                self.close_session().await;
                self.transition(ConnectionState::Error);
            },
        }
    }

    async fn run(mut self, cancel: CancellationToken, mut requests: UnboundedReceiver<Request>) {
        'mainloop: loop {
            let wake = tokio::select! {
                biased;
                _ = cancel.cancelled() => Wake::Shutdown,
                event = next_link_event(&mut self.session) => Wake::Link(event),
                request = requests.next() => Wake::Request(request),
                result = next_attempt_result(&mut self.attempt) => Wake::Attempt(result),
            };

            match wake {
                Wake::Shutdown | Wake::Request(None) => break 'mainloop,
                Wake::Request(Some(request)) => self.handle_request(request).await,
                Wake::Attempt(result) => self.finish_attempt(result),
                Wake::Link(event) => self.handle_link_event(event).await,
            }
        }

        info!("Connectivity service stopping");
        if let Some(attempt) = self.attempt.take() {
            for waiter in attempt.waiters {
                let _ = waiter.send(Err(ConnectError::ServiceStopped));
            }
        }
        self.close_session().await;
    }
}

pub fn connectivity_service(
    transport: Arc<dyn Transport>,
    config: &DeviceConfig,
    cancel: CancellationToken,
) -> (Connectivity, JoinHandle<()>) {
    let (tx, rx) = unbounded::<Request>();

    let task = ConnectivityTask {
        transport,
        state: ConnectionState::Disconnected,
        device: None,
        listeners: IndexMap::new(),
        attempt: None,
        session: None,
        close_deadline: config.close_deadline(),
    };
    let handle = spawn(task.run(cancel, rx));

    let connectivity = Connectivity {
        requests: tx,
        next_listener_id: Arc::new(AtomicU64::new(0)),
        write_deadline: config.write_deadline(),
    };
    (connectivity, handle)
}
