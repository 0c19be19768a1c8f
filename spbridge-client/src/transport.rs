use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use spbridge_types::{
    topic::{topic_matches, validate_filter, QoS, TopicFilter},
    utils::duration_ms,
};
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    backoff::Backoff, ConnectionEvent, ConnectionState, DisconnectReason, DynClient,
    DynEventLoop, Event, IncomingMessage, LastWill, MessageProperties, PublishRequest,
    TransportError,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Wait used by [Transport::connect_default] for the acknowledgement, and by
    /// [Transport::disconnect] for the clean shutdown to flush.
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub min_reconnect_delay: Duration,
    #[serde(with = "duration_ms")]
    pub max_reconnect_delay: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            min_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(60),
        }
    }
}

/// Handler invoked on the network task for every message matching its filter.
///
/// Handlers must not block. Work that needs I/O should be handed to another task.
pub type MessageHandler = Arc<dyn Fn(&IncomingMessage) + Send + Sync>;

/// Listener invoked on the network task for every connection transition.
pub type ConnectionListener = Arc<dyn Fn(ConnectionEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    filter: TopicFilter,
    handler: MessageHandler,
}

#[derive(Default)]
struct SubscriptionTable {
    next_id: u64,
    entries: Vec<Subscription>,
}

impl SubscriptionTable {
    fn insert(&mut self, filter: TopicFilter, handler: MessageHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.entries.push(Subscription {
            id,
            filter,
            handler,
        });
        id
    }

    fn remove(&mut self, id: SubscriptionId) -> Option<Subscription> {
        let index = self.entries.iter().position(|s| s.id == id)?;
        Some(self.entries.remove(index))
    }

    fn filter_qos(&self, topic: &str) -> Option<QoS> {
        self.entries
            .iter()
            .filter(|s| s.filter.topic == topic)
            .map(|s| s.filter.qos)
            .max()
    }

    /// Distinct filters, each with the highest QoS requested for it, in registration order.
    fn filters(&self) -> Vec<TopicFilter> {
        let mut out: Vec<TopicFilter> = Vec::new();
        for sub in &self.entries {
            match out.iter_mut().find(|f| f.topic == sub.filter.topic) {
                Some(existing) => existing.qos = existing.qos.max(sub.filter.qos),
                None => out.push(sub.filter.clone()),
            }
        }
        out
    }

    fn handlers_for(&self, topic: &str) -> Vec<MessageHandler> {
        self.entries
            .iter()
            .filter(|s| topic_matches(&s.filter.topic, topic))
            .map(|s| s.handler.clone())
            .collect()
    }
}

struct WillSlot {
    will: Option<LastWill>,
    dirty: bool,
}

struct Shared {
    client: Arc<DynClient>,
    config: TransportConfig,
    eventloop: Mutex<Option<Box<DynEventLoop>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    state: watch::Sender<ConnectionState>,
    shutdown: watch::Sender<bool>,
    epoch: AtomicU64,
    in_flight: AtomicUsize,
    reconnecting: AtomicBool,
    closing: AtomicBool,
    last_error: Mutex<Option<String>>,
    subscriptions: Mutex<SubscriptionTable>,
    listeners: Mutex<Vec<ConnectionListener>>,
    will: Mutex<WillSlot>,
}

async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|closing| *closing).await;
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            info!("Connection state {previous:?} -> {state:?}");
        }
    }

    fn notify(&self, event: ConnectionEvent) {
        let listeners = self.listeners.lock().unwrap().clone();
        for listener in listeners {
            listener(event)
        }
    }

    fn apply_will(&self, eventloop: &mut DynEventLoop) {
        let mut slot = self.will.lock().unwrap();
        if !slot.dirty {
            return;
        }
        if let Some(will) = &slot.will {
            debug!("Registering last will on {}", will.topic);
            eventloop.set_last_will(will.clone());
        }
        slot.dirty = false;
    }

    fn release_in_flight(&self) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1));
    }

    /// Returns false if a reconnect loop is already running.
    fn begin_reconnect(&self) -> bool {
        self.reconnecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    async fn replay_subscriptions(&self) -> Result<(), TransportError> {
        let filters = self.subscriptions.lock().unwrap().filters();
        if filters.is_empty() {
            return Ok(());
        }
        debug!("Replaying {} subscription(s)", filters.len());
        self.client.subscribe_many(filters).await?;
        Ok(())
    }

    fn dispatch(&self, message: &IncomingMessage) {
        let handlers = self.subscriptions.lock().unwrap().handlers_for(&message.topic);
        if handlers.is_empty() {
            trace!("No handler for message on {}", message.topic);
            return;
        }
        for handler in handlers {
            handler(message)
        }
    }

    async fn handle_online(&self) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let was_reconnecting = self.reconnecting.swap(false, Ordering::SeqCst);
        *self.last_error.lock().unwrap() = None;
        self.set_state(ConnectionState::Connected);
        if was_reconnecting {
            info!("Reconnected, session epoch {epoch}");
        } else {
            info!("Connected, session epoch {epoch}");
        }
        if let Err(e) = self.replay_subscriptions().await {
            warn!("Subscription replay failed: {e}");
        }
        self.notify(ConnectionEvent::Connected { epoch });
    }

    fn handle_unexpected(&self, reason: String) {
        *self.last_error.lock().unwrap() = Some(reason.clone());
        self.in_flight.store(0, Ordering::SeqCst);
        if !self.begin_reconnect() {
            warn!("Reconnect attempt failed: {reason}");
            return;
        }
        let previous = self.state();
        self.set_state(ConnectionState::Reconnecting);
        if previous == ConnectionState::Connected {
            warn!("Connection lost: {reason}");
            self.notify(ConnectionEvent::Disconnected { graceful: false });
        } else {
            warn!("Connection attempt failed: {reason}");
        }
    }

    fn handle_graceful(&self) {
        self.in_flight.store(0, Ordering::SeqCst);
        let previous = self.state();
        self.set_state(ConnectionState::Disconnected);
        if previous == ConnectionState::Connected {
            self.notify(ConnectionEvent::Disconnected { graceful: true });
        }
    }

    async fn run(self: Arc<Self>, mut eventloop: Box<DynEventLoop>) {
        let mut shutdown = self.shutdown.subscribe();
        let mut backoff = Backoff::new(
            self.config.min_reconnect_delay,
            self.config.max_reconnect_delay,
        );
        loop {
            self.apply_will(eventloop.as_mut());
            let event = tokio::select! {
                event = eventloop.poll() => event,
                _ = shutdown_requested(&mut shutdown) => break,
            };
            match event {
                Event::Online => {
                    backoff.reset();
                    self.handle_online().await;
                }
                Event::Offline(DisconnectReason::Graceful) => {
                    info!("Disconnected gracefully");
                    self.handle_graceful();
                    break;
                }
                Event::Offline(DisconnectReason::Unexpected(reason)) => {
                    if self.closing.load(Ordering::SeqCst) {
                        self.handle_graceful();
                        break;
                    }
                    self.handle_unexpected(reason);
                    let epoch = self.epoch.load(Ordering::SeqCst);
                    let delay = backoff.next_delay();
                    info!("Next connection attempt in {delay:?}");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => (),
                        _ = shutdown_requested(&mut shutdown) => break,
                    }
                    if self.epoch.load(Ordering::SeqCst) != epoch {
                        debug!("Dropping stale reconnect attempt");
                        break;
                    }
                }
                Event::Publish(message) => self.dispatch(&message),
                Event::Acknowledged => self.release_in_flight(),
                Event::Rejected { reason } => {
                    self.release_in_flight();
                    warn!("Broker rejected a publish: {reason}");
                }
            }
        }
        self.reconnecting.store(false, Ordering::SeqCst);
        self.in_flight.store(0, Ordering::SeqCst);
        if self.state() != ConnectionState::Disconnected {
            self.set_state(ConnectionState::Disconnected);
        }
        *self.eventloop.lock().unwrap() = Some(eventloop);
        debug!("Network task finished");
    }
}

/// A single logical connection to the message bus with automatic recovery.
///
/// Cloning is cheap and every clone refers to the same connection.
#[derive(Clone)]
pub struct Transport {
    shared: Arc<Shared>,
}

impl Transport {
    pub fn new(
        eventloop: Box<DynEventLoop>,
        client: Arc<DynClient>,
        config: TransportConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                client,
                config,
                eventloop: Mutex::new(Some(eventloop)),
                task: Mutex::new(None),
                state,
                shutdown,
                epoch: AtomicU64::new(0),
                in_flight: AtomicUsize::new(0),
                reconnecting: AtomicBool::new(false),
                closing: AtomicBool::new(false),
                last_error: Mutex::new(None),
                subscriptions: Mutex::new(SubscriptionTable::default()),
                listeners: Mutex::new(Vec::new()),
                will: Mutex::new(WillSlot {
                    will: None,
                    dirty: false,
                }),
            }),
        }
    }

    /// Register the will the broker publishes if this client disappears without a clean disconnect.
    ///
    /// Takes effect on the next connection attempt.
    pub fn set_last_will(&self, will: LastWill) {
        let mut slot = self.shared.will.lock().unwrap();
        slot.will = Some(will);
        slot.dirty = true;
    }

    /// Start the network task if it is not running. Returns true if it was started.
    fn start(&self) -> Result<bool, TransportError> {
        let mut task = self.shared.task.lock().unwrap();
        if let Some(handle) = task.as_ref() {
            if !handle.is_finished() {
                return Ok(false);
            }
        }
        let mut eventloop = self
            .shared
            .eventloop
            .lock()
            .unwrap()
            .take()
            .ok_or(TransportError::Closed)?;
        self.shared.closing.store(false, Ordering::SeqCst);
        self.shared.shutdown.send_replace(false);
        self.shared.apply_will(eventloop.as_mut());
        self.shared.set_state(ConnectionState::Connecting);
        let shared = self.shared.clone();
        *task = Some(tokio::spawn(shared.run(eventloop)));
        Ok(true)
    }

    /// Connect and wait up to `timeout` for the connection to be acknowledged.
    ///
    /// If the first attempt fails the error is returned and the reconnect loop keeps trying in
    /// the background. A timeout also leaves the attempt running.
    pub async fn connect(&self, timeout: Duration) -> Result<(), TransportError> {
        let mut state_rx = self.shared.state.subscribe();
        let started = self.start()?;
        let wait = async {
            loop {
                let state = *state_rx.borrow_and_update();
                match state {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Reconnecting | ConnectionState::Disconnected if started => {
                        let reason = self
                            .shared
                            .last_error
                            .lock()
                            .unwrap()
                            .clone()
                            .unwrap_or_else(|| "connection closed".to_string());
                        return Err(TransportError::Connect(reason));
                    }
                    _ => (),
                }
                if state_rx.changed().await.is_err() {
                    return Err(TransportError::Closed);
                }
            }
        };
        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => {
                warn!("No connection acknowledgement within {timeout:?}");
                Err(TransportError::ConnectTimeout)
            }
        }
    }

    /// [Transport::connect] bounded by the configured `connect_timeout`.
    pub async fn connect_default(&self) -> Result<(), TransportError> {
        self.connect(self.shared.config.connect_timeout).await
    }

    fn request(
        &self,
        topic: String,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
        properties: Option<MessageProperties>,
    ) -> Result<PublishRequest, TransportError> {
        if self.state() != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        Ok(PublishRequest {
            topic,
            payload,
            qos,
            retain,
            properties: properties.unwrap_or_default(),
        })
    }

    /// Hand a message to the client for publication.
    ///
    /// Never waits on network I/O. Broker acknowledgements are tracked by [Transport::in_flight].
    pub async fn publish(
        &self,
        topic: String,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
        properties: Option<MessageProperties>,
    ) -> Result<(), TransportError> {
        let request = self.request(topic, payload, qos, retain, properties)?;
        self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.shared.client.publish(request).await {
            self.shared.release_in_flight();
            return Err(e.into());
        }
        Ok(())
    }

    /// Like [Transport::publish] but fails instead of waiting when the client queue is full.
    pub async fn try_publish(
        &self,
        topic: String,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
        properties: Option<MessageProperties>,
    ) -> Result<(), TransportError> {
        let request = self.request(topic, payload, qos, retain, properties)?;
        self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.shared.client.try_publish(request).await {
            self.shared.release_in_flight();
            return Err(e.into());
        }
        Ok(())
    }

    /// Register `handler` for messages matching `filter`.
    ///
    /// The subscription is recorded even while disconnected and is replayed on every
    /// (re)connect. Every registered handler whose filter matches a message is invoked.
    pub async fn subscribe<F>(
        &self,
        filter: TopicFilter,
        handler: F,
    ) -> Result<SubscriptionId, TransportError>
    where
        F: Fn(&IncomingMessage) + Send + Sync + 'static,
    {
        validate_filter(&filter.topic).map_err(TransportError::InvalidFilter)?;
        let (id, needs_subscribe) = {
            let mut table = self.shared.subscriptions.lock().unwrap();
            let known = table.filter_qos(&filter.topic);
            let id = table.insert(filter.clone(), Arc::new(handler));
            (id, known.map_or(true, |qos| qos < filter.qos))
        };
        if needs_subscribe && self.state() == ConnectionState::Connected {
            if let Err(e) = self.shared.client.subscribe(filter.clone()).await {
                warn!(
                    "Subscribe to {} failed, it will be replayed on reconnect: {e}",
                    filter.topic
                );
            }
        }
        Ok(id)
    }

    /// Remove a subscription. The broker subscription is dropped with the last handler for its filter.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TransportError> {
        let removed = {
            let mut table = self.shared.subscriptions.lock().unwrap();
            match table.remove(id) {
                Some(sub) if table.filter_qos(&sub.filter.topic).is_none() => Some(sub.filter.topic),
                _ => None,
            }
        };
        if let Some(topic) = removed {
            if self.state() == ConnectionState::Connected {
                self.shared.client.unsubscribe(topic).await?;
            }
        }
        Ok(())
    }

    /// Re-send every registered filter in a single subscribe request.
    pub async fn resubscribe(&self) -> Result<(), TransportError> {
        if self.state() != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        self.shared.replay_subscriptions().await
    }

    /// Register a listener for connection transitions.
    ///
    /// Connected events are delivered after subscriptions have been replayed.
    pub fn on_connection_event<F>(&self, listener: F)
    where
        F: Fn(ConnectionEvent) + Send + Sync + 'static,
    {
        self.shared.listeners.lock().unwrap().push(Arc::new(listener));
    }

    /// Disconnect cleanly. The broker does not publish the last will and the reconnect loop stops.
    pub async fn disconnect(&self) -> Result<(), TransportError> {
        self.shared.closing.store(true, Ordering::SeqCst);
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        let handle = self.shared.task.lock().unwrap().take();
        let Some(mut handle) = handle else {
            self.shared.set_state(ConnectionState::Disconnected);
            return Ok(());
        };

        if self.state() == ConnectionState::Connected {
            match self.shared.client.disconnect().await {
                Ok(()) => {
                    if tokio::time::timeout(self.shared.config.connect_timeout, &mut handle)
                        .await
                        .is_ok()
                    {
                        return Ok(());
                    }
                    warn!("Clean disconnect did not complete in time");
                }
                Err(e) => debug!("Client disconnect failed: {e}"),
            }
        }

        self.shared.shutdown.send_replace(true);
        let _ = handle.await;
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Incremented on every successful connection and on [Transport::disconnect].
    pub fn session_epoch(&self) -> u64 {
        self.shared.epoch.load(Ordering::SeqCst)
    }

    /// Publishes handed to the client and not yet acknowledged.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }
}
