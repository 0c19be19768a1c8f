use std::sync::{Arc, Mutex};

use crate::{ClientError, DisconnectReason, Event, LastWill, PublishRequest};
use async_trait::async_trait;
use spbridge_types::topic::TopicFilter;
use tokio::sync::mpsc;

/// A [Client](crate::Client) implementation that uses channels for message passing.
///
/// # Examples
///
/// See [ChannelEventLoop]
#[derive(Clone)]
pub struct ChannelClient {
    tx: mpsc::UnboundedSender<OutboundMessage>,
    tx_event: mpsc::UnboundedSender<Event>,
}

impl ChannelClient {
    fn send(&self, message: OutboundMessage) -> Result<(), ClientError> {
        self.tx.send(message).map_err(|_| ClientError::Disconnected)
    }
}

#[async_trait]
impl crate::Client for ChannelClient {
    async fn disconnect(&self) -> Result<(), ClientError> {
        self.send(OutboundMessage::Disconnect)?;
        // a real client sees its own DISCONNECT go out on the next poll
        self.tx_event
            .send(Event::Offline(DisconnectReason::Graceful))
            .map_err(|_| ClientError::Disconnected)
    }

    async fn publish(&self, message: PublishRequest) -> Result<(), ClientError> {
        self.send(OutboundMessage::Publish(message))
    }

    async fn try_publish(&self, message: PublishRequest) -> Result<(), ClientError> {
        self.send(OutboundMessage::Publish(message))
    }

    async fn subscribe_many(&self, topics: Vec<TopicFilter>) -> Result<(), ClientError> {
        self.send(OutboundMessage::Subscribe(topics))
    }

    async fn unsubscribe(&self, topic: String) -> Result<(), ClientError> {
        self.send(OutboundMessage::Unsubscribe(topic))
    }
}

/// An Enum representing different messages and requests a [ChannelClient] can send to the [ChannelBroker]
#[derive(Clone, Debug, PartialEq)]
pub enum OutboundMessage {
    Disconnect,
    Publish(PublishRequest),
    Subscribe(Vec<TopicFilter>),
    Unsubscribe(String),
}

/// A "broker" that manages the communication between a [ChannelClient] and an [ChannelEventLoop].
///
/// Used to send messages to the eventloop and inspect messages/requests produced by the client
///
/// # Examples
///
/// ```no_run
/// use spbridge_client::{Event, channel::{ChannelEventLoop, ChannelClient}};
/// use tokio::runtime::Runtime;
///
/// let rt = Runtime::new().unwrap();
/// rt.block_on(async {
///     let (mut eventloop, client, mut broker) = ChannelEventLoop::new();
///
///     //create a transport that uses the EventLoop and client
///
///     //Send an event to the EventLoop
///     broker.tx_event.send(Event::Online).unwrap();
///
///     //Receive a message or request from the Client
///     let message = broker.rx_outbound.recv().await.unwrap();
/// });
/// ```
pub struct ChannelBroker {
    pub rx_outbound: mpsc::UnboundedReceiver<OutboundMessage>,
    pub tx_event: mpsc::UnboundedSender<Event>,
    last_will: Arc<Mutex<Option<LastWill>>>,
}

impl ChannelBroker {
    /// Retrieves the current last will message set by the EventLoop, if set.
    pub fn last_will(&self) -> Option<LastWill> {
        self.last_will.lock().unwrap().clone()
    }
}

/// An [EventLoop](crate::EventLoop) implementation that uses channels
///
/// # Examples
///
/// See [ChannelBroker]
pub struct ChannelEventLoop {
    rx: mpsc::UnboundedReceiver<Event>,
    last_will: Arc<Mutex<Option<LastWill>>>,
}

impl ChannelEventLoop {
    /// Creates a new event loop along with the corresponding client and broker.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (Self, ChannelClient, ChannelBroker) {
        let (tx_event, rx_event) = mpsc::unbounded_channel();
        let (tx_outbound, rx_outbound) = mpsc::unbounded_channel();
        let last_will = Arc::new(Mutex::new(None));
        let el = Self {
            rx: rx_event,
            last_will: last_will.clone(),
        };
        (
            el,
            ChannelClient {
                tx: tx_outbound,
                tx_event: tx_event.clone(),
            },
            ChannelBroker {
                rx_outbound,
                tx_event,
                last_will,
            },
        )
    }
}

#[async_trait]
impl crate::EventLoop for ChannelEventLoop {
    async fn poll(&mut self) -> Event {
        match self.rx.recv().await {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }

    fn set_last_will(&mut self, will: LastWill) {
        let mut lw = self.last_will.lock().unwrap();
        *lw = Some(will)
    }
}
