use async_trait::async_trait;
use spbridge_types::topic::TopicFilter;

use crate::{ClientError, Event, LastWill, PublishRequest};

/// The sending half of a message bus connection.
#[async_trait]
pub trait Client {
    /// Disconnects the client cleanly. The broker will not publish the last will.
    async fn disconnect(&self) -> Result<(), ClientError>;

    /// Publishes a message.
    ///
    /// This method will yield to the async runtime until the message is accepted by the client.
    /// It does not wait for network I/O or broker acknowledgement.
    async fn publish(&self, message: PublishRequest) -> Result<(), ClientError>;

    /// Attempts to publish a message.
    ///
    /// Unlike `publish`, this method may return early if the client cannot process the message
    /// e.g the message queue is full.
    async fn try_publish(&self, message: PublishRequest) -> Result<(), ClientError>;

    /// Subscribes to a single topic.
    ///
    /// This is a convenience method that calls `subscribe_many` with a single topic.
    async fn subscribe(&self, topic: TopicFilter) -> Result<(), ClientError> {
        self.subscribe_many(vec![topic]).await
    }

    /// Subscribes to multiple topics in a single operation.
    async fn subscribe_many(&self, topics: Vec<TopicFilter>) -> Result<(), ClientError>;

    /// Removes a subscription.
    async fn unsubscribe(&self, topic: String) -> Result<(), ClientError>;
}

pub type DynClient = dyn Client + Send + Sync;

/// The receiving half of a message bus connection.
///
/// Polling drives the network. A poll after an [Event::Offline] starts a new connection attempt.
#[async_trait]
pub trait EventLoop {
    async fn poll(&mut self) -> Event;

    /// Set the will registered with the broker on the next connection.
    fn set_last_will(&mut self, will: LastWill);
}

pub type DynEventLoop = dyn EventLoop + Send;
