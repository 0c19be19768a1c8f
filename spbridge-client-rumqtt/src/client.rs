use async_trait::async_trait;
use log::{error, trace};
use rumqttc::{
    v5::{
        mqttbytes::{
            v5::{
                DisconnectReasonCode, Filter, Packet, PubAckReason, PubCompReason, Publish,
                PublishProperties,
            },
            QoS,
        },
        AsyncClient as RuClient, ClientError as RuClientError, EventLoop as RuEventLoop,
    },
    Outgoing,
};
use spbridge_client::{
    ClientError, DisconnectReason, Event, IncomingMessage, LastWill, MessageProperties,
    PublishRequest,
};
use spbridge_types::topic::TopicFilter;

use crate::MqttOptions;

fn qos_to_mqtt_qos(qos: spbridge_types::topic::QoS) -> QoS {
    match qos {
        spbridge_types::topic::QoS::AtMostOnce => QoS::AtMostOnce,
        spbridge_types::topic::QoS::AtLeastOnce => QoS::AtLeastOnce,
        spbridge_types::topic::QoS::ExactlyOnce => QoS::ExactlyOnce,
    }
}

fn topic_filter_to_mqtt_filter(topic_filter: TopicFilter) -> Filter {
    Filter::new(topic_filter.topic, qos_to_mqtt_qos(topic_filter.qos))
}

fn map_client_error(e: RuClientError) -> ClientError {
    match e {
        RuClientError::Request(_) => ClientError::Disconnected,
        RuClientError::TryRequest(_) => ClientError::Rejected("client request queue is full".into()),
    }
}

fn publish_properties(properties: MessageProperties) -> Option<PublishProperties> {
    if properties.is_empty() {
        return None;
    }
    Some(PublishProperties {
        user_properties: properties.user_properties,
        content_type: properties.content_type,
        ..Default::default()
    })
}

fn incoming_message(publish: Publish) -> Option<IncomingMessage> {
    let topic = match String::from_utf8(publish.topic.to_vec()) {
        Ok(topic) => topic,
        Err(e) => {
            error!("Dropping message with non utf8 topic: {e}");
            return None;
        }
    };
    let properties = publish
        .properties
        .map(|p| MessageProperties {
            user_properties: p.user_properties,
            content_type: p.content_type,
        })
        .unwrap_or_default();
    Some(IncomingMessage {
        topic,
        payload: publish.payload,
        properties,
    })
}

/// A [spbridge_client::Client] implementation using [rumqttc]
#[derive(Clone)]
pub struct Client {
    client: RuClient,
}

#[async_trait]
impl spbridge_client::Client for Client {
    async fn disconnect(&self) -> Result<(), ClientError> {
        self.client.disconnect().await.map_err(map_client_error)
    }

    async fn publish(&self, message: PublishRequest) -> Result<(), ClientError> {
        let qos = qos_to_mqtt_qos(message.qos);
        let result = match publish_properties(message.properties) {
            Some(properties) => {
                self.client
                    .publish_with_properties(
                        message.topic,
                        qos,
                        message.retain,
                        message.payload,
                        properties,
                    )
                    .await
            }
            None => {
                self.client
                    .publish(message.topic, qos, message.retain, message.payload)
                    .await
            }
        };
        result.map_err(map_client_error)
    }

    async fn try_publish(&self, message: PublishRequest) -> Result<(), ClientError> {
        let qos = qos_to_mqtt_qos(message.qos);
        let result = match publish_properties(message.properties) {
            Some(properties) => self.client.try_publish_with_properties(
                message.topic,
                qos,
                message.retain,
                message.payload,
                properties,
            ),
            None => self
                .client
                .try_publish(message.topic, qos, message.retain, message.payload),
        };
        result.map_err(map_client_error)
    }

    async fn subscribe_many(&self, topics: Vec<TopicFilter>) -> Result<(), ClientError> {
        let filters: Vec<Filter> = topics.into_iter().map(topic_filter_to_mqtt_filter).collect();
        self.client
            .subscribe_many(filters)
            .await
            .map_err(map_client_error)
    }

    async fn unsubscribe(&self, topic: String) -> Result<(), ClientError> {
        self.client.unsubscribe(topic).await.map_err(map_client_error)
    }
}

enum ConnectionState {
    Disconnected,
    ManualDisconnected,
    Connected,
}

/// An [spbridge_client::EventLoop] implementation using [rumqttc]
pub struct EventLoop {
    state: ConnectionState,
    el: RuEventLoop,
}

impl EventLoop {
    /// Create a new `Eventloop`.
    ///
    /// `cap` specifies the capacity of the bounded async channel for the client handle.
    pub fn new(options: MqttOptions, cap: usize) -> (Self, Client) {
        let (client, eventloop) = RuClient::new(options.into_rumqtt(), cap);
        (
            EventLoop {
                el: eventloop,
                state: ConnectionState::Disconnected,
            },
            Client { client },
        )
    }

    async fn poll_rumqtt(&mut self) -> Option<Event> {
        let event = self.el.poll().await;
        match event {
            Ok(event) => {
                trace!("{event:?}");
                match event {
                    rumqttc::v5::Event::Incoming(Packet::ConnAck(_)) => {
                        self.state = ConnectionState::Connected;
                        Some(Event::Online)
                    }
                    rumqttc::v5::Event::Incoming(Packet::Disconnect(disconnect)) => {
                        self.state = ConnectionState::Disconnected;
                        let reason = match disconnect.reason_code {
                            DisconnectReasonCode::NormalDisconnection => DisconnectReason::Graceful,
                            code => DisconnectReason::Unexpected(format!(
                                "broker disconnected with {code:?}"
                            )),
                        };
                        Some(Event::Offline(reason))
                    }
                    rumqttc::v5::Event::Incoming(Packet::Publish(publish)) => {
                        incoming_message(publish).map(Event::Publish)
                    }
                    rumqttc::v5::Event::Incoming(Packet::PubAck(ack)) => match ack.reason {
                        PubAckReason::Success | PubAckReason::NoMatchingSubscribers => {
                            Some(Event::Acknowledged)
                        }
                        reason => Some(Event::Rejected {
                            reason: format!("{reason:?}"),
                        }),
                    },
                    rumqttc::v5::Event::Incoming(Packet::PubComp(comp)) => match comp.reason {
                        PubCompReason::Success => Some(Event::Acknowledged),
                        reason => Some(Event::Rejected {
                            reason: format!("{reason:?}"),
                        }),
                    },
                    /* QoS 0 publishes are complete once written */
                    rumqttc::v5::Event::Outgoing(Outgoing::Publish(0)) => Some(Event::Acknowledged),
                    rumqttc::v5::Event::Outgoing(Outgoing::Disconnect) => {
                        self.state = ConnectionState::ManualDisconnected;
                        Some(Event::Offline(DisconnectReason::Graceful))
                    }
                    _ => None,
                }
            }
            Err(e) => match self.state {
                ConnectionState::ManualDisconnected => {
                    Some(Event::Offline(DisconnectReason::Graceful))
                }
                ConnectionState::Connected | ConnectionState::Disconnected => {
                    error!("Client error: {e}");
                    self.state = ConnectionState::Disconnected;
                    Some(Event::Offline(DisconnectReason::Unexpected(e.to_string())))
                }
            },
        }
    }
}

#[async_trait]
impl spbridge_client::EventLoop for EventLoop {
    async fn poll(&mut self) -> Event {
        loop {
            if let Some(event) = self.poll_rumqtt().await {
                return event;
            }
        }
    }

    fn set_last_will(&mut self, will: LastWill) {
        let qos = qos_to_mqtt_qos(will.qos);
        let mqtt_will = rumqttc::v5::mqttbytes::v5::LastWill::new(
            will.topic,
            will.payload,
            qos,
            will.retain,
            None,
        );
        self.el.options.set_last_will(mqtt_will);
    }
}
