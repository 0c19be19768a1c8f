use std::{
    collections::BTreeMap,
    sync::Arc,
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};
use spbridge_client::{
    node_death_payload, ConnectionEvent, ConnectionState, IncomingMessage, LastWill, Transport,
    TransportError,
};
use spbridge_store::{AliasRegistry, BirthCache, CachedBirth, DedupStore, StoreError};
use spbridge_types::{
    constants::{BDSEQ, NODE_CONTROL_REBIRTH, SPARKPLUG_QOS, SPARKPLUG_RETAIN},
    payload::{metric, DataType, Message, Metric as WireMetric, Payload},
    topic::{DeviceMessage, DeviceTopic, NodeMessage, NodeTopic, QoS, TopicFilter},
    utils::{timestamp, validate_name},
    Metric,
};
use tokio::sync::{mpsc, Mutex};

use crate::{
    command::{rebirth_request, RebirthTarget},
    lifecycle::{
        merge_metrics, wire_metrics, AliasedMetric, DeviceSnapshot, DeviceState, NodeLifecycle,
    },
    NodeBuilder, PublishError,
};

enum NodeEvent {
    Connected,
    Disconnected,
    Rebirth(RebirthTarget),
    Stop,
}

struct NodeState {
    lifecycle: NodeLifecycle,
    /// Known devices. Sorted so rebirths happen in a stable order.
    devices: BTreeMap<String, DeviceState>,
    last_rebirth_request: Option<Instant>,
}

fn envelope(seq: Option<u8>, metrics: Vec<WireMetric>) -> Payload {
    Payload {
        timestamp: Some(timestamp()),
        metrics,
        seq: seq.map(u64::from),
        uuid: None,
        body: None,
    }
}

fn node_birth_payload(bd_seq: u64) -> Payload {
    let now = timestamp();
    let mut bd_seq_metric = WireMetric::new();
    bd_seq_metric
        .set_name(BDSEQ.to_string())
        .set_datatype(DataType::Int64)
        .set_timestamp(now)
        .set_value(metric::Value::LongValue(bd_seq));
    let mut rebirth_metric = WireMetric::new();
    rebirth_metric
        .set_name(NODE_CONTROL_REBIRTH.to_string())
        .set_datatype(DataType::Boolean)
        .set_timestamp(now)
        .set_value(metric::Value::BooleanValue(false));
    envelope(Some(0), vec![bd_seq_metric, rebirth_metric])
}

fn decode_birth(cached: &CachedBirth) -> Result<(Payload, DeviceSnapshot), PublishError> {
    let payload = Payload::decode(cached.payload.as_slice())?;
    let snapshot = DeviceSnapshot::from_birth(&payload)?;
    Ok((payload, snapshot))
}

struct Inner {
    group_id: String,
    node_id: String,
    transport: Transport,
    aliases: AliasRegistry,
    births: BirthCache,
    dedup: Option<DedupStore>,
    rebirth_request_cooldown: Duration,
    /// The single serialization point for `seq`, `bdSeq` and device state.
    state: Mutex<NodeState>,
    events: mpsc::UnboundedSender<NodeEvent>,
}

impl Inner {
    fn node_topic(&self, message: NodeMessage) -> NodeTopic {
        NodeTopic::new(&self.group_id, message, &self.node_id)
    }

    fn device_topic(&self, message: DeviceMessage, device_id: &str) -> DeviceTopic {
        DeviceTopic::new(&self.group_id, message, &self.node_id, device_id)
    }

    async fn send(
        &self,
        topic: String,
        (qos, retain): (QoS, bool),
        payload: Vec<u8>,
    ) -> Result<(), PublishError> {
        self.transport
            .publish(topic, payload, qos, retain, None)
            .await?;
        Ok(())
    }

    async fn node_birth(&self, state: &mut NodeState) -> Result<(), PublishError> {
        let bd_seq = state.lifecycle.next_bd_seq();
        let topic = self.node_topic(NodeMessage::NBirth);
        let bytes = node_birth_payload(bd_seq).encode_to_vec();
        self.send(
            topic.topic.clone(),
            topic.get_publish_quality_retain(),
            bytes.clone(),
        )
        .await?;
        state.lifecycle.node_birth_sent(bd_seq);
        for device in state.devices.values_mut() {
            device.born = false;
        }
        info!("NBIRTH published. node={} bdSeq={bd_seq}", self.node_id);

        if let Err(e) = self.births.store_node_birth(&topic.topic, &bytes) {
            error!("Failed to cache NBIRTH. node={}: {e}", self.node_id);
        }
        /* a broker holds the will from CONNECT, so this one is for the next session */
        self.transport.set_last_will(LastWill::new_node(
            &self.group_id,
            &self.node_id,
            state.lifecycle.next_bd_seq(),
        ));
        if let Err(e) = self.transport.resubscribe().await {
            warn!("Re-arming command subscriptions failed: {e}");
        }
        Ok(())
    }

    async fn device_birth(
        &self,
        state: &mut NodeState,
        device_id: &str,
        metrics: Vec<Metric>,
        source: Option<String>,
    ) -> Result<(), PublishError> {
        let metrics = merge_metrics(Vec::new(), metrics);
        let mut aliased = Vec::with_capacity(metrics.len());
        for metric in metrics {
            let alias = self.aliases.get_or_create(&metric.path, device_id)?;
            aliased.push(AliasedMetric { metric, alias });
        }
        let wire = wire_metrics(&aliased, source.as_deref())?;

        let seq = state.lifecycle.seq();
        let topic = self.device_topic(DeviceMessage::DBirth, device_id);
        let bytes = envelope(Some(seq), wire).encode_to_vec();
        self.send(
            topic.topic.clone(),
            topic.get_publish_quality_retain(),
            bytes.clone(),
        )
        .await?;
        state.lifecycle.advance_seq();
        info!(
            "DBIRTH published. node={} device={device_id} seq={seq} metrics={}",
            self.node_id,
            aliased.len()
        );

        if let Err(e) = self.births.store_device_birth(device_id, &topic.topic, &bytes) {
            error!("Failed to cache DBIRTH. device={device_id}: {e}");
        }
        self.record_published(device_id, aliased.iter().map(|m| &m.metric));
        state.devices.insert(
            device_id.to_string(),
            DeviceState {
                born: true,
                snapshot: Some(DeviceSnapshot::new(aliased, source)),
            },
        );
        Ok(())
    }

    /// The last known metric set of a device: its snapshot, else its cached birth.
    fn known_metrics(&self, state: &NodeState, device_id: &str) -> (Vec<Metric>, Option<String>) {
        if let Some(snapshot) = state
            .devices
            .get(device_id)
            .and_then(|d| d.snapshot.as_ref())
        {
            return (snapshot.metrics(), snapshot.source().map(str::to_string));
        }
        match self.births.get_device_birth(device_id) {
            Ok(Some(cached)) => match decode_birth(&cached) {
                Ok((_, snapshot)) => (snapshot.metrics(), snapshot.source().map(str::to_string)),
                Err(e) => {
                    warn!("Ignoring unreadable cached birth. device={device_id}: {e}");
                    (Vec::new(), None)
                }
            },
            Ok(None) => (Vec::new(), None),
            Err(e) => {
                error!("Failed to read cached birth. device={device_id}: {e}");
                (Vec::new(), None)
            }
        }
    }

    async fn device_data(
        &self,
        state: &mut NodeState,
        device_id: &str,
        metrics: Vec<Metric>,
    ) -> Result<(), PublishError> {
        let metrics = merge_metrics(Vec::new(), metrics);
        let mut aliases = Vec::with_capacity(metrics.len());
        let mut needs_birth = false;
        match state.devices.get(device_id) {
            Some(DeviceState {
                born: true,
                snapshot: Some(snapshot),
            }) => {
                for metric in &metrics {
                    let alias = self.aliases.get_or_create(&metric.path, device_id)?;
                    if snapshot.alias(&metric.path) != Some(alias) {
                        needs_birth = true;
                        break;
                    }
                    aliases.push(alias);
                }
            }
            _ => needs_birth = true,
        }
        if needs_birth {
            /* consumers cannot decode aliases they were never born with */
            debug!("Device {device_id} has no matching birth, sending DBIRTH instead of DDATA");
            let (known, source) = self.known_metrics(state, device_id);
            return self
                .device_birth(state, device_id, merge_metrics(known, metrics), source)
                .await;
        }

        let topic = self.device_topic(DeviceMessage::DData, device_id);
        let mut changed: Vec<(Metric, u64)> = metrics.into_iter().zip(aliases).collect();
        if let Some(dedup) = &self.dedup {
            let mut kept = Vec::with_capacity(changed.len());
            for (metric, alias) in changed {
                if dedup.has_changed(&format!("{}/{}", topic.topic, metric.path), &metric)? {
                    kept.push((metric, alias));
                }
            }
            if kept.is_empty() {
                debug!("No changed values for device {device_id}");
                return Ok(());
            }
            changed = kept;
        }

        let wire = changed
            .iter()
            .map(|(metric, alias)| metric.to_data_metric(*alias))
            .collect::<Result<Vec<_>, _>>()?;
        let seq = state.lifecycle.seq();
        self.send(
            topic.topic.clone(),
            topic.get_publish_quality_retain(),
            envelope(Some(seq), wire).encode_to_vec(),
        )
        .await?;
        state.lifecycle.advance_seq();
        debug!(
            "DDATA published. device={device_id} seq={seq} metrics={}",
            changed.len()
        );

        let published: Vec<Metric> = changed.into_iter().map(|(metric, _)| metric).collect();
        self.record_published(device_id, &published);
        if let Some(snapshot) = state
            .devices
            .get_mut(device_id)
            .and_then(|d| d.snapshot.as_mut())
        {
            snapshot.update(&published);
        }
        Ok(())
    }

    fn record_published<'a, I>(&self, device_id: &str, metrics: I)
    where
        I: IntoIterator<Item = &'a Metric>,
    {
        let Some(dedup) = &self.dedup else {
            return;
        };
        let topic = self.device_topic(DeviceMessage::DData, device_id).topic;
        let keyed: Vec<(String, &Metric)> = metrics
            .into_iter()
            .map(|m| (format!("{topic}/{}", m.path), m))
            .collect();
        if let Err(e) = dedup.record_published_batch(keyed.iter().map(|(k, m)| (k.as_str(), *m))) {
            error!("Failed to record published values. device={device_id}: {e}");
        }
    }

    async fn device_death(&self, state: &mut NodeState, device_id: &str) -> Result<(), PublishError> {
        let seq = state.lifecycle.seq();
        let topic = self.device_topic(DeviceMessage::DDeath, device_id);
        self.send(
            topic.topic.clone(),
            topic.get_publish_quality_retain(),
            envelope(Some(seq), Vec::new()).encode_to_vec(),
        )
        .await?;
        state.lifecycle.advance_seq();
        info!(
            "DDEATH published. node={} device={device_id} seq={seq}",
            self.node_id
        );
        if let Err(e) = self.forget_device(state, device_id) {
            error!("Failed to drop cached birth. device={device_id}: {e}");
        }
        Ok(())
    }

    fn forget_device(&self, state: &mut NodeState, device_id: &str) -> Result<(), StoreError> {
        state.devices.remove(device_id);
        self.births.remove_device_birth(device_id)?;
        Ok(())
    }

    async fn rebirth_device(&self, state: &mut NodeState, device_id: &str) -> Result<(), PublishError> {
        let from_snapshot = state
            .devices
            .get(device_id)
            .and_then(|d| d.snapshot.as_ref())
            .map(|s| (s.metrics(), s.source().map(str::to_string)));
        if let Some((metrics, source)) = from_snapshot {
            return self.device_birth(state, device_id, metrics, source).await;
        }
        let cached = self
            .births
            .get_device_birth(device_id)?
            .ok_or_else(|| PublishError::DeviceUnknown(device_id.to_string()))?;
        self.republish_birth(state, device_id, cached).await
    }

    /// Publish a cached DBIRTH again with a fresh `seq` and timestamp.
    async fn republish_birth(
        &self,
        state: &mut NodeState,
        device_id: &str,
        cached: CachedBirth,
    ) -> Result<(), PublishError> {
        let mut payload = Payload::decode(cached.payload.as_slice())?;
        let seq = state.lifecycle.seq();
        payload.seq = Some(u64::from(seq));
        payload.timestamp = Some(timestamp());
        let bytes = payload.encode_to_vec();
        self.send(
            cached.topic.clone(),
            (SPARKPLUG_QOS, SPARKPLUG_RETAIN),
            bytes.clone(),
        )
        .await?;
        state.lifecycle.advance_seq();
        info!(
            "DBIRTH republished from cache. node={} device={device_id} seq={seq}",
            self.node_id
        );

        if let Err(e) = self
            .births
            .store_device_birth(device_id, &cached.topic, &bytes)
        {
            error!("Failed to cache DBIRTH. device={device_id}: {e}");
        }
        let snapshot = match DeviceSnapshot::from_birth(&payload) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("Cached birth has no usable snapshot. device={device_id}: {e}");
                None
            }
        };
        state.devices.insert(
            device_id.to_string(),
            DeviceState {
                born: true,
                snapshot,
            },
        );
        Ok(())
    }

    /// DBIRTH every known device. Failures are logged per device.
    async fn birth_devices(&self, state: &mut NodeState) {
        let ids: Vec<String> = state.devices.keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.rebirth_device(state, &id).await {
                error!("Device birth failed. device={id}: {e}");
            }
        }
    }

    async fn rebirth(&self, state: &mut NodeState) -> Result<(), PublishError> {
        info!("Rebirthing node {}", self.node_id);
        state.lifecycle.set_offline();
        self.node_birth(state).await?;
        self.birth_devices(state).await;
        Ok(())
    }

    async fn on_connected(&self) {
        let mut state = self.state.lock().await;
        info!("Edge node online. node={}", self.node_id);
        if let Err(e) = self.node_birth(&mut state).await {
            error!("Publishing node birth message failed. node={}: {e}", self.node_id);
            return;
        }
        self.birth_devices(&mut state).await;
    }

    async fn on_disconnected(&self) {
        let mut state = self.state.lock().await;
        state.lifecycle.set_offline();
        for device in state.devices.values_mut() {
            device.born = false;
        }
        info!(
            "Edge node offline. node={} bdSeq={}",
            self.node_id,
            state.lifecycle.bd_seq()
        );
    }

    async fn on_rebirth_request(&self, target: RebirthTarget) {
        let mut state = self.state.lock().await;
        if !state.lifecycle.is_online() {
            warn!("Ignoring rebirth request while offline. node={}", self.node_id);
            return;
        }
        match target {
            RebirthTarget::Node => {
                if let Some(last) = state.last_rebirth_request {
                    if last.elapsed() < self.rebirth_request_cooldown {
                        info!("Got Rebirth CMD but cooldown time not expired. Ignoring");
                        return;
                    }
                }
                state.last_rebirth_request = Some(Instant::now());
                info!("Got Rebirth CMD - Rebirthing Node");
                if let Err(e) = self.rebirth(&mut state).await {
                    error!("Rebirth failed. node={}: {e}", self.node_id);
                }
            }
            RebirthTarget::Device(device_id) => {
                info!("Got Rebirth CMD - Rebirthing Device {device_id}");
                if let Err(e) = self.rebirth_device(&mut state, &device_id).await {
                    warn!("Device rebirth failed. device={device_id}: {e}");
                }
            }
        }
    }
}

async fn run(inner: Arc<Inner>, mut events: mpsc::UnboundedReceiver<NodeEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            NodeEvent::Connected => inner.on_connected().await,
            NodeEvent::Disconnected => inner.on_disconnected().await,
            NodeEvent::Rebirth(target) => inner.on_rebirth_request(target).await,
            NodeEvent::Stop => break,
        }
    }
    debug!("Edge node task stopped. node={}", inner.node_id);
}

/// A Sparkplug B edge node publishing on behalf of its devices.
///
/// Births, data and deaths are published through a [Transport]. The node births itself whenever
/// the transport (re)connects, followed by every known device, and answers rebirth commands.
/// All sequence numbers are assigned under a single lock, so concurrent callers are safe.
///
/// See [NodeBuilder] on how to create a `SparkplugNode`. Build the node before connecting the
/// transport so the node death will is registered with the first connection.
#[derive(Clone)]
pub struct SparkplugNode {
    inner: Arc<Inner>,
}

impl SparkplugNode {
    pub(crate) async fn new_from_builder(builder: NodeBuilder) -> Result<Self, String> {
        let group_id = builder
            .group_id
            .ok_or("group id must be provided".to_string())?;
        let node_id = builder
            .node_id
            .ok_or("node id must be provided".to_string())?;
        validate_name(&group_id)?;
        validate_name(&node_id)?;
        let aliases = builder
            .aliases
            .ok_or("an alias registry must be provided".to_string())?;
        let births = builder
            .births
            .ok_or("a birth cache must be provided".to_string())?;
        let transport = builder.transport;

        let known_devices = births.list_device_ids().map_err(|e| e.to_string())?;
        let initial_bd_seq = births
            .get_node_birth()
            .map_err(|e| e.to_string())?
            .and_then(|cached| Payload::decode(cached.payload.as_slice()).ok())
            .and_then(|payload| payload.bdseq())
            .map_or(0, |bd_seq| bd_seq + 1);

        transport.set_last_will(LastWill::new_node(&group_id, &node_id, initial_bd_seq));

        let (events, events_rx) = mpsc::unbounded_channel();
        let listener_events = events.clone();
        transport.on_connection_event(move |event| {
            let event = match event {
                ConnectionEvent::Connected { .. } => NodeEvent::Connected,
                ConnectionEvent::Disconnected { .. } => NodeEvent::Disconnected,
            };
            _ = listener_events.send(event);
        });

        let command_filters = [
            NodeTopic::new(&group_id, NodeMessage::NCmd, &node_id).topic,
            DeviceTopic::new(&group_id, DeviceMessage::DCmd, &node_id, "+").topic,
        ];
        for filter in command_filters {
            let command_events = events.clone();
            let (g, n) = (group_id.clone(), node_id.clone());
            transport
                .subscribe(
                    TopicFilter::new_with_qos(filter, QoS::AtLeastOnce),
                    move |message: &IncomingMessage| {
                        if let Some(target) = rebirth_request(message, &g, &n) {
                            _ = command_events.send(NodeEvent::Rebirth(target));
                        }
                    },
                )
                .await
                .map_err(|e| e.to_string())?;
        }

        info!(
            "Edge node created. node={node_id} bdSeq={initial_bd_seq} cached devices={}",
            known_devices.len()
        );
        let inner = Arc::new(Inner {
            state: Mutex::new(NodeState {
                lifecycle: NodeLifecycle::new(initial_bd_seq),
                devices: known_devices
                    .into_iter()
                    .map(|id| (id, DeviceState::default()))
                    .collect(),
                last_rebirth_request: None,
            }),
            group_id,
            node_id,
            transport,
            aliases,
            births,
            dedup: builder.dedup,
            rebirth_request_cooldown: builder.rebirth_request_cooldown,
            events,
        });
        tokio::spawn(run(inner.clone(), events_rx));
        Ok(Self { inner })
    }

    pub fn group_id(&self) -> &str {
        &self.inner.group_id
    }

    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    pub fn transport(&self) -> &Transport {
        &self.inner.transport
    }

    /// Connect the underlying transport. See [Transport::connect].
    pub async fn connect(&self, timeout: Duration) -> Result<(), TransportError> {
        self.inner.transport.connect(timeout).await
    }

    /// True between a successful NBIRTH and the next disconnect.
    pub async fn is_online(&self) -> bool {
        self.inner.state.lock().await.lifecycle.is_online()
    }

    /// The `bdSeq` of the current (or last) node session.
    pub async fn bd_seq(&self) -> u64 {
        self.inner.state.lock().await.lifecycle.bd_seq()
    }

    /// Publish an NBIRTH.
    ///
    /// The first NBIRTH carries the initial `bdSeq`, every later one increments it. Resets `seq`
    /// and re-arms the command subscriptions. Devices need a new DBIRTH afterwards, which
    /// [SparkplugNode::publish_device_data] sends on demand. See [SparkplugNode::rebirth] for
    /// how the registered will lags behind a birth made inside a live connection.
    pub async fn publish_node_birth(&self) -> Result<(), PublishError> {
        let mut state = self.inner.state.lock().await;
        self.inner.node_birth(&mut state).await
    }

    /// Publish a DBIRTH with the full metric set of a device.
    ///
    /// Aliases are taken from the alias registry. The encoded birth is cached and the metric set
    /// is kept in memory for later rebirths.
    pub async fn publish_device_birth(
        &self,
        device_id: &str,
        metrics: Vec<Metric>,
        source: Option<&str>,
    ) -> Result<(), PublishError> {
        validate_name(device_id).map_err(PublishError::InvalidName)?;
        if metrics.is_empty() {
            return Err(PublishError::NoMetrics);
        }
        let mut state = self.inner.state.lock().await;
        if !state.lifecycle.is_online() {
            return Err(PublishError::NodeOffline);
        }
        self.inner
            .device_birth(&mut state, device_id, metrics, source.map(str::to_string))
            .await
    }

    /// Publish changed metrics of a device as DDATA, using aliases only.
    ///
    /// A device without a birth in the current session, or a metric the last birth did not
    /// announce, results in a DBIRTH of the merged metric set instead. When a dedup store is
    /// configured unchanged values are dropped, and nothing is published if none changed.
    pub async fn publish_device_data(
        &self,
        device_id: &str,
        metrics: Vec<Metric>,
    ) -> Result<(), PublishError> {
        validate_name(device_id).map_err(PublishError::InvalidName)?;
        if metrics.is_empty() {
            return Err(PublishError::NoMetrics);
        }
        let mut state = self.inner.state.lock().await;
        if !state.lifecycle.is_online() {
            return Err(PublishError::NodeOffline);
        }
        self.inner.device_data(&mut state, device_id, metrics).await
    }

    /// Publish a DDEATH and forget the device.
    pub async fn publish_device_death(&self, device_id: &str) -> Result<(), PublishError> {
        validate_name(device_id).map_err(PublishError::InvalidName)?;
        let mut state = self.inner.state.lock().await;
        if !state.lifecycle.is_online() {
            return Err(PublishError::NodeOffline);
        }
        if !state.devices.contains_key(device_id) {
            return Err(PublishError::DeviceUnknown(device_id.to_string()));
        }
        self.inner.device_death(&mut state, device_id).await
    }

    /// Remove a device, publishing its DDEATH when the node is online.
    ///
    /// With `decommission` the device's aliases are released as well.
    pub async fn remove_device(&self, device_id: &str, decommission: bool) -> Result<(), PublishError> {
        validate_name(device_id).map_err(PublishError::InvalidName)?;
        let mut state = self.inner.state.lock().await;
        if state.lifecycle.is_online() && state.devices.contains_key(device_id) {
            self.inner.device_death(&mut state, device_id).await?;
        } else {
            self.inner.forget_device(&mut state, device_id)?;
        }
        if decommission {
            let removed = self.inner.aliases.clear_device(device_id)?;
            info!("Decommissioned device {device_id}, released {removed} aliases");
        }
        Ok(())
    }

    /// Rebirth the node: NBIRTH followed by a DBIRTH for every known device.
    ///
    /// Devices are reborn from their in-memory metric set, or from the birth cache when there is
    /// none (e.g. straight after a restart).
    ///
    /// A rebirth inside a live connection increments `bdSeq`, but the broker keeps the will
    /// registered at CONNECT. Until the next reconnect an unexpected drop therefore publishes an
    /// NDEATH carrying the previous `bdSeq`, which does not match the live NBIRTH. The same holds
    /// for [SparkplugNode::publish_node_birth].
    pub async fn rebirth(&self) -> Result<(), PublishError> {
        if self.inner.transport.state() != ConnectionState::Connected {
            return Err(TransportError::NotConnected.into());
        }
        let mut state = self.inner.state.lock().await;
        self.inner.rebirth(&mut state).await
    }

    /// Publish a DBIRTH for a single device from its in-memory metric set or its cached birth.
    pub async fn rebirth_device(&self, device_id: &str) -> Result<(), PublishError> {
        validate_name(device_id).map_err(PublishError::InvalidName)?;
        let mut state = self.inner.state.lock().await;
        if !state.lifecycle.is_online() {
            return Err(PublishError::NodeOffline);
        }
        self.inner.rebirth_device(&mut state, device_id).await
    }

    /// Publish an NDEATH, disconnect cleanly and stop the node.
    pub async fn shutdown(&self) -> Result<(), PublishError> {
        let mut state = self.inner.state.lock().await;
        if state.lifecycle.is_online() {
            let topic = self.inner.node_topic(NodeMessage::NDeath);
            let payload = node_death_payload(state.lifecycle.bd_seq());
            if let Err(e) = self
                .inner
                .send(
                    topic.topic.clone(),
                    topic.get_publish_quality_retain(),
                    payload.encode_to_vec(),
                )
                .await
            {
                debug!("Unable to publish node death certificate on exit: {e}");
            }
            state.lifecycle.set_offline();
        }
        drop(state);
        info!("Edge node stopping. node={}", self.inner.node_id);
        let result = self.inner.transport.disconnect().await;
        _ = self.inner.events.send(NodeEvent::Stop);
        result.map_err(PublishError::from)
    }
}
