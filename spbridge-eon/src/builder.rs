use std::time::Duration;

use spbridge_client::Transport;
use spbridge_store::{AliasRegistry, BirthCache, DedupStore};

use crate::SparkplugNode;

/// A builder for creating and configuring [SparkplugNode] instances.
pub struct NodeBuilder {
    pub(crate) group_id: Option<String>,
    pub(crate) node_id: Option<String>,
    pub(crate) transport: Transport,
    pub(crate) aliases: Option<AliasRegistry>,
    pub(crate) births: Option<BirthCache>,
    pub(crate) dedup: Option<DedupStore>,
    pub(crate) rebirth_request_cooldown: Duration,
}

impl NodeBuilder {
    /// Creates a new builder publishing through `transport`.
    pub fn new(transport: Transport) -> Self {
        Self {
            group_id: None,
            node_id: None,
            transport,
            aliases: None,
            births: None,
            dedup: None,
            rebirth_request_cooldown: Duration::from_secs(5),
        }
    }

    /// Sets the group ID the node belongs to.
    pub fn with_group_id<S: Into<String>>(mut self, group_id: S) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Sets the node ID. It uniquely identifies this node within its group.
    pub fn with_node_id<S: Into<String>>(mut self, node_id: S) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    /// Sets the minimum time between two honored node rebirth commands. Defaults to 5 seconds.
    pub fn with_rebirth_request_cooldown(mut self, cooldown: Duration) -> Self {
        self.rebirth_request_cooldown = cooldown;
        self
    }

    /// Sets the registry the node takes metric aliases from. Required.
    pub fn with_alias_registry(mut self, aliases: AliasRegistry) -> Self {
        self.aliases = Some(aliases);
        self
    }

    /// Sets the cache births are written to and recovered from. Required.
    pub fn with_birth_cache(mut self, births: BirthCache) -> Self {
        self.births = Some(births);
        self
    }

    /// Enables dropping of unchanged DDATA values.
    pub fn with_dedup_store(mut self, dedup: DedupStore) -> Self {
        self.dedup = Some(dedup);
        self
    }

    /// Builds the node.
    ///
    /// Registers the node death will and the command subscriptions with the transport, so it
    /// should be called before the transport is connected. Returns an error if the group or node
    /// id is missing or invalid, a required store is missing, or the birth cache cannot be read.
    pub async fn build(self) -> Result<SparkplugNode, String> {
        SparkplugNode::new_from_builder(self).await
    }
}
