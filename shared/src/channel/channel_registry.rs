use std::collections::HashMap;

use log::info;

use crate::{
    channel::{
        channel::Channel, descriptor::ChannelDescriptor, error::ChannelError,
        subscription::HandlerSpec,
    },
    config::BufferConfig,
    types::ChannelName,
};

/// Every channel wired on one device, keyed by name
pub struct ChannelRegistry {
    config: BufferConfig,
    channels: HashMap<ChannelName, Channel>,
}

impl ChannelRegistry {
    pub fn new(config: BufferConfig) -> Self {
        Self {
            config,
            channels: HashMap::new(),
        }
    }

    /// Builds the channel and subscribes every declared consumer. A second
    /// wiring under the same name is rejected and leaves the first intact.
    pub fn wire(&mut self, descriptor: ChannelDescriptor) -> Result<&mut Channel, ChannelError> {
        let name = descriptor.display_name();
        if self.channels.contains_key(&name) {
            return Err(ChannelError::ChannelAlreadyWired { channel: name });
        }

        let mut channel = Channel::new(descriptor, &self.config)?;
        for subscription in channel.declared_subscriptions() {
            channel.subscribe(subscription);
        }
        info!(
            "Wired channel {} ({} subscriber(s))",
            name,
            channel.subscribers().len()
        );

        Ok(self.channels.entry(name).or_insert(channel))
    }

    pub fn tear_down(&mut self, name: &str) -> Result<Channel, ChannelError> {
        let channel = self
            .channels
            .remove(name)
            .ok_or_else(|| ChannelError::ChannelNotFound {
                channel: name.to_string(),
            })?;
        info!("Tore down channel {}", name);
        Ok(channel)
    }

    pub fn get(&self, name: &str) -> Option<&Channel> {
        self.channels.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Channel> {
        self.channels.get_mut(name)
    }

    pub fn try_get_mut(&mut self, name: &str) -> Result<&mut Channel, ChannelError> {
        self.channels
            .get_mut(name)
            .ok_or_else(|| ChannelError::ChannelNotFound {
                channel: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Channel names, sorted
    pub fn names(&self) -> Vec<ChannelName> {
        let mut names: Vec<ChannelName> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }

    /// Names of every channel `instance_id` takes part in, sorted
    pub fn channels_of(&self, instance_id: &str) -> Vec<ChannelName> {
        let mut names: Vec<ChannelName> = self
            .channels
            .values()
            .filter(|channel| channel.participates(instance_id))
            .map(|channel| channel.name().to_string())
            .collect();
        names.sort();
        names
    }

    /// Names of the channels that carry `event` from `instance_id`. An event
    /// no channel declares goes to every channel the instance publishes on,
    /// where it is logged as undeclared.
    pub fn publishing_channels(&self, instance_id: &str, event: &str) -> Vec<ChannelName> {
        let declared: Vec<&Channel> = self
            .channels
            .values()
            .filter(|channel| channel.is_published_event(instance_id, event))
            .collect();
        let carriers = if declared.is_empty() {
            self.channels
                .values()
                .filter(|channel| channel.is_publisher(instance_id))
                .collect()
        } else {
            declared
        };
        let mut names: Vec<ChannelName> = carriers
            .into_iter()
            .map(|channel| channel.name().to_string())
            .collect();
        names.sort();
        names
    }

    /// The (channel, handler) pairs under which `instance_id` is subscribed
    pub fn consumer_mappings(&self, instance_id: &str) -> Vec<(ChannelName, HandlerSpec)> {
        let mut mappings: Vec<(ChannelName, HandlerSpec)> = self
            .channels
            .values()
            .flat_map(|channel| {
                channel
                    .subscribers()
                    .iter()
                    .filter(|subscription| subscription.instance_id == instance_id)
                    .map(|subscription| (channel.name().to_string(), subscription.handler.clone()))
            })
            .collect();
        mappings.sort_by(|a, b| a.0.cmp(&b.0));
        mappings
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Channel> {
        self.channels.values_mut()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new(BufferConfig::default())
    }
}
