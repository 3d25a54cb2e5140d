use std::collections::HashMap;

use nomad_shared::{
    ChannelDispatch, DeliveryError, DeviceRegistry, Envelope, InstanceId, Message, Millis,
    ProxyError, RemoteDelivery, Subscription,
};

use crate::container::component_container::ComponentContainer;

/// The runtime as channels see it while they dispatch
pub(crate) struct Hub<'a> {
    pub devices: &'a DeviceRegistry,
    pub containers: &'a mut HashMap<InstanceId, ComponentContainer>,
    pub outbox: &'a mut Vec<Envelope>,
    pub clock: Millis,
}

impl ChannelDispatch for Hub<'_> {
    fn is_local(&self, instance_id: &str) -> bool {
        self.containers.contains_key(instance_id) && self.devices.is_local(instance_id)
    }

    fn deliver_local(
        &mut self,
        channel: &str,
        subscription: &Subscription,
        message: Message,
    ) -> Result<(), DeliveryError> {
        let container = self
            .containers
            .get_mut(&subscription.instance_id)
            .ok_or_else(|| DeliveryError::NoRoute {
                instance_id: subscription.instance_id.clone(),
            })?;
        let (proxy, core) = container.parts();
        proxy
            .notify_operation(core, channel, subscription.operation(), &message)
            .map(|_| ())
            .map_err(|error| match error {
                ProxyError::NoMapping { instance_id, .. } => DeliveryError::HandlerNotFound {
                    instance_id,
                    operation: subscription.operation().to_string(),
                },
                other => DeliveryError::Rejected {
                    instance_id: subscription.instance_id.clone(),
                    reason: other.to_string(),
                },
            })
    }

    fn forward_remote(&mut self, channel: &str, delivery: RemoteDelivery) -> Result<(), DeliveryError> {
        let local = self.devices.local_session();
        let host = match self.devices.host_of(&delivery.instance_id) {
            Some(host) if host != local => host.clone(),
            _ => {
                return Err(DeliveryError::NoRoute {
                    instance_id: delivery.instance_id,
                })
            }
        };
        self.outbox.push(Envelope::remote_publish(
            local,
            &host,
            channel,
            vec![delivery],
            self.clock,
        ));
        Ok(())
    }
}
