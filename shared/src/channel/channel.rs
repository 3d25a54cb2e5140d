//! ## `Channel` – named pub/sub link
//!
//! A channel connects the publishing participants of a composition to its
//! consuming participants. Publishing mediates the message once per
//! subscriber and hands the copy to the [`ChannelDispatch`]: locally hosted
//! subscribers are invoked right away, subscribers on other devices get a
//! [`RemoteDelivery`].
//!
//! ### Blocking
//! While blocked, every publish (local or remote) is appended to a FIFO and
//! nothing is dispatched. `unblock` drains the FIFO through the same
//! dispatch path in arrival order. A drained remote delivery whose
//! subscriber is no longer local is forwarded to its current host.
//!
//! ### Invariants
//! * A publisher never receives its own event on this channel.
//! * At most one subscription per (instance, operation).

use std::collections::{HashMap, HashSet, VecDeque};

use log::{debug, info, warn};

use crate::{
    channel::{
        descriptor::{ChannelDescriptor, ChannelType, Participant},
        dispatch::{ChannelDispatch, DeliveryError, PublishReport, RemoteDelivery},
        error::ChannelError,
        subscription::{HandlerSpec, Subscription},
    },
    config::BufferConfig,
    mediation::{
        error::MediationError,
        mediator::{check_param_types, ChannelParam, MediationPlan},
    },
    message::Message,
    types::{ChannelName, InstanceId},
};

enum Pending {
    Local {
        publisher: InstanceId,
        message: Message,
    },
    Remote(RemoteDelivery),
}

pub struct Channel {
    name: ChannelName,
    kind: ChannelType,
    sender_role: String,
    receiver_role: String,
    publishers: Vec<Participant>,
    consumers: Vec<Participant>,
    params: Vec<ChannelParam>,
    threshold: Option<usize>,

    subscribers: Vec<Subscription>,
    published_events: HashSet<(InstanceId, String)>,
    publisher_params: HashMap<(InstanceId, String), Vec<String>>,
    plans: HashMap<(InstanceId, String), MediationPlan>,

    blocked: bool,
    buffer: VecDeque<Pending>,
    max_buffered: usize,
    threshold_warned: bool,
}

impl Channel {
    /// Builds a channel from its descriptor. Fails on a malformed descriptor
    /// or a transform that does not compile. No subscriptions are made; see
    /// [`Channel::declared_subscriptions`].
    pub fn new(descriptor: ChannelDescriptor, config: &BufferConfig) -> Result<Self, ChannelError> {
        descriptor.validate()?;

        let name = descriptor.display_name();
        let kind = descriptor.kind.ok_or_else(|| ChannelError::MalformedDescriptor {
            channel: name.clone(),
            reason: "missing type",
        })?;
        let (publishers, consumers) = descriptor.sides(kind);
        let publishers = publishers.to_vec();
        let consumers = consumers.to_vec();

        let mut published_events = HashSet::new();
        let mut publisher_params = HashMap::new();
        for publisher in &publishers {
            if let Some(event) = publisher.published_event() {
                let key = (publisher.instance_id.clone(), event.to_string());
                published_events.insert(key.clone());
                publisher_params.insert(key, publisher.params.clone());
            }
        }

        let mut plans = HashMap::new();
        for consumer in &consumers {
            let Some(operation) = consumer.consumed_operation() else {
                continue;
            };
            let plan = MediationPlan::compile(&consumer.params, &consumer.transforms).map_err(
                |error| ChannelError::InvalidTransform {
                    channel: name.clone(),
                    instance_id: consumer.instance_id.clone(),
                    error,
                },
            )?;
            plans.insert((consumer.instance_id.clone(), operation.to_string()), plan);
        }

        Ok(Self {
            name,
            kind,
            sender_role: descriptor.sender_role.unwrap_or_default(),
            receiver_role: descriptor.receiver_role.unwrap_or_default(),
            publishers,
            consumers,
            params: descriptor.params,
            threshold: descriptor.threshold,
            subscribers: Vec::new(),
            published_events,
            publisher_params,
            plans,
            blocked: false,
            buffer: VecDeque::new(),
            max_buffered: config.max_buffered,
            threshold_warned: false,
        })
    }

    // Accessors

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ChannelType {
        self.kind
    }

    pub fn sender_role(&self) -> &str {
        &self.sender_role
    }

    pub fn receiver_role(&self) -> &str {
        &self.receiver_role
    }

    pub fn params(&self) -> &[ChannelParam] {
        &self.params
    }

    pub fn threshold(&self) -> Option<usize> {
        self.threshold
    }

    pub fn publishers(&self) -> &[Participant] {
        &self.publishers
    }

    pub fn consumers(&self) -> &[Participant] {
        &self.consumers
    }

    pub fn subscribers(&self) -> &[Subscription] {
        &self.subscribers
    }

    pub fn is_published_event(&self, instance_id: &str, event: &str) -> bool {
        self.published_events
            .contains(&(instance_id.to_string(), event.to_string()))
    }

    pub fn is_publisher(&self, instance_id: &str) -> bool {
        self.publishers
            .iter()
            .any(|publisher| publisher.instance_id == instance_id)
    }

    /// Declared as a participant on either side, or subscribed
    pub fn participates(&self, instance_id: &str) -> bool {
        self.is_publisher(instance_id)
            || self
                .consumers
                .iter()
                .any(|consumer| consumer.instance_id == instance_id)
            || self
                .subscribers
                .iter()
                .any(|subscription| subscription.instance_id == instance_id)
    }

    /// The subscriptions the composition declares for this channel's consumers
    pub fn declared_subscriptions(&self) -> Vec<Subscription> {
        let consumer_role = match self.kind {
            ChannelType::Backlink => &self.sender_role,
            _ => &self.receiver_role,
        };
        self.consumers
            .iter()
            .filter_map(|consumer| {
                let operation = consumer.consumed_operation()?;
                let handler = match (&consumer.property, self.kind) {
                    (Some(property), ChannelType::PropLink) => {
                        HandlerSpec::property(operation, property)
                    }
                    _ => HandlerSpec::operation_with_params(operation, &consumer.params),
                };
                Some(Subscription::new(&consumer.instance_id, handler, consumer_role))
            })
            .collect()
    }

    // Subscriptions

    /// Adds a subscription; returns `false` if (instance, operation) was
    /// already subscribed, in which case nothing changes
    pub fn subscribe(&mut self, subscription: Subscription) -> bool {
        if self
            .subscribers
            .iter()
            .any(|existing| existing.matches(&subscription.instance_id, subscription.operation()))
        {
            debug!(
                "Channel {}: {}.{} already subscribed",
                self.name,
                subscription.instance_id,
                subscription.operation()
            );
            return false;
        }
        self.subscribers.push(subscription);
        true
    }

    pub fn unsubscribe(&mut self, instance_id: &str, operation: &str) -> bool {
        let before = self.subscribers.len();
        self.subscribers
            .retain(|subscription| !subscription.matches(instance_id, operation));
        before != self.subscribers.len()
    }

    pub fn clear_subscribers(&mut self) {
        self.subscribers.clear();
    }

    // Blocking

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// The buffer has reached the declared sync threshold
    pub fn over_threshold(&self) -> bool {
        self.threshold
            .map_or(false, |threshold| self.buffer.len() >= threshold)
    }

    pub fn block(&mut self) {
        if !self.blocked {
            info!("Channel {} blocked", self.name);
        }
        self.blocked = true;
        self.threshold_warned = false;
    }

    /// Clears the flag and drains the FIFO in arrival order
    pub fn unblock(&mut self, dispatch: &mut dyn ChannelDispatch) -> PublishReport {
        self.blocked = false;
        let mut report = PublishReport::default();
        if !self.buffer.is_empty() {
            info!(
                "Channel {} unblocked, draining {} buffered message(s)",
                self.name,
                self.buffer.len()
            );
        }
        while let Some(pending) = self.buffer.pop_front() {
            let drained = match pending {
                Pending::Local { publisher, message } => {
                    self.dispatch_local(&publisher, &message, dispatch)
                }
                Pending::Remote(delivery) => self.dispatch_remote(delivery, dispatch),
            };
            report.merge(drained);
        }
        report
    }

    fn ensure_capacity(&mut self, incoming: usize) -> Result<(), ChannelError> {
        if self.buffer.len() + incoming > self.max_buffered {
            warn!(
                "Channel {} buffer full ({} messages), rejecting {} more",
                self.name, self.max_buffered, incoming
            );
            return Err(ChannelError::BufferFull {
                channel: self.name.clone(),
                capacity: self.max_buffered,
            });
        }
        Ok(())
    }

    fn note_threshold(&mut self) {
        if !self.threshold_warned && self.over_threshold() {
            self.threshold_warned = true;
            warn!(
                "Channel {} holds {} buffered message(s), sync threshold reached",
                self.name,
                self.buffer.len()
            );
        }
    }

    // Publishing

    /// Publishes `message` from `publisher` to every other subscriber.
    ///
    /// Only a full buffer fails the call; per-subscriber problems are logged
    /// and counted in the report.
    pub fn publish_local_message(
        &mut self,
        publisher: &str,
        message: Message,
        dispatch: &mut dyn ChannelDispatch,
    ) -> Result<PublishReport, ChannelError> {
        if self.blocked {
            self.ensure_capacity(1)?;
            self.buffer.push_back(Pending::Local {
                publisher: publisher.to_string(),
                message,
            });
            self.note_threshold();
            return Ok(PublishReport::buffered(1));
        }
        Ok(self.dispatch_local(publisher, &message, dispatch))
    }

    /// Delivers copies already mediated elsewhere to local subscribers.
    /// While blocked the whole batch is buffered, or rejected if it does not fit.
    pub fn publish_remote_message(
        &mut self,
        deliveries: Vec<RemoteDelivery>,
        dispatch: &mut dyn ChannelDispatch,
    ) -> Result<PublishReport, ChannelError> {
        if self.blocked {
            self.ensure_capacity(deliveries.len())?;
            let count = deliveries.len();
            self.buffer
                .extend(deliveries.into_iter().map(Pending::Remote));
            self.note_threshold();
            return Ok(PublishReport::buffered(count));
        }
        let mut report = PublishReport::default();
        for delivery in deliveries {
            report.merge(self.dispatch_remote(delivery, dispatch));
        }
        Ok(report)
    }

    fn mediate(
        &self,
        source_params: &[String],
        subscription: &Subscription,
        message: &Message,
    ) -> Result<Message, MediationError> {
        let key = (
            subscription.instance_id.clone(),
            subscription.operation().to_string(),
        );
        let body = match self.plans.get(&key) {
            Some(plan) => plan.apply(source_params, &message.body)?,
            None => message.body.clone(),
        };
        check_param_types(&self.params, &body)?;
        Ok(message.rebody(body))
    }

    fn dispatch_local(
        &self,
        publisher: &str,
        message: &Message,
        dispatch: &mut dyn ChannelDispatch,
    ) -> PublishReport {
        let key = (publisher.to_string(), message.name.clone());
        if !self.published_events.contains(&key) {
            warn!(
                "Channel {}: {}.{} is not a declared event, delivering anyway",
                self.name, publisher, message.name
            );
        }
        let source_params = self
            .publisher_params
            .get(&key)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let mut report = PublishReport::default();
        for subscription in &self.subscribers {
            if subscription.instance_id == publisher {
                continue;
            }

            let mediated = match self.mediate(source_params, subscription, message) {
                Ok(mediated) => mediated,
                Err(error) => {
                    warn!(
                        "Channel {}: mediation for {}.{} failed: {}",
                        self.name,
                        subscription.instance_id,
                        subscription.operation(),
                        error
                    );
                    report.failed += 1;
                    continue;
                }
            };

            let result = if dispatch.is_local(&subscription.instance_id) {
                dispatch
                    .deliver_local(&self.name, subscription, mediated)
                    .map(|_| report.delivered += 1)
            } else {
                let delivery = RemoteDelivery {
                    instance_id: subscription.instance_id.clone(),
                    operation: subscription.operation().to_string(),
                    message: mediated,
                };
                dispatch
                    .forward_remote(&self.name, delivery)
                    .map(|_| report.forwarded += 1)
            };
            if let Err(error) = result {
                self.log_delivery_failure(subscription, &error);
                report.failed += 1;
            }
        }
        report
    }

    fn dispatch_remote(
        &self,
        delivery: RemoteDelivery,
        dispatch: &mut dyn ChannelDispatch,
    ) -> PublishReport {
        let mut report = PublishReport::default();
        let Some(subscription) = self
            .subscribers
            .iter()
            .find(|subscription| subscription.matches(&delivery.instance_id, &delivery.operation))
        else {
            warn!(
                "Channel {}: {}",
                self.name,
                DeliveryError::HandlerNotFound {
                    instance_id: delivery.instance_id,
                    operation: delivery.operation,
                }
            );
            report.failed += 1;
            return report;
        };

        let result = if dispatch.is_local(&delivery.instance_id) {
            dispatch
                .deliver_local(&self.name, subscription, delivery.message)
                .map(|_| report.delivered += 1)
        } else {
            debug!(
                "Channel {}: {} moved, re-routing remote delivery",
                self.name, delivery.instance_id
            );
            dispatch
                .forward_remote(&self.name, delivery)
                .map(|_| report.forwarded += 1)
        };
        if let Err(error) = result {
            self.log_delivery_failure(subscription, &error);
            report.failed += 1;
        }
        report
    }

    fn log_delivery_failure(&self, subscription: &Subscription, error: &DeliveryError) {
        warn!(
            "Channel {}: delivery to {}.{} failed: {}",
            self.name,
            subscription.instance_id,
            subscription.operation(),
            error
        );
    }
}
