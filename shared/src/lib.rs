//! # Nomad Shared
//! Channels, event proxies, buffers and registries shared between the
//! nomad-client runtime and the nomad-server relay.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod buffer;
mod channel;
mod component;
mod config;
mod container;
mod device;
mod handler;
mod mediation;
mod message;
mod proxy;
mod relocation;
mod transaction;
mod types;

pub use buffer::{
    error::BufferError,
    input_event::{CallTarget, InputEvent, InputEventKind},
    input_event_buffer::{BufferSnapshot, InputEventBuffer},
};
pub use channel::{
    channel::Channel,
    channel_registry::ChannelRegistry,
    descriptor::{ChannelDescriptor, ChannelType, Participant},
    dispatch::{ChannelDispatch, DeliveryError, PublishReport, RemoteDelivery},
    error::ChannelError,
    subscription::{HandlerSpec, Subscription},
};
pub use component::{
    Capabilities, Capability, Component, ComponentContext, ComponentDescriptor, ComponentError,
    Effect,
};
pub use config::BufferConfig;
pub use container::ContainerContract;
pub use device::{
    device::{Device, PlatformDescriptor, ServiceEndpoint},
    device_registry::DeviceRegistry,
    error::DeviceError,
};
pub use handler::{
    error::HandlerError,
    handler_context::{Continuation, HandlerContext, HandlerRecord},
    handler_registry::HandlerContextRegistry,
};
pub use mediation::{
    error::MediationError,
    expr::{Expr, Scope},
    mediator::{check_param_types, remap_positionally, ChannelParam, MediationPlan, ParamType},
};
pub use message::Message;
pub use proxy::{
    error::ProxyError,
    event_proxy::{EventProxy, PublishOutcome, Released},
    network_proxy::{response_message, NetworkProxy, ServiceCall},
    timer_proxy::TimerProxy,
};
pub use relocation::{
    snapshot::ComponentSnapshot,
    status::{RelocationCondition, RelocationStatus},
};
pub use transaction::{
    envelope::{Envelope, Level, Payload, RelocationPayload, Tag},
    error::TransactionError,
};
pub use types::{
    ChannelName, CorrelationId, EventId, InstanceId, MigrationId, Millis, SessionId, Side,
};
