//! # Nomad Client
//! A per-device runtime that hosts components, wires them together through
//! channels and moves them live to other devices with a relocation
//! coordinator.

#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces
)]

pub mod shared {
    pub use nomad_shared::{
        BufferConfig, ChannelDescriptor, ChannelType, Component, ComponentContext,
        ComponentDescriptor, ComponentError, Device, Envelope, Message, Participant,
        PlatformDescriptor, RelocationCondition, RelocationStatus, ServiceEndpoint,
    };
}

mod container;
mod coordinator;
mod error;
mod runtime;
mod runtime_config;

pub use container::{
    component_container::{ComponentContainer, ContainerCore},
    component_kinds::{ComponentFactory, ComponentKinds},
};
pub use coordinator::{
    error::RelocationError,
    relocation_coordinator::{CancelRequest, RelocationCoordinator, RelocationRequest},
    relocation_host::{RelocationHost, RelocationHosts},
    relocation_item::RelocationItem,
};
pub use error::RuntimeError;
pub use runtime::runtime::Runtime;
pub use runtime_config::RuntimeConfig;
