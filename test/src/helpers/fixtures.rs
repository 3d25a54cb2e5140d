use nomad_shared::{
    ChannelDescriptor, ComponentDescriptor, Device, Participant, PlatformDescriptor,
    ServiceEndpoint,
};

/// A device offering the `weather` service
pub fn device(session_id: &str) -> Device {
    let mut device = Device::new(
        session_id,
        PlatformDescriptor::new("nomad", "0.1"),
        PlatformDescriptor::new("linux", "6.1"),
    );
    device.add_service(
        "weather",
        ServiceEndpoint {
            url: "https://weather.example/api".to_string(),
            protocol: "http".to_string(),
        },
    );
    device
}

/// A recording component that snapshots its `seen` counter
pub fn recorder(instance_id: &str) -> ComponentDescriptor {
    ComponentDescriptor::new(instance_id, "recorder").with_properties(&["seen"])
}

/// `A.onSelect(id)` → `B.show(target)`
pub fn ch1() -> ChannelDescriptor {
    ChannelDescriptor::link("ch1")
        .sender(Participant::publisher("A", "onSelect", &["id"]))
        .receiver(Participant::consumer("B", "show", &["target"]))
}
