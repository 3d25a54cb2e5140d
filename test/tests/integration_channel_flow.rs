/// Channel traffic between components on one device and across devices,
/// including effects that publish further and service calls answered by
/// the relay.
use serde_json::json;

use nomad_client::{RelocationRequest, RuntimeConfig, RuntimeError};
use nomad_shared::{
    BufferConfig, ChannelDescriptor, ChannelError, Message, Participant, RelocationStatus,
};
use nomad_test::{ch1, recorder, Journal, TestBus};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn select(id: &str) -> Message {
    Message::new("onSelect").with("id", id)
}

fn echo_channels() -> (ChannelDescriptor, ChannelDescriptor) {
    let to_echo = ChannelDescriptor::link("toEcho")
        .sender(Participant::publisher("A", "onSelect", &["id"]))
        .receiver(Participant::consumer("B", "echo", &["id"]));
    let to_log = ChannelDescriptor::link("toLog")
        .sender(Participant::publisher("B", "onEcho", &["id"]))
        .receiver(Participant::consumer("C", "log", &["id"]));
    (to_echo, to_log)
}

#[test]
fn link_delivers_across_devices() {
    init_logging();
    let journal = Journal::new();
    let mut bus = TestBus::new(&["s1", "s2"], &journal);
    bus.wire(ch1());
    bus.place(recorder("A"), "s1");
    bus.place(recorder("B"), "s2");

    bus.publish("A", select("x1"));
    bus.publish("A", select("x2"));

    assert_eq!(
        journal.values("B", "show", "target"),
        vec![json!("x1"), json!("x2")]
    );
    assert!(journal
        .of("B", "show")
        .iter()
        .all(|entry| entry.session_id == "s2"));
    assert!(journal.of("A", "show").is_empty());
    assert!(bus.errors().is_empty(), "{:?}", bus.errors());
}

#[test]
fn link_delivers_on_one_device() {
    init_logging();
    let journal = Journal::new();
    let mut bus = TestBus::new(&["s1", "s2"], &journal);
    bus.wire(ch1());
    bus.place(recorder("A"), "s1");
    bus.place(recorder("B"), "s1");

    bus.publish("A", select("x1"));

    assert_eq!(journal.values("B", "show", "target"), vec![json!("x1")]);
    assert_eq!(journal.of("B", "show")[0].session_id, "s1");
    assert!(!bus.runtime_mut("s1").has_outgoing());
}

#[test]
fn published_effects_travel_on() {
    init_logging();
    let journal = Journal::new();
    let mut bus = TestBus::new(&["s1", "s2"], &journal);
    let (to_echo, to_log) = echo_channels();
    bus.wire(to_echo);
    bus.wire(to_log);
    bus.place(recorder("A"), "s1");
    bus.place(recorder("B"), "s2");
    bus.place(recorder("C"), "s1");

    bus.publish("A", select("p1"));

    assert_eq!(journal.values("B", "echo", "id"), vec![json!("p1")]);
    assert_eq!(journal.values("C", "log", "id"), vec![json!("p1")]);
    assert_eq!(journal.of("C", "log")[0].session_id, "s1");
}

#[test]
fn service_calls_are_answered() {
    init_logging();
    let journal = Journal::new();
    let mut bus = TestBus::new(&["s1", "s2"], &journal);
    bus.place(recorder("B"), "s2");

    bus.invoke(
        "B",
        "fetch",
        Message::new("fetch")
            .with("service", "weather")
            .with("operation", "today")
            .with("arg", "Oslo"),
    );
    bus.invoke(
        "B",
        "fetch",
        Message::new("fetch")
            .with("service", "weather")
            .with("operation", "tomorrow"),
    );

    let responses = journal.of("B", "onFetched");
    assert_eq!(responses.len(), 2);
    assert_eq!(
        responses[0].body["payload"],
        json!({ "city": "Oslo", "sky": "clear" })
    );
    assert_eq!(responses[0].body["failed"], json!(false));
    assert_eq!(responses[1].body["failed"], json!(true));
    assert!(bus.runtime("s2").container("B").unwrap().registry().is_empty());
}

#[test]
fn service_missing_on_the_device_fails_the_call() {
    init_logging();
    let journal = Journal::new();
    let mut bus = TestBus::new(&["s1", "s2"], &journal);
    bus.place(recorder("B"), "s2");

    bus.invoke(
        "B",
        "fetch",
        Message::new("fetch").with("service", "traffic"),
    );

    let responses = journal.of("B", "onFetched");
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].body["failed"], json!(true));
    assert!(responses[0].body["payload"]["error"]
        .as_str()
        .unwrap()
        .contains("traffic"));
}

#[test]
fn full_channel_buffer_rejects_without_dropping() {
    init_logging();
    let journal = Journal::new();
    let config = RuntimeConfig {
        buffers: BufferConfig::bounded(2),
        ..Default::default()
    };
    let mut bus = TestBus::with_config(&["s1", "s2"], &journal, config);
    bus.wire(ch1());
    bus.place(recorder("A"), "s1");
    bus.place(recorder("B"), "s2");

    bus.begin(RelocationRequest::new("m1", &["B"], "s2", "s1"));
    bus.step("m1", "s2", "s1");
    assert_eq!(
        bus.coordinator().item("m1", "B").unwrap().status(),
        RelocationStatus::Block
    );

    let s1 = bus.runtime_mut("s1");
    assert_eq!(s1.publish("A", select("x1")).unwrap().buffered, 1);
    assert_eq!(s1.publish("A", select("x2")).unwrap().buffered, 1);
    assert!(matches!(
        s1.publish("A", select("x3")),
        Err(RuntimeError::Channel(ChannelError::BufferFull { capacity: 2, .. }))
    ));
    assert_eq!(s1.channel("ch1").unwrap().buffered_len(), 2);

    while !bus.step("m1", "s2", "s1") {}

    assert_eq!(
        journal.values("B", "show", "target"),
        vec![json!("x1"), json!("x2")]
    );
}

#[test]
fn transform_after_a_missing_parameter_keeps_its_name() {
    init_logging();
    let journal = Journal::new();
    let mut bus = TestBus::new(&["s1", "s2"], &journal);
    bus.wire(
        ChannelDescriptor::link("labelled")
            .sender(Participant::publisher("A", "onSelect", &["id"]))
            .receiver(
                Participant::consumer("B", "show", &["target", "extra", "label"])
                    .with_transform("label", "upper(id)"),
            ),
    );
    bus.place(recorder("A"), "s1");
    bus.place(recorder("B"), "s2");

    bus.publish("A", select("x1"));

    assert_eq!(journal.values("B", "show", "target"), vec![json!("x1")]);
    assert_eq!(journal.values("B", "show", "label"), vec![json!("X1")]);
    assert_eq!(journal.values("B", "show", "extra"), vec![serde_json::Value::Null]);
    assert!(bus.errors().is_empty(), "{:?}", bus.errors());
}
