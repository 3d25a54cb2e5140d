/// Timers and pending service calls travel with a relocating component: a
/// timer fires once, on the target, at its original due time; a response
/// that arrives mid-relocation reaches the component exactly once.
use serde_json::json;

use nomad_client::{RelocationRequest, RuntimeConfig};
use nomad_shared::{BufferConfig, Message};
use nomad_test::{recorder, Journal, TestBus};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn timeout_fires_once_on_the_target() {
    init_logging();
    let journal = Journal::new();
    let mut bus = TestBus::new(&["s1", "s2"], &journal);
    bus.place(recorder("B"), "s2");

    bus.invoke("B", "arm", Message::new("arm").with("delay", 100));
    bus.advance(40);
    bus.relocate("m1", &["B"], "s2", "s1");

    bus.advance(59);
    assert!(journal.of("B", "onTimer").is_empty());

    bus.advance(1);
    let fired = journal.of("B", "onTimer");
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].session_id, "s1");
    assert_eq!(fired[0].at, 100);

    bus.advance(500);
    assert_eq!(journal.of("B", "onTimer").len(), 1);
    assert!(bus.runtime("s1").container("B").unwrap().registry().is_empty());
}

#[test]
fn interval_keeps_its_phase_across_devices() {
    init_logging();
    let journal = Journal::new();
    let mut bus = TestBus::new(&["s1", "s2"], &journal);
    bus.place(recorder("B"), "s2");

    bus.invoke("B", "repeat", Message::new("repeat").with("period", 30));
    bus.advance(70);
    bus.relocate("m1", &["B"], "s2", "s1");
    bus.advance(60);

    let ticks = journal.of("B", "onTick");
    let at: Vec<u64> = ticks.iter().map(|tick| tick.at).collect();
    let sessions: Vec<&str> = ticks.iter().map(|tick| tick.session_id.as_str()).collect();
    assert_eq!(at, vec![30, 60, 90, 120]);
    assert_eq!(sessions, vec!["s2", "s2", "s1", "s1"]);
}

#[test]
fn timer_due_while_blocked_fires_on_the_target() {
    init_logging();
    let journal = Journal::new();
    let mut bus = TestBus::new(&["s1", "s2"], &journal);
    bus.place(recorder("B"), "s2");
    bus.invoke("B", "arm", Message::new("arm").with("delay", 10));

    bus.begin(RelocationRequest::new("m1", &["B"], "s2", "s1"));
    bus.step("m1", "s2", "s1");
    bus.advance(20);
    assert!(journal.of("B", "onTimer").is_empty());

    while !bus.step("m1", "s2", "s1") {}

    let fired = journal.of("B", "onTimer");
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].session_id, "s1");
}

#[test]
fn response_arriving_mid_relocation_is_delivered_once() {
    init_logging();
    let journal = Journal::new();
    let mut bus = TestBus::new(&["s1", "s2"], &journal);
    bus.place(recorder("B"), "s2");

    let fetch = Message::new("fetch")
        .with("service", "weather")
        .with("operation", "today")
        .with("arg", "Oslo");
    bus.runtime_mut("s2").invoke("B", "fetch", &fetch).unwrap();

    bus.begin(RelocationRequest::new("m1", &["B"], "s2", "s1"));
    for _ in 0..4 {
        assert!(!bus.step_quietly("m1", "s2", "s1").unwrap());
    }
    bus.exchange();
    assert!(journal.of("B", "onFetched").is_empty());

    while !bus.step("m1", "s2", "s1") {}

    let responses = journal.of("B", "onFetched");
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].session_id, "s1");
    assert_eq!(
        responses[0].body["payload"],
        json!({ "city": "Oslo", "sky": "clear" })
    );
    assert!(bus.errors().is_empty(), "{:?}", bus.errors());
}

#[test]
fn identical_calls_in_flight_are_answered_separately() {
    init_logging();
    let journal = Journal::new();
    let mut bus = TestBus::new(&["s1", "s2"], &journal);
    bus.place(recorder("B"), "s1");
    let fetch = Message::new("fetch").with("arg", "Oslo");

    bus.runtime_mut("s1").invoke("B", "fetch", &fetch).unwrap();
    bus.runtime_mut("s1").invoke("B", "fetch", &fetch).unwrap();
    bus.exchange();

    assert_eq!(journal.of("B", "onFetched").len(), 2);
    assert!(bus.errors().is_empty(), "{:?}", bus.errors());
    assert!(bus.runtime("s1").container("B").unwrap().registry().is_empty());
}

#[test]
fn timer_the_blocked_log_cannot_take_stays_armed() {
    init_logging();
    let journal = Journal::new();
    let config = RuntimeConfig {
        buffers: BufferConfig::bounded(1),
        ..Default::default()
    };
    let mut bus = TestBus::with_config(&["s1", "s2"], &journal, config);
    bus.place(recorder("B"), "s2");
    for handler in ["first", "second"] {
        bus.invoke(
            "B",
            "arm",
            Message::new("arm").with("handler", handler).with("delay", 10),
        );
    }

    bus.begin(RelocationRequest::new("m1", &["B"], "s2", "s1"));
    bus.step("m1", "s2", "s1");
    bus.advance(20);
    assert_eq!(
        bus.runtime("s2").container("B").unwrap().buffer().downstream_len(),
        1
    );
    assert_eq!(bus.runtime("s2").container("B").unwrap().registry().len(), 1);

    while !bus.step("m1", "s2", "s1") {}
    bus.advance(0);

    let mut fired: Vec<String> = journal
        .entries()
        .into_iter()
        .filter(|entry| entry.operation == "first" || entry.operation == "second")
        .map(|entry| {
            assert_eq!(entry.session_id, "s1");
            entry.operation
        })
        .collect();
    fired.sort();
    assert_eq!(fired, vec!["first", "second"]);
}
