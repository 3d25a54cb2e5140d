/// Uninterrupted relocations: the component ends up on the target with its
/// state, and traffic sent at any phase reaches it exactly once, in order.
use serde_json::json;

use nomad_client::RelocationRequest;
use nomad_shared::{
    ChannelDescriptor, Message, Participant, RelocationCondition, RelocationStatus, Tag,
};
use nomad_test::{ch1, recorder, Journal, TestBus};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn select(id: &str) -> Message {
    Message::new("onSelect").with("id", id)
}

fn bus_with(journal: &Journal, a_on: &str, b_on: &str) -> TestBus {
    let mut bus = TestBus::new(&["s1", "s2"], journal);
    bus.wire(ch1());
    bus.place(recorder("A"), a_on);
    bus.place(recorder("B"), b_on);
    bus
}

#[test]
fn relocated_component_runs_on_target_with_its_state() {
    init_logging();
    let journal = Journal::new();
    let mut bus = bus_with(&journal, "s1", "s2");
    bus.publish("A", select("x1"));
    bus.publish("A", select("x2"));

    bus.relocate("m1", &["B"], "s2", "s1");

    let item = bus.coordinator().item("m1", "B").unwrap();
    assert_eq!(item.status(), RelocationStatus::Run);
    assert_eq!(item.condition(), RelocationCondition::Success);
    assert_eq!(item.history(), &RelocationStatus::ALL[..]);
    assert_eq!(bus.coordinator().progress("m1"), Some(100));

    assert!(bus.runtime("s2").container("B").is_none());
    let moved = bus.runtime("s1").container("B").unwrap();
    assert_eq!(moved.property("seen"), Some(json!(2)));
    assert!(!moved.proxy().is_blocked());
    assert_eq!(
        bus.runtime("s2").devices().host_of("B").map(String::as_str),
        Some("s1")
    );
    assert!(!bus.runtime("s1").channel("ch1").unwrap().is_blocked());
    assert!(!bus.runtime("s2").channel("ch1").unwrap().is_blocked());

    bus.publish("A", select("x3"));
    let shows = journal.of("B", "show");
    assert_eq!(shows.len(), 3);
    assert_eq!(shows[2].session_id, "s1");
    assert_eq!(
        bus.runtime("s1").container("B").unwrap().property("seen"),
        Some(json!(3))
    );
    assert!(bus.errors().is_empty(), "{:?}", bus.errors());
}

#[test]
fn relocation_reports_start_progress_and_completion() {
    init_logging();
    let journal = Journal::new();
    let mut bus = bus_with(&journal, "s1", "s2");

    bus.relocate("m1", &["B"], "s2", "s1");

    assert_eq!(bus.events_tagged(Tag::MigrationStart).len(), 1);
    let progress = bus.events_tagged(Tag::MigrationProgress);
    assert_eq!(progress.len(), 8);
    let statuses: Vec<RelocationStatus> = progress
        .iter()
        .filter_map(|event| event.relocation_payload()?.status)
        .collect();
    assert_eq!(statuses, RelocationStatus::ALL[1..].to_vec());

    let complete = bus.events_tagged(Tag::MigrationComplete);
    assert_eq!(complete.len(), 1);
    let payload = complete[0].relocation_payload().unwrap();
    assert_eq!(payload.migration_id, "m1");
    assert_eq!(payload.condition, Some(RelocationCondition::Success));
    assert!(bus.events_tagged(Tag::MigrationFailed).is_empty());
    assert!(bus.coordinator().is_finished("m1"));
}

#[test]
fn traffic_during_relocation_arrives_once_in_order() {
    init_logging();
    let journal = Journal::new();
    let mut bus = bus_with(&journal, "s1", "s2");
    let mut sent = vec!["x0".to_string()];
    bus.publish("A", select("x0"));

    bus.begin(RelocationRequest::new("m1", &["B"], "s2", "s1"));
    loop {
        let finished = bus.step("m1", "s2", "s1");
        let id = format!("x{}", sent.len());
        bus.publish("A", select(&id));
        sent.push(id);
        if finished {
            break;
        }
    }

    let received: Vec<String> = journal
        .values("B", "show", "target")
        .into_iter()
        .map(|value| value.as_str().unwrap().to_string())
        .collect();
    assert_eq!(received, sent);
    let shows = journal.of("B", "show");
    assert_eq!(shows.first().unwrap().session_id, "s2");
    assert_eq!(shows.last().unwrap().session_id, "s1");
}

#[test]
fn relocating_away_from_the_publisher_keeps_order() {
    init_logging();
    let journal = Journal::new();
    let mut bus = bus_with(&journal, "s1", "s1");
    let mut sent = Vec::new();

    bus.begin(RelocationRequest::new("m1", &["B"], "s1", "s2"));
    loop {
        let finished = bus.step("m1", "s1", "s2");
        let id = format!("y{}", sent.len());
        bus.publish("A", select(&id));
        sent.push(id);
        if finished {
            break;
        }
    }

    let received: Vec<String> = journal
        .values("B", "show", "target")
        .into_iter()
        .map(|value| value.as_str().unwrap().to_string())
        .collect();
    assert_eq!(received, sent);
    assert!(journal
        .of("B", "show")
        .iter()
        .all(|entry| entry.session_id == "s2"));
}

#[test]
fn messages_held_by_the_moving_component_are_released_on_target() {
    init_logging();
    let journal = Journal::new();
    let mut bus = TestBus::new(&["s1", "s2"], &journal);
    bus.wire(
        ChannelDescriptor::link("toLog")
            .sender(Participant::publisher("B", "onEcho", &["id"]))
            .receiver(Participant::consumer("C", "log", &["id"])),
    );
    bus.place(recorder("B"), "s2");
    bus.place(recorder("C"), "s1");
    let echo = |id: &str| Message::new("onEcho").with("id", id);

    bus.begin(RelocationRequest::new("m1", &["B"], "s2", "s1"));
    bus.step("m1", "s2", "s1");
    bus.publish("B", echo("e1"));
    for _ in 0..3 {
        bus.step("m1", "s2", "s1");
    }
    assert_eq!(
        bus.coordinator().item("m1", "B").unwrap().status(),
        RelocationStatus::Reintegrate
    );
    bus.publish("B", echo("e2"));
    assert!(journal.of("C", "log").is_empty());

    while !bus.step("m1", "s2", "s1") {}
    bus.publish("B", echo("e3"));

    assert_eq!(
        journal.values("C", "log", "id"),
        vec![json!("e1"), json!("e2"), json!("e3")]
    );
}

#[test]
fn several_components_move_together() {
    init_logging();
    let journal = Journal::new();
    let mut bus = bus_with(&journal, "s1", "s1");
    bus.publish("A", select("before"));

    bus.relocate("m1", &["A", "B"], "s1", "s2");

    assert!(bus.runtime("s1").instances().is_empty());
    assert_eq!(bus.runtime("s2").instances(), vec!["A", "B"]);
    assert!(bus
        .coordinator()
        .items("m1")
        .unwrap()
        .iter()
        .all(|item| item.condition() == RelocationCondition::Success));

    bus.publish("A", select("after"));
    let shows = journal.of("B", "show");
    assert_eq!(shows.len(), 2);
    assert_eq!(shows[0].session_id, "s1");
    assert_eq!(shows[1].session_id, "s2");
    assert!(!bus.runtime("s2").has_outgoing());
}
