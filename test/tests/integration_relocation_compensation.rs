/// Cancelled and failing relocations: compensation walks the phases back and
/// leaves the component running on its source, with nothing lost.
use serde_json::json;

use nomad_client::{CancelRequest, RelocationError, RelocationHost, RelocationRequest, RuntimeError};
use nomad_shared::{
    Envelope, Message, RelocationCondition, RelocationPayload, RelocationStatus, Tag,
};
use nomad_test::{ch1, recorder, Journal, TestBus};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn select(id: &str) -> Message {
    Message::new("onSelect").with("id", id)
}

fn bus(journal: &Journal) -> TestBus {
    let mut bus = TestBus::new(&["s1", "s2"], journal);
    bus.wire(ch1());
    bus.place(recorder("A"), "s1");
    bus.place(recorder("B"), "s2");
    bus
}

fn finish(bus: &mut TestBus, migration_id: &str) {
    for _ in 0..32 {
        if bus.step(migration_id, "s2", "s1") {
            return;
        }
    }
    panic!("migration {} did not finish", migration_id);
}

#[test]
fn cancel_after_reintegrate_restores_the_source() {
    init_logging();
    let journal = Journal::new();
    let mut bus = bus(&journal);
    bus.publish("A", select("m1"));

    bus.begin(RelocationRequest::new("mig", &["B"], "s2", "s1"));
    bus.step("mig", "s2", "s1");
    bus.publish("A", select("m2"));
    for _ in 0..3 {
        bus.step("mig", "s2", "s1");
    }
    assert_eq!(
        bus.coordinator().item("mig", "B").unwrap().status(),
        RelocationStatus::Reintegrate
    );

    let reversing = bus
        .coordinator_mut()
        .cancel("mig", CancelRequest::new(7, "user left"))
        .unwrap();
    assert_eq!(reversing, 1);
    finish(&mut bus, "mig");

    let item = bus.coordinator().item("mig", "B").unwrap();
    assert_eq!(item.status(), RelocationStatus::Block);
    assert_eq!(item.condition(), RelocationCondition::ReverseSuccess);
    assert_eq!(
        &item.history()[4..],
        &[
            RelocationStatus::Reintegrate,
            RelocationStatus::Disintegrate,
            RelocationStatus::Serialise,
            RelocationStatus::Block,
        ]
    );

    assert!(bus.runtime("s1").container("B").is_none());
    assert!(!bus.runtime("s2").container("B").unwrap().proxy().is_blocked());
    assert_eq!(
        bus.runtime("s1").devices().host_of("B").map(String::as_str),
        Some("s2")
    );
    assert!(!bus.runtime("s1").channel("ch1").unwrap().is_blocked());

    bus.publish("A", select("m3"));
    assert_eq!(
        journal.values("B", "show", "target"),
        vec![json!("m1"), json!("m2"), json!("m3")]
    );
    assert!(journal
        .of("B", "show")
        .iter()
        .all(|entry| entry.session_id == "s2"));
    assert_eq!(
        bus.runtime("s2").container("B").unwrap().property("seen"),
        Some(json!(3))
    );

    let complete = bus.events_tagged(Tag::MigrationComplete);
    assert_eq!(complete.len(), 1);
    assert_eq!(
        complete[0].relocation_payload().unwrap().condition,
        Some(RelocationCondition::ReverseSuccess)
    );
    assert!(bus
        .events_tagged(Tag::MigrationProgress)
        .iter()
        .filter_map(|event| event.relocation_payload())
        .any(|payload| payload.cancel_cause == Some(7)));
}

#[test]
fn cancel_envelope_reverses_a_blocked_item() {
    init_logging();
    let journal = Journal::new();
    let mut bus = bus(&journal);

    bus.begin(RelocationRequest::new("mig", &["B"], "s2", "s1"));
    bus.step("mig", "s2", "s1");
    let cancel = Envelope::relocation(
        Tag::MigrationCancel,
        "s1",
        RelocationPayload {
            migration_id: "mig".to_string(),
            cancel_cause: Some(3),
            cancel_cause_text: Some("battery low".to_string()),
            component: Some("B".to_string()),
            ..Default::default()
        },
        0,
    );
    assert!(bus.coordinator_mut().handle_envelope(&cancel).unwrap());
    finish(&mut bus, "mig");

    let item = bus.coordinator().item("mig", "B").unwrap();
    assert_eq!(item.condition(), RelocationCondition::ReverseSuccess);
    assert_eq!(item.cancel_request().unwrap().text, "battery low");
    assert!(!bus.runtime("s2").channel("ch1").unwrap().is_blocked());
    assert!(!bus.runtime("s1").channel("ch1").unwrap().is_blocked());

    bus.publish("A", select("after"));
    assert_eq!(journal.of("B", "show")[0].session_id, "s2");
}

#[test]
fn cancel_after_unblock_is_ignored() {
    init_logging();
    let journal = Journal::new();
    let mut bus = bus(&journal);

    bus.begin(RelocationRequest::new("mig", &["B"], "s2", "s1"));
    for _ in 0..7 {
        bus.step("mig", "s2", "s1");
    }
    assert_eq!(
        bus.coordinator().item("mig", "B").unwrap().status(),
        RelocationStatus::Unblock
    );

    let reversing = bus
        .coordinator_mut()
        .cancel("mig", CancelRequest::new(1, "too late"))
        .unwrap();
    assert_eq!(reversing, 0);
    finish(&mut bus, "mig");

    let item = bus.coordinator().item("mig", "B").unwrap();
    assert_eq!(item.status(), RelocationStatus::Run);
    assert_eq!(item.condition(), RelocationCondition::Success);
    assert!(bus.runtime("s1").container("B").is_some());
}

#[test]
fn unknown_component_reverses_without_moving_anything() {
    init_logging();
    let journal = Journal::new();
    let mut bus = bus(&journal);

    bus.begin(RelocationRequest::new("mig", &["ghost"], "s2", "s1"));
    finish(&mut bus, "mig");

    let item = bus.coordinator().item("mig", "ghost").unwrap();
    assert_eq!(item.status(), RelocationStatus::Block);
    assert_eq!(item.condition(), RelocationCondition::ReverseSuccess);
    assert!(matches!(
        item.error(),
        Some(RelocationError::Runtime(RuntimeError::UnknownInstance { .. }))
    ));
    assert!(bus.runtime("s2").container("B").is_some());
}

#[test]
fn serialising_an_unblocked_component_is_a_protocol_violation() {
    init_logging();
    let journal = Journal::new();
    let mut bus = bus(&journal);

    let error = bus
        .runtime_mut("s2")
        .serialise_component("B")
        .unwrap_err();

    assert!(error.is_protocol_violation());
}

#[test]
fn migrations_are_validated_before_they_start() {
    init_logging();
    let journal = Journal::new();
    let mut bus = bus(&journal);
    let coordinator = bus.coordinator_mut();

    assert!(matches!(
        coordinator.begin(RelocationRequest::new("m", &[], "s2", "s1"), 0),
        Err(RelocationError::EmptyMigration { .. })
    ));
    assert!(matches!(
        coordinator.begin(RelocationRequest::new("m", &["B"], "s2", "s2"), 0),
        Err(RelocationError::SameHost { .. })
    ));
    coordinator
        .begin(RelocationRequest::new("m", &["B"], "s2", "s1"), 0)
        .unwrap();
    assert!(matches!(
        coordinator.begin(RelocationRequest::new("m", &["B"], "s2", "s1"), 0),
        Err(RelocationError::DuplicateMigration { .. })
    ));
    assert!(matches!(
        coordinator.cancel("nope", CancelRequest::new(0, "")),
        Err(RelocationError::UnknownMigration { .. })
    ));
    assert!(coordinator.remove("m").is_none());
}

#[test]
fn stepping_with_the_wrong_hosts_is_rejected() {
    init_logging();
    let journal = Journal::new();
    let mut bus = bus(&journal);

    bus.begin(RelocationRequest::new("mig", &["B"], "s2", "s1"));
    let result = bus.step_quietly("mig", "s1", "s2");

    assert!(matches!(
        result,
        Err(RelocationError::HostMismatch { role: "source", .. })
    ));
    assert_eq!(
        bus.coordinator().item("mig", "B").unwrap().status(),
        RelocationStatus::Default
    );
}
