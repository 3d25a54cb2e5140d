/// PROPERTY-BASED TESTS: delivery across a relocation
///
/// Whatever the publisher sends before, during and after a relocation, in
/// either direction, the moving consumer sees every message exactly once and
/// in the order it was sent.
use proptest::prelude::*;

use nomad_client::RelocationRequest;
use nomad_shared::{Message, RelocationCondition};
use nomad_test::{ch1, recorder, Journal, TestBus};

// Messages to publish before the migration starts and after each of its
// eight phases
fn bursts() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0usize..4, 9)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_relocation_delivers_every_message_once_in_order(
        bursts in bursts(),
        consumer_leaves_publisher in any::<bool>(),
    ) {
        let (from, to) = if consumer_leaves_publisher { ("s1", "s2") } else { ("s2", "s1") };
        let journal = Journal::new();
        let mut bus = TestBus::new(&["s1", "s2"], &journal);
        bus.wire(ch1());
        bus.place(recorder("A"), "s1");
        bus.place(recorder("B"), from);

        let mut sent = Vec::new();
        let mut publish_burst = |bus: &mut TestBus, count: usize| {
            for _ in 0..count {
                let id = format!("x{}", sent.len());
                bus.publish("A", Message::new("onSelect").with("id", id.as_str()));
                sent.push(id);
            }
        };

        publish_burst(&mut bus, bursts[0]);
        bus.begin(RelocationRequest::new("m", &["B"], from, to));
        for count in &bursts[1..] {
            bus.step("m", from, to);
            publish_burst(&mut bus, *count);
        }

        let item = bus.coordinator().item("m", "B").unwrap();
        prop_assert_eq!(item.condition(), RelocationCondition::Success);
        let received: Vec<String> = journal
            .values("B", "show", "target")
            .into_iter()
            .filter_map(|value| value.as_str().map(str::to_string))
            .collect();
        prop_assert_eq!(received, sent);
        prop_assert!(bus.errors().is_empty());
    }
}
