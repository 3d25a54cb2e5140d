pub mod fixtures;
pub mod recording_component;
pub mod test_bus;

pub use fixtures::{ch1, device, recorder};
pub use recording_component::{recording_kinds, Invocation, Journal, RecordingComponent};
pub use test_bus::TestBus;
