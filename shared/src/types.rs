pub type InstanceId = String;
pub type SessionId = String;
pub type ChannelName = String;
pub type EventId = u64;
pub type CorrelationId = u64;
pub type MigrationId = String;
/// Milliseconds on a runtime's logical clock
pub type Millis = u64;

/// Which side of a channel a participant sits on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    Publisher,
    Consumer,
}

impl Side {
    pub fn invert(self) -> Self {
        match self {
            Side::Publisher => Side::Consumer,
            Side::Consumer => Side::Publisher,
        }
    }
}
