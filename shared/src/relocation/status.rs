use serde::{Deserialize, Serialize};

/// Phase of one relocating item. Declaration order is the phase order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelocationStatus {
    Default,
    Block,
    Serialise,
    Disintegrate,
    Reintegrate,
    Initialize,
    TransferState,
    Unblock,
    Run,
}

impl RelocationStatus {
    pub const ALL: [RelocationStatus; 9] = [
        RelocationStatus::Default,
        RelocationStatus::Block,
        RelocationStatus::Serialise,
        RelocationStatus::Disintegrate,
        RelocationStatus::Reintegrate,
        RelocationStatus::Initialize,
        RelocationStatus::TransferState,
        RelocationStatus::Unblock,
        RelocationStatus::Run,
    ];

    pub fn ordinal(self) -> usize {
        self as usize
    }

    /// The following phase, `None` at `Run`
    pub fn next(self) -> Option<Self> {
        Self::ALL.get(self.ordinal() + 1).copied()
    }

    /// The preceding phase, `None` at `Default`
    pub fn previous(self) -> Option<Self> {
        self.ordinal()
            .checked_sub(1)
            .and_then(|index| Self::ALL.get(index).copied())
    }

    /// Percentage of the phase list covered, 0 at `Default` and 100 at `Run`
    pub fn progress(self) -> u8 {
        let last = Self::ALL.len() - 1;
        ((self.ordinal() * 100) / last) as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            RelocationStatus::Default => "DEFAULT",
            RelocationStatus::Block => "BLOCK",
            RelocationStatus::Serialise => "SERIALISE",
            RelocationStatus::Disintegrate => "DISINTEGRATE",
            RelocationStatus::Reintegrate => "REINTEGRATE",
            RelocationStatus::Initialize => "INITIALIZE",
            RelocationStatus::TransferState => "TRANSFER_STATE",
            RelocationStatus::Unblock => "UNBLOCK",
            RelocationStatus::Run => "RUN",
        }
    }
}

impl std::fmt::Display for RelocationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelocationCondition {
    #[default]
    Default,
    Warning,
    Error,
    Success,
    Reverse,
    ReverseSuccess,
}

impl RelocationCondition {
    /// No further phase will run
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RelocationCondition::Error
                | RelocationCondition::Success
                | RelocationCondition::ReverseSuccess
        )
    }

    pub fn is_reversing(self) -> bool {
        self == RelocationCondition::Reverse
    }
}
