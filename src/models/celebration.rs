use serde::{Deserialize, Serialize};
use std::fmt;

/// Onboarding celebration phases, in playback order.
///
/// Ordering is meaningful: a run only ever moves to a greater phase, except for
/// an explicit reset back to `Idle`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum CelebrationPhase {
    #[default]
    Idle,
    Breathe,
    Ascend,
    Acknowledgment,
    Affirmations,
    Sanctuary,
    Ready,
}

impl CelebrationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Breathe => "breathe",
            Self::Ascend => "ascend",
            Self::Acknowledgment => "acknowledgment",
            Self::Affirmations => "affirmations",
            Self::Sanctuary => "sanctuary",
            Self::Ready => "ready",
        }
    }

    pub fn is_running(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl fmt::Display for CelebrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Published on every observable change of the running celebration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CelebrationUpdate {
    pub run_id: u64,
    pub phase: CelebrationPhase,
    pub affirmation_index: u8,
}
