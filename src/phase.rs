/// Lifecycle shared by both step models.
///
///   Idle ──first advance──▶ Running ──bound reached──▶ Terminal
///
/// Terminal is absorbing; only a reset (building a fresh model) returns to
/// Idle.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Running,
    Terminal,
}

impl Phase {
    /// Phase of a model that has taken `taken` of `bound` steps.
    pub fn from_progress(taken: usize, bound: usize) -> Self {
        if taken >= bound {
            Phase::Terminal
        } else if taken == 0 {
            Phase::Idle
        } else {
            Phase::Running
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self == Phase::Terminal
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle     => write!(f, "idle"),
            Phase::Running  => write!(f, "running"),
            Phase::Terminal => write!(f, "terminal"),
        }
    }
}
