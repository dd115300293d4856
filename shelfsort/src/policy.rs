//! Resolution policy: auto-approve a ranked prediction or hand it to a human.

use serde::{Deserialize, Serialize};

use crate::aggregate::RankedPrediction;

/// Minimum lead of the top class over the runner-up for semi-automatic approval.
pub const SEMI_AUTOMATIC_GAP: f64 = 0.2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionMode {
    #[default]
    Automatic,
    SemiAutomatic,
    Manual,
}

impl ResolutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Automatic => "automatic",
            Self::SemiAutomatic => "semi-automatic",
            Self::Manual => "manual",
        }
    }
}

impl std::fmt::Display for ResolutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    AutoApprove(String),
    Queue,
}

/// Decide how a ranked prediction is resolved under `mode`.
///
/// A prediction with no classes has nothing to approve automatically and is
/// always queued.
pub fn resolve(prediction: &RankedPrediction, mode: ResolutionMode) -> Decision {
    let Some(top) = prediction.top() else {
        return Decision::Queue;
    };

    let auto_approve = match mode {
        ResolutionMode::Automatic => true,
        ResolutionMode::Manual => false,
        ResolutionMode::SemiAutomatic => prediction
            .confidence_gap()
            .is_some_and(|gap| gap > SEMI_AUTOMATIC_GAP),
    };

    if auto_approve {
        Decision::AutoApprove(top.class.clone())
    } else {
        Decision::Queue
    }
}
