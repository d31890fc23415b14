use serde::{Deserialize, Serialize};

use crate::{LeaseCap, Selector};

/// Outcome of an admission check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "decision", content = "reason")]
pub enum Decision {
    Admit,
    Deny(String),
}

impl Decision {
    pub fn is_admit(&self) -> bool {
        matches!(self, Decision::Admit)
    }
}

/// What admission saw when it decided.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionSnapshot {
    pub selector: Selector,
    /// Active leases observed; zero when no query was needed.
    pub count: usize,
    pub cap: LeaseCap,
    pub decision: Decision,
}
