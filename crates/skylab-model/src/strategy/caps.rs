use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    SelectorKind,
    error::{ModelError, ModelResult},
};

/// Highest per-selector cap the lease policy allows.
pub const MAX_SELECTOR_CAP: u32 = 2;

/// Concurrency cap on active leases for one selector kind.
///
/// - `Unlimited`: no admission query is made.
/// - `Limited(0)`: leases of this kind are disabled.
/// - `Limited(n)`: a new lease is denied when more than `n` are already active.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LeaseCap {
    Unlimited,
    Limited(u32),
}

impl LeaseCap {
    /// A bounded cap, validated against [`MAX_SELECTOR_CAP`].
    pub fn limited(n: u32) -> ModelResult<Self> {
        if n > MAX_SELECTOR_CAP {
            return Err(ModelError::UnknownCap(format!(
                "{n} exceeds the maximum cap {MAX_SELECTOR_CAP}"
            )));
        }
        Ok(LeaseCap::Limited(n))
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, LeaseCap::Limited(0))
    }

    /// `true` when `active` existing leases exceed this cap.
    pub fn is_exceeded_by(&self, active: usize) -> bool {
        match self {
            LeaseCap::Unlimited => false,
            LeaseCap::Limited(n) => active > *n as usize,
        }
    }
}

impl fmt::Display for LeaseCap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaseCap::Unlimited => f.write_str("unlimited"),
            LeaseCap::Limited(n) => write!(f, "{n}"),
        }
    }
}

impl FromStr for LeaseCap {
    type Err = ModelError;
    fn from_str(s: &str) -> ModelResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unlimited" | "inf" | "infinity" => Ok(LeaseCap::Unlimited),
            "disabled" | "off" => Ok(LeaseCap::Limited(0)),
            other => other
                .parse::<u32>()
                .map_err(|_| ModelError::UnknownCap(other.to_string()))
                .and_then(LeaseCap::limited),
        }
    }
}

/// Per-kind admission caps. Hostname, model and board leases are counted in
/// independent buckets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LeaseCaps {
    pub hostname: LeaseCap,
    pub model: LeaseCap,
    pub board: LeaseCap,
}

impl LeaseCaps {
    pub fn for_kind(&self, kind: SelectorKind) -> LeaseCap {
        match kind {
            SelectorKind::Hostname => self.hostname,
            SelectorKind::Model => self.model,
            SelectorKind::Board => self.board,
        }
    }
}

impl Default for LeaseCaps {
    fn default() -> Self {
        Self {
            hostname: LeaseCap::Unlimited,
            model: LeaseCap::Limited(1),
            board: LeaseCap::Limited(0),
        }
    }
}
