use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    Dimensions, PoolPolicy,
    domain::constants::{
        DIM_BOT_ID, DIM_DUT_NAME, DIM_DUT_STATE, DIM_LABEL_POOL, DIM_POOL, TAG_DUT_NAME,
    },
    error::{ModelError, ModelResult},
};

/// Which attribute a lease targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectorKind {
    Hostname,
    Model,
    Board,
}

impl SelectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectorKind::Hostname => "hostname",
            SelectorKind::Model => "model",
            SelectorKind::Board => "board",
        }
    }

    /// Bot dimension that identifies leases of this kind.
    pub fn identifying_key(&self) -> &'static str {
        match self {
            SelectorKind::Hostname => DIM_DUT_NAME,
            SelectorKind::Model => "label-model",
            SelectorKind::Board => "label-board",
        }
    }

    /// Key of the tag naming the selector payload on a dispatched lease.
    pub fn tag_key(&self) -> &'static str {
        match self {
            SelectorKind::Hostname => TAG_DUT_NAME,
            SelectorKind::Model => "model",
            SelectorKind::Board => "board",
        }
    }

    /// Dimension keys a user may not supply for this kind.
    ///
    /// Hostname leases pin one bot and must not pick up quota-pool or label
    /// constraints; model and board leases must not pin a bot.
    pub fn reserved_dimension_keys(&self) -> &'static [&'static str] {
        match self {
            SelectorKind::Hostname => &[DIM_LABEL_POOL, DIM_DUT_STATE, "label-model", "label-board"],
            SelectorKind::Model | SelectorKind::Board => &[DIM_BOT_ID],
        }
    }
}

impl fmt::Display for SelectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectorKind {
    type Err = ModelError;
    fn from_str(s: &str) -> ModelResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hostname" | "host" => Ok(SelectorKind::Hostname),
            "model" => Ok(SelectorKind::Model),
            "board" => Ok(SelectorKind::Board),
            other => Err(ModelError::UnknownSelectorKind(other.to_string())),
        }
    }
}

/// What the user wants to lease: a specific host, or any ready DUT of a model or board.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Selector {
    Hostname(String),
    Model(String),
    Board(String),
}

impl Selector {
    /// Build a selector, rejecting an empty payload.
    pub fn new(kind: SelectorKind, payload: impl Into<String>) -> ModelResult<Self> {
        let payload = payload.into();
        if payload.trim().is_empty() {
            return Err(ModelError::EmptySelector {
                kind: kind.as_str(),
            });
        }
        Ok(match kind {
            SelectorKind::Hostname => Selector::Hostname(payload),
            SelectorKind::Model => Selector::Model(payload),
            SelectorKind::Board => Selector::Board(payload),
        })
    }

    pub fn kind(&self) -> SelectorKind {
        match self {
            Selector::Hostname(_) => SelectorKind::Hostname,
            Selector::Model(_) => SelectorKind::Model,
            Selector::Board(_) => SelectorKind::Board,
        }
    }

    pub fn payload(&self) -> &str {
        match self {
            Selector::Hostname(p) | Selector::Model(p) | Selector::Board(p) => p,
        }
    }

    /// `dut-name:<host>`, `model:<model>` or `board:<board>`.
    pub fn selector_tag(&self) -> String {
        format!("{}:{}", self.kind().tag_key(), self.payload())
    }

    /// `<identifying key>:<payload>` as used to search active lease tasks.
    pub fn identifying_tag(&self) -> String {
        format!("{}:{}", self.kind().identifying_key(), self.payload())
    }

    /// Dimensions the scheduler must match regardless of user input.
    ///
    /// Hostname leases pin the bot by id and need `bot_id`; model and board
    /// leases target ready DUTs in the quota pool.
    pub fn required_dimensions(
        &self,
        policy: &PoolPolicy,
        bot_id: Option<&str>,
    ) -> ModelResult<Dimensions> {
        let mut dims = Dimensions::new();
        dims.insert(DIM_POOL, policy.skylab_pool.as_str());
        match self {
            Selector::Hostname(host) => {
                let id = bot_id.filter(|id| !id.is_empty()).ok_or_else(|| {
                    ModelError::Invalid(format!("hostname lease of {host} requires a bot id"))
                })?;
                dims.insert(DIM_BOT_ID, id);
            }
            Selector::Model(payload) | Selector::Board(payload) => {
                dims.insert(self.kind().identifying_key(), payload.as_str());
                dims.insert(DIM_LABEL_POOL, policy.quota_pool_label.as_str());
                dims.insert(DIM_DUT_STATE, policy.ready_state.as_str());
            }
        }
        Ok(dims)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.kind(), self.payload())
    }
}
