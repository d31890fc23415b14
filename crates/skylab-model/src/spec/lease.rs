use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    Dimensions, Flag, Selector, SelectorKind,
    error::{ModelError, ModelResult},
    input::validate_reason,
};

const MINUTES_PER_DAY: f64 = 24.0 * 60.0;

/// Longest lease accepted: one day minus one minute.
pub const MAX_LEASE_SECS: u64 = 24 * 60 * 60 - 60;

/// Validated lease duration in whole seconds, `0 < secs <= MAX_LEASE_SECS`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct LeaseDuration(u64);

impl LeaseDuration {
    pub fn from_secs(secs: u64) -> ModelResult<Self> {
        if secs == 0 {
            return Err(ModelError::InvalidDuration(
                "lease duration must be positive".into(),
            ));
        }
        if secs > MAX_LEASE_SECS {
            return Err(ModelError::InvalidDuration(format!(
                "lease duration ({secs} seconds) cannot exceed {MAX_LEASE_SECS} seconds"
            )));
        }
        Ok(Self(secs))
    }

    /// Parses the operator's `minutes` value.
    ///
    /// Decimals are accepted and truncated to whole minutes; the value must
    /// satisfy `0 < minutes < 1440` and leave at least one whole minute.
    pub fn from_minutes(minutes: f64) -> ModelResult<Self> {
        if !minutes.is_finite() || minutes <= 0.0 {
            return Err(ModelError::InvalidDuration(format!(
                "minutes to lease ({minutes}) must be positive"
            )));
        }
        if minutes >= MINUTES_PER_DAY {
            return Err(ModelError::InvalidDuration(format!(
                "lease duration ({} minutes) cannot reach 1 day [{MINUTES_PER_DAY} minutes]",
                minutes as u64
            )));
        }
        let whole = minutes.trunc() as u64;
        if whole == 0 {
            return Err(ModelError::InvalidDuration(format!(
                "minutes to lease ({minutes}) must be at least one whole minute"
            )));
        }
        Self::from_secs(whole * 60)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Whole minutes, truncated.
    pub fn as_minutes(&self) -> u32 {
        u32::try_from(self.0 / 60).unwrap_or(u32::MAX)
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.0)
    }
}

impl TryFrom<u64> for LeaseDuration {
    type Error = ModelError;
    fn try_from(secs: u64) -> ModelResult<Self> {
        Self::from_secs(secs)
    }
}

impl From<LeaseDuration> for u64 {
    fn from(d: LeaseDuration) -> Self {
        d.0
    }
}

/// Immutable, validated request to lease a DUT.
///
/// Built once from operator input, then consumed by admission and dispatch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseRequest {
    selector: Selector,
    duration: LeaseDuration,
    reason: String,
    #[serde(default, skip_serializing_if = "Dimensions::is_empty")]
    user_dims: Dimensions,
    #[serde(default)]
    allow_bypass: Flag,
}

impl LeaseRequest {
    /// Validate and build a lease request.
    pub fn new(
        selector: Selector,
        duration: LeaseDuration,
        reason: impl Into<String>,
        user_dims: Dimensions,
        allow_bypass: Flag,
    ) -> ModelResult<Self> {
        let reason = reason.into();
        validate_reason(&reason)?;
        let kind = selector.kind();
        if let Some(key) = kind
            .reserved_dimension_keys()
            .iter()
            .copied()
            .find(|key| user_dims.contains_key(key))
        {
            return Err(ModelError::ReservedDimension {
                key: key.to_string(),
                kind: kind.as_str(),
            });
        }
        Ok(Self {
            selector,
            duration,
            reason,
            user_dims,
            allow_bypass,
        })
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn kind(&self) -> SelectorKind {
        self.selector.kind()
    }

    pub fn duration(&self) -> LeaseDuration {
        self.duration
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn user_dims(&self) -> &Dimensions {
        &self.user_dims
    }

    pub fn allow_bypass(&self) -> Flag {
        self.allow_bypass
    }
}
