use serde::{Deserialize, Serialize};

use super::constants::{
    DEFAULT_QUOTA_ACCOUNT, DEFAULT_QUOTA_POOL_LABEL, DEFAULT_READY_STATE, DEFAULT_SKYLAB_POOL,
};

/// Fleet-wide names that shape lease dimensions and tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PoolPolicy {
    /// Pool every leasable bot belongs to (`pool=<value>`).
    pub skylab_pool: String,
    /// Quota account tag value (`qs_account:<value>`).
    pub quota_account: String,
    /// `label-pool` required for model and board leases.
    pub quota_pool_label: String,
    /// `dut_state` required for model and board leases.
    pub ready_state: String,
}

impl Default for PoolPolicy {
    fn default() -> Self {
        Self {
            skylab_pool: DEFAULT_SKYLAB_POOL.to_string(),
            quota_account: DEFAULT_QUOTA_ACCOUNT.to_string(),
            quota_pool_label: DEFAULT_QUOTA_POOL_LABEL.to_string(),
            ready_state: DEFAULT_READY_STATE.to_string(),
        }
    }
}
