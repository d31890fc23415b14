//! Well-known dimension and tag keys.
//!
//! Keeping them here avoids scattering magic strings throughout the codebase.

/// Top-level pool every Skylab DUT bot belongs to.
pub const DEFAULT_SKYLAB_POOL: &str = "ChromeOSSkylab";

/// Quota-scheduler account charged for lease tasks.
pub const DEFAULT_QUOTA_ACCOUNT: &str = "leases";

/// Only DUTs in this critical pool may be leased by model or board.
pub const DEFAULT_QUOTA_POOL_LABEL: &str = "DUT_POOL_QUOTA";

/// DUT state required for model and board leases.
pub const DEFAULT_READY_STATE: &str = "ready";

pub const DIM_POOL: &str = "pool";
pub const DIM_BOT_ID: &str = "id";
pub const DIM_DUT_NAME: &str = "dut_name";
pub const DIM_DUT_STATE: &str = "dut_state";
pub const DIM_LABEL_POOL: &str = "label-pool";

/// Tag marking every task created by the lease command.
pub const TAG_LEASE_TOOL: &str = "skylab-tool:lease";
pub const TAG_QUOTA_ACCOUNT: &str = "qs_account";
pub const TAG_LEASE_BY: &str = "lease-by";
pub const TAG_LEASE_REASON: &str = "lease-reason";
pub const TAG_SESSION: &str = "admin_session";
pub const TAG_DUT_NAME: &str = "dut-name";
pub const TAG_LABEL_MODEL: &str = "label-model";

/// Domain appended to a DUT name to form its FQDN.
pub const DUT_DOMAIN: &str = "cros.corp.google.com";
