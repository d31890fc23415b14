//! Normalization and validation of operator input.
mod dims;
pub use dims::{parse_dim, parse_dims, parse_dims_into};

mod hostname;
pub use hostname::{dut_name_to_fqdn, fix_suspicious_hostname};

mod reason;
pub use reason::{MAX_REASON_LEN, looks_like_bug_id, validate_reason};
