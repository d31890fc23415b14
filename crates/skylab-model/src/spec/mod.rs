mod lease;
pub use lease::{LeaseDuration, LeaseRequest, MAX_LEASE_SECS};
