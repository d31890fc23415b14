mod caps;
pub use caps::{LeaseCap, LeaseCaps, MAX_SELECTOR_CAP};

mod retry;
pub use retry::RetryPolicy;
