mod domain;
pub use domain::constants;
pub use domain::{BotId, Dimensions, Flag, KeyValue, PoolPolicy, TagList, TaskId, tag_prefix};

mod error;
pub use error::{ModelError, ModelResult};

pub mod input;

mod lease;
pub use lease::{
    AdmissionSnapshot, BuildId, BuildStatus, Decision, FinishOutcome, LeaseState, LeaseTask,
    SessionId,
};

mod selector;
pub use selector::{Selector, SelectorKind};

mod spec;
pub use spec::{LeaseDuration, LeaseRequest, MAX_LEASE_SECS};

mod strategy;
pub use strategy::{LeaseCap, LeaseCaps, MAX_SELECTOR_CAP, RetryPolicy};
