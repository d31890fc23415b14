mod kv;
pub use kv::KeyValue;

mod dimensions;
pub use dimensions::Dimensions;

mod tags;
pub use tags::{TagList, tag_prefix};

mod flag;
pub use flag::Flag;

mod policy;
pub use policy::PoolPolicy;

pub mod constants;

/// Stable identifier of a swarming bot attached to a DUT.
pub type BotId = String;

/// Opaque swarming task identifier.
pub type TaskId = String;
