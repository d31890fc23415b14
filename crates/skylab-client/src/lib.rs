//! HTTP implementations of the lease core's service seams.
mod transport;
pub use transport::Transport;

pub mod buildbucket;
pub use buildbucket::{BuildbucketClient, BuilderId};

pub mod inventory;
pub use inventory::InventoryClient;

pub mod swarming;
pub use swarming::SwarmingClient;
