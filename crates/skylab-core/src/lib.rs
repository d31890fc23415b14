pub mod admission;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod inventory;
pub mod leaser;
pub mod retry;
pub mod service;

#[cfg(test)]
mod testing;

pub mod prelude {
    pub use crate::admission::LeaseAdmission;
    pub use crate::directory::BotDirectory;
    pub use crate::dispatch::{DispatchConfig, LeaseDispatcher};
    pub use crate::error::{CoreError, CoreResult};
    pub use crate::inventory::InventoryLookup;
    pub use crate::leaser::{Leaser, ReleaseReport, ReleaseSummary, SubmittedLease};
    pub use crate::service::{
        BotService, BotState, BuildService, InventoryService, ServiceError, TaskService,
    };
}
