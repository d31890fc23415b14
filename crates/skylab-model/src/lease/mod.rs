mod admission;
pub use admission::{AdmissionSnapshot, Decision};

mod build;
pub use build::{BuildId, BuildStatus};

mod session;
pub use session::SessionId;

mod task;
pub use task::{FinishOutcome, LeaseState, LeaseTask};
