//! The three worker kinds the supervisor starts and stops: one thread per
//! configured source, one per configured target, and one per table that
//! declares an `init_query`.

pub mod control;
pub mod init;
pub mod source;
pub mod target;

pub use control::{StatsHandle, WorkerHandle};
pub use init::InitWorker;
pub use source::SourceWorker;
pub use target::TargetWorker;
