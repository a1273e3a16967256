//! Publishing jobs: the per-job record and the process-wide registry that owns them.

pub mod record;
pub mod store;

pub use record::{EntityRef, ErrorKind, JobErrorEntry, JobProgress, JobRecord, JobStatus};
pub use store::{JobStore, RetentionPolicy};
