//! Domain types shared by every partition.

pub mod job;
pub mod partition;

pub use job::{Job, JobStatus};
pub use partition::{PartitionId, PollErrorPolicy};
