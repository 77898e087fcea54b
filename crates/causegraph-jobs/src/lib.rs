//! causegraph Jobs - Background job orchestration
//!
//! Runs causal extraction as long-lived background jobs:
//! - Progress tracking with a single-writer job state machine
//! - Per-job subscription rooms for real-time status events
//! - TTL-bounded job store and FIFO work queue with atomic claims
//! - Worker pool with wall-clock budgets per job
//! - CSV artifact persistence and CSV dataset sources
//!
//! Author: hephaex@gmail.com

pub mod artifact;
pub mod events;
pub mod orchestrator;
pub mod queue;
pub mod service;
pub mod source;
pub mod store;
pub mod tracker;
pub mod worker;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use artifact::CsvArtifactStore;
pub use events::{Subscription, SubscriptionRegistry};
pub use orchestrator::{Deadline, JobOrchestrator};
pub use queue::JobQueue;
pub use service::{JobService, Submission};
pub use source::CsvRecordSource;
pub use store::JobStore;
pub use tracker::JobProgressTracker;
pub use worker::WorkerPool;
