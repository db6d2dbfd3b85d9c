//! Job-queue collection for Slurm.
//!
//! This module takes raw snapshots of the scheduler queue and folds them into
//! per-user job counters. The snapshot source sits behind a trait so the
//! aggregation can be tested without a cluster.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 QueueSource (trait)          │
//! └──────────────┬───────────────────┬───────────┘
//!                │                   │
//!       ┌────────▼───────┐   ┌───────▼───────┐
//!       │ SqueueCommand  │   │   MockQueue   │
//!       │ (squeue -o ..) │   │  (Testing)    │
//!       └────────┬───────┘   └───────┬───────┘
//!                └─────────┬─────────┘
//!                          │ raw bytes
//!                   ┌──────▼───────┐
//!                   │parse_snapshot│ user -> UserJobMetrics
//!                   └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use slurm_user_exporter::collector::{MockQueue, QueueSource, parse_snapshot};
//!
//! let source = MockQueue::new("123|alice|RUNNING|8|gpu:v100:1|2\n");
//! let users = parse_snapshot(&source.snapshot().unwrap());
//! assert_eq!(users["alice"].running_gpus, 2.0);
//! ```

pub mod mock;
pub mod parser;
pub mod squeue;
pub mod traits;

pub use mock::MockQueue;
pub use parser::{JobRecord, JobState, UserJobMetrics, parse_snapshot};
pub use squeue::SqueueCommand;
pub use traits::{QueueSource, SnapshotError};
