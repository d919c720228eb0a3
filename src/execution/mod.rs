//! Execution module.
//!
//! This module propagates changes through the graph: it schedules
//! recomputes, runs asynchronous ones on a worker pool and merges their
//! results back.

pub mod cache;
pub mod engine;
pub mod events;
pub mod worker;

pub use cache::{CacheKey, CacheStats, ResultCache, SharedCache};
pub use engine::{Engine, EngineOptions, EngineStats};
pub use events::{ChannelObserver, GraphObserver, LoggingObserver, NodeEvent, ObserverId};
pub use worker::{Completion, Job, WorkerPool};
