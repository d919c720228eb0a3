//! Background compute workers.
//!
//! Jobs run on a dedicated rayon pool. Each job owns a snapshot of its
//! inputs, so workers never touch the graph; results come back to the
//! coordinating thread over a channel tagged with the generation that
//! was current at dispatch.

use crate::core::context::ComputeContext;
use crate::core::error::{ComputeError, ComputeResult, NodeId, VortexResult};
use crate::core::node::NodeVariant;
use crate::core::types::Value;
use crate::execution::cache::CacheKey;
use crossbeam::channel::{unbounded, Receiver, Sender};
use indexmap::IndexMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A compute handed to the pool.
pub struct Job {
    pub node_id: NodeId,
    pub generation: u64,
    pub variant: Arc<dyn NodeVariant>,
    pub ctx: ComputeContext,
    /// Where to memoize the result, when caching is enabled.
    pub cache_key: Option<CacheKey>,
}

/// The outcome of a job.
#[derive(Debug)]
pub struct Completion {
    pub node_id: NodeId,
    pub generation: u64,
    pub result: ComputeResult<IndexMap<String, Value>>,
    pub duration: Duration,
    pub cache_key: Option<CacheKey>,
}

/// Fixed-size pool running asynchronous computes.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    sender: Sender<Completion>,
}

impl WorkerPool {
    /// Create a pool and the receiving end of its completion channel.
    ///
    /// `threads == 0` uses one thread per available core.
    pub fn new(threads: usize, name_prefix: &str) -> VortexResult<(Self, Receiver<Completion>)> {
        let prefix = name_prefix.to_string();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(move |i| format!("{}-{}", prefix, i))
            .build()?;
        let (sender, receiver) = unbounded();

        log::debug!("Started worker pool with {} thread(s)", pool.current_num_threads());
        Ok((Self { pool, sender }, receiver))
    }

    /// Run a job in the background.
    pub fn submit(&self, job: Job) {
        let sender = self.sender.clone();
        self.pool.spawn(move || {
            let completion = run_job(job);
            // The engine may have been dropped meanwhile.
            let _ = sender.send(completion);
        });
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

/// Execute a job, turning panics into compute errors.
pub fn run_job(job: Job) -> Completion {
    let Job {
        node_id,
        generation,
        variant,
        ctx,
        cache_key,
    } = job;

    let start = Instant::now();
    let result = run_compute(variant.as_ref(), ctx);
    let duration = start.elapsed();

    log::debug!(
        "Node {} generation {} finished in {:?}",
        node_id,
        generation,
        duration
    );

    Completion {
        node_id,
        generation,
        result,
        duration,
        cache_key,
    }
}

/// Run a compute to completion on the current thread.
pub fn run_compute(
    variant: &dyn NodeVariant,
    mut ctx: ComputeContext,
) -> ComputeResult<IndexMap<String, Value>> {
    let node_id = ctx.node_id;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| variant.compute(&mut ctx)));

    match outcome {
        Ok(Ok(())) => ctx.finish(),
        Ok(Err(error)) => Err(error),
        Err(payload) => Err(ComputeError::Panicked {
            node_id,
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::NodeMetadata;
    use crate::core::port::PortSpec;
    use crate::core::types::PortType;

    struct Square;

    impl NodeVariant for Square {
        fn metadata(&self) -> NodeMetadata {
            NodeMetadata::builder("square", "Square")
                .port(PortSpec::sink("x", PortType::Number))
                .port(PortSpec::source("y", PortType::Number))
                .asynchronous()
                .build()
        }

        fn compute(&self, ctx: &mut ComputeContext) -> Result<(), ComputeError> {
            let x = ctx.input_number("x")?;
            if x < 0.0 {
                panic!("negative input");
            }
            ctx.set_output("y", Value::Number(x * x))
        }
    }

    fn context(x: f64) -> ComputeContext {
        let mut ctx = ComputeContext::new(NodeId::new());
        ctx.add_input("x", Value::Number(x));
        ctx.declare_output("y", PortType::Number);
        ctx
    }

    #[test]
    fn test_run_compute() {
        let outputs = run_compute(&Square, context(3.0)).unwrap();
        assert_eq!(outputs.get("y"), Some(&Value::Number(9.0)));
    }

    #[test]
    fn test_panic_becomes_error() {
        let result = run_compute(&Square, context(-1.0));
        match result {
            Err(ComputeError::Panicked { message, .. }) => assert_eq!(message, "negative input"),
            other => panic!("expected panic error, got {:?}", other),
        }
    }

    #[test]
    fn test_pool_round_trip() {
        let (pool, completions) = WorkerPool::new(2, "test-worker").unwrap();
        assert_eq!(pool.num_threads(), 2);

        let ctx = context(4.0);
        let node_id = ctx.node_id;
        pool.submit(Job {
            node_id,
            generation: 7,
            variant: Arc::new(Square),
            ctx,
            cache_key: None,
        });

        let completion = completions.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(completion.node_id, node_id);
        assert_eq!(completion.generation, 7);
        assert_eq!(
            completion.result.unwrap().get("y"),
            Some(&Value::Number(16.0))
        );
    }
}
