//! Reactive propagation engine.
//!
//! The engine owns the graph and is the single coordinating context: every
//! structural change and every node state transition happens on the thread
//! that calls into it. Only asynchronous computes leave that thread, on an
//! immutable snapshot of their inputs, and come back as generation-tagged
//! completions that are accepted only if still current.

use crate::core::context::ComputeContext;
use crate::core::error::{ComputeError, ComputeResult, GraphResult, NodeId, VortexResult};
use crate::core::node::{NodeState, NodeVariant};
use crate::core::port::PortId;
use crate::core::types::{ParamValue, Parameters, Value};
use crate::execution::cache::{CacheKey, CacheStats, ResultCache, SharedCache};
use crate::execution::events::{GraphObserver, NodeEvent, ObserverId, Observers};
use crate::execution::worker::{run_compute, Completion, Job, WorkerPool};
use crate::graph::link::Link;
use crate::graph::structure::{Graph, GraphNode};
use crate::graph::topology::TopologyAnalyzer;
use crossbeam::channel::{Receiver, RecvTimeoutError};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Engine options.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Number of background worker threads (0 = one per core).
    pub worker_threads: usize,
    /// Whether to memoize asynchronous results.
    pub use_cache: bool,
    /// Maximum number of memoized results.
    pub cache_capacity: usize,
    /// Memory budget of the cache in megabytes.
    pub cache_memory_mb: usize,
    /// How long a memoized result stays valid.
    pub cache_ttl: Duration,
    /// Name prefix for worker threads.
    pub thread_name_prefix: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            use_cache: true,
            cache_capacity: 64,
            cache_memory_mb: 512,
            cache_ttl: Duration::from_secs(3600),
            thread_name_prefix: "vortex-worker".to_string(),
        }
    }
}

impl EngineOptions {
    /// Create a new options builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker threads.
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Enable/disable caching.
    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Set the cache capacity.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Set the cache memory budget in megabytes.
    pub fn with_cache_memory_mb(mut self, megabytes: usize) -> Self {
        self.cache_memory_mb = megabytes;
        self
    }

    /// Set how long memoized results stay valid.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the worker thread name prefix.
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }
}

/// Engine statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Computes submitted to the worker pool.
    pub dispatched: u64,
    /// Computes run inline on the coordinating thread.
    pub inline: u64,
    /// Results applied to a node, successful or not.
    pub completed: u64,
    /// Background results dropped as stale.
    pub discarded: u64,
    /// Results that were errors.
    pub failed: u64,
    /// Background computes answered from the cache.
    pub cache_hits: u64,
}

/// The propagation engine.
pub struct Engine {
    graph: Graph,
    pool: WorkerPool,
    completions: Receiver<Completion>,
    cache: SharedCache,
    options: EngineOptions,
    observers: Observers,
    stats: EngineStats,
    /// Jobs submitted whose completion has not been received.
    in_flight: usize,
}

impl Engine {
    /// Create an engine with default options.
    pub fn new() -> VortexResult<Self> {
        Self::with_options(EngineOptions::default())
    }

    /// Create an engine with the given options.
    pub fn with_options(options: EngineOptions) -> VortexResult<Self> {
        let (pool, completions) =
            WorkerPool::new(options.worker_threads, &options.thread_name_prefix)?;
        Ok(Self {
            graph: Graph::new(),
            pool,
            completions,
            cache: Arc::new(
                ResultCache::new(options.cache_capacity)
                    .with_memory_limit(options.cache_memory_mb)
                    .with_ttl(options.cache_ttl),
            ),
            options,
            observers: Observers::new(),
            stats: EngineStats::default(),
            in_flight: 0,
        })
    }

    /// Read-only view of the graph.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Add a node for a variant. It computes as soon as its inputs allow.
    pub fn add_node(&mut self, variant: Box<dyn NodeVariant>) -> NodeId {
        let id = self.graph.add_variant(variant);
        self.settle(vec![NodeEvent::Invalidated(id)]);
        id
    }

    /// Add a prepared graph node.
    ///
    /// Fails with [`DuplicateNode`](crate::core::error::GraphError::DuplicateNode) if its id is already taken.
    pub fn add_graph_node(&mut self, node: GraphNode) -> GraphResult<NodeId> {
        let id = self.graph.add_node(node)?;
        self.settle(vec![NodeEvent::Invalidated(id)]);
        Ok(id)
    }

    /// Remove a node and its links. Idempotent.
    ///
    /// Nodes that lost an input are recomputed. A compute in flight for
    /// the removed node is discarded when it finishes.
    pub fn remove_node(&mut self, id: NodeId) -> Vec<Link> {
        let removed = self.graph.remove_node(id);
        let events = removed
            .iter()
            .filter_map(|link| self.graph.owner(link.sink))
            .map(NodeEvent::Invalidated)
            .collect();
        self.settle(events);
        removed
    }

    /// Link a source port to a sink port.
    pub fn connect(&mut self, source: PortId, sink: PortId) -> GraphResult<Link> {
        let link = self.graph.connect(source, sink)?;
        let events = self.graph.owner(sink).map(NodeEvent::Invalidated).into_iter().collect();
        self.settle(events);
        Ok(link)
    }

    /// Link two ports identified by node and port name.
    pub fn connect_ports(
        &mut self,
        from_node: NodeId,
        from_port: &str,
        to_node: NodeId,
        to_port: &str,
    ) -> GraphResult<Link> {
        let source = self.graph.find_port(from_node, from_port)?;
        let sink = self.graph.find_port(to_node, to_port)?;
        self.connect(source, sink)
    }

    /// Remove a link. Returns false if it was not present.
    pub fn disconnect(&mut self, link: Link) -> bool {
        if !self.graph.disconnect(link) {
            return false;
        }
        let events = self.graph.owner(link.sink).map(NodeEvent::Invalidated).into_iter().collect();
        self.settle(events);
        true
    }

    /// Update some parameters of a node.
    pub fn set_parameters(&mut self, node_id: NodeId, parameters: Parameters) -> GraphResult<()> {
        self.graph.set_parameters(node_id, parameters)?;
        self.settle(vec![NodeEvent::Invalidated(node_id)]);
        Ok(())
    }

    /// Update a single parameter.
    pub fn set_parameter(
        &mut self,
        node_id: NodeId,
        name: &str,
        value: impl Into<ParamValue>,
    ) -> GraphResult<()> {
        self.set_parameters(node_id, Parameters::new().with(name, value))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Current propagation state of a node.
    pub fn state(&self, node_id: NodeId) -> GraphResult<NodeState> {
        Ok(self.graph.node(node_id)?.state())
    }

    /// Last computed value of a source port.
    pub fn cached_value(&self, port: PortId) -> Option<&Value> {
        let owner = self.graph.owner(port)?;
        self.graph.node(owner).ok()?.cached_output(port)
    }

    /// Last computed value of a node's source port, by name.
    pub fn cached_output(&self, node_id: NodeId, port: &str) -> Option<&Value> {
        let port = self.graph.find_port(node_id, port).ok()?;
        self.cached_value(port)
    }

    /// Error of the node's last failed compute.
    pub fn last_error(&self, node_id: NodeId) -> Option<&ComputeError> {
        self.graph.node(node_id).ok()?.last_error()
    }

    /// Generation of the node's most recent compute.
    pub fn generation(&self, node_id: NodeId) -> Option<u64> {
        self.graph.node(node_id).ok().map(|n| n.generation())
    }

    /// Whether no node is dirty or computing and no job is outstanding.
    pub fn is_idle(&self) -> bool {
        self.in_flight == 0 && self.graph.nodes().all(|n| n.state().is_settled())
    }

    /// Number of background jobs not yet reported back, stale ones included.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop all memoized results.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn worker_threads(&self) -> usize {
        self.pool.num_threads()
    }

    // ========================================================================
    // Observers
    // ========================================================================

    /// Register an observer for node events.
    pub fn subscribe(&mut self, observer: Box<dyn GraphObserver>) -> ObserverId {
        self.observers.subscribe(observer)
    }

    /// Remove an observer.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    // ========================================================================
    // Completions
    // ========================================================================

    /// Apply every completion that has already arrived. Never blocks.
    ///
    /// Returns the number of completions handled.
    pub fn process_completions(&mut self) -> usize {
        let completions: Vec<Completion> = self.completions.try_iter().collect();
        let count = completions.len();
        if count > 0 {
            self.merge(completions);
        }
        count
    }

    /// Block until at least one completion arrives, then apply it and any
    /// others already queued. Returns false on timeout.
    pub fn wait_for_completion(&mut self, timeout: Duration) -> bool {
        match self.completions.recv_timeout(timeout) {
            Ok(first) => {
                let mut completions = vec![first];
                completions.extend(self.completions.try_iter());
                self.merge(completions);
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Keep applying completions until the engine is idle.
    ///
    /// Returns false if `timeout` elapses first.
    pub fn wait_until_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.process_completions();
            if self.is_idle() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || !self.wait_for_completion(remaining) {
                return self.is_idle();
            }
        }
    }

    fn merge(&mut self, completions: Vec<Completion>) {
        let mut events = Vec::new();
        for completion in completions {
            self.accept(completion, &mut events);
        }
        self.settle(events);
    }

    /// Apply a completion if it is still the one the node awaits.
    fn accept(&mut self, completion: Completion, events: &mut Vec<NodeEvent>) {
        self.in_flight = self.in_flight.saturating_sub(1);

        if let (Some(key), Ok(outputs)) = (&completion.cache_key, &completion.result) {
            if self.options.use_cache {
                self.cache.put(key.clone(), outputs.clone(), completion.duration);
            }
        }

        let current = self
            .graph
            .node(completion.node_id)
            .map(|node| node.accepts(completion.generation))
            .unwrap_or(false);
        if !current {
            self.stats.discarded += 1;
            log::debug!(
                "Discarded stale result for node {} (generation {})",
                completion.node_id,
                completion.generation
            );
            return;
        }

        self.apply(completion.node_id, completion.result, events);
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Dispatch ready work, then notify observers.
    fn settle(&mut self, mut events: Vec<NodeEvent>) {
        self.schedule(&mut events);
        self.observers.emit(&events);
    }

    /// Dispatch every dirty node whose upstream has settled.
    ///
    /// Nodes are visited in topological order, so inline computes feed
    /// their successors within the same pass and a node joined by several
    /// paths computes once per wave.
    fn schedule(&mut self, events: &mut Vec<NodeEvent>) {
        loop {
            let order = match TopologyAnalyzer::new(&self.graph).topological_sort() {
                Ok(order) => order,
                Err(e) => {
                    log::error!("Cannot schedule: {}", e);
                    return;
                }
            };

            let mut progressed = false;
            for node_id in order {
                let ready = self
                    .graph
                    .node(node_id)
                    .map(|node| node.state() == NodeState::Dirty)
                    .unwrap_or(false)
                    && !TopologyAnalyzer::new(&self.graph).has_pending_upstream(node_id);

                if ready {
                    self.dispatch(node_id, events);
                    progressed = true;
                }
            }

            if !progressed {
                break;
            }
        }
    }

    /// Start a recompute of one node.
    fn dispatch(&mut self, node_id: NodeId, events: &mut Vec<NodeEvent>) {
        let Ok(node) = self.graph.node(node_id) else {
            return;
        };

        // Snapshot inputs: upstream value, else port default.
        let mut inputs: IndexMap<String, Value> = IndexMap::new();
        let mut missing = None;
        for port in node.sink_ports() {
            let value = self
                .graph
                .upstream_value(port.id)
                .cloned()
                .or_else(|| port.default_value.clone());
            match value {
                Some(value) => {
                    inputs.insert(port.name.clone(), value);
                }
                None if port.optional => {}
                None => {
                    missing = Some(port.name.clone());
                    break;
                }
            }
        }

        if let Some(port) = missing {
            log::debug!("Node {} waiting for input '{}'", node_id, port);
            if let Ok(node) = self.graph.node_mut(node_id) {
                node.mark_waiting();
            }
            events.push(NodeEvent::Waiting { node_id, port });
            return;
        }

        if let Err(error) = node.metadata().check_parameters(node_id, node.parameters()) {
            self.apply(node_id, Err(error), events);
            return;
        }

        let variant = Arc::clone(node.variant());
        let variant_id = node.metadata().id.clone();
        let asynchronous = node.is_asynchronous();
        let cacheable = node.metadata().is_cacheable();
        let parameters = node.parameters().clone();

        let mut ctx = ComputeContext::new(node_id).with_parameters(parameters.clone());
        for port in node.source_ports() {
            ctx.declare_output(port.name.clone(), port.port_type);
        }
        for (name, value) in &inputs {
            ctx.add_input(name.clone(), value.clone());
        }

        if !asynchronous {
            if let Ok(node) = self.graph.node_mut(node_id) {
                node.begin_compute();
            }
            self.stats.inline += 1;
            let result = run_compute(variant.as_ref(), ctx);
            self.apply(node_id, result, events);
            return;
        }

        let cache_key = (self.options.use_cache && cacheable)
            .then(|| CacheKey::new(&variant_id, &parameters, &inputs));
        if let Some(outputs) = cache_key.as_ref().and_then(|key| self.cache.get(key)) {
            log::debug!("Cache hit for node {} ({})", node_id, variant_id);
            self.stats.cache_hits += 1;
            self.apply(node_id, Ok(outputs), events);
            return;
        }

        let Ok(node) = self.graph.node_mut(node_id) else {
            return;
        };
        let generation = node.begin_compute();
        log::debug!("Dispatching node {} generation {}", node_id, generation);

        self.stats.dispatched += 1;
        self.in_flight += 1;
        self.pool.submit(Job {
            node_id,
            generation,
            variant,
            ctx,
            cache_key,
        });
    }

    /// Store a compute result on its node.
    ///
    /// Success caches the outputs and dirties direct successors; failure
    /// keeps the previous outputs and stops propagation at this node.
    fn apply(
        &mut self,
        node_id: NodeId,
        result: ComputeResult<IndexMap<String, Value>>,
        events: &mut Vec<NodeEvent>,
    ) {
        let Ok(node) = self.graph.node_mut(node_id) else {
            return;
        };
        self.stats.completed += 1;

        match result {
            Ok(outputs) => {
                let by_port: HashMap<PortId, Value> = outputs
                    .into_iter()
                    .filter_map(|(name, value)| {
                        node.source_ports().find(|p| p.name == name).map(|p| (p.id, value))
                    })
                    .collect();
                node.store_outputs(by_port.clone());
                events.push(NodeEvent::ValueChanged {
                    node_id,
                    outputs: by_port,
                });

                for successor in self.graph.successors(node_id) {
                    if let Ok(next) = self.graph.node_mut(successor) {
                        next.mark_dirty();
                        events.push(NodeEvent::Invalidated(successor));
                    }
                }
            }
            Err(error) => {
                log::warn!("{}", error);
                self.stats.failed += 1;
                node.store_error(error.clone());
                events.push(NodeEvent::Failed { node_id, error });
            }
        }
    }
}
