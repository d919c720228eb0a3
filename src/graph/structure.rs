//! Graph structure and node management.
//!
//! The Graph is the only component allowed to change connectivity. Every
//! mutation is checked up front and either applied completely or rejected
//! with a [`GraphError`] and no state change, so these invariants always
//! hold:
//! 1. Acyclicity of the node-level dependency graph.
//! 2. Each sink port has at most one incoming link.
//! 3. Every link connects ports of equal type.
//! 4. Every link references ports of nodes currently in the graph.

use crate::core::error::{ComputeError, GraphError, GraphResult, NodeId};
use crate::core::node::{NodeMetadata, NodeState, NodeVariant};
use crate::core::port::{connectable, Port, PortId, PortKind};
use crate::core::types::{ParamValue, Parameters, Value};
use crate::graph::link::Link;
use crate::graph::topology::TopologyAnalyzer;
use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;
use std::sync::Arc;

/// A node instance in the graph.
///
/// Owns its ports, its parameter values and the engine-visible propagation
/// state (state, cached outputs, generation counter).
#[derive(Clone)]
pub struct GraphNode {
    /// Unique identifier
    pub id: NodeId,
    variant: Arc<dyn NodeVariant>,
    metadata: NodeMetadata,
    ports: Vec<Port>,
    parameters: Parameters,
    state: NodeState,
    cached_outputs: HashMap<PortId, Value>,
    generation: u64,
    last_error: Option<ComputeError>,
}

impl std::fmt::Debug for GraphNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphNode")
            .field("id", &self.id)
            .field("variant", &self.metadata.id)
            .field("parameters", &self.parameters)
            .field("state", &self.state)
            .field("generation", &self.generation)
            .finish()
    }
}

impl GraphNode {
    /// Create a new graph node from a variant.
    pub fn new(variant: Box<dyn NodeVariant>) -> Self {
        Self::from_arc(Arc::from(variant))
    }

    /// Create a new graph node from a shared variant.
    pub fn from_arc(variant: Arc<dyn NodeVariant>) -> Self {
        let id = NodeId::new();
        let metadata = variant.metadata();
        let ports = metadata.ports.iter().map(|spec| Port::from_spec(id, spec)).collect();
        let parameters = metadata.default_parameters();

        Self {
            id,
            variant,
            metadata,
            ports,
            parameters,
            state: NodeState::Dirty,
            cached_outputs: HashMap::new(),
            generation: 0,
            last_error: None,
        }
    }

    /// Create with a specific ID.
    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = id;
        for port in &mut self.ports {
            port.node_id = id;
        }
        self
    }

    /// Set a parameter value.
    ///
    /// Unlike [`Graph::set_parameters`] this is not checked against the
    /// variant's declarations.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.parameters.insert(name, value.into());
        self
    }

    pub fn variant(&self) -> &Arc<dyn NodeVariant> {
        &self.variant
    }

    pub fn metadata(&self) -> &NodeMetadata {
        &self.metadata
    }

    pub fn is_asynchronous(&self) -> bool {
        self.metadata.is_asynchronous()
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    /// Find a port by name.
    pub fn port_named(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.name == name)
    }

    pub fn sink_ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter().filter(|p| p.kind == PortKind::Sink)
    }

    pub fn source_ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter().filter(|p| p.kind == PortKind::Source)
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Generation of the most recently started compute.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Last successfully computed value per source port.
    pub fn cached_outputs(&self) -> &HashMap<PortId, Value> {
        &self.cached_outputs
    }

    pub fn cached_output(&self, port: PortId) -> Option<&Value> {
        self.cached_outputs.get(&port)
    }

    /// Error of the last failed compute, cleared on success.
    pub fn last_error(&self) -> Option<&ComputeError> {
        self.last_error.as_ref()
    }

    // ========================================================================
    // Propagation state (driven by the engine)
    // ========================================================================

    pub(crate) fn mark_dirty(&mut self) {
        self.state = NodeState::Dirty;
    }

    /// Start a new generation and enter `Computing`.
    pub(crate) fn begin_compute(&mut self) -> u64 {
        self.generation += 1;
        self.state = NodeState::Computing(self.generation);
        self.generation
    }

    /// Whether a result tagged `generation` is still the one awaited.
    pub(crate) fn accepts(&self, generation: u64) -> bool {
        self.generation == generation && self.state == NodeState::Computing(generation)
    }

    pub(crate) fn mark_waiting(&mut self) {
        self.state = NodeState::Waiting;
    }

    pub(crate) fn store_outputs(&mut self, outputs: HashMap<PortId, Value>) {
        self.cached_outputs = outputs;
        self.last_error = None;
        self.state = NodeState::Clean;
    }

    /// Enter `Error`, keeping the last good outputs.
    pub(crate) fn store_error(&mut self, error: ComputeError) {
        self.last_error = Some(error);
        self.state = NodeState::Error;
    }
}

/// The processing graph: nodes, their ports, and the links between them.
///
/// Uses IndexMap/IndexSet to keep insertion order for stable iteration.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// All nodes in the graph, indexed by ID.
    nodes: IndexMap<NodeId, GraphNode>,
    /// Owning node of every port.
    port_owners: HashMap<PortId, NodeId>,
    /// All links in the graph.
    links: IndexSet<Link>,
    /// The single incoming link of each occupied sink.
    incoming: HashMap<PortId, Link>,
}

impl Graph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Node Management
    // ========================================================================

    /// Add a node to the graph. The node starts `Dirty`.
    ///
    /// Rejects a node whose id or ports are already in the graph, such as
    /// a clone of an existing node.
    pub fn add_node(&mut self, node: GraphNode) -> GraphResult<NodeId> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode(node.id));
        }
        if let Some(port) = node.ports.iter().find(|p| self.port_owners.contains_key(&p.id)) {
            return Err(GraphError::DuplicatePort(port.id));
        }
        Ok(self.insert(node))
    }

    /// Add a node from a variant and return the node ID.
    pub fn add_variant(&mut self, variant: Box<dyn NodeVariant>) -> NodeId {
        // Fresh ids cannot collide
        self.insert(GraphNode::new(variant))
    }

    fn insert(&mut self, mut node: GraphNode) -> NodeId {
        let id = node.id;
        node.mark_dirty();
        for port in &node.ports {
            self.port_owners.insert(port.id, id);
        }
        log::info!("Added node {} ({})", id, node.metadata.id);
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node and every link touching it.
    ///
    /// Idempotent: removing an absent node is a no-op. Returns the links
    /// that were removed, whose sinks on other nodes are now dirty.
    pub fn remove_node(&mut self, id: NodeId) -> Vec<Link> {
        let Some(node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        let port_ids: Vec<PortId> = node.ports.iter().map(|p| p.id).collect();

        let incident: Vec<Link> = self
            .links
            .iter()
            .filter(|l| port_ids.contains(&l.source) || port_ids.contains(&l.sink))
            .copied()
            .collect();
        for link in &incident {
            self.disconnect(*link);
        }

        for port in &port_ids {
            self.port_owners.remove(port);
        }
        self.nodes.shift_remove(&id);
        log::info!("Removed node {} and {} link(s)", id, incident.len());
        incident
    }

    /// Get a reference to a node.
    pub fn node(&self, id: NodeId) -> GraphResult<&GraphNode> {
        self.nodes.get(&id).ok_or(GraphError::UnknownNode(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> GraphResult<&mut GraphNode> {
        self.nodes.get_mut(&id).ok_or(GraphError::UnknownNode(id))
    }

    /// Check if a node exists.
    pub fn has_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Get all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    /// Get all node IDs.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Get the number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // ========================================================================
    // Ports
    // ========================================================================

    /// Get a port by ID.
    pub fn port(&self, id: PortId) -> GraphResult<&Port> {
        self.port_owners
            .get(&id)
            .and_then(|owner| self.nodes.get(owner))
            .and_then(|node| node.ports.iter().find(|p| p.id == id))
            .ok_or(GraphError::UnknownPort(id))
    }

    /// All ports of a node.
    pub fn ports_of(&self, node_id: NodeId) -> GraphResult<&[Port]> {
        Ok(self.node(node_id)?.ports())
    }

    /// Node owning a port.
    pub fn owner(&self, port: PortId) -> Option<NodeId> {
        self.port_owners.get(&port).copied()
    }

    /// Find a port on a node by name.
    pub fn find_port(&self, node_id: NodeId, name: &str) -> GraphResult<PortId> {
        self.node(node_id)?
            .port_named(name)
            .map(|p| p.id)
            .ok_or_else(|| GraphError::PortNotFound {
                node_id,
                port: name.to_string(),
            })
    }

    /// Current value feeding a sink: the upstream source's cached output.
    pub fn upstream_value(&self, sink: PortId) -> Option<&Value> {
        let link = self.incoming.get(&sink)?;
        let owner = self.port_owners.get(&link.source)?;
        self.nodes.get(owner)?.cached_outputs.get(&link.source)
    }

    // ========================================================================
    // Connection Management
    // ========================================================================

    /// Create a link from a source port to a sink port.
    ///
    /// Fails without changing the graph if the ports are unknown or
    /// reversed, their types differ, the sink is already fed, or the new
    /// edge would close a cycle. On success the sink's node becomes dirty.
    pub fn connect(&mut self, source: PortId, sink: PortId) -> GraphResult<Link> {
        let source_port = self.port(source)?;
        let sink_port = self.port(sink)?;

        if source_port.kind != PortKind::Source || sink_port.kind != PortKind::Sink {
            return Err(GraphError::InvalidEndpoints {
                from_kind: source_port.kind,
                to_kind: sink_port.kind,
            });
        }

        if !connectable(source_port, sink_port) {
            return Err(GraphError::TypeMismatch {
                from_type: source_port.port_type,
                to_type: sink_port.port_type,
            });
        }

        if let Some(existing) = self.incoming.get(&sink) {
            return Err(GraphError::SinkOccupied {
                sink,
                existing: *existing,
            });
        }

        let from = source_port.node_id;
        let to = sink_port.node_id;
        if self.would_create_cycle(from, to) {
            return Err(GraphError::WouldCreateCycle { from, to });
        }

        let link = Link::new(source, sink);
        self.links.insert(link);
        self.incoming.insert(sink, link);
        if let Some(node) = self.nodes.get_mut(&to) {
            node.mark_dirty();
        }
        log::info!("Connected {} -> {} ({})", from, to, link);
        Ok(link)
    }

    /// Create a link between two ports named on their nodes.
    pub fn connect_by_name(
        &mut self,
        from_node: NodeId,
        from_port: &str,
        to_node: NodeId,
        to_port: &str,
    ) -> GraphResult<Link> {
        let source = self.find_port(from_node, from_port)?;
        let sink = self.find_port(to_node, to_port)?;
        self.connect(source, sink)
    }

    /// Remove a link.
    ///
    /// Idempotent: returns false and changes nothing if the link is absent.
    /// Otherwise frees the sink and marks its node dirty.
    pub fn disconnect(&mut self, link: Link) -> bool {
        if !self.links.shift_remove(&link) {
            return false;
        }
        self.incoming.remove(&link.sink);
        if let Some(node) = self
            .port_owners
            .get(&link.sink)
            .and_then(|owner| self.nodes.get_mut(owner))
        {
            node.mark_dirty();
        }
        log::info!("Disconnected {}", link);
        true
    }

    /// Check whether a link is present.
    pub fn contains_link(&self, link: &Link) -> bool {
        self.links.contains(link)
    }

    /// Get all links.
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    /// Get the number of links.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// The link feeding a sink, if any.
    pub fn incoming(&self, sink: PortId) -> Option<Link> {
        self.incoming.get(&sink).copied()
    }

    /// Get all links leaving a node's source ports.
    pub fn links_from(&self, node_id: NodeId) -> impl Iterator<Item = &Link> {
        self.links
            .iter()
            .filter(move |l| self.port_owners.get(&l.source) == Some(&node_id))
    }

    /// Get all links entering a node's sink ports.
    pub fn links_to(&self, node_id: NodeId) -> impl Iterator<Item = &Link> {
        self.links
            .iter()
            .filter(move |l| self.port_owners.get(&l.sink) == Some(&node_id))
    }

    /// Distinct nodes fed directly by this node, in link order.
    pub fn successors(&self, node_id: NodeId) -> Vec<NodeId> {
        let mut seen = IndexSet::new();
        for link in self.links_from(node_id) {
            if let Some(owner) = self.owner(link.sink) {
                seen.insert(owner);
            }
        }
        seen.into_iter().collect()
    }

    /// Distinct nodes feeding this node directly, in link order.
    pub fn predecessors(&self, node_id: NodeId) -> Vec<NodeId> {
        let mut seen = IndexSet::new();
        for link in self.links_to(node_id) {
            if let Some(owner) = self.owner(link.source) {
                seen.insert(owner);
            }
        }
        seen.into_iter().collect()
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    /// Update some parameters of a node and mark it dirty.
    ///
    /// Every name must be declared by the variant and every value must
    /// have the declared kind; otherwise nothing is changed. Parameters
    /// not named keep their current value.
    pub fn set_parameters(&mut self, node_id: NodeId, parameters: Parameters) -> GraphResult<()> {
        let node = self.node(node_id)?;
        for (name, value) in parameters.iter() {
            let definition = node.metadata.get_parameter(name).ok_or_else(|| {
                GraphError::UnknownParameter {
                    node_id,
                    name: name.to_string(),
                }
            })?;
            if !definition.default_value.same_kind(value) {
                return Err(GraphError::ParameterTypeMismatch {
                    node_id,
                    name: name.to_string(),
                    expected: definition.default_value.kind_name().to_string(),
                    got: value.kind_name().to_string(),
                });
            }
        }

        let node = self.node_mut(node_id)?;
        for (name, value) in parameters.iter() {
            node.parameters.insert(name, value.clone());
        }
        node.mark_dirty();
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
    // Graph Analysis
    // ========================================================================

    /// Check if linking from_node to to_node would create a cycle.
    fn would_create_cycle(&self, from_node: NodeId, to_node: NodeId) -> bool {
        // The new edge closes a cycle iff from_node is already reachable
        // from to_node (including from_node == to_node).
        TopologyAnalyzer::new(self).is_reachable(to_node, from_node)
    }

    /// Clear all nodes and links.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.port_owners.clear();
        self.links.clear();
        self.incoming.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::ComputeContext;
    use crate::core::node::NodeMetadata;
    use crate::core::port::{ParameterDefinition, PortSpec};
    use crate::core::types::PortType;

    /// Number relay with an extra image sink, for wiring tests.
    struct Relay;

    impl NodeVariant for Relay {
        fn metadata(&self) -> NodeMetadata {
            NodeMetadata::builder("relay", "Relay")
                .port(PortSpec::sink("input", PortType::Number))
                .port(PortSpec::sink("image", PortType::Image).optional())
                .port(PortSpec::source("output", PortType::Number))
                .parameter(ParameterDefinition::new("gain", 1.0))
                .build()
        }

        fn compute(&self, ctx: &mut ComputeContext) -> Result<(), ComputeError> {
            let value = ctx.input_number("input")?;
            ctx.set_output("output", Value::Number(value))
        }
    }

    fn relay(graph: &mut Graph) -> NodeId {
        graph.add_variant(Box::new(Relay))
    }

    #[test]
    fn test_add_remove_node() {
        let mut graph = Graph::new();

        let id = relay(&mut graph);
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.node(id).unwrap().state(), NodeState::Dirty);

        let port = graph.find_port(id, "output").unwrap();
        assert_eq!(graph.owner(port), Some(id));

        assert!(graph.remove_node(id).is_empty());
        assert!(!graph.has_node(id));
        assert!(graph.port(port).is_err());

        // Idempotent
        assert!(graph.remove_node(id).is_empty());
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut graph = Graph::new();
        let source = relay(&mut graph);
        let sink = relay(&mut graph);
        let link = graph.connect_by_name(source, "output", sink, "input").unwrap();

        let replacement = GraphNode::new(Box::new(Relay)).with_id(sink);
        assert_eq!(graph.add_node(replacement).unwrap_err(), GraphError::DuplicateNode(sink));

        // A clone under a new id still carries the original port ids
        let clone = graph.node(sink).unwrap().clone().with_id(NodeId::new());
        assert!(matches!(graph.add_node(clone), Err(GraphError::DuplicatePort(_))));

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.incoming(link.sink), Some(link));
        assert_eq!(graph.port(link.sink).unwrap().node_id, sink);
        assert_eq!(graph.owner(link.sink), Some(sink));

        let fresh = GraphNode::new(Box::new(Relay));
        let id = fresh.id;
        assert_eq!(graph.add_node(fresh).unwrap(), id);
        assert_eq!(graph.node_count(), 3);
    }

    #[test]
    fn test_connect_marks_sink_dirty() {
        let mut graph = Graph::new();
        let a = relay(&mut graph);
        let b = relay(&mut graph);
        graph.node_mut(b).unwrap().store_outputs(HashMap::new());

        let link = graph.connect_by_name(a, "output", b, "input").unwrap();
        assert_eq!(graph.link_count(), 1);
        assert_eq!(graph.node(b).unwrap().state(), NodeState::Dirty);
        assert_eq!(graph.incoming(link.sink), Some(link));
        assert_eq!(graph.successors(a), vec![b]);
        assert_eq!(graph.predecessors(b), vec![a]);
    }

    #[test]
    fn test_type_mismatch() {
        let mut graph = Graph::new();
        let a = relay(&mut graph);
        let b = relay(&mut graph);

        let result = graph.connect_by_name(a, "output", b, "image");
        assert!(matches!(result, Err(GraphError::TypeMismatch { .. })));
        assert_eq!(graph.link_count(), 0);
    }

    #[test]
    fn test_reversed_endpoints() {
        let mut graph = Graph::new();
        let a = relay(&mut graph);
        let b = relay(&mut graph);

        let result = graph.connect_by_name(b, "input", a, "output");
        assert!(matches!(result, Err(GraphError::InvalidEndpoints { .. })));
    }

    #[test]
    fn test_sink_occupied() {
        let mut graph = Graph::new();
        let a = relay(&mut graph);
        let b = relay(&mut graph);
        let c = relay(&mut graph);

        let first = graph.connect_by_name(a, "output", c, "input").unwrap();
        let result = graph.connect_by_name(b, "output", c, "input");
        assert_eq!(
            result,
            Err(GraphError::SinkOccupied {
                sink: first.sink,
                existing: first
            })
        );

        // Explicit disconnect frees the slot
        assert!(graph.disconnect(first));
        assert!(graph.connect_by_name(b, "output", c, "input").is_ok());
    }

    #[test]
    fn test_cycle_detection() {
        let mut graph = Graph::new();
        let a = relay(&mut graph);
        let b = relay(&mut graph);
        let c = relay(&mut graph);

        graph.connect_by_name(a, "output", b, "input").unwrap();
        graph.connect_by_name(b, "output", c, "input").unwrap();

        let result = graph.connect_by_name(c, "output", a, "input");
        assert!(matches!(result, Err(GraphError::WouldCreateCycle { .. })));
        assert_eq!(graph.link_count(), 2);
    }

    #[test]
    fn test_self_loop_rejected() {
        let mut graph = Graph::new();
        let a = relay(&mut graph);

        let result = graph.connect_by_name(a, "output", a, "input");
        assert_eq!(result, Err(GraphError::WouldCreateCycle { from: a, to: a }));
    }

    #[test]
    fn test_disconnect_idempotent() {
        let mut graph = Graph::new();
        let a = relay(&mut graph);
        let b = relay(&mut graph);

        let link = graph.connect_by_name(a, "output", b, "input").unwrap();
        assert!(graph.disconnect(link));
        assert!(!graph.disconnect(link));
        assert_eq!(graph.link_count(), 0);
        assert_eq!(graph.incoming(link.sink), None);
    }

    #[test]
    fn test_remove_node_cascades() {
        let mut graph = Graph::new();
        let a = relay(&mut graph);
        let b = relay(&mut graph);
        let c = relay(&mut graph);

        graph.connect_by_name(a, "output", b, "input").unwrap();
        graph.connect_by_name(b, "output", c, "input").unwrap();
        graph.node_mut(c).unwrap().store_outputs(HashMap::new());

        let removed = graph.remove_node(b);
        assert_eq!(removed.len(), 2);
        assert_eq!(graph.link_count(), 0);
        assert_eq!(graph.node(c).unwrap().state(), NodeState::Dirty);
    }

    #[test]
    fn test_set_parameters_checked() {
        let mut graph = Graph::new();
        let a = relay(&mut graph);

        assert!(graph.set_parameter(a, "gain", 2.0).is_ok());
        assert_eq!(
            graph.node(a).unwrap().parameters().get("gain"),
            Some(&ParamValue::Number(2.0))
        );

        assert!(matches!(
            graph.set_parameter(a, "bias", 1.0),
            Err(GraphError::UnknownParameter { .. })
        ));
        assert!(matches!(
            graph.set_parameter(a, "gain", "loud"),
            Err(GraphError::ParameterTypeMismatch { .. })
        ));
        assert_eq!(
            graph.node(a).unwrap().parameters().get("gain"),
            Some(&ParamValue::Number(2.0))
        );
    }

    #[test]
    fn test_generation_acceptance() {
        let mut graph = Graph::new();
        let a = relay(&mut graph);
        let node = graph.node_mut(a).unwrap();

        let first = node.begin_compute();
        node.mark_dirty();
        assert!(!node.accepts(first));

        let second = node.begin_compute();
        assert!(second > first);
        assert!(node.accepts(second));
        assert!(!node.accepts(first));
    }
}
