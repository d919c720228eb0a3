//! Change notifications for observers of the graph.
//!
//! Observers are invoked on the coordinating thread, after the engine has
//! finished mutating the graph for the triggering step.

use crate::core::error::{ComputeError, NodeId};
use crate::core::port::PortId;
use crate::core::types::Value;
use crossbeam::channel::Sender;
use std::collections::HashMap;

/// A notification about one node.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// The node's cached outputs no longer reflect its inputs.
    Invalidated(NodeId),
    /// The node recomputed successfully.
    ValueChanged {
        node_id: NodeId,
        outputs: HashMap<PortId, Value>,
    },
    /// The node's compute failed; its previous outputs are kept.
    Failed { node_id: NodeId, error: ComputeError },
    /// A required sink has no value yet.
    Waiting { node_id: NodeId, port: String },
}

impl NodeEvent {
    /// The node this event is about.
    pub fn node_id(&self) -> NodeId {
        match self {
            NodeEvent::Invalidated(node_id)
            | NodeEvent::ValueChanged { node_id, .. }
            | NodeEvent::Failed { node_id, .. }
            | NodeEvent::Waiting { node_id, .. } => *node_id,
        }
    }
}

/// Receives node events.
pub trait GraphObserver: Send {
    fn on_event(&self, event: &NodeEvent);
}

impl<F> GraphObserver for F
where
    F: Fn(&NodeEvent) + Send,
{
    fn on_event(&self, event: &NodeEvent) {
        self(event)
    }
}

/// Forwards events into a channel.
///
/// Events are dropped silently once the receiver is gone.
pub struct ChannelObserver {
    sender: Sender<NodeEvent>,
}

impl ChannelObserver {
    pub fn new(sender: Sender<NodeEvent>) -> Self {
        Self { sender }
    }
}

impl GraphObserver for ChannelObserver {
    fn on_event(&self, event: &NodeEvent) {
        let _ = self.sender.send(event.clone());
    }
}

/// Writes every event to the log.
#[derive(Debug, Default)]
pub struct LoggingObserver;

impl GraphObserver for LoggingObserver {
    fn on_event(&self, event: &NodeEvent) {
        match event {
            NodeEvent::Invalidated(node_id) => log::debug!("Node {} invalidated", node_id),
            NodeEvent::ValueChanged { node_id, outputs } => {
                log::info!("Node {} produced {} output(s)", node_id, outputs.len())
            }
            NodeEvent::Failed { error, .. } => log::warn!("{}", error),
            NodeEvent::Waiting { node_id, port } => {
                log::info!("Node {} waiting for input '{}'", node_id, port)
            }
        }
    }
}

/// Handle returned by [`Observers::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// The set of subscribed observers.
#[derive(Default)]
pub struct Observers {
    next_id: u64,
    observers: Vec<(ObserverId, Box<dyn GraphObserver>)>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer.
    pub fn subscribe(&mut self, observer: Box<dyn GraphObserver>) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, observer));
        id
    }

    /// Remove an observer. Returns false if it was not subscribed.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        self.observers.len() != before
    }

    /// Deliver events to every observer, in subscription order.
    pub fn emit(&self, events: &[NodeEvent]) {
        for event in events {
            for (_, observer) in &self.observers {
                observer.on_event(event);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}
