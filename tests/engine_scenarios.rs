//! End-to-end propagation scenarios driven through the public engine API.

use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vortex::prelude::*;

const TIMEOUT: Duration = Duration::from_secs(10);

fn engine() -> Engine {
    Engine::with_options(EngineOptions::new().with_worker_threads(4)).unwrap()
}

/// Emits its "value" parameter.
struct Number;

impl NodeVariant for Number {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("test_number", "Number")
            .port(PortSpec::source("value", PortType::Number))
            .parameter(ParameterDefinition::new("value", 0.0))
            .build()
    }

    fn compute(&self, ctx: &mut ComputeContext) -> Result<(), ComputeError> {
        let value = ctx.number("value")?;
        ctx.set_output("value", Value::Number(value))
    }
}

/// Doubles its input in the background. Fails on NaN.
struct Doubler;

impl NodeVariant for Doubler {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("doubler", "Doubler")
            .port(PortSpec::sink("in", PortType::Number))
            .port(PortSpec::source("out", PortType::Number))
            .asynchronous()
            .build()
    }

    fn compute(&self, ctx: &mut ComputeContext) -> Result<(), ComputeError> {
        let x = ctx.input_number("in")?;
        if x.is_nan() {
            return Err(ctx.processing_error("not a number"));
        }
        ctx.set_output("out", Value::Number(x * 2.0))
    }
}

/// Blocks each compute until its key (input plus offset) has been released.
#[derive(Default)]
struct Gate {
    released: Mutex<HashSet<i64>>,
    signal: Condvar,
}

impl Gate {
    fn release(&self, value: i64) {
        self.released.lock().insert(value);
        self.signal.notify_all();
    }

    fn wait(&self, value: i64) {
        let mut released = self.released.lock();
        while !released.contains(&value) {
            self.signal.wait(&mut released);
        }
    }
}

struct Gated(Arc<Gate>);

impl NodeVariant for Gated {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("gated", "Gated")
            .port(PortSpec::sink("in", PortType::Number))
            .port(PortSpec::source("out", PortType::Number))
            .parameter(ParameterDefinition::new("offset", 0.0))
            .asynchronous()
            .build()
    }

    fn compute(&self, ctx: &mut ComputeContext) -> Result<(), ComputeError> {
        let x = ctx.input_number("in")? + ctx.number("offset")?;
        self.0.wait(x as i64);
        ctx.set_output("out", Value::Number(x * 10.0))
    }
}

/// Adds its two inputs and counts how often it ran.
struct CountingSum(Arc<AtomicUsize>);

impl NodeVariant for CountingSum {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("counting_sum", "Counting Sum")
            .port(PortSpec::sink("a", PortType::Number))
            .port(PortSpec::sink("b", PortType::Number))
            .port(PortSpec::source("sum", PortType::Number))
            .build()
    }

    fn compute(&self, ctx: &mut ComputeContext) -> Result<(), ComputeError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        let sum = ctx.input_number("a")? + ctx.input_number("b")?;
        ctx.set_output("sum", Value::Number(sum))
    }
}

/// Panics on every compute.
struct Exploding;

impl NodeVariant for Exploding {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("exploding", "Exploding")
            .port(PortSpec::sink("in", PortType::Number))
            .port(PortSpec::source("out", PortType::Number))
            .asynchronous()
            .build()
    }

    fn compute(&self, _ctx: &mut ComputeContext) -> Result<(), ComputeError> {
        panic!("kernel blew up")
    }
}

#[test]
fn test_parameter_change_propagates() {
    let mut engine = engine();
    let number = engine.add_node(Box::new(Number));
    let doubler = engine.add_node(Box::new(Doubler));

    engine.set_parameter(number, "value", 5.0).unwrap();
    engine.connect_ports(number, "value", doubler, "in").unwrap();
    assert!(engine.wait_until_idle(TIMEOUT));
    assert_eq!(engine.cached_output(doubler, "out"), Some(&Value::Number(10.0)));
    assert_eq!(engine.state(doubler).unwrap(), NodeState::Clean);

    engine.set_parameter(number, "value", 7.0).unwrap();
    assert_eq!(engine.state(number).unwrap(), NodeState::Clean);
    assert!(engine.wait_until_idle(TIMEOUT));
    assert_eq!(engine.cached_output(doubler, "out"), Some(&Value::Number(14.0)));
}

#[test]
fn test_type_mismatch_rejected() {
    let mut engine = engine();
    let color = engine.add_node(Box::new(ColorConstant));
    let doubler = engine.add_node(Box::new(Doubler));

    let err = engine.connect_ports(color, "color", doubler, "in").unwrap_err();
    assert!(matches!(err, GraphError::TypeMismatch { .. }));
    assert_eq!(engine.graph().link_count(), 0);
    assert_eq!(engine.state(doubler).unwrap(), NodeState::Waiting);
}

#[test]
fn test_cycle_rejected() {
    let mut engine = engine();
    let a = engine.add_node(Box::new(Doubler));
    let b = engine.add_node(Box::new(Doubler));
    engine.connect_ports(a, "out", b, "in").unwrap();

    let err = engine.connect_ports(b, "out", a, "in").unwrap_err();
    assert!(matches!(err, GraphError::WouldCreateCycle { .. }));
    assert_eq!(engine.graph().link_count(), 1);
    assert!(!TopologyAnalyzer::new(engine.graph()).has_cycle());
}

#[test]
fn test_self_loop_rejected() {
    let mut engine = engine();
    let a = engine.add_node(Box::new(Doubler));

    let err = engine.connect_ports(a, "out", a, "in").unwrap_err();
    assert!(matches!(err, GraphError::WouldCreateCycle { .. }));
}

#[test]
fn test_sink_accepts_one_link() {
    let mut engine = engine();
    let a = engine.add_node(Box::new(Number));
    let b = engine.add_node(Box::new(Number));
    let doubler = engine.add_node(Box::new(Doubler));

    engine.connect_ports(a, "value", doubler, "in").unwrap();
    let err = engine.connect_ports(b, "value", doubler, "in").unwrap_err();
    assert!(matches!(err, GraphError::SinkOccupied { .. }));
}

#[test]
fn test_stale_result_is_discarded() {
    let gate = Arc::new(Gate::default());
    let mut engine = engine();
    let number = engine.add_node(Box::new(Number));
    let gated = engine.add_node(Box::new(Gated(Arc::clone(&gate))));

    engine.set_parameter(number, "value", 1.0).unwrap();
    engine.connect_ports(number, "value", gated, "in").unwrap();
    let first = engine.generation(gated).unwrap();

    // Supersede the in-flight compute before it finishes
    engine.set_parameter(number, "value", 2.0).unwrap();
    let second = engine.generation(gated).unwrap();
    assert!(second > first);
    assert_eq!(engine.state(gated).unwrap(), NodeState::Computing(second));

    gate.release(2);
    assert!(engine.wait_for_completion(TIMEOUT));
    assert_eq!(engine.cached_output(gated, "out"), Some(&Value::Number(20.0)));
    assert_eq!(engine.state(gated).unwrap(), NodeState::Clean);
    assert_eq!(engine.in_flight(), 1);

    // The older result arrives last and must not overwrite
    gate.release(1);
    assert!(engine.wait_until_idle(TIMEOUT));
    assert_eq!(engine.stats().discarded, 1);
    assert_eq!(engine.cached_output(gated, "out"), Some(&Value::Number(20.0)));
    assert_eq!(engine.state(gated).unwrap(), NodeState::Clean);
}

#[test]
fn test_rapid_parameter_changes_keep_latest() {
    let gate = Arc::new(Gate::default());
    let mut engine = engine();
    let number = engine.add_node(Box::new(Number));
    let gated = engine.add_node(Box::new(Gated(Arc::clone(&gate))));
    engine.connect_ports(number, "value", gated, "in").unwrap();

    engine.set_parameter(gated, "offset", 5.0).unwrap();
    engine.set_parameter(gated, "offset", 7.0).unwrap();
    let latest = engine.generation(gated).unwrap();
    assert_eq!(engine.state(gated).unwrap(), NodeState::Computing(latest));
    assert_eq!(engine.in_flight(), 3);

    gate.release(7);
    assert!(engine.wait_for_completion(TIMEOUT));
    assert_eq!(engine.cached_output(gated, "out"), Some(&Value::Number(70.0)));

    gate.release(0);
    gate.release(5);
    assert!(engine.wait_until_idle(TIMEOUT));
    assert_eq!(engine.stats().discarded, 2);
    assert_eq!(engine.cached_output(gated, "out"), Some(&Value::Number(70.0)));
    assert_eq!(engine.generation(gated), Some(latest));
}

#[test]
fn test_error_isolated_to_failing_branch() {
    let mut engine = engine();
    let number = engine.add_node(Box::new(Number));
    let failing = engine.add_node(Box::new(Doubler));
    let downstream = engine.add_node(Box::new(Doubler));
    let sibling = engine.add_node(Box::new(Doubler));

    engine.connect_ports(number, "value", failing, "in").unwrap();
    engine.connect_ports(failing, "out", downstream, "in").unwrap();
    engine.connect_ports(number, "value", sibling, "in").unwrap();
    engine.set_parameter(number, "value", 3.0).unwrap();
    assert!(engine.wait_until_idle(TIMEOUT));
    assert_eq!(engine.cached_output(downstream, "out"), Some(&Value::Number(12.0)));

    engine.set_parameter(number, "value", f64::NAN).unwrap();
    assert!(engine.wait_until_idle(TIMEOUT));

    assert_eq!(engine.state(failing).unwrap(), NodeState::Error);
    assert!(matches!(
        engine.last_error(failing),
        Some(ComputeError::Processing { .. })
    ));
    // Last good values survive, downstream was not recomputed
    assert_eq!(engine.cached_output(failing, "out"), Some(&Value::Number(6.0)));
    assert_eq!(engine.state(downstream).unwrap(), NodeState::Clean);
    assert_eq!(engine.cached_output(downstream, "out"), Some(&Value::Number(12.0)));
    assert_eq!(engine.state(sibling).unwrap(), NodeState::Error);

    // Recovery
    engine.set_parameter(number, "value", 1.0).unwrap();
    assert!(engine.wait_until_idle(TIMEOUT));
    assert_eq!(engine.state(failing).unwrap(), NodeState::Clean);
    assert!(engine.last_error(failing).is_none());
    assert_eq!(engine.cached_output(downstream, "out"), Some(&Value::Number(4.0)));
}

#[test]
fn test_panicking_compute_becomes_error() {
    let mut engine = engine();
    let number = engine.add_node(Box::new(Number));
    let exploding = engine.add_node(Box::new(Exploding));
    engine.connect_ports(number, "value", exploding, "in").unwrap();

    assert!(engine.wait_until_idle(TIMEOUT));
    assert_eq!(engine.state(exploding).unwrap(), NodeState::Error);
    assert!(matches!(
        engine.last_error(exploding),
        Some(ComputeError::Panicked { .. })
    ));

    // The pool survives
    let doubler = engine.add_node(Box::new(Doubler));
    engine.connect_ports(number, "value", doubler, "in").unwrap();
    assert!(engine.wait_until_idle(TIMEOUT));
    assert_eq!(engine.cached_output(doubler, "out"), Some(&Value::Number(0.0)));
}

#[test]
fn test_waiting_until_connected() {
    let mut engine = engine();
    let (tx, rx) = crossbeam::channel::unbounded();
    engine.subscribe(Box::new(ChannelObserver::new(tx)));

    let doubler = engine.add_node(Box::new(Doubler));
    assert_eq!(engine.state(doubler).unwrap(), NodeState::Waiting);
    assert!(engine.is_idle());
    assert!(rx
        .try_iter()
        .any(|e| matches!(e, NodeEvent::Waiting { node_id, ref port } if node_id == doubler && port == "in")));

    let number = engine.add_node(Box::new(Number));
    engine.connect_ports(number, "value", doubler, "in").unwrap();
    assert!(engine.wait_until_idle(TIMEOUT));
    assert_eq!(engine.state(doubler).unwrap(), NodeState::Clean);
}

#[test]
fn test_disconnect_returns_to_waiting() {
    let mut engine = engine();
    let number = engine.add_node(Box::new(Number));
    let doubler = engine.add_node(Box::new(Doubler));
    let link = engine.connect_ports(number, "value", doubler, "in").unwrap();
    assert!(engine.wait_until_idle(TIMEOUT));

    assert!(engine.disconnect(link));
    assert!(!engine.disconnect(link));
    assert_eq!(engine.state(doubler).unwrap(), NodeState::Waiting);
}

#[test]
fn test_remove_upstream_node() {
    let mut engine = engine();
    let number = engine.add_node(Box::new(Number));
    let doubler = engine.add_node(Box::new(Doubler));
    engine.connect_ports(number, "value", doubler, "in").unwrap();
    assert!(engine.wait_until_idle(TIMEOUT));

    let removed = engine.remove_node(number);
    assert_eq!(removed.len(), 1);
    assert!(engine.remove_node(number).is_empty());
    assert_eq!(engine.graph().link_count(), 0);
    assert_eq!(engine.state(doubler).unwrap(), NodeState::Waiting);
    assert!(matches!(engine.state(number), Err(GraphError::UnknownNode(_))));
}

#[test]
fn test_diamond_join_computes_once_per_change() {
    let count = Arc::new(AtomicUsize::new(0));
    let mut engine = engine();
    let root = engine.add_node(Box::new(Number));
    let left = engine.add_node(Box::new(Doubler));
    let right = engine.add_node(Box::new(Doubler));
    let join = engine.add_node(Box::new(CountingSum(Arc::clone(&count))));

    engine.connect_ports(root, "value", left, "in").unwrap();
    engine.connect_ports(root, "value", right, "in").unwrap();
    engine.connect_ports(left, "out", join, "a").unwrap();
    engine.connect_ports(right, "out", join, "b").unwrap();
    assert!(engine.wait_until_idle(TIMEOUT));
    assert_eq!(engine.cached_output(join, "sum"), Some(&Value::Number(0.0)));

    count.store(0, Ordering::SeqCst);
    engine.set_parameter(root, "value", 2.0).unwrap();
    assert!(engine.wait_until_idle(TIMEOUT));

    assert_eq!(engine.cached_output(join, "sum"), Some(&Value::Number(8.0)));
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unknown_parameter_rejected() {
    let mut engine = engine();
    let number = engine.add_node(Box::new(Number));

    assert!(matches!(
        engine.set_parameter(number, "nope", 1.0),
        Err(GraphError::UnknownParameter { .. })
    ));
    assert!(matches!(
        engine.set_parameter(number, "value", "text"),
        Err(GraphError::ParameterTypeMismatch { .. })
    ));
    assert_eq!(engine.cached_output(number, "value"), Some(&Value::Number(0.0)));
}

#[test]
fn test_constraint_violation_sets_error() {
    let mut engine = engine();
    let number = engine.add_node(Box::new(Number));
    let brightness = engine.add_node(Box::new(Brightness));
    let image = engine.add_node(Box::new(ImageSource));

    // Empty path fails the not-empty constraint before any I/O
    assert!(engine.wait_until_idle(TIMEOUT));
    assert_eq!(engine.state(image).unwrap(), NodeState::Error);
    assert!(matches!(
        engine.last_error(image),
        Some(ComputeError::InvalidParameter { .. })
    ));

    engine.connect_ports(number, "value", brightness, "amount").unwrap();
    engine.set_parameter(brightness, "amount", 1000.0).unwrap();
    // Required image sink is unfed, so the range is not checked yet
    assert_eq!(engine.state(brightness).unwrap(), NodeState::Waiting);
    assert!(engine.last_error(brightness).is_none());
}

#[test]
fn test_image_chain() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gray.png");
    image::RgbaImage::from_pixel(4, 4, image::Rgba([100, 100, 100, 255]))
        .save(&path)
        .unwrap();

    let registry = NodeRegistry::with_builtins();
    let mut engine = engine();
    let source = engine.add_graph_node(
        GraphNode::new(registry.create("image_source").unwrap())
            .with_parameter("path", path.to_str().unwrap()),
    )
    .unwrap();
    let brightness = engine
        .add_graph_node(GraphNode::new(registry.create("brightness").unwrap()).with_parameter("amount", 20.0))
        .unwrap();
    let output = engine.add_node(registry.create("image_output").unwrap());

    engine.connect_ports(source, "image", brightness, "image").unwrap();
    engine.connect_ports(brightness, "result", output, "image").unwrap();
    assert!(engine.wait_until_idle(TIMEOUT));

    let preview = engine
        .cached_output(output, "preview")
        .and_then(Value::as_image)
        .and_then(ImageValue::to_rgba8)
        .unwrap();
    assert_eq!(preview.get_pixel(0, 0), &image::Rgba([120, 120, 120, 255]));

    // Out of range amount fails at compute time; the preview keeps the old image
    engine.set_parameter(brightness, "amount", 1000.0).unwrap();
    assert!(engine.wait_until_idle(TIMEOUT));
    assert_eq!(engine.state(brightness).unwrap(), NodeState::Error);
    assert!(matches!(
        engine.last_error(brightness),
        Some(ComputeError::InvalidParameter { .. })
    ));
    assert!(engine.cached_output(output, "preview").is_some());

    // A missing file is a resource error
    engine
        .set_parameter(source, "path", dir.path().join("absent.png").to_str().unwrap())
        .unwrap();
    assert!(engine.wait_until_idle(TIMEOUT));
    assert!(matches!(
        engine.last_error(source),
        Some(ComputeError::Resource { .. })
    ));
}

#[test]
fn test_reload_changed_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");
    let path_str = path.to_str().unwrap();
    let gray = |level: u8| image::RgbaImage::from_pixel(2, 2, image::Rgba([level, level, level, 255]));
    gray(10).save(&path).unwrap();

    let registry = NodeRegistry::with_builtins();
    let mut engine = engine();
    let source = engine.add_node(registry.create("image_source").unwrap());
    let output = engine.add_node(registry.create("image_output").unwrap());
    engine.connect_ports(source, "image", output, "image").unwrap();
    engine.set_parameter(source, "path", path_str).unwrap();
    assert!(engine.wait_until_idle(TIMEOUT));

    let level = |engine: &Engine| {
        engine
            .cached_output(output, "preview")
            .and_then(Value::as_image)
            .and_then(ImageValue::to_rgba8)
            .map(|image| image.get_pixel(0, 0)[0])
    };
    assert_eq!(level(&engine), Some(10));

    // Same path, new contents
    gray(200).save(&path).unwrap();
    engine.set_parameter(source, "path", path_str).unwrap();
    assert!(engine.wait_until_idle(TIMEOUT));

    assert_eq!(level(&engine), Some(200));
    assert_eq!(engine.stats().cache_hits, 0);
}

#[test]
fn test_duplicate_id_keeps_links() {
    let registry = NodeRegistry::with_builtins();
    let mut engine = engine();
    let number = engine.add_node(registry.create("number").unwrap());
    let math = engine.add_node(registry.create("math").unwrap());
    engine.set_parameter(number, "value", 3.0).unwrap();
    let link = engine.connect_ports(number, "value", math, "a").unwrap();
    engine.connect_ports(number, "value", math, "b").unwrap();

    let replacement = GraphNode::new(registry.create("math").unwrap()).with_id(math);
    assert_eq!(
        engine.add_graph_node(replacement).unwrap_err(),
        GraphError::DuplicateNode(math)
    );

    let graph = engine.graph();
    assert_eq!(graph.node_count(), 2);
    assert!(graph.contains_link(&link));
    assert_eq!(graph.owner(link.sink), Some(math));

    // The original node still computes from its inputs
    assert!(engine.wait_until_idle(TIMEOUT));
    assert_eq!(engine.cached_output(math, "result"), Some(&Value::Number(6.0)));
    engine.set_parameter(number, "value", 4.0).unwrap();
    assert!(engine.wait_until_idle(TIMEOUT));
    assert_eq!(engine.cached_output(math, "result"), Some(&Value::Number(8.0)));
}
