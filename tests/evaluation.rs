//! Lazy evaluation, dirty propagation, signal ordering, and caching.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use plugflow::{
    AddNode, CapturingSlot, ComponentId, ComputeScope, ContractViolation, Graph, GraphError,
    NodeBehaviour, NodeInit, NodeSetup, PlugSpec, Value,
};

fn add_pair(graph: &Graph) -> (ComponentId, ComponentId) {
    let n1 = graph
        .add_node_with(AddNode, NodeInit::new().name("n1"))
        .unwrap();
    let n2 = graph
        .add_node_with(AddNode, NodeInit::new().name("n2"))
        .unwrap();
    (n1, n2)
}

#[test]
fn values_pull_lazily_through_connections() {
    let graph = Graph::new();
    let (n1, n2) = add_pair(&graph);

    graph
        .set_value(graph.plug(n1, "op1").unwrap(), Value::Int(2))
        .unwrap();
    graph
        .set_value(graph.plug(n1, "op2").unwrap(), Value::Int(3))
        .unwrap();
    graph
        .set_input(
            graph.plug(n2, "op1").unwrap(),
            Some(graph.plug(n1, "sum").unwrap()),
        )
        .unwrap();

    assert_eq!(
        graph.get_value(graph.plug(n2, "op1").unwrap()).unwrap(),
        Value::Int(5)
    );
    assert_eq!(
        graph.get_value(graph.plug(n2, "sum").unwrap()).unwrap(),
        Value::Int(5)
    );
}

#[test]
fn connecting_dirties_without_setting() {
    let graph = Graph::new();
    let (n1, n2) = add_pair(&graph);

    let set = CapturingSlot::new();
    let dirtied = CapturingSlot::new();
    for node in [n1, n2] {
        set.attach(&graph.plug_set_signal(node).unwrap());
        dirtied.attach(&graph.plug_dirtied_signal(node).unwrap());
    }

    graph
        .set_input(
            graph.plug(n2, "op1").unwrap(),
            Some(graph.plug(n1, "sum").unwrap()),
        )
        .unwrap();

    assert!(set.is_empty());
    assert_eq!(dirtied.paths(), vec!["n2.op1", "n2.sum"]);
}

#[test]
fn setting_a_value_emits_one_set_then_dirties_downstream() {
    let graph = Graph::new();
    let (n1, n2) = add_pair(&graph);
    graph
        .set_input(
            graph.plug(n2, "op1").unwrap(),
            Some(graph.plug(n1, "sum").unwrap()),
        )
        .unwrap();

    let set = CapturingSlot::new();
    let dirtied = CapturingSlot::new();
    for node in [n1, n2] {
        set.attach(&graph.plug_set_signal(node).unwrap());
        dirtied.attach(&graph.plug_dirtied_signal(node).unwrap());
    }

    graph
        .set_value(graph.plug(n1, "op1").unwrap(), Value::Int(7))
        .unwrap();

    assert_eq!(set.paths(), vec!["n1.op1"]);
    assert_eq!(dirtied.paths(), vec!["n1.sum", "n2.op1", "n2.sum"]);
}

#[test]
fn disconnecting_preserves_the_pulled_value() {
    let graph = Graph::new();
    let (n1, n2) = add_pair(&graph);
    let n2_op1 = graph.plug(n2, "op1").unwrap();

    graph
        .set_value(graph.plug(n1, "op1").unwrap(), Value::Int(4))
        .unwrap();
    graph
        .set_input(n2_op1, Some(graph.plug(n1, "sum").unwrap()))
        .unwrap();
    assert_eq!(graph.get_value(n2_op1).unwrap(), Value::Int(4));

    let set = CapturingSlot::new();
    let dirtied = CapturingSlot::new();
    for node in [n1, n2] {
        set.attach(&graph.plug_set_signal(node).unwrap());
        dirtied.attach(&graph.plug_dirtied_signal(node).unwrap());
    }

    graph.set_input(n2_op1, None).unwrap();

    assert_eq!(graph.input(n2_op1).unwrap(), None);
    assert_eq!(graph.get_value(n2_op1).unwrap(), Value::Int(4));
    assert_eq!(set.paths(), vec!["n2.op1"]);
    assert_eq!(dirtied.paths(), vec!["n2.sum"]);
}

#[test]
fn disconnecting_an_unconnected_plug_is_a_quiet_no_op() {
    let graph = Graph::new();
    let node = graph.add_node(AddNode).unwrap();
    let op1 = graph.plug(node, "op1").unwrap();

    let set = CapturingSlot::new();
    set.attach(&graph.plug_set_signal(node).unwrap());
    graph.set_input(op1, None).unwrap();
    assert!(set.is_empty());
}

#[test]
fn setting_a_connected_plug_is_rejected() {
    let graph = Graph::new();
    let (n1, n2) = add_pair(&graph);
    let n2_op1 = graph.plug(n2, "op1").unwrap();
    graph
        .set_input(n2_op1, Some(graph.plug(n1, "sum").unwrap()))
        .unwrap();
    let err = graph.set_value(n2_op1, Value::Int(1)).unwrap_err();
    assert!(matches!(err, GraphError::StructuralPolicy(_)));
}

#[test]
fn output_plugs_cannot_be_set_or_driven() {
    let graph = Graph::new();
    let (n1, n2) = add_pair(&graph);
    let sum = graph.plug(n1, "sum").unwrap();
    assert!(graph.set_value(sum, Value::Int(1)).is_err());
    assert!(graph
        .set_input(sum, Some(graph.plug(n2, "sum").unwrap()))
        .is_err());
}

#[test]
fn type_incompatible_connections_are_rejected() {
    let graph = Graph::new();
    let adder = graph.add_node(AddNode).unwrap();
    let frame = graph.add_node(plugflow::FrameNode).unwrap();
    let op1 = graph.plug(adder, "op1").unwrap();
    let output = graph.plug(frame, "output").unwrap();
    assert!(!graph.accepts_input(op1, output));
    assert!(graph.set_input(op1, Some(output)).is_err());
}

struct CountingDouble {
    calls: Arc<AtomicUsize>,
}

impl NodeBehaviour for CountingDouble {
    fn type_name(&self) -> &'static str {
        "CountingDouble"
    }

    fn setup(&self, setup: &mut NodeSetup) -> Result<(), GraphError> {
        setup.add_plug(PlugSpec::input("op1", Value::Int(0)));
        setup.add_plug(PlugSpec::output("out", Value::Int(0)));
        Ok(())
    }

    fn affects(&self, input: &str) -> Vec<String> {
        match input {
            "op1" => vec!["out".to_string()],
            _ => Vec::new(),
        }
    }

    fn compute(&self, output: &str, scope: &mut ComputeScope<'_>) -> Result<(), GraphError> {
        if output == "out" {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let op1 = scope.input("op1")?.as_int().unwrap_or_default();
            scope.set("out", Value::Int(op1 * 2))?;
        }
        Ok(())
    }
}

#[test]
fn repeated_reads_hit_the_cache_until_dirtied() {
    let graph = Graph::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let node = graph
        .add_node(CountingDouble {
            calls: calls.clone(),
        })
        .unwrap();
    let op1 = graph.plug(node, "op1").unwrap();
    let out = graph.plug(node, "out").unwrap();

    graph.set_value(op1, Value::Int(3)).unwrap();
    assert_eq!(graph.get_value(out).unwrap(), Value::Int(6));
    assert_eq!(graph.get_value(out).unwrap(), Value::Int(6));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    graph.set_value(op1, Value::Int(4)).unwrap();
    assert_eq!(graph.get_value(out).unwrap(), Value::Int(8));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

struct FailingNode {
    calls: Arc<AtomicUsize>,
}

impl NodeBehaviour for FailingNode {
    fn type_name(&self) -> &'static str {
        "FailingNode"
    }

    fn setup(&self, setup: &mut NodeSetup) -> Result<(), GraphError> {
        setup.add_plug(PlugSpec::output("out", Value::Int(0)));
        Ok(())
    }

    fn compute(&self, _output: &str, _scope: &mut ComputeScope<'_>) -> Result<(), GraphError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(anyhow::anyhow!("no value available"))?;
        Ok(())
    }
}

#[test]
fn compute_failures_propagate_and_are_never_cached() {
    let graph = Graph::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let node = graph
        .add_node(FailingNode {
            calls: calls.clone(),
        })
        .unwrap();
    let out = graph.plug(node, "out").unwrap();

    let err = graph.get_value(out).unwrap_err();
    assert!(err.user_error().is_some());
    assert!(err.to_string().contains("no value available"));

    let err = graph.get_value(out).unwrap_err();
    assert!(err.user_error().is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn connection_cycles_fail_at_evaluation() {
    let graph = Graph::new();
    let (n1, n2) = add_pair(&graph);
    graph
        .set_input(
            graph.plug(n2, "op1").unwrap(),
            Some(graph.plug(n1, "sum").unwrap()),
        )
        .unwrap();
    graph
        .set_input(
            graph.plug(n1, "op1").unwrap(),
            Some(graph.plug(n2, "sum").unwrap()),
        )
        .unwrap();

    let err = graph
        .get_value(graph.plug(n1, "sum").unwrap())
        .unwrap_err();
    assert!(matches!(
        err,
        GraphError::ComputeContract {
            violation: ContractViolation::Cycle,
            ..
        }
    ));
}

#[test]
fn observers_may_mutate_the_graph_during_delivery() {
    let graph = Arc::new(Graph::new());
    let node = graph
        .add_node_with(AddNode, NodeInit::new().name("n"))
        .unwrap();
    let op1 = graph.plug(node, "op1").unwrap();
    let op2 = graph.plug(node, "op2").unwrap();

    let set = CapturingSlot::new();
    set.attach(&graph.plug_set_signal(node).unwrap());
    {
        let graph = graph.clone();
        graph
            .clone()
            .plug_set_signal(node)
            .unwrap()
            .connect(move |event| {
                if event.plug == op1 {
                    graph.set_value(op2, Value::Int(5)).unwrap();
                }
            });
    }

    graph.set_value(op1, Value::Int(7)).unwrap();

    assert_eq!(graph.get_value(op2).unwrap(), Value::Int(5));
    assert_eq!(
        graph.get_value(graph.plug(node, "sum").unwrap()).unwrap(),
        Value::Int(12)
    );
    // The nested set event is delivered re-entrantly, before the outer
    // mutation returns.
    assert_eq!(set.paths(), vec!["n.op1", "n.op2"]);
}

struct MutatingNode {
    graph: Arc<Graph>,
    victim: ComponentId,
}

impl NodeBehaviour for MutatingNode {
    fn type_name(&self) -> &'static str {
        "MutatingNode"
    }

    fn setup(&self, setup: &mut NodeSetup) -> Result<(), GraphError> {
        setup.add_plug(PlugSpec::output("out", Value::Int(0)));
        Ok(())
    }

    fn compute(&self, output: &str, scope: &mut ComputeScope<'_>) -> Result<(), GraphError> {
        if output == "out" {
            self.graph.set_value(self.victim, Value::Int(9))?;
            scope.set("out", Value::Int(1))?;
        }
        Ok(())
    }
}

#[test]
fn mutations_inside_a_compute_emit_no_signals() {
    let graph = Arc::new(Graph::new());
    let victim = graph.add_node(AddNode).unwrap();
    let victim_op1 = graph.plug(victim, "op1").unwrap();
    let node = graph
        .add_node(MutatingNode {
            graph: graph.clone(),
            victim: victim_op1,
        })
        .unwrap();

    let set = CapturingSlot::new();
    let dirtied = CapturingSlot::new();
    set.attach(&graph.plug_set_signal(victim).unwrap());
    dirtied.attach(&graph.plug_dirtied_signal(victim).unwrap());

    let out = graph.plug(node, "out").unwrap();
    assert_eq!(graph.get_value(out).unwrap(), Value::Int(1));

    // The mutation took effect but delivered nothing.
    assert_eq!(graph.get_value(victim_op1).unwrap(), Value::Int(9));
    assert!(set.is_empty());
    assert!(dirtied.is_empty());
}
