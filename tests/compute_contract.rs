//! Enforcement of the compute contract: wrong-plug sets, undeclared reads,
//! missing outputs, and connection policies.

use plugflow::{
    AddNode, BasicNode, ComponentId, ComputeScope, ContractViolation, Graph, GraphError,
    NodeBehaviour, NodeSetup, PlugSpec, Value,
};

struct MisbehavingNode;

impl NodeBehaviour for MisbehavingNode {
    fn type_name(&self) -> &'static str {
        "MisbehavingNode"
    }

    fn setup(&self, setup: &mut NodeSetup) -> Result<(), GraphError> {
        for name in ["in1", "in2", "in3"] {
            setup.add_plug(PlugSpec::input(name, Value::Int(0)));
        }
        for name in ["out1", "out2", "out3"] {
            setup.add_plug(PlugSpec::output(name, Value::Int(0)));
        }
        Ok(())
    }

    fn affects(&self, input: &str) -> Vec<String> {
        match input {
            "in3" => vec!["out3".to_string()],
            _ => Vec::new(),
        }
    }

    fn compute(&self, output: &str, scope: &mut ComputeScope<'_>) -> Result<(), GraphError> {
        match output {
            // Sets a plug other than the requested one.
            "out1" => scope.set("out2", Value::Int(1)),
            // Reads an input not declared to affect out2.
            "out2" => {
                let v = scope.input("in3")?;
                scope.set("out2", v)
            }
            // Returns without setting anything.
            "out3" => Ok(()),
            _ => Ok(()),
        }
    }
}

fn violation_for(graph: &Graph, node: ComponentId, plug: &str) -> ContractViolation {
    let plug = graph.plug(node, plug).unwrap();
    match graph.get_value(plug).unwrap_err() {
        GraphError::ComputeContract { violation, .. } => violation,
        other => panic!("expected a contract violation, got {other}"),
    }
}

#[test]
fn setting_the_wrong_plug_is_reported() {
    let graph = Graph::new();
    let node = graph.add_node(MisbehavingNode).unwrap();
    assert_eq!(
        violation_for(&graph, node, "out1"),
        ContractViolation::WrongPlugSet {
            set: "out2".to_string()
        }
    );
}

#[test]
fn reading_an_undeclared_input_is_reported() {
    let graph = Graph::new();
    let node = graph.add_node(MisbehavingNode).unwrap();
    assert_eq!(
        violation_for(&graph, node, "out2"),
        ContractViolation::UndeclaredDependency {
            input: "in3".to_string()
        }
    );
}

#[test]
fn returning_without_setting_is_reported() {
    let graph = Graph::new();
    let node = graph.add_node(MisbehavingNode).unwrap();
    assert_eq!(
        violation_for(&graph, node, "out3"),
        ContractViolation::OutputNotSet
    );
}

#[test]
fn violations_are_not_cached() {
    let graph = Graph::new();
    let node = graph.add_node(MisbehavingNode).unwrap();
    assert_eq!(
        violation_for(&graph, node, "out3"),
        ContractViolation::OutputNotSet
    );
    assert_eq!(
        violation_for(&graph, node, "out3"),
        ContractViolation::OutputNotSet
    );
}

struct SilentNode;

impl NodeBehaviour for SilentNode {
    fn type_name(&self) -> &'static str {
        "SilentNode"
    }

    fn setup(&self, setup: &mut NodeSetup) -> Result<(), GraphError> {
        setup.add_plug(PlugSpec::output("out", Value::Int(0)));
        Ok(())
    }
}

#[test]
fn nodes_without_a_compute_routine_are_reported() {
    let graph = Graph::new();
    let node = graph.add_node(SilentNode).unwrap();
    assert_eq!(
        violation_for(&graph, node, "out"),
        ContractViolation::NoCompute
    );
}

struct SelectiveNode;

impl NodeBehaviour for SelectiveNode {
    fn type_name(&self) -> &'static str {
        "SelectiveNode"
    }

    fn setup(&self, setup: &mut NodeSetup) -> Result<(), GraphError> {
        setup.add_plug(PlugSpec::input("op1", Value::Int(0)));
        Ok(())
    }

    fn accepts_input(&self, graph: &Graph, _plug: ComponentId, input: ComponentId) -> bool {
        graph
            .plug_node(input)
            .and_then(|node| graph.node_type_name(node))
            == Some("AddNode")
    }
}

#[test]
fn connection_policies_are_consulted_before_connecting() {
    let graph = Graph::new();
    let selective = graph.add_node(SelectiveNode).unwrap();
    let adder = graph.add_node(AddNode).unwrap();
    let other = graph.add_node(MisbehavingNode).unwrap();
    let op1 = graph.plug(selective, "op1").unwrap();

    let allowed = graph.plug(adder, "sum").unwrap();
    let refused = graph.plug(other, "out1").unwrap();

    assert!(graph.accepts_input(op1, allowed));
    assert!(!graph.accepts_input(op1, refused));
    graph.set_input(op1, Some(allowed)).unwrap();
    graph.set_input(op1, None).unwrap();
    let err = graph.set_input(op1, Some(refused)).unwrap_err();
    assert!(matches!(err, GraphError::StructuralPolicy(_)));
}

#[test]
fn containers_have_no_plugs_to_violate() {
    let graph = Graph::new();
    let node = graph.add_node(BasicNode).unwrap();
    assert!(graph.children(node).is_empty());
}
