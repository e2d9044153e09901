//! Built-in node types.

use std::sync::Arc;

use crate::compute::ComputeScope;
use crate::error::GraphError;
use crate::node::{NodeBehaviour, NodeRegistry, NodeSetup};
use crate::plug::PlugSpec;
use crate::value::Value;

/// A pure container node: no plugs, no compute.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicNode;

impl NodeBehaviour for BasicNode {
    fn type_name(&self) -> &'static str {
        "BasicNode"
    }

    fn setup(&self, _setup: &mut NodeSetup) -> Result<(), GraphError> {
        Ok(())
    }
}

/// Integer addition: `sum = op1 + op2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddNode;

impl NodeBehaviour for AddNode {
    fn type_name(&self) -> &'static str {
        "AddNode"
    }

    fn setup(&self, setup: &mut NodeSetup) -> Result<(), GraphError> {
        setup.add_plug(PlugSpec::input("op1", Value::Int(0)));
        setup.add_plug(PlugSpec::input("op2", Value::Int(0)));
        setup.add_plug(PlugSpec::output("sum", Value::Int(0)));
        Ok(())
    }

    fn affects(&self, input: &str) -> Vec<String> {
        match input {
            "op1" | "op2" => vec!["sum".to_string()],
            _ => Vec::new(),
        }
    }

    fn compute(&self, output: &str, scope: &mut ComputeScope<'_>) -> Result<(), GraphError> {
        if output == "sum" {
            let op1 = scope.input("op1")?.as_int().unwrap_or_default();
            let op2 = scope.input("op2")?.as_int().unwrap_or_default();
            let sum = op1
                .checked_add(op2)
                .ok_or_else(|| anyhow::anyhow!("integer overflow adding {op1} and {op2}"))?;
            scope.set("sum", Value::Int(sum))?;
        }
        Ok(())
    }
}

/// Exposes the evaluating context's frame as a float output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameNode;

impl NodeBehaviour for FrameNode {
    fn type_name(&self) -> &'static str {
        "FrameNode"
    }

    fn setup(&self, setup: &mut NodeSetup) -> Result<(), GraphError> {
        setup.add_plug(PlugSpec::output("output", Value::Float(0.0)));
        Ok(())
    }

    fn compute(&self, output: &str, scope: &mut ComputeScope<'_>) -> Result<(), GraphError> {
        if output == "output" {
            let frame = scope.context().frame();
            scope.set("output", Value::Float(frame))?;
        }
        Ok(())
    }
}

pub(crate) fn register_builtins(registry: &NodeRegistry) {
    registry.register("BasicNode", Arc::new(|| Arc::new(BasicNode) as Arc<dyn NodeBehaviour>));
    registry.register("AddNode", Arc::new(|| Arc::new(AddNode) as Arc<dyn NodeBehaviour>));
    registry.register("FrameNode", Arc::new(|| Arc::new(FrameNode) as Arc<dyn NodeBehaviour>));
    registry.register(
        "ScriptRoot",
        Arc::new(|| Arc::new(crate::script::ScriptRoot) as Arc<dyn NodeBehaviour>),
    );
}
