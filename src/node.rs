//! The node authoring contract.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::component::ComponentId;
use crate::compute::ComputeScope;
use crate::error::{ContractViolation, GraphError};
use crate::graph::Graph;
use crate::plug::PlugSpec;
use crate::value::Value;

/// The behaviour of a node variant.
///
/// This is the only extension surface a host needs to drive the engine:
/// implement the structural policies, the affects map, and the compute
/// routine, then hand an instance to [`Graph::add_node`].
///
/// # The compute contract
///
/// `compute` is invoked when a dirty Out-plug of the node is read. It must
/// set exactly the requested plug via [`ComputeScope::set`], reading only
/// inputs whose [`affects`](NodeBehaviour::affects) set contains the
/// requested output. Violations are reported as errors from the offending
/// `get_value` call, never silently downgraded to a stale or default value.
pub trait NodeBehaviour: Send + Sync + 'static {
    /// The registry key for this node variant, used by serialization.
    fn type_name(&self) -> &'static str;

    /// Declare the node's static plugs.
    fn setup(&self, setup: &mut NodeSetup) -> Result<(), GraphError>;

    /// Structural policy: may `child` be parented under this node?
    ///
    /// The default accepts nodes and plugs.
    fn accepts_child(&self, graph: &Graph, node: ComponentId, child: ComponentId) -> bool {
        let _ = node;
        graph.is_node(child) || graph.is_plug(child)
    }

    /// Structural policy: may this node be parented under `parent`?
    ///
    /// The default accepts only nodes.
    fn accepts_parent(&self, graph: &Graph, node: ComponentId, parent: ComponentId) -> bool {
        let _ = node;
        graph.is_node(parent)
    }

    /// Connection policy: may `input` drive `plug`?
    ///
    /// The default accepts any plug. Evaluated before any connection is made.
    fn accepts_input(&self, graph: &Graph, plug: ComponentId, input: ComponentId) -> bool {
        let _ = (graph, plug, input);
        true
    }

    /// The dependency map: which output plugs are invalidated when `input`
    /// changes.
    ///
    /// Propagation fan-out is per-input; an output not listed here may not be
    /// computed from `input`.
    fn affects(&self, input: &str) -> Vec<String> {
        let _ = input;
        Vec::new()
    }

    /// Produce the value of the requested Out-plug.
    ///
    /// The default reports that the node has no compute routine, which is the
    /// correct behaviour for pure container nodes with no outputs.
    fn compute(&self, output: &str, scope: &mut ComputeScope<'_>) -> Result<(), GraphError> {
        let _ = output;
        Err(GraphError::contract(
            scope.requested_path(),
            ContractViolation::NoCompute,
        ))
    }
}

/// Collects the plugs a node declares during [`NodeBehaviour::setup`].
#[derive(Debug, Default)]
pub struct NodeSetup {
    pub(crate) plugs: Vec<PlugSpec>,
}

impl NodeSetup {
    /// Declare a plug.
    pub fn add_plug(&mut self, spec: PlugSpec) {
        self.plugs.push(spec);
    }
}

/// Extended construction arguments for [`Graph::add_node_with`]: an optional
/// name plus initial plug values or connections.
#[derive(Debug, Default)]
pub struct NodeInit {
    pub(crate) name: Option<String>,
    pub(crate) inputs: Vec<(String, InitialInput)>,
}

impl NodeInit {
    /// Empty init: default name, no inputs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the node's name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set an initial literal value for the named plug.
    pub fn value(mut self, plug: impl Into<String>, value: Value) -> Self {
        self.inputs.push((plug.into(), InitialInput::Value(value)));
        self
    }

    /// Connect the named plug to `source`.
    pub fn connection(mut self, plug: impl Into<String>, source: ComponentId) -> Self {
        self.inputs
            .push((plug.into(), InitialInput::Connection(source)));
        self
    }
}

/// One initial input of a [`NodeInit`].
#[derive(Debug)]
pub(crate) enum InitialInput {
    Value(Value),
    Connection(ComponentId),
}

type Factory = Arc<dyn Fn() -> Arc<dyn NodeBehaviour> + Send + Sync>;

/// Maps node type names to behaviour factories for script execution.
#[derive(Default)]
pub(crate) struct NodeRegistry {
    factories: Mutex<AHashMap<String, Factory>>,
}

impl NodeRegistry {
    pub(crate) fn register(&self, type_name: impl Into<String>, factory: Factory) {
        self.factories.lock().insert(type_name.into(), factory);
    }

    pub(crate) fn create(&self, type_name: &str) -> Result<Arc<dyn NodeBehaviour>, GraphError> {
        let factories = self.factories.lock();
        let factory = factories.get(type_name).ok_or_else(|| {
            GraphError::ConstructionArgument(format!("no node type '{}' is registered", type_name))
        })?;
        Ok(factory())
    }
}
