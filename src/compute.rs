//! Pull-based evaluation: `get_value`, the compute scope, and the contract
//! checks around user compute routines.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use log::trace;

use crate::cache::CacheKey;
use crate::component::{Component, ComponentId};
use crate::context::Context;
use crate::error::{ContractViolation, GraphError};
use crate::graph::Graph;
use crate::node::NodeBehaviour;
use crate::plug::Direction;
use crate::value::Value;

thread_local! {
    // Plugs currently being evaluated on this thread, for cycle detection.
    static EVAL_STACK: RefCell<Vec<ComponentId>> = const { RefCell::new(Vec::new()) };
    // Non-zero while a compute routine is running on this thread.
    static SUPPRESS_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// True while the calling thread is inside a compute routine. Mutations made
/// there must not emit signals.
pub(crate) fn signals_suppressed() -> bool {
    SUPPRESS_DEPTH.with(|depth| depth.get() > 0)
}

struct SuppressGuard;

impl SuppressGuard {
    fn new() -> Self {
        SUPPRESS_DEPTH.with(|depth| depth.set(depth.get() + 1));
        SuppressGuard
    }
}

impl Drop for SuppressGuard {
    fn drop(&mut self) {
        SUPPRESS_DEPTH.with(|depth| depth.set(depth.get() - 1));
    }
}

struct StackGuard;

impl StackGuard {
    /// Push `plug` onto the evaluation stack, failing if it is already there.
    fn enter(plug: ComponentId, path: &str) -> Result<Self, GraphError> {
        EVAL_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(&plug) {
                return Err(GraphError::contract(path, ContractViolation::Cycle));
            }
            stack.push(plug);
            Ok(StackGuard)
        })
    }
}

impl Drop for StackGuard {
    fn drop(&mut self) {
        EVAL_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

// How a plug's value is produced, resolved under the read lock so evaluation
// itself runs without holding it.
enum Resolution {
    Stored(Value),
    Follow(ComponentId),
    Compute {
        behaviour: Arc<dyn NodeBehaviour>,
        node: ComponentId,
        name: String,
        path: String,
        version: u64,
    },
}

impl Graph {
    /// Pull a plug's value.
    ///
    /// An unconnected In-plug yields its stored value, falling back to its
    /// default. A connected plug follows its input. An Out-plug invokes the
    /// owning node's compute routine under the calling thread's active
    /// [`Context`], consulting the cache first. Reads never emit signals.
    pub fn get_value(&self, plug: ComponentId) -> Result<Value, GraphError> {
        let resolution = {
            let state = self.state.read();
            let path = state.full_name(plug);
            let record = state.plug_record(plug)?;
            if let Some(source) = record.input {
                Resolution::Follow(source)
            } else if record.direction == Direction::In {
                Resolution::Stored(record.effective_value())
            } else {
                match state
                    .owning_node(plug)
                    .and_then(|node| {
                        state
                            .components
                            .get(node.0)
                            .and_then(Component::node)
                            .map(|record| (node, record.behaviour.clone()))
                    }) {
                    Some((node, behaviour)) => {
                        let name = state.get(plug)?.name.clone();
                        Resolution::Compute {
                            behaviour,
                            node,
                            name,
                            path,
                            version: record.version,
                        }
                    }
                    None => {
                        return Err(GraphError::contract(path, ContractViolation::NoCompute))
                    }
                }
            }
        };

        match resolution {
            Resolution::Stored(value) => Ok(value),
            Resolution::Follow(source) => {
                let state = self.state.read();
                let path = state.full_name(plug);
                drop(state);
                let _guard = StackGuard::enter(plug, &path)?;
                self.get_value(source)
            }
            Resolution::Compute {
                behaviour,
                node,
                name,
                path,
                version,
            } => {
                let context = Context::current();
                let key = CacheKey {
                    plug,
                    version,
                    context: context.stable_hash(),
                };
                if let Some(value) = self.cache.get(&key) {
                    return Ok(value);
                }
                let _guard = StackGuard::enter(plug, &path)?;
                trace!("computing '{}' (v{})", path, version);
                self.cache.get_or_compute(key, || {
                    let _suppress = SuppressGuard::new();
                    let mut scope = ComputeScope {
                        graph: self,
                        node,
                        behaviour: behaviour.clone(),
                        requested_name: name.clone(),
                        requested_path: path.clone(),
                        context,
                        result: None,
                    };
                    behaviour.compute(&name, &mut scope)?;
                    scope
                        .result
                        .ok_or_else(|| GraphError::contract(&path, ContractViolation::OutputNotSet))
                })
            }
        }
    }
}

/// The environment a compute routine runs in.
///
/// The scope enforces the compute contract: inputs are readable only when
/// declared to affect the requested output, and only the requested output can
/// be set.
pub struct ComputeScope<'a> {
    graph: &'a Graph,
    node: ComponentId,
    behaviour: Arc<dyn NodeBehaviour>,
    requested_name: String,
    requested_path: String,
    context: Context,
    result: Option<Value>,
}

impl ComputeScope<'_> {
    /// Pull the value of the named input plug.
    ///
    /// Fails with an [`UndeclaredDependency`](ContractViolation::UndeclaredDependency)
    /// contract violation when the node's affects map does not list the
    /// requested output under this input.
    pub fn input(&self, name: &str) -> Result<Value, GraphError> {
        if !self
            .behaviour
            .affects(name)
            .iter()
            .any(|output| output == &self.requested_name)
        {
            return Err(GraphError::contract(
                &self.requested_path,
                ContractViolation::UndeclaredDependency {
                    input: name.to_string(),
                },
            ));
        }
        let plug = self.graph.plug(self.node, name)?;
        self.graph.get_value(plug)
    }

    /// Set the computed value of the requested output.
    ///
    /// Naming any other plug is a
    /// [`WrongPlugSet`](ContractViolation::WrongPlugSet) contract violation.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), GraphError> {
        if name != self.requested_name {
            return Err(GraphError::contract(
                &self.requested_path,
                ContractViolation::WrongPlugSet {
                    set: name.to_string(),
                },
            ));
        }
        self.result = Some(value);
        Ok(())
    }

    /// The context this computation runs under.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Full name of the plug being computed.
    pub fn requested_path(&self) -> &str {
        &self.requested_path
    }
}
