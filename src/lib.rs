#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

mod cache;
mod component;
mod compute;
mod context;
mod error;
mod graph;
mod node;
mod nodes;
mod plug;
mod script;
mod signal;
mod value;

pub use component::ComponentId;
pub use compute::ComputeScope;
pub use context::{Context, ContextScope};
pub use error::{ContractViolation, GraphError};
pub use graph::Graph;
pub use node::{NodeBehaviour, NodeInit, NodeSetup};
pub use nodes::{AddNode, BasicNode, FrameNode};
pub use plug::{Direction, PlugFlags, PlugSpec};
pub use script::ScriptRoot;
pub use signal::{CapturingSlot, NodeSignals, PlugEvent, Signal};
pub use value::Value;
