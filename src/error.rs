//! Error types for graph mutation and evaluation.

use std::sync::Arc;

use crate::component::ComponentId;

/// Errors reported by graph operations.
///
/// Every error is raised synchronously at the call that triggers it; nothing
/// is deferred, batched, or downgraded to a default value. User failures from
/// a node's compute routine can be propagated with the `?` operator, which
/// converts any `anyhow::Error` into [`GraphError::User`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum GraphError {
    /// An illegal parent/child relationship, input connection, or value
    /// assignment was attempted.
    #[error("structural policy violation: {0}")]
    StructuralPolicy(String),

    /// A node's compute routine broke its declared contract.
    ///
    /// The plug named here is the one whose `get_value` call surfaced the
    /// violation.
    #[error("compute contract violation on '{plug}': {violation}")]
    ComputeContract {
        /// Full name of the mis-served plug.
        plug: String,
        /// What the compute routine did wrong.
        violation: ContractViolation,
    },

    /// Malformed extended-constructor arguments.
    #[error("bad construction argument: {0}")]
    ConstructionArgument(String),

    /// A handle does not refer to a live component.
    #[error("unknown component {0:?}")]
    UnknownComponent(ComponentId),

    /// A plug lookup by name found nothing.
    #[error("no plug named '{name}' on '{node}'")]
    NoSuchPlug {
        /// Full name of the node that was searched.
        node: String,
        /// The missing plug name.
        name: String,
    },

    /// A script could not be serialized or executed.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A user-defined error raised inside a compute routine.
    #[error("compute failed: {0}")]
    User(#[source] Arc<anyhow::Error>),
}

impl From<anyhow::Error> for GraphError {
    fn from(err: anyhow::Error) -> Self {
        GraphError::User(Arc::new(err))
    }
}

impl GraphError {
    /// Shorthand for a [`GraphError::ComputeContract`] value.
    pub(crate) fn contract(plug: impl Into<String>, violation: ContractViolation) -> Self {
        GraphError::ComputeContract {
            plug: plug.into(),
            violation,
        }
    }

    /// Returns a reference to the inner user error, if any.
    pub fn user_error(&self) -> Option<&Arc<anyhow::Error>> {
        match self {
            GraphError::User(e) => Some(e),
            _ => None,
        }
    }
}

/// Ways a compute routine can break its contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractViolation {
    /// The routine set a plug other than the one requested.
    #[error("compute set plug '{set}' instead of the requested plug")]
    WrongPlugSet {
        /// Name of the plug the routine tried to set.
        set: String,
    },

    /// The routine read an input that its affects map does not declare as
    /// affecting the requested output.
    #[error("compute read input '{input}' which is not declared to affect the requested plug")]
    UndeclaredDependency {
        /// Name of the undeclared input.
        input: String,
    },

    /// The routine returned without setting the requested output.
    #[error("compute returned without setting the requested plug")]
    OutputNotSet,

    /// The node provides no compute routine for the requested output.
    #[error("node provides no compute routine for this plug")]
    NoCompute,

    /// Pulling the requested output would recurse into itself.
    #[error("dependency cycle detected")]
    Cycle,
}
