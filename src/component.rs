//! Component records and handles.

use std::sync::Arc;

use crate::node::NodeBehaviour;
use crate::plug::PlugRecord;
use crate::signal::NodeSignals;

/// A handle to a component owned by a [`Graph`](crate::Graph).
///
/// Handles are plain indices; they are cheap to copy and safe to send across
/// threads, but validity is a runtime question answered by the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId(pub(crate) usize);

/// Internal per-component state: identity plus hierarchy links.
#[derive(Debug)]
pub(crate) struct Component {
    /// Unique among siblings; de-duplicated on insertion.
    pub(crate) name: String,
    /// Non-owning back-reference. Ownership lives in the graph's arena.
    pub(crate) parent: Option<ComponentId>,
    /// Insertion order preserved; observable through serialization.
    pub(crate) children: Vec<ComponentId>,
    pub(crate) kind: ComponentKind,
}

impl Component {
    pub(crate) fn new(name: impl Into<String>, kind: ComponentKind) -> Self {
        Self {
            name: name.into(),
            parent: None,
            children: Vec::new(),
            kind,
        }
    }

    pub(crate) fn plug(&self) -> Option<&PlugRecord> {
        match &self.kind {
            ComponentKind::Plug(record) => Some(record),
            _ => None,
        }
    }

    pub(crate) fn plug_mut(&mut self) -> Option<&mut PlugRecord> {
        match &mut self.kind {
            ComponentKind::Plug(record) => Some(record),
            _ => None,
        }
    }

    pub(crate) fn node(&self) -> Option<&NodeRecord> {
        match &self.kind {
            ComponentKind::Node(record) => Some(record),
            _ => None,
        }
    }
}

/// What a component is.
#[derive(Debug)]
pub(crate) enum ComponentKind {
    /// A bare named container with no graph semantics.
    Plain,
    /// A node: carries behaviour and signals.
    Node(NodeRecord),
    /// A plug: carries connection and value state.
    Plug(PlugRecord),
}

/// Internal per-node state.
pub(crate) struct NodeRecord {
    pub(crate) behaviour: Arc<dyn NodeBehaviour>,
    pub(crate) signals: NodeSignals,
    /// Script roots anchor serialization and `script_node` lookup.
    pub(crate) is_script: bool,
}

impl std::fmt::Debug for NodeRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRecord")
            .field("type_name", &self.behaviour.type_name())
            .field("is_script", &self.is_script)
            .finish()
    }
}
