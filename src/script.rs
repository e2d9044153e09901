//! Script roots and serialization.
//!
//! A script root anchors a serializable subgraph. Serializing produces a JSON
//! document describing the nodes beneath the root, their stored values, their
//! dynamic plugs, and the connections contained within the subtree. Executing
//! that document against an empty script reconstructs an equivalent subgraph,
//! instantiating node behaviours through the graph's type registry.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::component::ComponentId;
use crate::error::GraphError;
use crate::graph::{Graph, GraphState};
use crate::node::{NodeBehaviour, NodeInit, NodeSetup};
use crate::plug::{Direction, PlugFlags, PlugSpec};
use crate::value::Value;

/// The node behaviour anchoring a script.
///
/// A script root accepts any node as a child and refuses to be parented
/// anywhere, so scripts are always outermost.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptRoot;

impl NodeBehaviour for ScriptRoot {
    fn type_name(&self) -> &'static str {
        "ScriptRoot"
    }

    fn setup(&self, _setup: &mut NodeSetup) -> Result<(), GraphError> {
        Ok(())
    }

    fn accepts_parent(&self, _graph: &Graph, _node: ComponentId, _parent: ComponentId) -> bool {
        false
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ScriptDocument {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    nodes: Vec<NodeEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    connections: Vec<ConnectionEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NodeEntry {
    name: String,
    node_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    values: Vec<PlugValueEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    dynamic_plugs: Vec<DynamicPlugEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<NodeEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PlugValueEntry {
    name: String,
    value: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct DynamicPlugEntry {
    name: String,
    direction: Direction,
    flags: PlugFlags,
    default: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConnectionEntry {
    plug: String,
    source: String,
}

impl Graph {
    /// Serialize the subgraph beneath a script root to a JSON document.
    pub fn serialize(&self, script: ComponentId) -> Result<String, GraphError> {
        if !self.is_script(script) {
            return Err(GraphError::Serialization(format!(
                "'{}' is not a script root",
                self.full_name(script)?
            )));
        }
        let state = self.state.read();
        let mut connections = Vec::new();
        let nodes = collect_nodes(&state, script, script, &mut connections)?;
        let document = ScriptDocument { nodes, connections };
        serde_json::to_string_pretty(&document)
            .map_err(|e| GraphError::Serialization(e.to_string()))
    }

    /// Execute a serialized document against a script root, reconstructing
    /// its nodes, plugs, values, and connections.
    ///
    /// Node behaviours are instantiated through the registry; executing a
    /// document that names an unregistered type fails.
    pub fn execute(&self, script: ComponentId, document: &str) -> Result<(), GraphError> {
        if !self.is_script(script) {
            return Err(GraphError::Serialization(format!(
                "'{}' is not a script root",
                self.full_name(script)?
            )));
        }
        let document: ScriptDocument = serde_json::from_str(document)
            .map_err(|e| GraphError::Serialization(e.to_string()))?;
        debug!("executing script with {} top-level nodes", document.nodes.len());
        for entry in &document.nodes {
            self.instantiate(script, entry)?;
        }
        for connection in &document.connections {
            let plug = self.resolve_path(script, &connection.plug)?;
            let source = self.resolve_path(script, &connection.source)?;
            self.set_input(plug, Some(source))?;
        }
        Ok(())
    }

    fn instantiate(&self, parent: ComponentId, entry: &NodeEntry) -> Result<(), GraphError> {
        let behaviour = self.registry.create(&entry.node_type)?;
        let node = self.insert_node(behaviour, NodeInit::new().name(&entry.name), false)?;
        self.add_child(parent, node)?;
        for plug in &entry.dynamic_plugs {
            let spec = PlugSpec {
                name: plug.name.clone(),
                direction: plug.direction,
                flags: plug.flags,
                default: plug.default.clone(),
            };
            let created = self.add_plug(node, spec)?;
            if let Some(value) = &plug.value {
                self.set_value(created, value.clone())?;
            }
        }
        for value in &entry.values {
            let plug = self.plug(node, &value.name)?;
            self.set_value(plug, value.value.clone())?;
        }
        for child in &entry.children {
            self.instantiate(node, child)?;
        }
        Ok(())
    }

    /// Resolve a dot-separated path relative to `root`.
    fn resolve_path(&self, root: ComponentId, path: &str) -> Result<ComponentId, GraphError> {
        let mut current = root;
        for segment in path.split('.') {
            current = self.child(current, segment).ok_or_else(|| {
                GraphError::Serialization(format!("no component at path '{}'", path))
            })?;
        }
        Ok(current)
    }
}

fn collect_nodes(
    state: &GraphState,
    script: ComponentId,
    parent: ComponentId,
    connections: &mut Vec<ConnectionEntry>,
) -> Result<Vec<NodeEntry>, GraphError> {
    let mut entries = Vec::new();
    for &child in &state.get(parent)?.children {
        let component = state.get(child)?;
        let Some(record) = component.node() else {
            continue;
        };
        let mut entry = NodeEntry {
            name: component.name.clone(),
            node_type: record.behaviour.type_name().to_string(),
            values: Vec::new(),
            dynamic_plugs: Vec::new(),
            children: Vec::new(),
        };
        for &plug in &component.children {
            let Some(plug_record) = state.get(plug)?.plug() else {
                continue;
            };
            if !plug_record.flags.serializable {
                continue;
            }
            let name = state.get(plug)?.name.clone();
            let storable = plug_record.direction == Direction::In
                && plug_record.input.is_none()
                && plug_record.value.is_some();
            if plug_record.flags.dynamic {
                entry.dynamic_plugs.push(DynamicPlugEntry {
                    name,
                    direction: plug_record.direction,
                    flags: plug_record.flags,
                    default: plug_record.default.clone(),
                    value: if storable { plug_record.value.clone() } else { None },
                });
            } else if storable {
                entry.values.push(PlugValueEntry {
                    name,
                    value: plug_record.effective_value(),
                });
            }
            if let Some(source) = plug_record.input {
                if let (Some(plug_path), Some(source_path)) = (
                    relative_path(state, script, plug),
                    relative_path(state, script, source),
                ) {
                    connections.push(ConnectionEntry {
                        plug: plug_path,
                        source: source_path,
                    });
                }
            }
        }
        entry.children = collect_nodes(state, script, child, connections)?;
        entries.push(entry);
    }
    Ok(entries)
}

/// The dot-separated path of `id` relative to `root`, or `None` when `id` is
/// not inside `root`'s subtree.
fn relative_path(state: &GraphState, root: ComponentId, id: ComponentId) -> Option<String> {
    let mut names = Vec::new();
    let mut current = id;
    while current != root {
        let component = state.get(current).ok()?;
        names.push(component.name.clone());
        current = component.parent?;
    }
    names.reverse();
    Some(names.join("."))
}
