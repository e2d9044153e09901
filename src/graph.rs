//! The graph: component ownership, hierarchy, connections, and dirty
//! propagation.

use std::collections::VecDeque;
use std::sync::Arc;

use ahash::AHashSet;
use log::{debug, trace};
use parking_lot::RwLock;
use slab::Slab;

use crate::cache::ComputeCache;
use crate::component::{Component, ComponentId, ComponentKind, NodeRecord};
use crate::compute;
use crate::error::GraphError;
use crate::node::{InitialInput, NodeBehaviour, NodeInit, NodeRegistry, NodeSetup};
use crate::plug::{Direction, PlugRecord, PlugSpec};
use crate::signal::{NodeSignals, PlugEvent, Signal};
use crate::value::Value;

/// A dataflow graph owning every component in a single arena.
///
/// All methods take `&self`; the graph is safe to share across threads behind
/// an `Arc`. Mutations acquire a write lock, compute the affected set, and
/// deliver signals synchronously on the calling thread after the lock is
/// released. Reads (`get_value`) never emit events.
pub struct Graph {
    pub(crate) state: RwLock<GraphState>,
    pub(crate) cache: ComputeCache,
    pub(crate) registry: NodeRegistry,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

/// A signal emission staged under the write lock, delivered after it.
pub(crate) type PendingEvent = (Signal, PlugEvent);

#[derive(Default)]
pub(crate) struct GraphState {
    pub(crate) components: Slab<Component>,
}

impl GraphState {
    pub(crate) fn get(&self, id: ComponentId) -> Result<&Component, GraphError> {
        self.components
            .get(id.0)
            .ok_or(GraphError::UnknownComponent(id))
    }

    pub(crate) fn get_mut(&mut self, id: ComponentId) -> Result<&mut Component, GraphError> {
        self.components
            .get_mut(id.0)
            .ok_or(GraphError::UnknownComponent(id))
    }

    pub(crate) fn plug_record(&self, id: ComponentId) -> Result<&PlugRecord, GraphError> {
        self.get(id)?
            .plug()
            .ok_or_else(|| GraphError::StructuralPolicy(format!("'{}' is not a plug", self.full_name(id))))
    }

    pub(crate) fn plug_record_mut(&mut self, id: ComponentId) -> Result<&mut PlugRecord, GraphError> {
        let path = self.full_name(id);
        self.get_mut(id)?
            .plug_mut()
            .ok_or(GraphError::StructuralPolicy(format!("'{}' is not a plug", path)))
    }

    /// Dot-separated path from the component's outermost ancestor.
    pub(crate) fn full_name(&self, id: ComponentId) -> String {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(c) = current {
            match self.components.get(c.0) {
                Some(component) => {
                    names.push(component.name.clone());
                    current = component.parent;
                }
                None => break,
            }
        }
        names.reverse();
        names.join(".")
    }

    pub(crate) fn child_by_name(&self, parent: ComponentId, name: &str) -> Option<ComponentId> {
        let component = self.components.get(parent.0)?;
        component
            .children
            .iter()
            .copied()
            .find(|&c| self.components.get(c.0).map(|cc| cc.name == name).unwrap_or(false))
    }

    /// The node a plug belongs to, if its parent is a node.
    pub(crate) fn owning_node(&self, plug: ComponentId) -> Option<ComponentId> {
        let parent = self.components.get(plug.0)?.parent?;
        self.components
            .get(parent.0)
            .filter(|c| c.node().is_some())
            .map(|_| parent)
    }

    /// Whether `ancestor` appears on `id`'s parent chain (inclusive of `id`).
    fn is_in_subtree(&self, id: ComponentId, ancestor: ComponentId) -> bool {
        let mut current = Some(id);
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            current = self.components.get(c.0).and_then(|component| component.parent);
        }
        false
    }

    /// The plugs immediately invalidated when `plug` changes: the owning
    /// node's affected outputs (for In plugs) plus downstream connections.
    fn direct_dependents(&self, plug: ComponentId) -> Vec<ComponentId> {
        let Some(component) = self.components.get(plug.0) else {
            return Vec::new();
        };
        let Some(record) = component.plug() else {
            return Vec::new();
        };
        let mut dependents = Vec::new();
        if record.direction == Direction::In {
            if let Some(node) = self.owning_node(plug) {
                if let Some(node_record) = self.components.get(node.0).and_then(Component::node) {
                    for output in node_record.behaviour.affects(&component.name) {
                        if let Some(affected) = self.child_by_name(node, &output) {
                            dependents.push(affected);
                        }
                    }
                }
            }
        }
        dependents.extend(record.outputs.iter().copied());
        dependents
    }

    /// One breadth-first dirty pass. Every visited plug's version is bumped;
    /// a plug already visited in this pass is not re-emitted. Returns the
    /// dirtied plugs with their new versions, in propagation order.
    fn dirty_pass(&mut self, seeds: Vec<ComponentId>) -> Vec<(ComponentId, u64)> {
        let mut queue: VecDeque<ComponentId> = seeds.into();
        let mut visited = AHashSet::new();
        let mut order = Vec::new();
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            let version = match self.plug_record_mut(id) {
                Ok(record) => {
                    record.version += 1;
                    record.version
                }
                Err(_) => continue,
            };
            trace!("dirtied '{}' (v{})", self.full_name(id), version);
            order.push((id, version));
            for dependent in self.direct_dependents(id) {
                if !visited.contains(&dependent) {
                    queue.push_back(dependent);
                }
            }
        }
        order
    }

    /// Stage a dirtied event for each plug that has an owning node.
    fn dirtied_events(&self, plugs: &[(ComponentId, u64)]) -> Vec<PendingEvent> {
        plugs
            .iter()
            .filter_map(|&(plug, _)| {
                let node = self.owning_node(plug)?;
                let signals = self.components.get(node.0)?.node()?.signals.clone();
                Some((
                    signals.dirtied,
                    PlugEvent {
                        plug,
                        path: self.full_name(plug),
                    },
                ))
            })
            .collect()
    }

    fn set_event(&self, plug: ComponentId) -> Option<PendingEvent> {
        let node = self.owning_node(plug)?;
        let signals = self.components.get(node.0)?.node()?.signals.clone();
        Some((
            signals.set,
            PlugEvent {
                plug,
                path: self.full_name(plug),
            },
        ))
    }

    /// Pick a name unique among `parent`'s children, appending a numeric
    /// suffix on collision. `skip` excludes a child from the collision check
    /// (the component being renamed or reparented).
    fn dedupe_name(&self, parent: ComponentId, base: &str, skip: Option<ComponentId>) -> String {
        let taken = |name: &str| {
            self.components
                .get(parent.0)
                .map(|p| {
                    p.children
                        .iter()
                        .filter(|&&c| Some(c) != skip)
                        .any(|&c| {
                            self.components
                                .get(c.0)
                                .map(|cc| cc.name == name)
                                .unwrap_or(false)
                        })
                })
                .unwrap_or(false)
        };
        if !taken(base) {
            return base.to_string();
        }
        let mut n = 1;
        loop {
            let candidate = format!("{}{}", base, n);
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

impl Graph {
    /// An empty graph with the built-in node types registered.
    pub fn new() -> Self {
        let graph = Self {
            state: RwLock::new(GraphState::default()),
            cache: ComputeCache::default(),
            registry: NodeRegistry::default(),
        };
        crate::nodes::register_builtins(&graph.registry);
        graph
    }

    /// Register a node type for script execution.
    ///
    /// The factory is invoked once immediately to learn the type name.
    pub fn register_node_type<F>(&self, factory: F)
    where
        F: Fn() -> Arc<dyn NodeBehaviour> + Send + Sync + 'static,
    {
        let type_name = factory().type_name();
        self.registry.register(type_name, Arc::new(factory));
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Add a bare named container component with no graph semantics.
    pub fn add_component(&self, name: impl Into<String>) -> ComponentId {
        let mut state = self.state.write();
        let entry = state.components.insert(Component::new(name, ComponentKind::Plain));
        ComponentId(entry)
    }

    /// Add an unparented node with its static plugs, using the default name.
    pub fn add_node(&self, behaviour: impl NodeBehaviour) -> Result<ComponentId, GraphError> {
        self.add_node_with(behaviour, NodeInit::new())
    }

    /// Add an unparented node with extended construction arguments: a name
    /// and initial plug values or connections.
    ///
    /// A reference to a plug the node does not have, or a type-mismatched
    /// literal, fails with [`GraphError::ConstructionArgument`].
    pub fn add_node_with(
        &self,
        behaviour: impl NodeBehaviour,
        init: NodeInit,
    ) -> Result<ComponentId, GraphError> {
        self.insert_node(Arc::new(behaviour), init, false)
    }

    /// Add a script root: a node that anchors serialization and refuses to be
    /// parented anywhere.
    pub fn add_script(&self) -> Result<ComponentId, GraphError> {
        self.insert_node(Arc::new(crate::script::ScriptRoot), NodeInit::new(), true)
    }

    pub(crate) fn insert_node(
        &self,
        behaviour: Arc<dyn NodeBehaviour>,
        init: NodeInit,
        is_script: bool,
    ) -> Result<ComponentId, GraphError> {
        let mut setup = NodeSetup::default();
        behaviour.setup(&mut setup)?;
        for (i, spec) in setup.plugs.iter().enumerate() {
            if setup.plugs[..i].iter().any(|other| other.name == spec.name) {
                return Err(GraphError::ConstructionArgument(format!(
                    "node '{}' declares plug '{}' twice",
                    behaviour.type_name(),
                    spec.name
                )));
            }
        }

        let name = init.name.clone().unwrap_or_else(|| behaviour.type_name().to_string());
        let node = {
            let mut state = self.state.write();
            let record = NodeRecord {
                behaviour: behaviour.clone(),
                signals: NodeSignals::default(),
                is_script,
            };
            let node = ComponentId(
                state
                    .components
                    .insert(Component::new(name, ComponentKind::Node(record))),
            );
            for spec in &setup.plugs {
                let plug = ComponentId(
                    state
                        .components
                        .insert(Component::new(spec.name.clone(), ComponentKind::Plug(PlugRecord::new(spec)))),
                );
                state.components[plug.0].parent = Some(node);
                state.components[node.0].children.push(plug);
            }
            node
        };
        debug!("added node '{}' ({})", behaviour.type_name(), node.0);

        for (plug_name, input) in init.inputs {
            let plug = self.plug(node, &plug_name).map_err(|_| {
                GraphError::ConstructionArgument(format!(
                    "node '{}' has no plug named '{}'",
                    behaviour.type_name(),
                    plug_name
                ))
            })?;
            match input {
                InitialInput::Value(value) => self.set_value(plug, value).map_err(|e| {
                    GraphError::ConstructionArgument(format!(
                        "initial value for plug '{}' rejected: {}",
                        plug_name, e
                    ))
                })?,
                InitialInput::Connection(source) => {
                    self.set_input(plug, Some(source)).map_err(|e| {
                        GraphError::ConstructionArgument(format!(
                            "initial connection for plug '{}' rejected: {}",
                            plug_name, e
                        ))
                    })?
                }
            }
        }
        Ok(node)
    }

    /// Add a plug to a node at runtime (a dynamic plug, typically).
    pub fn add_plug(&self, node: ComponentId, spec: PlugSpec) -> Result<ComponentId, GraphError> {
        let mut state = self.state.write();
        if state.get(node)?.node().is_none() {
            let path = state.full_name(node);
            return Err(GraphError::StructuralPolicy(format!(
                "'{}' is not a node",
                path
            )));
        }
        let name = state.dedupe_name(node, &spec.name, None);
        let plug = ComponentId(
            state
                .components
                .insert(Component::new(name, ComponentKind::Plug(PlugRecord::new(&spec)))),
        );
        state.components[plug.0].parent = Some(node);
        state.components[node.0].children.push(plug);
        Ok(plug)
    }

    // ------------------------------------------------------------------
    // Hierarchy
    // ------------------------------------------------------------------

    /// Structural policy check: may `child` be parented under `parent`?
    pub fn accepts_child(&self, parent: ComponentId, child: ComponentId) -> bool {
        let behaviour = {
            let state = self.state.read();
            if state.get(child).is_err() {
                return false;
            }
            match state.get(parent) {
                Err(_) => return false,
                Ok(component) => match &component.kind {
                    ComponentKind::Plain => return true,
                    ComponentKind::Plug(_) => return false,
                    ComponentKind::Node(record) => record.behaviour.clone(),
                },
            }
        };
        behaviour.accepts_child(self, parent, child)
    }

    /// Structural policy check: may `child` accept `parent` as its parent?
    pub fn accepts_parent(&self, child: ComponentId, parent: ComponentId) -> bool {
        let behaviour = {
            let state = self.state.read();
            if state.get(parent).is_err() {
                return false;
            }
            match state.get(child) {
                Err(_) => return false,
                Ok(component) => match &component.kind {
                    ComponentKind::Plain => return true,
                    ComponentKind::Plug(_) => {
                        return state.get(parent).map(|p| p.node().is_some()).unwrap_or(false)
                    }
                    ComponentKind::Node(record) => record.behaviour.clone(),
                },
            }
        };
        behaviour.accepts_parent(self, child, parent)
    }

    /// Parent `child` under `parent`, detaching it from any previous parent
    /// first and de-duplicating its name among the new siblings.
    ///
    /// Fails with [`GraphError::StructuralPolicy`] when either side's policy
    /// refuses the relationship.
    pub fn add_child(&self, parent: ComponentId, child: ComponentId) -> Result<(), GraphError> {
        if parent == child {
            return Err(GraphError::StructuralPolicy(
                "a component cannot be its own parent".to_string(),
            ));
        }
        if !self.accepts_child(parent, child) {
            let state = self.state.read();
            return Err(GraphError::StructuralPolicy(format!(
                "'{}' does not accept '{}' as a child",
                state.full_name(parent),
                state.full_name(child)
            )));
        }
        if !self.accepts_parent(child, parent) {
            let state = self.state.read();
            return Err(GraphError::StructuralPolicy(format!(
                "'{}' does not accept '{}' as a parent",
                state.full_name(child),
                state.full_name(parent)
            )));
        }

        let mut state = self.state.write();
        state.get(parent)?;
        state.get(child)?;
        if state.is_in_subtree(parent, child) {
            return Err(GraphError::StructuralPolicy(format!(
                "'{}' is a descendant of '{}'",
                state.full_name(parent),
                state.full_name(child)
            )));
        }
        if let Some(old_parent) = state.get(child)?.parent {
            let children = &mut state.get_mut(old_parent)?.children;
            children.retain(|&c| c != child);
        }
        let name = state.dedupe_name(parent, &state.get(child)?.name.clone(), Some(child));
        let component = state.get_mut(child)?;
        component.name = name;
        component.parent = Some(parent);
        state.get_mut(parent)?.children.push(child);
        Ok(())
    }

    /// Detach `child` from `parent` unconditionally, severing every
    /// connection that crosses the removed subtree's boundary in either
    /// direction. No dangling plug references survive.
    pub fn remove_child(&self, parent: ComponentId, child: ComponentId) -> Result<(), GraphError> {
        let events = {
            let mut state = self.state.write();
            if state.get(child)?.parent != Some(parent) {
                return Err(GraphError::StructuralPolicy(format!(
                    "'{}' is not a child of '{}'",
                    state.full_name(child),
                    state.full_name(parent)
                )));
            }
            state.get_mut(parent)?.children.retain(|&c| c != child);
            state.get_mut(child)?.parent = None;

            // Collect every plug inside the detached subtree.
            let mut subtree_plugs = Vec::new();
            let mut stack = vec![child];
            while let Some(id) = stack.pop() {
                if let Ok(component) = state.get(id) {
                    if component.plug().is_some() {
                        subtree_plugs.push(id);
                    }
                    stack.extend(component.children.iter().copied());
                }
            }

            let mut severed = Vec::new();
            for &plug in &subtree_plugs {
                // Inbound: an input from outside the subtree.
                let input = state.plug_record(plug)?.input;
                if let Some(source) = input {
                    if !state.is_in_subtree(source, child) {
                        if let Ok(record) = state.plug_record_mut(source) {
                            record.outputs.retain(|&o| o != plug);
                        }
                        state.plug_record_mut(plug)?.input = None;
                        severed.push(plug);
                    }
                }
                // Outbound: downstream plugs outside the subtree.
                let outputs = state.plug_record(plug)?.outputs.clone();
                for downstream in outputs {
                    if !state.is_in_subtree(downstream, child) {
                        state.plug_record_mut(plug)?.outputs.retain(|&o| o != downstream);
                        if let Ok(record) = state.plug_record_mut(downstream) {
                            record.input = None;
                        }
                        severed.push(downstream);
                    }
                }
            }
            debug!(
                "detached '{}', severed {} connections",
                state.full_name(child),
                severed.len()
            );
            let dirtied = state.dirty_pass(severed);
            self.prune_cache(&dirtied);
            state.dirtied_events(&dirtied)
        };
        self.deliver(events);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// The component's name.
    pub fn name(&self, id: ComponentId) -> Result<String, GraphError> {
        Ok(self.state.read().get(id)?.name.clone())
    }

    /// Rename a component, de-duplicating among siblings. Returns the name
    /// actually assigned.
    pub fn set_name(&self, id: ComponentId, name: impl Into<String>) -> Result<String, GraphError> {
        let mut state = self.state.write();
        let parent = state.get(id)?.parent;
        let name = match parent {
            Some(parent) => state.dedupe_name(parent, &name.into(), Some(id)),
            None => name.into(),
        };
        state.get_mut(id)?.name = name.clone();
        Ok(name)
    }

    /// Dot-separated path from the component's outermost ancestor.
    pub fn full_name(&self, id: ComponentId) -> Result<String, GraphError> {
        let state = self.state.read();
        state.get(id)?;
        Ok(state.full_name(id))
    }

    /// The component's parent, if any.
    pub fn parent(&self, id: ComponentId) -> Option<ComponentId> {
        self.state.read().components.get(id.0)?.parent
    }

    /// The component's children, in insertion order.
    pub fn children(&self, id: ComponentId) -> Vec<ComponentId> {
        self.state
            .read()
            .components
            .get(id.0)
            .map(|c| c.children.clone())
            .unwrap_or_default()
    }

    /// A direct child by name.
    pub fn child(&self, id: ComponentId, name: &str) -> Option<ComponentId> {
        self.state.read().child_by_name(id, name)
    }

    /// A plug of `node` by name.
    pub fn plug(&self, node: ComponentId, name: &str) -> Result<ComponentId, GraphError> {
        let state = self.state.read();
        state
            .child_by_name(node, name)
            .filter(|&c| state.get(c).map(|cc| cc.plug().is_some()).unwrap_or(false))
            .ok_or_else(|| GraphError::NoSuchPlug {
                node: state.full_name(node),
                name: name.to_string(),
            })
    }

    /// True if `id` is a live node.
    pub fn is_node(&self, id: ComponentId) -> bool {
        self.state
            .read()
            .components
            .get(id.0)
            .map(|c| c.node().is_some())
            .unwrap_or(false)
    }

    /// True if `id` is a live plug.
    pub fn is_plug(&self, id: ComponentId) -> bool {
        self.state
            .read()
            .components
            .get(id.0)
            .map(|c| c.plug().is_some())
            .unwrap_or(false)
    }

    /// The node's behaviour type name.
    pub fn node_type_name(&self, node: ComponentId) -> Option<&'static str> {
        self.state
            .read()
            .components
            .get(node.0)?
            .node()
            .map(|record| record.behaviour.type_name())
    }

    /// The node a plug belongs to.
    pub fn plug_node(&self, plug: ComponentId) -> Option<ComponentId> {
        self.state.read().owning_node(plug)
    }

    /// The nearest enclosing script root, starting from `id` itself.
    pub fn script_node(&self, id: ComponentId) -> Option<ComponentId> {
        let state = self.state.read();
        let mut current = Some(id);
        while let Some(c) = current {
            let component = state.components.get(c.0)?;
            if component.node().map(|record| record.is_script).unwrap_or(false) {
                return Some(c);
            }
            current = component.parent;
        }
        None
    }

    /// True if `id` is a script root.
    pub fn is_script(&self, id: ComponentId) -> bool {
        self.state
            .read()
            .components
            .get(id.0)
            .and_then(Component::node)
            .map(|record| record.is_script)
            .unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // Plug access
    // ------------------------------------------------------------------

    /// The plug's direction.
    pub fn direction(&self, plug: ComponentId) -> Result<Direction, GraphError> {
        Ok(self.state.read().plug_record(plug)?.direction)
    }

    /// The plug's flags.
    pub fn flags(&self, plug: ComponentId) -> Result<crate::plug::PlugFlags, GraphError> {
        Ok(self.state.read().plug_record(plug)?.flags)
    }

    /// The plug's default value.
    pub fn default_value(&self, plug: ComponentId) -> Result<Value, GraphError> {
        Ok(self.state.read().plug_record(plug)?.default.clone())
    }

    /// The plug's upstream connection, if any.
    pub fn input(&self, plug: ComponentId) -> Result<Option<ComponentId>, GraphError> {
        Ok(self.state.read().plug_record(plug)?.input)
    }

    /// The node's value-set signal.
    pub fn plug_set_signal(&self, node: ComponentId) -> Result<Signal, GraphError> {
        let state = self.state.read();
        let path = state.full_name(node);
        state
            .get(node)?
            .node()
            .map(|record| record.signals.set.clone())
            .ok_or(GraphError::StructuralPolicy(format!("'{}' is not a node", path)))
    }

    /// The node's dirtied signal.
    pub fn plug_dirtied_signal(&self, node: ComponentId) -> Result<Signal, GraphError> {
        let state = self.state.read();
        let path = state.full_name(node);
        state
            .get(node)?
            .node()
            .map(|record| record.signals.dirtied.clone())
            .ok_or(GraphError::StructuralPolicy(format!("'{}' is not a node", path)))
    }

    // ------------------------------------------------------------------
    // Values and connections
    // ------------------------------------------------------------------

    /// Store a literal value on an unconnected In-plug.
    ///
    /// Emits exactly one set event for the plug, then one dirtied event per
    /// transitive dependent, synchronously on this thread. Rejected on Out
    /// plugs, connected plugs, and type mismatches.
    pub fn set_value(&self, plug: ComponentId, value: Value) -> Result<(), GraphError> {
        let events = {
            let mut state = self.state.write();
            let path = state.full_name(plug);
            let record = state.plug_record(plug)?;
            if record.direction == Direction::Out {
                return Err(GraphError::StructuralPolicy(format!(
                    "cannot set a value on output plug '{}'",
                    path
                )));
            }
            if record.input.is_some() {
                return Err(GraphError::StructuralPolicy(format!(
                    "plug '{}' has an input connection; values are pulled, not set",
                    path
                )));
            }
            if !record.default.same_type(&value) {
                return Err(GraphError::StructuralPolicy(format!(
                    "plug '{}' holds {} values, not {}",
                    path,
                    record.default.type_name(),
                    value.type_name()
                )));
            }
            state.plug_record_mut(plug)?.value = Some(value);
            trace!("set '{}'", path);

            let seeds = state.direct_dependents(plug);
            let dirtied = state.dirty_pass(seeds);
            self.prune_cache(&dirtied);

            let mut events = Vec::new();
            events.extend(state.set_event(plug));
            events.extend(state.dirtied_events(&dirtied));
            events
        };
        self.deliver(events);
        Ok(())
    }

    /// Connection policy check: type compatibility plus the owning node's
    /// `accepts_input` policy.
    pub fn accepts_input(&self, plug: ComponentId, source: ComponentId) -> bool {
        let behaviour = {
            let state = self.state.read();
            let (Ok(record), Ok(source_record)) =
                (state.plug_record(plug), state.plug_record(source))
            else {
                return false;
            };
            if !record.default.same_type(&source_record.default) {
                return false;
            }
            match state.owning_node(plug) {
                None => return true,
                Some(node) => match state.components.get(node.0).and_then(Component::node) {
                    None => return true,
                    Some(node_record) => node_record.behaviour.clone(),
                },
            }
        };
        behaviour.accepts_input(self, plug, source)
    }

    /// Connect or disconnect a plug's input.
    ///
    /// Connecting emits dirtied events for the plug and its transitive
    /// dependents and never transfers a value; the value is pulled on the
    /// next read. Disconnecting stores the last pulled value as the plug's
    /// own value, emitting exactly one set event plus dirtied events for
    /// downstream dependents.
    pub fn set_input(
        &self,
        plug: ComponentId,
        source: Option<ComponentId>,
    ) -> Result<(), GraphError> {
        match source {
            Some(source) => self.connect(plug, source),
            None => self.disconnect(plug),
        }
    }

    fn connect(&self, plug: ComponentId, source: ComponentId) -> Result<(), GraphError> {
        {
            let state = self.state.read();
            let path = state.full_name(plug);
            let record = state.plug_record(plug)?;
            state.plug_record(source)?;
            if record.direction == Direction::Out {
                return Err(GraphError::StructuralPolicy(format!(
                    "output plug '{}' cannot take an input",
                    path
                )));
            }
            if plug == source {
                return Err(GraphError::StructuralPolicy(format!(
                    "plug '{}' cannot be its own input",
                    path
                )));
            }
        }
        if !self.accepts_input(plug, source) {
            let state = self.state.read();
            return Err(GraphError::StructuralPolicy(format!(
                "plug '{}' does not accept input '{}'",
                state.full_name(plug),
                state.full_name(source)
            )));
        }

        let events = {
            let mut state = self.state.write();
            if let Some(previous) = state.plug_record(plug)?.input {
                if let Ok(record) = state.plug_record_mut(previous) {
                    record.outputs.retain(|&o| o != plug);
                }
            }
            state.plug_record_mut(plug)?.input = Some(source);
            state.plug_record_mut(source)?.outputs.push(plug);
            debug!(
                "connected '{}' <- '{}'",
                state.full_name(plug),
                state.full_name(source)
            );

            let dirtied = state.dirty_pass(vec![plug]);
            self.prune_cache(&dirtied);
            state.dirtied_events(&dirtied)
        };
        self.deliver(events);
        Ok(())
    }

    fn disconnect(&self, plug: ComponentId) -> Result<(), GraphError> {
        let connected = self.state.read().plug_record(plug)?.input.is_some();
        if !connected {
            return Ok(());
        }
        // Pull through the live connection before severing it, so the last
        // computed value becomes the plug's own stored value.
        let pulled = self.get_value(plug)?;

        let events = {
            let mut state = self.state.write();
            let Some(source) = state.plug_record(plug)?.input else {
                return Ok(());
            };
            if let Ok(record) = state.plug_record_mut(source) {
                record.outputs.retain(|&o| o != plug);
            }
            let record = state.plug_record_mut(plug)?;
            record.input = None;
            record.value = Some(pulled);
            debug!("disconnected '{}'", state.full_name(plug));

            let seeds = state.direct_dependents(plug);
            let dirtied = state.dirty_pass(seeds);
            self.prune_cache(&dirtied);

            let mut events = Vec::new();
            events.extend(state.set_event(plug));
            events.extend(state.dirtied_events(&dirtied));
            events
        };
        self.deliver(events);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Event delivery
    // ------------------------------------------------------------------

    pub(crate) fn prune_cache(&self, dirtied: &[(ComponentId, u64)]) {
        for &(plug, version) in dirtied {
            self.cache.prune_stale(plug, version);
        }
    }

    /// Deliver staged events synchronously, unless this thread is inside a
    /// compute (mutations performed by a compute emit nothing).
    pub(crate) fn deliver(&self, events: Vec<PendingEvent>) {
        if compute::signals_suppressed() {
            return;
        }
        for (signal, event) in events {
            signal.emit(&event);
        }
    }
}
