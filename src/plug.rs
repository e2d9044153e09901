//! Plug metadata: direction, flags, and creation specs.

use serde::{Deserialize, Serialize};

use crate::component::ComponentId;
use crate::value::Value;

/// Whether a plug consumes or produces a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// The plug receives a value, either stored directly or pulled through an
    /// input connection.
    In,
    /// The plug's value is always derived by its node's compute routine and
    /// never set directly by external callers.
    Out,
}

/// Per-plug metadata flags.
///
/// `PlugFlags::default()` is the ordinary static plug: not dynamic,
/// serializable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlugFlags {
    /// Dynamic plugs are created at runtime rather than by a node's setup
    /// routine; serialization reconstructs them structurally, defaults and
    /// current values included.
    pub dynamic: bool,
    /// Whether serialization records this plug's current value.
    pub serializable: bool,
}

impl Default for PlugFlags {
    fn default() -> Self {
        Self {
            dynamic: false,
            serializable: true,
        }
    }
}

/// A description of a plug to create, used by node setup routines and by
/// dynamic plug creation.
#[derive(Debug, Clone)]
pub struct PlugSpec {
    /// The plug's name.
    pub name: String,
    /// The plug's direction.
    pub direction: Direction,
    /// The plug's flags.
    pub flags: PlugFlags,
    /// The default value; fixes the plug's type.
    pub default: Value,
}

impl PlugSpec {
    /// An In-direction plug with default flags.
    pub fn input(name: impl Into<String>, default: Value) -> Self {
        Self {
            name: name.into(),
            direction: Direction::In,
            flags: PlugFlags::default(),
            default,
        }
    }

    /// An Out-direction plug with default flags.
    pub fn output(name: impl Into<String>, default: Value) -> Self {
        Self {
            name: name.into(),
            direction: Direction::Out,
            flags: PlugFlags::default(),
            default,
        }
    }

    /// Marks the plug as dynamic.
    pub fn with_dynamic(mut self) -> Self {
        self.flags.dynamic = true;
        self
    }

    /// Overrides the plug's flags.
    pub fn with_flags(mut self, flags: PlugFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Internal per-plug state.
#[derive(Debug)]
pub(crate) struct PlugRecord {
    pub(crate) direction: Direction,
    pub(crate) flags: PlugFlags,
    pub(crate) default: Value,
    /// Stored value; `None` means the default applies.
    pub(crate) value: Option<Value>,
    /// The sole upstream connection.
    pub(crate) input: Option<ComponentId>,
    /// Downstream plugs whose `input` is this plug.
    pub(crate) outputs: Vec<ComponentId>,
    /// Bumped every time this plug is dirtied; cache entries for older
    /// versions are stale.
    pub(crate) version: u64,
}

impl PlugRecord {
    pub(crate) fn new(spec: &PlugSpec) -> Self {
        Self {
            direction: spec.direction,
            flags: spec.flags,
            default: spec.default.clone(),
            value: None,
            input: None,
            outputs: Vec::new(),
            version: 0,
        }
    }

    /// The stored value, falling back to the default.
    pub(crate) fn effective_value(&self) -> Value {
        self.value.clone().unwrap_or_else(|| self.default.clone())
    }
}
