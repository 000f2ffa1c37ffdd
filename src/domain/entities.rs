//! Domain entities: node kinds and per-node payload

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::arena::NodeId;

/// Structural role of a node in a model document.
///
/// Drawable content lives in `Element` leaves; the other kinds define the
/// scopes (document, page, step, group) that collections and name checks
/// are organized around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Document,
    Page,
    Step,
    Group,
    Element,
    Reference,
}

impl NodeKind {
    /// Whether nodes of this kind own an ordered collection of children.
    pub fn is_collection(self) -> bool {
        matches!(
            self,
            NodeKind::Document | NodeKind::Page | NodeKind::Step | NodeKind::Group
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Document => "document",
            NodeKind::Page => "page",
            NodeKind::Step => "step",
            NodeKind::Group => "group",
            NodeKind::Element => "element",
            NodeKind::Reference => "reference",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case rule of a naming scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameCase {
    Sensitive,
    Insensitive,
}

impl NameCase {
    pub fn from_insensitive(insensitive: bool) -> Self {
        if insensitive {
            NameCase::Insensitive
        } else {
            NameCase::Sensitive
        }
    }
}

/// A name together with the case rule of the scope it must be unique in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedName {
    pub name: String,
    pub case: NameCase,
}

impl ScopedName {
    pub fn new(name: impl Into<String>, case: NameCase) -> Self {
        Self {
            name: name.into(),
            case,
        }
    }

    /// Compares using the case rule of `self`.
    pub fn collides_with(&self, other: &ScopedName) -> bool {
        match self.case {
            NameCase::Sensitive => self.name == other.name,
            NameCase::Insensitive => self.name.to_lowercase() == other.name.to_lowercase(),
        }
    }
}

/// Mutable payload carried by every node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeData {
    /// Optional identity used by uniqueness scopes
    pub name: Option<String>,
    /// Free-form properties owned by concrete node types
    pub properties: BTreeMap<String, String>,
    /// Reference target (weak, lookup-only)
    pub target: Option<NodeId>,
}

impl NodeData {
    /// Drop everything the node holds on to.
    pub(crate) fn release(&mut self) {
        self.properties.clear();
        self.target = None;
    }
}
