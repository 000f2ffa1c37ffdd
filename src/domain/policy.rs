//! Collaborator hooks consulted by collection checks
//!
//! Concrete node types decide what a node's identity is, where a
//! reference points, and which kinds a collection accepts. The arena only
//! asks; it never depends on concrete node types directly.

use std::fmt;

use crate::config::Settings;
use crate::domain::arena::{NodeArena, NodeId};
use crate::domain::entities::{NameCase, NodeKind, ScopedName};

/// Whether a candidate may be placed in a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Allowed,
    NotSupported,
    TopLevelNotAllowed,
}

pub trait NodePolicy: fmt::Debug {
    /// Identity that must not collide with a sibling's, if any.
    fn identity(&self, arena: &NodeArena, node: NodeId) -> Option<ScopedName>;

    /// Node a reference-type node points at, if it resolves.
    fn resolve_target(&self, arena: &NodeArena, node: NodeId) -> Option<NodeId>;

    fn placement(&self, arena: &NodeArena, collection: NodeId, candidate: NodeId) -> Placement;
}

/// Policy for the built-in structural kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultPolicy {
    pub page_names: NameCase,
    pub group_names: NameCase,
}

impl Default for DefaultPolicy {
    fn default() -> Self {
        Self {
            page_names: NameCase::Insensitive,
            group_names: NameCase::Sensitive,
        }
    }
}

impl DefaultPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            page_names: NameCase::from_insensitive(settings.naming.page_names_case_insensitive),
            group_names: NameCase::from_insensitive(settings.naming.group_names_case_insensitive),
        }
    }
}

impl NodePolicy for DefaultPolicy {
    fn identity(&self, arena: &NodeArena, node: NodeId) -> Option<ScopedName> {
        let case = match arena.kind(node).ok()? {
            NodeKind::Page => self.page_names,
            NodeKind::Group => self.group_names,
            _ => return None,
        };
        let name = arena.name(node).ok().flatten()?;
        Some(ScopedName::new(name, case))
    }

    fn resolve_target(&self, arena: &NodeArena, node: NodeId) -> Option<NodeId> {
        match arena.kind(node).ok()? {
            NodeKind::Reference => arena.target(node).ok().flatten(),
            _ => None,
        }
    }

    fn placement(&self, arena: &NodeArena, collection: NodeId, candidate: NodeId) -> Placement {
        let (Ok(container), Ok(item)) = (arena.kind(collection), arena.kind(candidate)) else {
            return Placement::NotSupported;
        };
        match (container, item) {
            (NodeKind::Document, NodeKind::Page) => Placement::Allowed,
            (NodeKind::Page, NodeKind::Step) => Placement::Allowed,
            (NodeKind::Page, NodeKind::Element | NodeKind::Group | NodeKind::Reference) => {
                Placement::TopLevelNotAllowed
            }
            (
                NodeKind::Step | NodeKind::Group,
                NodeKind::Element | NodeKind::Group | NodeKind::Reference,
            ) => Placement::Allowed,
            _ => Placement::NotSupported,
        }
    }
}
