use std::fmt;

use generational_arena::{Arena, Index};
use tracing::{debug, instrument};

use crate::config::Settings;
use crate::domain::entities::{NodeData, NodeKind};
use crate::domain::error::{DomainError, NodeResult, StructuralReason};
use crate::domain::events::{Change, ListenerRegistry};
use crate::domain::policy::{DefaultPolicy, NodePolicy};
use crate::domain::state::{NodeState, OpKind};
use crate::domain::transaction::UpdateScope;

/// Stable handle of a node in a [`NodeArena`].
///
/// Handles are generational: once a node is disposed its slot may be
/// reused, but the old handle never resolves again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) Index);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (slot, generation) = self.0.into_raw_parts();
        write!(f, "#{}v{}", slot, generation)
    }
}

/// Description of a node to be created.
#[derive(Debug, Clone)]
pub struct NewNode {
    pub kind: NodeKind,
    pub data: NodeData,
    pub immutable: bool,
}

impl NewNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            data: NodeData::default(),
            immutable: false,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.data.name = Some(name.into());
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.properties.insert(key.into(), value.into());
        self
    }

    pub fn target(mut self, target: NodeId) -> Self {
        self.data.target = Some(target);
        self
    }

    /// Immutability is fixed here and can never be changed afterwards.
    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }
}

impl From<NodeKind> for NewNode {
    fn from(kind: NodeKind) -> Self {
        Self::new(kind)
    }
}

/// Arena slot of a live node.
#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) data: NodeData,
    /// Owning collection, None for roots. Weak: the owner's `items` holds the edge.
    pub(crate) owner: Option<NodeId>,
    /// Strong edges to children, Some only for collection kinds
    pub(crate) items: Option<Vec<NodeId>>,
    pub(crate) state: NodeState,
    /// Update transaction; only consulted while this node is a root
    pub(crate) update: UpdateScope,
}

/// Arena-based document tree.
///
/// Every node of every tree lives here; a node without an owner is the
/// root of its own tree. The owning collection is the only strong edge,
/// all other relations (parent, containing page/step/document, reference
/// targets) are lookups computed from it.
#[derive(Debug)]
pub struct NodeArena {
    pub(crate) nodes: Arena<Node>,
    pub(crate) policy: Box<dyn NodePolicy>,
    pub(crate) listeners: ListenerRegistry,
    pub(crate) trace_dispatch: bool,
}

impl Default for NodeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeArena {
    pub fn new() -> Self {
        Self::with_policy(DefaultPolicy::default())
    }

    pub fn with_policy(policy: impl NodePolicy + 'static) -> Self {
        Self {
            nodes: Arena::new(),
            policy: Box::new(policy),
            listeners: ListenerRegistry::default(),
            trace_dispatch: false,
        }
    }

    /// Arena configured from naming and event settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut arena = Self::with_policy(DefaultPolicy::from_settings(settings));
        arena.trace_dispatch = settings.events.trace_dispatch;
        arena
    }

    /// Create a detached node; it is the root of its own tree until inserted.
    #[instrument(level = "trace", skip(self, node))]
    pub fn create(&mut self, node: impl Into<NewNode>) -> NodeId {
        let NewNode {
            kind,
            data,
            immutable,
        } = node.into();
        let slot = Node {
            kind,
            data,
            owner: None,
            items: kind.is_collection().then(Vec::new),
            state: NodeState::new(immutable),
            update: UpdateScope::default(),
        };
        let id = NodeId(self.nodes.insert(slot));
        debug!("created {} {}", kind, id);
        id
    }

    /// Number of live nodes across all trees.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    pub(crate) fn live(&self, id: NodeId) -> NodeResult<&Node> {
        self.node(id).ok_or(DomainError::Disposed(id))
    }

    pub(crate) fn live_mut(&mut self, id: NodeId) -> NodeResult<&mut Node> {
        self.node_mut(id).ok_or(DomainError::Disposed(id))
    }

    pub(crate) fn owner_of(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|node| node.owner)
    }

    /// Walks the owner chain to the top. A disposed handle is its own root.
    pub(crate) fn root_of(&self, id: NodeId) -> NodeId {
        self.self_and_ancestors(id).last().unwrap_or(id)
    }

    /// Check `op` against the node's state and turn a rejection into an error.
    pub(crate) fn ensure(&self, id: NodeId, op: OpKind) -> NodeResult<()> {
        self.check_mutable(id, op).map_err(|rejection| rejection.at(id))
    }

    /// Owner chain above `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            arena: self,
            next: self.owner_of(id),
        }
    }

    /// `id` followed by its owner chain; empty for a disposed handle.
    pub fn self_and_ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            arena: self,
            next: self.node(id).map(|_| id),
        }
    }

    /// Pre-order walk of the subtree rooted at `id`, `id` included.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        Descendants::new(self, id)
    }

    pub fn kind(&self, id: NodeId) -> NodeResult<NodeKind> {
        Ok(self.live(id)?.kind)
    }

    pub fn parent(&self, id: NodeId) -> NodeResult<Option<NodeId>> {
        Ok(self.live(id)?.owner)
    }

    pub fn root(&self, id: NodeId) -> NodeResult<NodeId> {
        self.live(id)?;
        Ok(self.root_of(id))
    }

    pub fn name(&self, id: NodeId) -> NodeResult<Option<&str>> {
        Ok(self.live(id)?.data.name.as_deref())
    }

    pub fn property(&self, id: NodeId, key: &str) -> NodeResult<Option<&str>> {
        Ok(self.live(id)?.data.properties.get(key).map(String::as_str))
    }

    /// Reference target, if set and still alive.
    pub fn target(&self, id: NodeId) -> NodeResult<Option<NodeId>> {
        Ok(self
            .live(id)?
            .data
            .target
            .filter(|target| self.nodes.contains(target.0)))
    }

    pub fn containing_document(&self, id: NodeId) -> NodeResult<Option<NodeId>> {
        self.containing(id, NodeKind::Document)
    }

    pub fn containing_page(&self, id: NodeId) -> NodeResult<Option<NodeId>> {
        self.containing(id, NodeKind::Page)
    }

    pub fn containing_step(&self, id: NodeId) -> NodeResult<Option<NodeId>> {
        self.containing(id, NodeKind::Step)
    }

    fn containing(&self, id: NodeId, kind: NodeKind) -> NodeResult<Option<NodeId>> {
        self.live(id)?;
        Ok(self
            .ancestors(id)
            .find(|&ancestor| self.node(ancestor).is_some_and(|node| node.kind == kind)))
    }

    /// Height of the subtree rooted at `id` (a leaf has depth 1).
    #[instrument(level = "debug", skip(self))]
    pub fn depth(&self, id: NodeId) -> NodeResult<usize> {
        self.live(id)?;
        Ok(self.calculate_depth(id))
    }

    fn calculate_depth(&self, id: NodeId) -> usize {
        match self.node(id) {
            Some(node) => {
                1 + node
                    .items
                    .iter()
                    .flatten()
                    .map(|&child| self.calculate_depth(child))
                    .max()
                    .unwrap_or(0)
            }
            None => 0,
        }
    }

    #[instrument(level = "trace", skip(self))]
    pub fn set_name(&mut self, id: NodeId, name: Option<String>) -> NodeResult<()> {
        self.ensure(id, OpKind::Write)?;
        let node = self.live_mut(id)?;
        if node.data.name == name {
            return Ok(());
        }
        let old = std::mem::replace(&mut node.data.name, name.clone());
        self.raise(id, Change::NameChanged { old, new: name });
        Ok(())
    }

    #[instrument(level = "trace", skip(self))]
    pub fn set_property(
        &mut self,
        id: NodeId,
        key: &str,
        value: Option<String>,
    ) -> NodeResult<()> {
        self.ensure(id, OpKind::Write)?;
        let properties = &mut self.live_mut(id)?.data.properties;
        if properties.get(key) == value.as_ref() {
            return Ok(());
        }
        let old = match &value {
            Some(value) => properties.insert(key.to_string(), value.clone()),
            None => properties.remove(key),
        };
        self.raise(
            id,
            Change::PropertyChanged {
                key: key.to_string(),
                old,
                new: value,
            },
        );
        Ok(())
    }

    /// Point a reference at `target`.
    ///
    /// When the reference already sits in a collection the new target must
    /// not (logically) contain that collection.
    #[instrument(level = "trace", skip(self))]
    pub fn set_target(&mut self, id: NodeId, target: Option<NodeId>) -> NodeResult<()> {
        self.ensure(id, OpKind::Write)?;
        let node = self.live(id)?;
        if node.kind != NodeKind::Reference {
            return Err(DomainError::structural(id, StructuralReason::NotSupported));
        }
        if node.data.target == target {
            return Ok(());
        }
        if let Some(target) = target {
            self.ensure(target, OpKind::Read)?;
            if self.target_would_cycle(id, target) {
                debug!("rejecting target {} for {}: circular reference", target, id);
                return Err(DomainError::structural(
                    id,
                    StructuralReason::CircularReference,
                ));
            }
        }
        let node = self.live_mut(id)?;
        let old = std::mem::replace(&mut node.data.target, target);
        self.raise(id, Change::TargetChanged { old, new: target });
        Ok(())
    }
}

/// Iterator over an owner chain.
pub struct Ancestors<'a> {
    arena: &'a NodeArena,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.arena.owner_of(current);
        Some(current)
    }
}

/// Pre-order iterator over a subtree.
pub struct Descendants<'a> {
    arena: &'a NodeArena,
    stack: Vec<NodeId>,
}

impl<'a> Descendants<'a> {
    fn new(arena: &'a NodeArena, start: NodeId) -> Self {
        let mut stack = Vec::new();
        if arena.node(start).is_some() {
            stack.push(start);
        }
        Self { arena, stack }
    }
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.stack.pop()?;
        if let Some(items) = self.arena.node(current).and_then(|node| node.items.as_ref()) {
            // Push children in reverse order for left-to-right traversal
            self.stack.extend(items.iter().rev().copied());
        }
        Some(current)
    }
}
