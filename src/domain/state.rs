//! Node lifecycle state and mutation checks
//!
//! Rejections are evaluated in a fixed order: disposed, frozen, immutable,
//! locked. An earlier failure masks every later one.
//!
//! Frozen and locked are inherited: a node counts as frozen (locked) when
//! it or any node on its owner chain carries the flag. Both are computed
//! on read so that setting them stays O(1).

use tracing::{debug, instrument};

use crate::domain::arena::{NodeArena, NodeId};
use crate::domain::collection::InsertCheckFlags;
use crate::domain::error::{DomainError, NodeResult, StructuralReason};
use crate::domain::events::Change;

/// Stored lifecycle flags of a live node.
///
/// `disposed` is not stored: a disposed node no longer has an arena slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeState {
    pub(crate) disposing: bool,
    pub(crate) frozen: bool,
    pub(crate) immutable: bool,
    pub(crate) locked: bool,
}

impl NodeState {
    pub(crate) fn new(immutable: bool) -> Self {
        Self {
            immutable,
            ..Self::default()
        }
    }
}

/// Kind of access a caller wants to perform on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Read,
    /// Property mutation
    Write,
    /// This node is being added to a collection
    StructuralAdd,
    /// This node is being removed from a collection
    StructuralRemove,
}

impl OpKind {
    pub fn is_structural(self) -> bool {
        matches!(self, OpKind::StructuralAdd | OpKind::StructuralRemove)
    }
}

/// Reason a node refused an operation, ordered by precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rejection {
    Disposed,
    Frozen,
    Immutable,
    Locked,
}

impl Rejection {
    /// Attach the rejecting node.
    pub fn at(self, node: NodeId) -> DomainError {
        match self {
            Rejection::Disposed => DomainError::Disposed(node),
            Rejection::Frozen => DomainError::Frozen(node),
            Rejection::Immutable => DomainError::Immutable(node),
            Rejection::Locked => DomainError::Locked(node),
        }
    }
}

/// Capacity in which a node takes part in an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Read,
    /// Property mutation on the node itself
    Property,
    /// Collection whose membership changes
    Container,
    /// Node moving into or out of a collection
    Member,
}

impl From<OpKind> for Role {
    fn from(op: OpKind) -> Self {
        match op {
            OpKind::Read => Role::Read,
            OpKind::Write => Role::Property,
            OpKind::StructuralAdd | OpKind::StructuralRemove => Role::Member,
        }
    }
}

impl NodeArena {
    /// Answerable for any handle, live or not.
    pub fn is_disposed(&self, id: NodeId) -> bool {
        !self.nodes.contains(id.0)
    }

    /// True while the node or one of its ancestors is being torn down.
    pub fn is_disposing(&self, id: NodeId) -> NodeResult<bool> {
        self.live(id)?;
        Ok(self.disposing_chain(id))
    }

    pub fn is_frozen(&self, id: NodeId) -> NodeResult<bool> {
        self.live(id)?;
        Ok(self.frozen_chain(id))
    }

    pub fn is_immutable(&self, id: NodeId) -> NodeResult<bool> {
        Ok(self.live(id)?.state.immutable)
    }

    /// Locked explicitly or through an ancestor.
    pub fn is_locked(&self, id: NodeId) -> NodeResult<bool> {
        self.live(id)?;
        Ok(self.locked_chain(id))
    }

    pub(crate) fn disposing_chain(&self, id: NodeId) -> bool {
        self.chain_has(id, |state| state.disposing)
    }

    pub(crate) fn frozen_chain(&self, id: NodeId) -> bool {
        self.chain_has(id, |state| state.frozen)
    }

    pub(crate) fn locked_chain(&self, id: NodeId) -> bool {
        self.chain_has(id, |state| state.locked)
    }

    fn chain_has(&self, id: NodeId, flag: impl Fn(&NodeState) -> bool) -> bool {
        self.self_and_ancestors(id)
            .filter_map(|ancestor| self.node(ancestor))
            .any(|node| flag(&node.state))
    }

    /// Validate `op` against the node's state.
    pub fn check_mutable(&self, id: NodeId, op: OpKind) -> Result<(), Rejection> {
        self.check_mutable_with(id, op, InsertCheckFlags::empty())
    }

    /// Like [`check_mutable`](Self::check_mutable); `IGNORE_LOCK` in `flags`
    /// lifts the lock for structural operations only.
    pub fn check_mutable_with(
        &self,
        id: NodeId,
        op: OpKind,
        flags: InsertCheckFlags,
    ) -> Result<(), Rejection> {
        match self.rejection(id, op.into(), flags) {
            Some(rejection) => Err(rejection),
            None => Ok(()),
        }
    }

    pub(crate) fn rejection(
        &self,
        id: NodeId,
        role: Role,
        flags: InsertCheckFlags,
    ) -> Option<Rejection> {
        let Some(node) = self.node(id) else {
            return Some(Rejection::Disposed);
        };
        if role == Role::Read {
            return None;
        }
        if self.frozen_chain(id) {
            return Some(Rejection::Frozen);
        }
        // Immutable nodes may still move between collections
        if node.state.immutable && matches!(role, Role::Property | Role::Container) {
            return Some(Rejection::Immutable);
        }
        let lock_lifted = matches!(role, Role::Container | Role::Member)
            && flags.contains(InsertCheckFlags::IGNORE_LOCK);
        if !lock_lifted && self.locked_chain(id) {
            return Some(Rejection::Locked);
        }
        None
    }

    /// Lock or unlock a collection or a member of a collection.
    #[instrument(level = "trace", skip(self))]
    pub fn set_locked(&mut self, id: NodeId, locked: bool) -> NodeResult<()> {
        let node = self.live(id)?;
        if self.frozen_chain(id) {
            return Err(DomainError::Frozen(id));
        }
        if !node.kind.is_collection() && node.owner.is_none() {
            return Err(DomainError::structural(id, StructuralReason::NotSupported));
        }
        let node = self.live_mut(id)?;
        if node.state.locked == locked {
            return Ok(());
        }
        node.state.locked = locked;
        debug!("{} {}", if locked { "locked" } else { "unlocked" }, id);
        self.raise(id, Change::LockChanged { locked });
        Ok(())
    }
}
