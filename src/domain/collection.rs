//! Ordered, owned collections of child nodes
//!
//! Every structural mutation first runs the insert-check, then mutates,
//! then raises exactly one structural event on the collection plus a
//! `ParentChanged` on each affected node. A failed check leaves the tree
//! untouched.
//!
//! Check order: state of every participant (disposed, frozen, immutable,
//! locked), empty batch, circular reference, placement, open transaction
//! on the candidate root, membership, duplicate name.

use std::collections::HashSet;

use bitflags::bitflags;
use tracing::{debug, instrument};

use crate::domain::arena::{NodeArena, NodeId};
use crate::domain::error::{DomainError, NodeResult, StructuralReason};
use crate::domain::events::Change;
use crate::domain::policy::Placement;
use crate::domain::state::{Rejection, Role};

bitflags! {
    /// Checks a caller may waive.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InsertCheckFlags: u8 {
        /// Accept a candidate owned by another collection; mutating calls move it.
        const IGNORE_CONTAINER = 1 << 0;
        /// Lift locks for this structural operation.
        const IGNORE_LOCK = 1 << 1;
    }
}

/// Outcome of `can_insert`/`can_replace`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InsertCheckResult {
    CanInsert,
    Disposed,
    Frozen,
    ReadOnly,
    Locked,
    CircularReference,
    NotSupported,
    TopLevelNotAllowed,
    TransactionOpen,
    AlreadyMember,
    HasDifferentContainer,
    DuplicateName,
}

impl InsertCheckResult {
    pub fn is_ok(self) -> bool {
        self == InsertCheckResult::CanInsert
    }

    fn from_rejection(rejection: Rejection) -> Self {
        match rejection {
            Rejection::Disposed => InsertCheckResult::Disposed,
            Rejection::Frozen => InsertCheckResult::Frozen,
            Rejection::Immutable => InsertCheckResult::ReadOnly,
            Rejection::Locked => InsertCheckResult::Locked,
        }
    }

    /// Error for a failed check, attributed to `node`.
    fn into_error(self, node: NodeId) -> DomainError {
        let reason = match self {
            InsertCheckResult::Disposed => return DomainError::Disposed(node),
            InsertCheckResult::Frozen => return DomainError::Frozen(node),
            InsertCheckResult::ReadOnly => return DomainError::Immutable(node),
            InsertCheckResult::Locked => return DomainError::Locked(node),
            InsertCheckResult::CircularReference => StructuralReason::CircularReference,
            InsertCheckResult::TopLevelNotAllowed => StructuralReason::TopLevelNotAllowed,
            InsertCheckResult::TransactionOpen => StructuralReason::TransactionOpen,
            InsertCheckResult::AlreadyMember => StructuralReason::AlreadyMember,
            InsertCheckResult::HasDifferentContainer => StructuralReason::HasDifferentContainer,
            InsertCheckResult::DuplicateName => StructuralReason::DuplicateName,
            InsertCheckResult::NotSupported | InsertCheckResult::CanInsert => {
                StructuralReason::NotSupported
            }
        };
        DomainError::structural(node, reason)
    }
}

/// A check result together with the node it is attributed to.
#[derive(Debug, Clone, Copy)]
struct Verdict {
    result: InsertCheckResult,
    node: NodeId,
}

impl Verdict {
    fn ok(node: NodeId) -> Self {
        Self {
            result: InsertCheckResult::CanInsert,
            node,
        }
    }

    fn reject(result: InsertCheckResult, node: NodeId) -> Self {
        Self { result, node }
    }

    fn into_result(self) -> NodeResult<()> {
        if self.result.is_ok() {
            Ok(())
        } else {
            debug!("insert check failed at {}: {:?}", self.node, self.result);
            Err(self.result.into_error(self.node))
        }
    }
}

impl NodeArena {
    /// Members of a collection in order.
    pub fn items(&self, collection: NodeId) -> NodeResult<&[NodeId]> {
        self.live(collection)?
            .items
            .as_deref()
            .ok_or_else(|| DomainError::structural(collection, StructuralReason::NotSupported))
    }

    pub fn len(&self, collection: NodeId) -> NodeResult<usize> {
        Ok(self.items(collection)?.len())
    }

    pub fn is_empty(&self, collection: NodeId) -> NodeResult<bool> {
        Ok(self.items(collection)?.is_empty())
    }

    pub fn item(&self, collection: NodeId, index: usize) -> NodeResult<Option<NodeId>> {
        Ok(self.items(collection)?.get(index).copied())
    }

    pub fn index_of(&self, collection: NodeId, item: NodeId) -> NodeResult<Option<usize>> {
        Ok(self.items(collection)?.iter().position(|&i| i == item))
    }

    pub fn contains(&self, collection: NodeId, item: NodeId) -> NodeResult<bool> {
        Ok(self.index_of(collection, item)?.is_some())
    }

    /// Whether `candidate` could be inserted into `collection`. Pure.
    pub fn can_insert(
        &self,
        collection: NodeId,
        candidate: NodeId,
        flags: InsertCheckFlags,
    ) -> InsertCheckResult {
        self.check_insert(collection, candidate, None, flags, &[]).result
    }

    /// Whether `candidate` could take the place of `to_replace`. Pure.
    ///
    /// `to_replace` is treated as already gone for the membership and
    /// duplicate-name checks.
    pub fn can_replace(
        &self,
        collection: NodeId,
        candidate: NodeId,
        to_replace: NodeId,
        flags: InsertCheckFlags,
    ) -> InsertCheckResult {
        if self.node(to_replace).is_some() && self.owner_of(to_replace) != Some(collection) {
            return InsertCheckResult::NotSupported;
        }
        self.check_insert(collection, candidate, Some(to_replace), flags, &[])
            .result
    }

    fn check_insert(
        &self,
        collection: NodeId,
        candidate: NodeId,
        replacing: Option<NodeId>,
        flags: InsertCheckFlags,
        batch: &[NodeId],
    ) -> Verdict {
        use InsertCheckResult as R;

        let mut participants = vec![(collection, Role::Container), (candidate, Role::Member)];
        if let Some(old) = replacing {
            participants.push((old, Role::Member));
        }
        let previous = self.owner_of(candidate);
        if flags.contains(InsertCheckFlags::IGNORE_CONTAINER) {
            if let Some(previous) = previous.filter(|&p| p != collection) {
                participants.push((previous, Role::Container));
            }
        }
        if let Some(verdict) = self.state_verdict(&participants, flags) {
            return verdict;
        }

        if self.creates_cycle(collection, candidate) {
            return Verdict::reject(R::CircularReference, candidate);
        }
        let Some(siblings) = self.node(collection).and_then(|node| node.items.as_ref()) else {
            return Verdict::reject(R::NotSupported, collection);
        };
        match self.policy.placement(self, collection, candidate) {
            Placement::Allowed => {}
            Placement::NotSupported => return Verdict::reject(R::NotSupported, candidate),
            Placement::TopLevelNotAllowed => {
                return Verdict::reject(R::TopLevelNotAllowed, candidate)
            }
        }
        if previous.is_none()
            && self
                .node(candidate)
                .is_some_and(|node| node.update.is_open())
        {
            return Verdict::reject(R::TransactionOpen, candidate);
        }

        if Some(candidate) == replacing {
            return Verdict::ok(candidate);
        }
        if previous == Some(collection) || batch.contains(&candidate) {
            return Verdict::reject(R::AlreadyMember, candidate);
        }
        if previous.is_some() && !flags.contains(InsertCheckFlags::IGNORE_CONTAINER) {
            return Verdict::reject(R::HasDifferentContainer, candidate);
        }

        if let Some(identity) = self.policy.identity(self, candidate) {
            let collides = siblings
                .iter()
                .chain(batch)
                .filter(|&&sibling| Some(sibling) != replacing && sibling != candidate)
                .filter_map(|&sibling| self.policy.identity(self, sibling))
                .any(|other| identity.collides_with(&other));
            if collides {
                return Verdict::reject(R::DuplicateName, candidate);
            }
        }
        Verdict::ok(candidate)
    }

    /// Highest-precedence state rejection among the participants.
    fn state_verdict(
        &self,
        participants: &[(NodeId, Role)],
        flags: InsertCheckFlags,
    ) -> Option<Verdict> {
        participants
            .iter()
            .filter_map(|&(id, role)| self.rejection(id, role, flags).map(|r| (r, id)))
            .min_by_key(|&(rejection, _)| rejection)
            .map(|(rejection, id)| {
                Verdict::reject(InsertCheckResult::from_rejection(rejection), id)
            })
    }

    /// Whether placing `candidate` in `collection` would make a node contain
    /// itself, structurally or through reference targets.
    fn creates_cycle(&self, collection: NodeId, candidate: NodeId) -> bool {
        let insertion_chain: HashSet<NodeId> = self.self_and_ancestors(collection).collect();
        self.reaches_any(candidate, &insertion_chain)
    }

    /// Whether pointing `reference` at `target` would close a cycle.
    pub(crate) fn target_would_cycle(&self, reference: NodeId, target: NodeId) -> bool {
        let chain: HashSet<NodeId> = self.self_and_ancestors(reference).collect();
        self.reaches_any(target, &chain)
    }

    /// Walks children and resolved targets from `start`.
    fn reaches_any(&self, start: NodeId, targets: &HashSet<NodeId>) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if targets.contains(&id) {
                return true;
            }
            if !visited.insert(id) {
                continue;
            }
            let Some(node) = self.node(id) else {
                continue;
            };
            if let Some(items) = &node.items {
                stack.extend(items.iter().copied());
            }
            if let Some(target) = self.policy.resolve_target(self, id) {
                stack.push(target);
            }
        }
        false
    }

    pub fn push(&mut self, collection: NodeId, candidate: NodeId) -> NodeResult<()> {
        let index = self.len(collection)?;
        self.insert(collection, index, candidate)
    }

    pub fn insert(&mut self, collection: NodeId, index: usize, candidate: NodeId) -> NodeResult<()> {
        self.insert_with(collection, index, candidate, InsertCheckFlags::empty())
    }

    pub fn insert_with(
        &mut self,
        collection: NodeId,
        index: usize,
        candidate: NodeId,
        flags: InsertCheckFlags,
    ) -> NodeResult<()> {
        self.insert_range(collection, index, &[candidate], flags)
    }

    /// Insert a batch at `index`, raising a single `ItemsAdded`.
    #[instrument(level = "trace", skip(self))]
    pub fn insert_range(
        &mut self,
        collection: NodeId,
        index: usize,
        candidates: &[NodeId],
        flags: InsertCheckFlags,
    ) -> NodeResult<()> {
        if let Some(rejection) = self.rejection(collection, Role::Container, flags) {
            return Err(rejection.at(collection));
        }
        if candidates.is_empty() {
            return Err(DomainError::NullArgument("candidates"));
        }
        let mut participants = vec![(collection, Role::Container)];
        for &candidate in candidates {
            participants.push((candidate, Role::Member));
            if flags.contains(InsertCheckFlags::IGNORE_CONTAINER) {
                if let Some(previous) = self.owner_of(candidate).filter(|&p| p != collection) {
                    participants.push((previous, Role::Container));
                }
            }
        }
        if let Some(verdict) = self.state_verdict(&participants, flags) {
            return verdict.into_result();
        }
        for (position, &candidate) in candidates.iter().enumerate() {
            self.check_insert(collection, candidate, None, flags, &candidates[..position])
                .into_result()?;
        }
        let len = self.len(collection)?;
        if index > len {
            return Err(DomainError::IndexOutOfRange { index, len });
        }

        let previous: Vec<Option<NodeId>> =
            candidates.iter().map(|&c| self.owner_of(c)).collect();
        for (&candidate, &owner) in candidates.iter().zip(&previous) {
            if let Some(owner) = owner {
                self.detach_and_notify(owner, candidate);
            }
        }
        for &candidate in candidates {
            self.live_mut(candidate)?.owner = Some(collection);
        }
        let members = self.members_mut(collection)?;
        let tail = members.split_off(index);
        members.extend_from_slice(candidates);
        members.extend(tail);

        debug!("added {} item(s) to {} at {}", candidates.len(), collection, index);
        self.raise(
            collection,
            Change::ItemsAdded {
                index,
                items: candidates.to_vec(),
            },
        );
        for (&candidate, &old) in candidates.iter().zip(&previous) {
            self.raise(
                candidate,
                Change::ParentChanged {
                    old,
                    new: Some(collection),
                },
            );
        }
        Ok(())
    }

    /// Remove `candidate`; returns false if it was not a member.
    ///
    /// Removing from a collection that is being disposed is a no-op.
    pub fn remove(&mut self, collection: NodeId, candidate: NodeId) -> NodeResult<bool> {
        self.remove_with(collection, candidate, InsertCheckFlags::empty())
    }

    #[instrument(level = "trace", skip(self))]
    pub fn remove_with(
        &mut self,
        collection: NodeId,
        candidate: NodeId,
        flags: InsertCheckFlags,
    ) -> NodeResult<bool> {
        self.live(collection)?;
        if self.disposing_chain(collection) {
            return Ok(false);
        }
        self.state_verdict(
            &[(collection, Role::Container), (candidate, Role::Member)],
            flags,
        )
        .map_or(Ok(()), Verdict::into_result)?;
        if self.index_of(collection, candidate)?.is_none() {
            return Ok(false);
        }
        self.detach_and_notify(collection, candidate);
        self.raise(
            candidate,
            Change::ParentChanged {
                old: Some(collection),
                new: None,
            },
        );
        Ok(true)
    }

    /// Remove the member at `index` and return it.
    pub fn remove_at(&mut self, collection: NodeId, index: usize) -> NodeResult<NodeId> {
        let len = self.len(collection)?;
        let item = self
            .item(collection, index)?
            .ok_or(DomainError::IndexOutOfRange { index, len })?;
        self.remove(collection, item)?;
        Ok(item)
    }

    /// Put `candidate` at `index`, returning the member it replaced.
    pub fn replace(
        &mut self,
        collection: NodeId,
        index: usize,
        candidate: NodeId,
    ) -> NodeResult<NodeId> {
        self.replace_with(collection, index, candidate, InsertCheckFlags::empty())
    }

    #[instrument(level = "trace", skip(self))]
    pub fn replace_with(
        &mut self,
        collection: NodeId,
        index: usize,
        candidate: NodeId,
        flags: InsertCheckFlags,
    ) -> NodeResult<NodeId> {
        let len = self.len(collection)?;
        let old = self
            .item(collection, index)?
            .ok_or(DomainError::IndexOutOfRange { index, len })?;
        self.check_insert(collection, candidate, Some(old), flags, &[])
            .into_result()?;
        if old == candidate {
            return Ok(old);
        }

        let previous = self.owner_of(candidate);
        if let Some(previous) = previous {
            self.detach_and_notify(previous, candidate);
        }
        self.members_mut(collection)?[index] = candidate;
        self.live_mut(candidate)?.owner = Some(collection);
        self.live_mut(old)?.owner = None;

        self.raise(
            collection,
            Change::ItemsReplaced {
                index,
                old: vec![old],
                new: vec![candidate],
            },
        );
        self.raise(
            old,
            Change::ParentChanged {
                old: Some(collection),
                new: None,
            },
        );
        self.raise(
            candidate,
            Change::ParentChanged {
                old: previous,
                new: Some(collection),
            },
        );
        Ok(old)
    }

    pub fn clear(&mut self, collection: NodeId) -> NodeResult<()> {
        self.clear_with(collection, InsertCheckFlags::empty())
    }

    #[instrument(level = "trace", skip(self))]
    pub fn clear_with(&mut self, collection: NodeId, flags: InsertCheckFlags) -> NodeResult<()> {
        let mut participants = vec![(collection, Role::Container)];
        participants.extend(self.items(collection)?.iter().map(|&i| (i, Role::Member)));
        self.state_verdict(&participants, flags)
            .map_or(Ok(()), Verdict::into_result)?;

        let items = std::mem::take(self.members_mut(collection)?);
        if items.is_empty() {
            return Ok(());
        }
        for &item in &items {
            self.live_mut(item)?.owner = None;
        }
        debug!("cleared {} item(s) from {}", items.len(), collection);
        self.raise(
            collection,
            Change::CollectionCleared {
                items: items.clone(),
            },
        );
        for item in items {
            self.raise(
                item,
                Change::ParentChanged {
                    old: Some(collection),
                    new: None,
                },
            );
        }
        Ok(())
    }

    fn members_mut(&mut self, collection: NodeId) -> NodeResult<&mut Vec<NodeId>> {
        self.live_mut(collection)?
            .items
            .as_mut()
            .ok_or_else(|| DomainError::structural(collection, StructuralReason::NotSupported))
    }

    /// Unlink `item` from `collection` and raise `ItemsRemoved`.
    fn detach_and_notify(&mut self, collection: NodeId, item: NodeId) {
        let Ok(items) = self.members_mut(collection) else {
            return;
        };
        let Some(index) = items.iter().position(|&i| i == item) else {
            return;
        };
        items.remove(index);
        if let Some(node) = self.node_mut(item) {
            node.owner = None;
        }
        self.raise(
            collection,
            Change::ItemsRemoved {
                index,
                items: vec![item],
            },
        );
    }
}
