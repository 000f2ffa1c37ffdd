//! Change notification and upward propagation
//!
//! A mutation raises a [`Change`] on the node it touched. The envelope is
//! delivered to that node's listeners, then handed to each owner in turn
//! up to the root. At the root it becomes a [`TreeEvent::Changed`], unless
//! an update transaction is open there, in which case it is buffered until
//! the outermost `end_update`.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, trace};

use crate::domain::arena::{NodeArena, NodeId};
use crate::domain::error::NodeResult;

/// Payload of a single change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    ItemsAdded {
        index: usize,
        items: Vec<NodeId>,
    },
    ItemsRemoved {
        index: usize,
        items: Vec<NodeId>,
    },
    ItemsReplaced {
        index: usize,
        old: Vec<NodeId>,
        new: Vec<NodeId>,
    },
    CollectionCleared {
        items: Vec<NodeId>,
    },
    ParentChanged {
        old: Option<NodeId>,
        new: Option<NodeId>,
    },
    NameChanged {
        old: Option<String>,
        new: Option<String>,
    },
    PropertyChanged {
        key: String,
        old: Option<String>,
        new: Option<String>,
    },
    TargetChanged {
        old: Option<NodeId>,
        new: Option<NodeId>,
    },
    LockChanged {
        locked: bool,
    },
    Frozen,
    Disposed,
}

impl Change {
    /// Name of the event that fired.
    pub fn name(&self) -> &'static str {
        match self {
            Change::ItemsAdded { .. } => "ItemsAdded",
            Change::ItemsRemoved { .. } => "ItemsRemoved",
            Change::ItemsReplaced { .. } => "ItemsReplaced",
            Change::CollectionCleared { .. } => "CollectionCleared",
            Change::ParentChanged { .. } => "ParentChanged",
            Change::NameChanged { .. } => "NameChanged",
            Change::PropertyChanged { .. } => "PropertyChanged",
            Change::TargetChanged { .. } => "TargetChanged",
            Change::LockChanged { .. } => "LockChanged",
            Change::Frozen => "Frozen",
            Change::Disposed => "Disposed",
        }
    }
}

/// Read-only record of a change, forwarded unchanged up the owner chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEnvelope {
    source: NodeId,
    operation: &'static str,
    payload: Change,
}

impl ChangeEnvelope {
    pub fn new(source: NodeId, payload: Change) -> Self {
        Self {
            source,
            operation: payload.name(),
            payload,
        }
    }

    /// Node the change originated on.
    pub fn source(&self) -> NodeId {
        self.source
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn payload(&self) -> &Change {
        &self.payload
    }
}

/// Aggregated tree change delivered at a root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeChanged {
    pub count: usize,
    /// Envelopes in arrival order
    pub events: Vec<ChangeEnvelope>,
}

impl TreeChanged {
    pub(crate) fn from_events(events: Vec<ChangeEnvelope>) -> Self {
        Self {
            count: events.len(),
            events,
        }
    }
}

/// Events observable on a tree root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    UpdateBegun,
    UpdateInProgress,
    Changed(TreeChanged),
    UpdateEnded,
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type ChangeListener = Box<dyn FnMut(&ChangeEnvelope)>;
type TreeListener = Box<dyn FnMut(&TreeEvent)>;

/// Listener storage keyed by node, kept beside the arena slots.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: u64,
    changes: HashMap<NodeId, Vec<(SubscriptionId, ChangeListener)>>,
    trees: HashMap<NodeId, Vec<(SubscriptionId, TreeListener)>>,
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("change_listeners", &self.changes.values().map(Vec::len).sum::<usize>())
            .field("tree_listeners", &self.trees.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}

impl ListenerRegistry {
    fn next_id(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }

    fn add_change(&mut self, node: NodeId, listener: ChangeListener) -> SubscriptionId {
        let id = self.next_id();
        self.changes.entry(node).or_default().push((id, listener));
        id
    }

    fn add_tree(&mut self, node: NodeId, listener: TreeListener) -> SubscriptionId {
        let id = self.next_id();
        self.trees.entry(node).or_default().push((id, listener));
        id
    }

    fn remove(&mut self, node: NodeId, subscription: SubscriptionId) -> bool {
        let changes = remove_listener(&mut self.changes, node, subscription);
        let trees = remove_listener(&mut self.trees, node, subscription);
        changes || trees
    }

    pub(crate) fn notify_change(&mut self, node: NodeId, envelope: &ChangeEnvelope) {
        if let Some(listeners) = self.changes.get_mut(&node) {
            for (_, listener) in listeners.iter_mut() {
                listener(envelope);
            }
        }
    }

    pub(crate) fn notify_tree(&mut self, node: NodeId, event: &TreeEvent) {
        if let Some(listeners) = self.trees.get_mut(&node) {
            for (_, listener) in listeners.iter_mut() {
                listener(event);
            }
        }
    }

    pub(crate) fn forget(&mut self, node: NodeId) {
        self.changes.remove(&node);
        self.trees.remove(&node);
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.trees.is_empty()
    }
}

/// Drop `subscription` from `node`'s listeners; an emptied entry is removed.
fn remove_listener<L>(
    listeners: &mut HashMap<NodeId, Vec<(SubscriptionId, L)>>,
    node: NodeId,
    subscription: SubscriptionId,
) -> bool {
    let Some(entries) = listeners.get_mut(&node) else {
        return false;
    };
    let before = entries.len();
    entries.retain(|(id, _)| *id != subscription);
    let removed = entries.len() != before;
    if entries.is_empty() {
        listeners.remove(&node);
    }
    removed
}

impl NodeArena {
    /// Listen to changes raised on `id` and bubbled up from its subtree.
    pub fn subscribe<F>(&mut self, id: NodeId, listener: F) -> NodeResult<SubscriptionId>
    where
        F: FnMut(&ChangeEnvelope) + 'static,
    {
        self.live(id)?;
        Ok(self.listeners.add_change(id, Box::new(listener)))
    }

    /// Listen to tree events delivered while `id` is a root.
    pub fn subscribe_tree<F>(&mut self, id: NodeId, listener: F) -> NodeResult<SubscriptionId>
    where
        F: FnMut(&TreeEvent) + 'static,
    {
        self.live(id)?;
        Ok(self.listeners.add_tree(id, Box::new(listener)))
    }

    /// Returns false when the subscription was not registered on `id`.
    pub fn unsubscribe(&mut self, id: NodeId, subscription: SubscriptionId) -> NodeResult<bool> {
        self.live(id)?;
        Ok(self.listeners.remove(id, subscription))
    }

    /// Fire `change` on `source` and forward it to the root.
    pub(crate) fn raise(&mut self, source: NodeId, change: Change) {
        let envelope = ChangeEnvelope::new(source, change);
        if self.trace_dispatch {
            debug!("{} on {}", envelope.operation(), source);
        } else {
            trace!("{} on {}", envelope.operation(), source);
        }
        self.listeners.notify_change(source, &envelope);
        match self.owner_of(source) {
            Some(parent) => self.on_child_changed(parent, envelope),
            None => self.deliver_to_root(source, envelope),
        }
    }

    /// Fire `change` on `source` only, without forwarding.
    pub(crate) fn raise_local(&mut self, source: NodeId, change: Change) {
        let envelope = ChangeEnvelope::new(source, change);
        trace!("{} on {} (local)", envelope.operation(), source);
        self.listeners.notify_change(source, &envelope);
    }

    /// Re-emit a child's envelope on `parent`, then continue upwards.
    pub(crate) fn on_child_changed(&mut self, parent: NodeId, envelope: ChangeEnvelope) {
        let mut current = parent;
        loop {
            self.listeners.notify_change(current, &envelope);
            match self.owner_of(current) {
                Some(next) => current = next,
                None => break,
            }
        }
        self.deliver_to_root(current, envelope);
    }

    fn deliver_to_root(&mut self, root: NodeId, envelope: ChangeEnvelope) {
        let Some(node) = self.node_mut(root) else {
            return;
        };
        if node.update.is_open() {
            node.update.buffer(envelope);
            return;
        }
        let event = TreeEvent::Changed(TreeChanged::from_events(vec![envelope]));
        self.listeners.notify_tree(root, &event);
    }
}
