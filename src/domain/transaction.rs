//! Nestable update transactions on a tree root
//!
//! ```text
//!   Idle ──begin_update──▶ Open(1) ──begin_update──▶ Open(2) …
//!    ▲                       │
//!    └──────end_update───────┘  flush buffered changes as one TreeChanged
//! ```
//!
//! Single-threaded and reentrant: nested scopes on the same root just
//! bump the counter.

use std::mem;
use std::ops::{Deref, DerefMut};

use tracing::{debug, instrument, warn};

use crate::domain::arena::{NodeArena, NodeId};
use crate::domain::error::{DomainError, NodeResult};
use crate::domain::events::{ChangeEnvelope, TreeChanged, TreeEvent};
use crate::domain::state::OpKind;

/// Nesting counter plus the changes buffered while it is open.
#[derive(Debug, Default)]
pub struct UpdateScope {
    depth: usize,
    buffer: Vec<ChangeEnvelope>,
}

/// Outcome of leaving one level of an [`UpdateScope`].
enum Exit {
    Nested,
    Closed(Vec<ChangeEnvelope>),
}

impl UpdateScope {
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_open(&self) -> bool {
        self.depth > 0
    }

    /// Number of envelopes waiting for the outermost `end_update`.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub(crate) fn buffer(&mut self, envelope: ChangeEnvelope) {
        self.buffer.push(envelope);
    }

    /// Returns true on the Idle → Open transition.
    fn enter(&mut self) -> bool {
        self.depth += 1;
        self.depth == 1
    }

    fn leave(&mut self) -> Option<Exit> {
        if self.depth == 0 {
            return None;
        }
        self.depth -= 1;
        if self.depth == 0 {
            Some(Exit::Closed(mem::take(&mut self.buffer)))
        } else {
            Some(Exit::Nested)
        }
    }
}

impl NodeArena {
    /// Open (or nest) the update transaction of the tree containing `id`.
    #[instrument(level = "trace", skip(self))]
    pub fn begin_update(&mut self, id: NodeId) -> NodeResult<()> {
        self.ensure(id, OpKind::Read)?;
        let root = self.root_of(id);
        if self.live_mut(root)?.update.enter() {
            debug!("update begun on {}", root);
            self.listeners.notify_tree(root, &TreeEvent::UpdateBegun);
        }
        Ok(())
    }

    /// Signal progress of an open transaction; no-op when none is open.
    #[instrument(level = "trace", skip(self))]
    pub fn update(&mut self, id: NodeId) -> NodeResult<()> {
        self.ensure(id, OpKind::Read)?;
        let root = self.root_of(id);
        if self.live(root)?.update.is_open() {
            self.listeners.notify_tree(root, &TreeEvent::UpdateInProgress);
        }
        Ok(())
    }

    /// Close one level; the outermost close flushes the buffered changes.
    #[instrument(level = "trace", skip(self))]
    pub fn end_update(&mut self, id: NodeId) -> NodeResult<()> {
        self.ensure(id, OpKind::Read)?;
        let root = self.root_of(id);
        match self.live_mut(root)?.update.leave() {
            None => {
                debug!("end_update without begin_update on {}", root);
                Err(DomainError::TransactionMisuse(root))
            }
            Some(Exit::Nested) => Ok(()),
            Some(Exit::Closed(events)) => {
                debug!("update ended on {}: flushing {} change(s)", root, events.len());
                if !events.is_empty() {
                    let event = TreeEvent::Changed(TreeChanged::from_events(events));
                    self.listeners.notify_tree(root, &event);
                }
                self.listeners.notify_tree(root, &TreeEvent::UpdateEnded);
                Ok(())
            }
        }
    }

    /// Current nesting depth of the transaction on the tree containing `id`.
    pub fn update_depth(&self, id: NodeId) -> NodeResult<usize> {
        self.live(id)?;
        Ok(self.live(self.root_of(id))?.update.depth())
    }

    pub fn is_updating(&self, id: NodeId) -> NodeResult<bool> {
        Ok(self.update_depth(id)? > 0)
    }

    /// Open a transaction that is closed when the guard goes out of scope,
    /// including during unwinding.
    pub fn update_scope(&mut self, id: NodeId) -> NodeResult<UpdateGuard<'_>> {
        self.begin_update(id)?;
        let root = self.root_of(id);
        Ok(UpdateGuard {
            arena: self,
            root,
            finished: false,
        })
    }
}

/// Scope guard over an open update transaction.
///
/// Dereferences to the arena so edits can be made through the guard.
pub struct UpdateGuard<'a> {
    arena: &'a mut NodeArena,
    root: NodeId,
    finished: bool,
}

impl UpdateGuard<'_> {
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Close the scope now and surface any error.
    pub fn finish(mut self) -> NodeResult<()> {
        self.finished = true;
        self.arena.end_update(self.root)
    }
}

impl Deref for UpdateGuard<'_> {
    type Target = NodeArena;

    fn deref(&self) -> &NodeArena {
        self.arena
    }
}

impl DerefMut for UpdateGuard<'_> {
    fn deref_mut(&mut self) -> &mut NodeArena {
        self.arena
    }
}

impl Drop for UpdateGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.arena.end_update(self.root) {
            warn!("closing update scope on {}: {}", self.root, e);
        }
    }
}
