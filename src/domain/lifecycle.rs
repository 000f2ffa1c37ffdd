//! Freezing and disposal

use tracing::{debug, instrument, warn};

use crate::domain::arena::{NodeArena, NodeId};
use crate::domain::error::NodeResult;
use crate::domain::events::Change;
use crate::domain::state::OpKind;

impl NodeArena {
    /// Freeze the whole tree containing `id`.
    ///
    /// The flag is set on the root only; descendants report frozen through
    /// their owner chain. Freezing an already frozen tree raises nothing.
    #[instrument(level = "trace", skip(self))]
    pub fn freeze(&mut self, id: NodeId) -> NodeResult<()> {
        self.ensure(id, OpKind::Read)?;
        let root = self.root_of(id);
        let node = self.live_mut(root)?;
        if node.state.frozen {
            return Ok(());
        }
        node.state.frozen = true;
        debug!("froze tree at {}", root);
        self.raise(root, Change::Frozen);
        Ok(())
    }

    /// Tear down `id` and everything it owns.
    ///
    /// Sequence per node: mark disposing, leave the owning collection
    /// (skipped when the owner is itself being disposed), release local
    /// data, dispose owned children, then drop the slot. Children disposed
    /// by the cascade only raise `Disposed` to their own listeners; the
    /// owner does not report them as removed.
    ///
    /// Any failure aborts the cascade and is returned unchanged.
    #[instrument(level = "trace", skip(self))]
    pub fn dispose(&mut self, id: NodeId) -> NodeResult<()> {
        self.ensure(id, OpKind::Read)?;
        self.dispose_node(id)
    }

    fn dispose_node(&mut self, id: NodeId) -> NodeResult<()> {
        self.live_mut(id)?.state.disposing = true;

        if let Some(owner) = self.owner_of(id) {
            if !self.disposing_chain(owner) {
                if let Err(e) = self.remove(owner, id) {
                    if let Some(node) = self.node_mut(id) {
                        node.state.disposing = false;
                    }
                    return Err(e);
                }
            }
        }

        let node = self.live_mut(id)?;
        node.data.release();
        let children = node.items.clone().unwrap_or_default();
        for child in children {
            self.dispose_node(child)?;
        }

        if let Some(slot) = self.nodes.remove(id.0) {
            if slot.update.is_open() {
                warn!(
                    "disposing {} with open update scope; dropping {} buffered change(s)",
                    id,
                    slot.update.buffered()
                );
            }
        }
        self.raise_local(id, Change::Disposed);
        self.listeners.forget(id);
        debug!("disposed {}", id);
        Ok(())
    }
}
