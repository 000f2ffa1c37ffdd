use termtree::Tree;
use tracing::instrument;

use crate::domain::arena::{NodeArena, NodeId};
use crate::domain::entities::NodeKind;

pub trait TreeDisplay {
    fn to_tree_string(&self, root: NodeId) -> Tree<String>;
}

impl TreeDisplay for NodeArena {
    #[instrument(level = "debug", skip(self))]
    fn to_tree_string(&self, root: NodeId) -> Tree<String> {
        if self.is_disposed(root) {
            return Tree::new("Disposed node".to_string());
        }

        fn build_tree(arena: &NodeArena, id: NodeId) -> Tree<String> {
            let leaves: Vec<_> = arena
                .items(id)
                .map(|items| items.iter().map(|&child| build_tree(arena, child)).collect())
                .unwrap_or_default();
            Tree::new(node_label(arena, id)).with_leaves(leaves)
        }

        build_tree(self, root)
    }
}

/// One-line description: kind, name, reference target, state markers.
pub fn node_label(arena: &NodeArena, id: NodeId) -> String {
    let Ok(kind) = arena.kind(id) else {
        return format!("<disposed {}>", id);
    };
    let mut label = kind.to_string();
    if let Ok(Some(name)) = arena.name(id) {
        label.push_str(&format!(" \"{}\"", name));
    }
    if kind == NodeKind::Reference {
        match arena.target(id).ok().flatten() {
            Some(target) => {
                let target_name = arena.name(target).ok().flatten().unwrap_or("?");
                label.push_str(&format!(" -> {}", target_name));
            }
            None => label.push_str(" -> (unresolved)"),
        }
    }
    let markers: Vec<&str> = [
        (arena.is_frozen(id).unwrap_or(false), "frozen"),
        (arena.is_immutable(id).unwrap_or(false), "immutable"),
        (arena.is_locked(id).unwrap_or(false), "locked"),
    ]
    .into_iter()
    .filter_map(|(set, marker)| set.then_some(marker))
    .collect();
    if !markers.is_empty() {
        label.push_str(&format!(" [{}]", markers.join(", ")));
    }
    label
}
