//! Document builder: turns an outline into a live node tree.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::domain::arena::{NewNode, NodeArena, NodeId};
use crate::domain::entities::{NodeKind, ScopedName};
use crate::domain::error::DomainError;
use crate::domain::policy::NodePolicy;

/// Declarative description of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Outline {
    pub document: DocumentOutline,
    pub pages: Vec<PageOutline>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentOutline {
    pub name: Option<String>,
    /// Freeze the document once built
    pub frozen: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageOutline {
    pub name: String,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub steps: Vec<StepOutline>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepOutline {
    pub name: Option<String>,
    pub items: Vec<ItemOutline>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ItemOutline {
    Element {
        name: Option<String>,
        #[serde(default)]
        properties: BTreeMap<String, String>,
        #[serde(default)]
        immutable: bool,
    },
    Group {
        name: String,
        #[serde(default)]
        items: Vec<ItemOutline>,
    },
    /// Reference to a page of the same document, by name
    Reference {
        name: Option<String>,
        target: String,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("{0}")]
    Node(#[from] DomainError),

    #[error("reference {reference} points at unknown page: {target}")]
    UnknownTarget { reference: NodeId, target: String },
}

/// A built document: the arena and the document root in it.
#[derive(Debug)]
pub struct BuiltDocument {
    pub arena: NodeArena,
    pub root: NodeId,
}

/// Constructs document trees from outlines.
///
/// All insertions happen inside one update scope, so listeners on the root
/// see a single aggregated change.
#[derive(Debug, Default)]
pub struct DocumentBuilder {
    arena: NodeArena,
}

impl DocumentBuilder {
    pub fn new(arena: NodeArena) -> Self {
        Self { arena }
    }

    /// Create the document root up front, e.g. to subscribe before building.
    pub fn create_root(&mut self, outline: &Outline) -> NodeId {
        let mut root = NewNode::new(NodeKind::Document);
        if let Some(name) = &outline.document.name {
            root = root.named(name.clone());
        }
        self.arena.create(root)
    }

    pub fn arena_mut(&mut self) -> &mut NodeArena {
        &mut self.arena
    }

    pub fn build(mut self, outline: &Outline) -> Result<BuiltDocument, BuildError> {
        let root = self.create_root(outline);
        self.build_into(root, outline)
    }

    /// Build `outline` under an existing document root.
    #[instrument(level = "debug", skip(self, outline))]
    pub fn build_into(
        mut self,
        root: NodeId,
        outline: &Outline,
    ) -> Result<BuiltDocument, BuildError> {
        {
            let mut scope = self.arena.update_scope(root)?;
            let mut pending = Vec::new();
            for page in &outline.pages {
                let page_id = scope.create(NewNode::new(NodeKind::Page).named(page.name.clone()));
                scope.push(root, page_id)?;
                for step in &page.steps {
                    let mut new_node = NewNode::new(NodeKind::Step);
                    if let Some(name) = &step.name {
                        new_node = new_node.named(name.clone());
                    }
                    let step_id = scope.create(new_node);
                    scope.push(page_id, step_id)?;
                    add_items(&mut scope, step_id, &step.items, &mut pending)?;
                }
            }
            // Targets resolve once every page exists
            for (reference, target) in pending {
                let page = find_page(&scope, root, &target)
                    .ok_or(BuildError::UnknownTarget { reference, target })?;
                scope.set_target(reference, Some(page))?;
            }
            for page in outline.pages.iter().filter(|page| page.locked) {
                if let Some(id) = find_page(&scope, root, &page.name) {
                    scope.set_locked(id, true)?;
                }
            }
            scope.finish()?;
        }
        if outline.document.frozen {
            self.arena.freeze(root)?;
        }
        debug!("built document {} with {} node(s)", root, self.arena.node_count());
        Ok(BuiltDocument {
            arena: self.arena,
            root,
        })
    }
}

/// Page lookup using the name rule the document applies for uniqueness.
fn find_page(arena: &NodeArena, root: NodeId, name: &str) -> Option<NodeId> {
    arena.items(root).ok()?.iter().copied().find(|&page| {
        arena
            .policy
            .identity(arena, page)
            .is_some_and(|identity| identity.collides_with(&ScopedName::new(name, identity.case)))
    })
}

fn add_items(
    arena: &mut NodeArena,
    collection: NodeId,
    items: &[ItemOutline],
    pending: &mut Vec<(NodeId, String)>,
) -> Result<(), BuildError> {
    for item in items {
        match item {
            ItemOutline::Element {
                name,
                properties,
                immutable,
            } => {
                let mut new_node = NewNode::new(NodeKind::Element);
                if let Some(name) = name {
                    new_node = new_node.named(name.clone());
                }
                for (key, value) in properties {
                    new_node = new_node.property(key.clone(), value.clone());
                }
                if *immutable {
                    new_node = new_node.immutable();
                }
                let id = arena.create(new_node);
                arena.push(collection, id)?;
            }
            ItemOutline::Group { name, items } => {
                let id = arena.create(NewNode::new(NodeKind::Group).named(name.clone()));
                arena.push(collection, id)?;
                add_items(arena, id, items, pending)?;
            }
            ItemOutline::Reference { name, target } => {
                let mut new_node = NewNode::new(NodeKind::Reference);
                if let Some(name) = name {
                    new_node = new_node.named(name.clone());
                }
                let id = arena.create(new_node);
                arena.push(collection, id)?;
                pending.push((id, target.clone()));
            }
        }
    }
    Ok(())
}
