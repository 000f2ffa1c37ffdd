//! Domain layer: the node tree substrate
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod arena;
pub mod builder;
pub mod collection;
pub mod display;
pub mod entities;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod policy;
pub mod state;
pub mod transaction;

pub use arena::{Ancestors, Descendants, NewNode, NodeArena, NodeId};
pub use builder::{BuildError, BuiltDocument, DocumentBuilder, ItemOutline, Outline};
pub use collection::{InsertCheckFlags, InsertCheckResult};
pub use display::TreeDisplay;
pub use entities::{NameCase, NodeData, NodeKind, ScopedName};
pub use error::{DomainError, NodeResult, StructuralReason};
pub use events::{Change, ChangeEnvelope, SubscriptionId, TreeChanged, TreeEvent};
pub use policy::{DefaultPolicy, NodePolicy, Placement};
pub use state::{NodeState, OpKind, Rejection};
pub use transaction::{UpdateGuard, UpdateScope};
