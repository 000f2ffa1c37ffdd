//! Domain-level errors (no external dependencies)

use std::fmt;

use thiserror::Error;

use crate::domain::arena::NodeId;

/// Why a structural change was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructuralReason {
    CircularReference,
    DuplicateName,
    AlreadyMember,
    HasDifferentContainer,
    TopLevelNotAllowed,
    NotSupported,
    TransactionOpen,
}

impl fmt::Display for StructuralReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StructuralReason::CircularReference => "circular reference",
            StructuralReason::DuplicateName => "duplicate name",
            StructuralReason::AlreadyMember => "already a member",
            StructuralReason::HasDifferentContainer => "already has a different container",
            StructuralReason::TopLevelNotAllowed => "not allowed at top level",
            StructuralReason::NotSupported => "not supported",
            StructuralReason::TransactionOpen => "update in progress on candidate root",
        };
        f.write_str(text)
    }
}

/// Domain errors signal a violated precondition of a tree operation.
///
/// None of them are transient; callers that want to avoid them query
/// `can_insert`/`can_replace` or the state accessors first.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("node is disposed: {0}")]
    Disposed(NodeId),

    #[error("node is frozen: {0}")]
    Frozen(NodeId),

    #[error("node is immutable: {0}")]
    Immutable(NodeId),

    #[error("node is locked: {0}")]
    Locked(NodeId),

    #[error("required argument is empty: {0}")]
    NullArgument(&'static str),

    #[error("invalid structural change at {node}: {reason}")]
    StructuralInvalid {
        node: NodeId,
        reason: StructuralReason,
    },

    #[error("index {index} out of range for collection of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("end_update without matching begin_update on {0}")]
    TransactionMisuse(NodeId),
}

impl DomainError {
    pub(crate) fn structural(node: NodeId, reason: StructuralReason) -> Self {
        Self::StructuralInvalid { node, reason }
    }

    /// The structural reason, if this is a `StructuralInvalid` error.
    pub fn reason(&self) -> Option<StructuralReason> {
        match self {
            DomainError::StructuralInvalid { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Result type for tree operations.
pub type NodeResult<T> = Result<T, DomainError>;
