//! Hierarchical node tree for model documents: owned collections, node
//! state, bubbling change events and root-level update transactions.

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod util;
