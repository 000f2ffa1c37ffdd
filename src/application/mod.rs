//! Application layer: use cases over the node tree
//!
//! This layer owns file I/O and hands parsed input to the domain.

pub mod error;
pub mod error_ext;
pub mod outline;

pub use error::{ApplicationError, ApplicationResult};
pub use error_ext::IoResultExt;
pub use outline::{build_document, document_builder, load_outline};
