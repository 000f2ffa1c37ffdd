//! Loading document outlines from TOML files

use std::fs;
use std::path::Path;

use tracing::{debug, instrument};

use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::config::Settings;
use crate::domain::{BuiltDocument, DocumentBuilder, NodeArena, Outline};

/// Read and parse an outline file.
#[instrument(level = "debug")]
pub fn load_outline(path: &Path) -> ApplicationResult<Outline> {
    let content = fs::read_to_string(path).with_path_context("read outline", path)?;
    let outline: Outline = toml::from_str(&content).map_err(|e| ApplicationError::Outline {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    debug!("loaded outline with {} page(s)", outline.pages.len());
    Ok(outline)
}

/// Builder over an arena configured from `settings`.
pub fn document_builder(settings: &Settings) -> DocumentBuilder {
    DocumentBuilder::new(NodeArena::from_settings(settings))
}

/// Load the outline at `path` and build it into a fresh arena.
pub fn build_document(path: &Path, settings: &Settings) -> ApplicationResult<BuiltDocument> {
    let outline = load_outline(path)?;
    Ok(document_builder(settings).build(&outline)?)
}
