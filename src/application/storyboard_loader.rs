//! Storyboard ingestion: read a local JSON file into a validated
//! [`Storyboard`] (§1 "storyboards are read from a local JSON file path").
//!
//! The richer ingestion pipeline (upload handling, reference-image
//! object-storage, interactive wizards) is out of scope (§1); this module
//! is the thin boundary the CLI needs to hand a `Storyboard` to the Run
//! Manager.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::errors::DomainError;
use crate::domain::models::storyboard::{Segment, Storyboard};

/// Errors raised while reading or parsing a storyboard file.
#[derive(Debug, Error)]
pub enum StoryboardLoadError {
    #[error("failed to read storyboard file '{path}': {source}")]
    Io { path: String, #[source] source: std::io::Error },
    #[error("failed to parse storyboard file '{path}': {source}")]
    Parse { path: String, #[source] source: serde_json::Error },
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// On-disk shape of a storyboard file: a name plus the ordered segments.
/// `Segment` itself derives `Deserialize` directly (§3), so this wrapper
/// only needs to carry the storyboard-level `name`.
#[derive(Debug, Deserialize)]
struct StoryboardFile {
    name: String,
    segments: Vec<Segment>,
}

/// Read and validate the storyboard at `path`, returning a ready-to-submit
/// [`Storyboard`] (§1, §3).
///
/// # Errors
/// Returns [`StoryboardLoadError::Io`] if the file cannot be read,
/// [`StoryboardLoadError::Parse`] if it is not well-formed JSON matching the
/// expected shape, or [`StoryboardLoadError::Domain`] if the parsed segments
/// fail `Storyboard::new`'s invariants (empty storyboard, duplicate segment
/// index, invalid duration, or empty prompt).
pub fn load_storyboard_file(path: impl AsRef<Path>) -> Result<Storyboard, StoryboardLoadError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| StoryboardLoadError::Io { path: path.display().to_string(), source })?;
    let parsed: StoryboardFile = serde_json::from_str(&raw).map_err(|source| StoryboardLoadError::Parse { path: path.display().to_string(), source })?;
    let storyboard = Storyboard::new(parsed.name, path.to_path_buf(), parsed.segments)?;
    Ok(storyboard)
}
