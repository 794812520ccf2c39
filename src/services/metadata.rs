//! Metadata JSON: the terminal record written beside every Task's artifact (§6).

use std::path::Path;

use serde::Serialize;
use serde_json::Value;

/// The core's own fields, merged with the provider's normalized/raw response
/// before being written to `<base>.json` (§4.6, §6).
#[derive(Debug, Clone, Serialize)]
pub struct TaskMetadata {
    pub full_prompt: String,
    pub local_task_id: String,
    pub source_file: String,
    pub segment_index: i64,
    pub version_index: u32,
    pub local_status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_status: Option<String>,
    #[serde(flatten)]
    pub provider: Value,
}

/// Serialize `metadata` and write it atomically: `*.tmp` sibling, then
/// rename on success (§6, §9 — the rename is the commit point).
///
/// # Errors
/// Propagates any I/O failure from writing the temp file, syncing, or
/// renaming it into place.
pub fn write_metadata_atomic(path: &Path, metadata: &TaskMetadata) -> std::io::Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    let body = serde_json::to_vec_pretty(metadata).expect("TaskMetadata always serializes");
    std::fs::write(&tmp_path, body)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
