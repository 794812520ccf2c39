//! Filesystem layout: output directories and artifact filenames (§6).

use std::path::{Path, PathBuf};

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::domain::models::run::OutputLayout;

/// Resolve the output directory for one segment under the given layout.
#[must_use]
pub fn output_dir_for_segment(layout: &OutputLayout, storyboard_id: &str, storyboard_source_path: &Path, segment_index: i64) -> PathBuf {
    match layout {
        OutputLayout::Centralized { output_root } => output_root.join(storyboard_id).join(format!("Segment_{segment_index}")),
        OutputLayout::InPlace => {
            let parent = storyboard_source_path.parent().unwrap_or_else(|| Path::new("."));
            let stem = storyboard_source_path.file_stem().and_then(|s| s.to_str()).unwrap_or("storyboard");
            parent.join(format!("{stem}_assets")).join(format!("Segment_{segment_index}"))
        }
        OutputLayout::Custom { path } => path.join(storyboard_id).join(format!("Segment_{segment_index}")),
    }
}

/// Build the `<segment_index>_v<version_index>_<timestamp>_<4-char-random>_<task_id>`
/// base name (without extension) for one generation attempt (§6).
#[must_use]
pub fn artifact_base_name(segment_index: i64, version_index: u32, timestamp: chrono::DateTime<chrono::Utc>, task_id: &str) -> String {
    let stamp = timestamp.format("%Y%m%d%H%M%S");
    let suffix: String = rand::thread_rng().sample_iter(&Alphanumeric).take(4).map(char::from).collect();
    format!("{segment_index}_v{version_index}_{stamp}_{suffix}_{task_id}")
}

/// Find a non-empty `.mp4` already produced for this (segment, version) in
/// `dir`, ignoring the timestamp/random/task_id suffix (§4.6 step 1
/// pre-flight check): any prior successful attempt satisfies `!force`.
#[must_use]
pub fn find_existing_artifact(dir: &Path, segment_index: i64, version_index: u32) -> Option<PathBuf> {
    let prefix = format!("{segment_index}_v{version_index}_");
    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("mp4") {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
        if !name.starts_with(&prefix) {
            continue;
        }
        if std::fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false) {
            return Some(path);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centralized_layout_nests_by_storyboard_and_segment() {
        let dir = output_dir_for_segment(&OutputLayout::Centralized { output_root: PathBuf::from("/out") }, "sb-1", Path::new("ignored.json"), 3);
        assert_eq!(dir, PathBuf::from("/out/sb-1/Segment_3"));
    }

    #[test]
    fn in_place_layout_derives_assets_dir_from_source_path() {
        let dir = output_dir_for_segment(&OutputLayout::InPlace, "sb-1", Path::new("/story/my_board.json"), 2);
        assert_eq!(dir, PathBuf::from("/story/my_board_assets/Segment_2"));
    }

    #[test]
    fn custom_layout_nests_under_user_path() {
        let dir = output_dir_for_segment(&OutputLayout::Custom { path: PathBuf::from("/custom") }, "sb-1", Path::new("ignored.json"), 1);
        assert_eq!(dir, PathBuf::from("/custom/sb-1/Segment_1"));
    }

    #[test]
    fn artifact_base_name_embeds_segment_version_and_task_id() {
        let name = artifact_base_name(5, 2, chrono::Utc::now(), "task-abc");
        assert!(name.starts_with("5_v2_"));
        assert!(name.ends_with("task-abc"));
    }

    #[test]
    fn find_existing_artifact_requires_non_empty_file() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("1_v1_20260101000000_abcd_t1.mp4"), []).unwrap();
        assert!(find_existing_artifact(tmp.path(), 1, 1).is_none());

        std::fs::write(tmp.path().join("1_v1_20260101000000_abcd_t1.mp4"), b"data").unwrap();
        assert!(find_existing_artifact(tmp.path(), 1, 1).is_some());
    }

    #[test]
    fn find_existing_artifact_ignores_other_versions() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("1_v2_20260101000000_abcd_t1.mp4"), b"data").unwrap();
        assert!(find_existing_artifact(tmp.path(), 1, 1).is_none());
    }
}
