use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::config::RecordingConfig;

/// Deletes leftover artifact WAVs per the retention policy
///
/// Artifacts are normally deleted as soon as their transcription
/// finishes; this sweep catches files orphaned by crashes or force
/// resets. Files older than `retention_days` or beyond `max_count`
/// are removed. Returns the number of files deleted.
///
/// # Errors
/// Returns error if the directory listing fails. Individual deletion
/// failures are logged and skipped.
pub fn cleanup_old_recordings(dir: &Path, config: &RecordingConfig) -> Result<usize> {
    if !dir.exists() {
        debug!("recordings directory does not exist, skipping cleanup");
        return Ok(0);
    }

    // Collect artifact files with their millisecond timestamps
    let mut recordings: Vec<(PathBuf, u128)> = fs::read_dir(dir)
        .context("failed to read recordings directory")?
        .filter_map(std::result::Result::ok)
        .filter_map(|entry| {
            let path = entry.path();
            if !path.is_file() {
                return None;
            }

            let filename = path.file_name()?.to_str()?;
            let timestamp: u128 = filename
                .strip_prefix("recording_")?
                .strip_suffix(".wav")?
                .parse()
                .ok()?;

            Some((path, timestamp))
        })
        .collect();

    if recordings.is_empty() {
        debug!("no recordings found, skipping cleanup");
        return Ok(0);
    }

    // Newest first
    recordings.sort_by(|a, b| b.1.cmp(&a.1));

    let mut to_delete = HashSet::new();

    if config.retention_days > 0 {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("failed to get current time")?
            .as_millis();
        let retention_ms = u128::from(config.retention_days) * 24 * 60 * 60 * 1000;

        for (path, timestamp) in &recordings {
            if now_ms.saturating_sub(*timestamp) > retention_ms {
                to_delete.insert(path.clone());
            }
        }
    }

    if config.max_count > 0 && recordings.len() > config.max_count {
        for (path, _) in recordings.iter().skip(config.max_count) {
            to_delete.insert(path.clone());
        }
    }

    let mut deleted_count = 0;
    for path in to_delete {
        match fs::remove_file(&path) {
            Ok(()) => {
                deleted_count += 1;
                debug!("deleted recording: {}", path.display());
            }
            Err(e) => {
                warn!("failed to delete {}: {}", path.display(), e);
            }
        }
    }

    if deleted_count > 0 {
        debug!(
            "cleanup complete: deleted {} of {} recordings",
            deleted_count,
            recordings.len()
        );
    }

    Ok(deleted_count)
}
