// =============================================================================
// Artifacts — timestamped JSON documents under the workspace
// =============================================================================
//
// Layout: `<workspace>/<category>/<prefix>_<YYYYMMDDTHHMMSSZ>.json`.
// Writes are tmp + rename so readers never see a partial document.  The
// timestamp sorts lexically, so the newest artifact is the last name.
// =============================================================================

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

pub fn artifact_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Write `payload` as pretty JSON and return the final path.
pub fn write_artifact<T: Serialize>(
    workspace: &Path,
    category: &str,
    prefix: &str,
    stamp: &str,
    payload: &T,
) -> Result<PathBuf> {
    let dir = workspace.join(category);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create artifact dir {}", dir.display()))?;

    let path = dir.join(format!("{prefix}_{stamp}.json"));
    let tmp_path = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(payload).context("failed to serialise artifact")?;

    std::fs::write(&tmp_path, json)
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, &path)
        .with_context(|| format!("failed to rename artifact to {}", path.display()))?;
    Ok(path)
}

/// Hex SHA-256 of a file, read in 8 KiB chunks.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Newest `<prefix>_*.json` artifact in a category, if any.
pub fn latest_artifact(workspace: &Path, category: &str, prefix: &str) -> Result<Option<PathBuf>> {
    let dir = workspace.join(category);
    if !dir.is_dir() {
        return Ok(None);
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)
        .with_context(|| format!("failed to list {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().map_or(false, |ext| ext == "json"))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with(&format!("{prefix}_")))
        })
        .collect();
    files.sort();
    Ok(files.pop())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn stamp_is_compact_utc() {
        let at = Utc.with_ymd_and_hms(2026, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(artifact_stamp(at), "20260309T140507Z");
    }

    #[test]
    fn write_then_find_latest() {
        let dir = tempfile::tempdir().unwrap();
        let ws = dir.path();
        assert_eq!(latest_artifact(ws, "calibration", "calibration_state").unwrap(), None);

        write_artifact(ws, "calibration", "calibration_state", "20260101T000000Z", &serde_json::json!({"n": 1})).unwrap();
        let newer = write_artifact(ws, "calibration", "calibration_state", "20260102T000000Z", &serde_json::json!({"n": 2})).unwrap();
        write_artifact(ws, "calibration", "drift_alerts", "20260102T000000Z", &serde_json::json!({"n": 3})).unwrap();

        assert_eq!(latest_artifact(ws, "calibration", "calibration_state").unwrap(), Some(newer.clone()));
        let v: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&newer).unwrap()).unwrap();
        assert_eq!(v["n"], 2);

        let leftovers = std::fs::read_dir(ws.join("calibration"))
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn sha256_of_known_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.txt");
        std::fs::write(&path, "abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
