pub mod ledger;
pub mod snapshot;

use crate::error::TrackerError;
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Reads a whole JSON document. A missing file is `Ok(None)`; an unreadable
/// or undecodable one is [`TrackerError::PersistenceCorrupt`].
pub fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(TrackerError::PersistenceCorrupt {
                path: path.to_path_buf(),
                detail: e.to_string(),
            }
            .into())
        }
    };

    serde_json::from_str::<T>(&text).map(Some).map_err(|e| {
        TrackerError::PersistenceCorrupt {
            path: path.to_path_buf(),
            detail: e.to_string(),
        }
        .into()
    })
}

/// Replaces the whole document: write a sibling temp file, fsync, rename.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create state dir {}", dir.display()))?;
    }

    let json = serde_json::to_vec_pretty(value).context("failed to serialize state")?;
    let tmp = path.with_extension("json.tmp");
    {
        let mut f = fs::File::create(&tmp)
            .with_context(|| format!("failed to create {}", tmp.display()))?;
        f.write_all(&json)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        f.sync_all()
            .with_context(|| format!("failed to sync {}", tmp.display()))?;
    }
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let res = read_json::<BTreeMap<String, u32>>(&dir.path().join("absent.json")).unwrap();
        assert!(res.is_none());
    }

    #[test]
    fn garbage_is_persistence_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();
        let err = read_json::<BTreeMap<String, u32>>(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrackerError>(),
            Some(TrackerError::PersistenceCorrupt { .. })
        ));
    }

    #[test]
    fn atomic_write_creates_dirs_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let mut value = BTreeMap::new();
        value.insert("a".to_string(), 1u32);
        write_json_atomic(&path, &value).unwrap();

        let back = read_json::<BTreeMap<String, u32>>(&path).unwrap().unwrap();
        assert_eq!(back, value);
        assert!(!path.with_extension("json.tmp").exists());
    }
}
