//! Per-target-file backup and hash bookkeeping. This store is what turns
//! "patch this file" into an idempotent operation: every repatch is computed
//! from the immutable backed-up original, never from the live file, and the
//! recorded digest of the last committed patch detects out-of-band drift
//! before anything is overwritten.
//!
//! Layout under `<target_root>/widepatch-data/`:
//! backups mirror the target's relative paths, hash records append `.sha256`,
//! and the optional pristine-document cache appends `.json`.

use std::fs;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{PatchError, Result};
use crate::sjson;

pub const DATA_DIR_NAME: &str = "widepatch-data";
const BACKUP_DIR: &str = "backups";
const HASH_DIR: &str = "hashes";
const CACHE_DIR: &str = "sjson-cache";
const HASH_EXTENSION: &str = "sha256";
const CACHE_EXTENSION: &str = "json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// No hash record: the tool has never touched this file.
    Pristine,
    /// The live file matches the recorded post-patch digest; repatching from
    /// the backup is safe.
    SafeToRepatch,
    /// The live file was modified by something else since the last patch.
    Drifted,
}

pub struct SafetyStore {
    target_root: PathBuf,
    data_dir: PathBuf,
}

impl SafetyStore {
    pub fn new(target_root: &Path) -> Self {
        Self {
            target_root: target_root.to_path_buf(),
            data_dir: target_root.join(DATA_DIR_NAME),
        }
    }

    pub fn live_path(&self, rel: &Path) -> PathBuf {
        self.target_root.join(rel)
    }

    fn backup_path(&self, rel: &Path) -> PathBuf {
        self.data_dir.join(BACKUP_DIR).join(rel)
    }

    fn hash_path(&self, rel: &Path) -> PathBuf {
        append_extension(self.data_dir.join(HASH_DIR).join(rel), HASH_EXTENSION)
    }

    fn cache_path(&self, rel: &Path) -> PathBuf {
        append_extension(self.data_dir.join(CACHE_DIR).join(rel), CACHE_EXTENSION)
    }

    pub fn digest_bytes(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    /// Digest a file without loading it through the heap; engine binaries
    /// run to tens of megabytes.
    pub fn digest_file(path: &Path) -> Result<String> {
        let file = fs::File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(Self::digest_bytes(&[]));
        }
        // SAFETY: read-only mapping; the single-invocation usage model means
        // nothing truncates the file while the mapping is live.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self::digest_bytes(&mmap))
    }

    pub fn check(&self, rel: &Path) -> Result<FileState> {
        let hash_path = self.hash_path(rel);
        if !hash_path.exists() {
            return Ok(FileState::Pristine);
        }
        let stored = fs::read_to_string(&hash_path)?.trim().to_string();
        let current = Self::digest_file(&self.live_path(rel))?;
        if stored == current {
            Ok(FileState::SafeToRepatch)
        } else {
            Ok(FileState::Drifted)
        }
    }

    /// Return the bytes every patch must be computed from. Never the live
    /// file once a patch has been committed: repatching from patched output
    /// would compound the recomputed offsets.
    pub fn acquire_original(&self, rel: &Path, force: bool) -> Result<Vec<u8>> {
        match self.check(rel)? {
            FileState::Pristine => self.backup_live(rel),
            FileState::SafeToRepatch => {
                log::debug!(
                    "hash match for '{}', repatching from backup",
                    rel.display()
                );
                let backup = self.backup_path(rel);
                if !backup.exists() {
                    return Err(PatchError::BackupMissing(backup));
                }
                Ok(fs::read(backup)?)
            }
            FileState::Drifted => {
                if !force {
                    return Err(PatchError::HashMismatch {
                        file: self.live_path(rel),
                    });
                }
                log::info!(
                    "'{}' drifted, discarding stale backup due to --force",
                    rel.display()
                );
                self.forget(rel)?;
                self.backup_live(rel)
            }
        }
    }

    fn backup_live(&self, rel: &Path) -> Result<Vec<u8>> {
        let backup = self.backup_path(rel);
        if backup.exists() {
            return Err(PatchError::AlreadyBackedUp(backup));
        }
        let bytes = fs::read(self.live_path(rel))?;
        if let Some(parent) = backup.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&backup, &bytes)?;
        log::debug!("backed up '{}' to '{}'", rel.display(), backup.display());
        Ok(bytes)
    }

    /// Write the patched bytes over the live file, then record their digest
    /// as the file's last-known-good patched state.
    pub fn commit(&self, rel: &Path, bytes: &[u8]) -> Result<()> {
        fs::write(self.live_path(rel), bytes)?;
        let hash_path = self.hash_path(rel);
        if let Some(parent) = hash_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&hash_path, Self::digest_bytes(bytes))?;
        log::debug!("committed '{}' and stored its digest", rel.display());
        Ok(())
    }

    /// Invariant repair after a failed patch: a backup without a hash record
    /// means acquire succeeded but commit never ran. Drop the orphan backup
    /// (and cache entry) so the backup-iff-patched invariant holds on the
    /// next run.
    pub fn abandon(&self, rel: &Path) -> Result<()> {
        if self.hash_path(rel).exists() {
            return Ok(());
        }
        let backup = self.backup_path(rel);
        if backup.exists() {
            fs::remove_file(&backup)?;
            remove_if_exists(&self.cache_path(rel))?;
            log::debug!(
                "abandoned orphan backup for '{}' after failed patch",
                rel.display()
            );
        }
        Ok(())
    }

    fn forget(&self, rel: &Path) -> Result<()> {
        remove_if_exists(&self.backup_path(rel))?;
        remove_if_exists(&self.hash_path(rel))?;
        remove_if_exists(&self.cache_path(rel))?;
        Ok(())
    }

    /// Copy the backup over the live file and drop all records for it.
    /// Non-fatal no-op when there is nothing to restore.
    pub fn restore_file(&self, rel: &Path) -> Result<bool> {
        let backup = self.backup_path(rel);
        if !backup.exists() {
            log::debug!("no backup for '{}', nothing to restore", rel.display());
            return Ok(false);
        }
        let live = self.live_path(rel);
        if let Some(parent) = live.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&backup, &live)?;
        self.forget(rel)?;
        log::info!("restored '{}' from backup", rel.display());
        Ok(true)
    }

    /// Restore every backed-up file, then clean the store directories out.
    pub fn restore_all(&self) -> Result<usize> {
        let backup_root = self.data_dir.join(BACKUP_DIR);
        if !backup_root.exists() {
            return Ok(0);
        }
        let mut rels = Vec::new();
        for entry in WalkDir::new(&backup_root) {
            let entry = entry.map_err(|e| {
                PatchError::Io(e.into_io_error().unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::Other, "walkdir error")
                }))
            })?;
            if entry.file_type().is_file() {
                match entry.path().strip_prefix(&backup_root) {
                    Ok(rel) => rels.push(rel.to_path_buf()),
                    Err(e) => {
                        return Err(PatchError::Io(std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            format!("backup entry outside backup root: {e}"),
                        )))
                    }
                }
            }
        }
        let mut restored = 0;
        for rel in rels {
            if self.restore_file(&rel)? {
                restored += 1;
            }
        }
        self.discard_all()?;
        Ok(restored)
    }

    /// Wipe all backup/hash/cache state for every tracked file.
    pub fn discard_all(&self) -> Result<()> {
        for dir in [BACKUP_DIR, HASH_DIR, CACHE_DIR] {
            let path = self.data_dir.join(dir);
            match fs::remove_dir_all(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        // Drop the data dir itself once empty.
        let _ = fs::remove_dir(&self.data_dir);
        Ok(())
    }

    /// Parsed pristine copy of a structured document, stored to skip
    /// re-parsing the slow text format on repatch. Invalidated exactly like
    /// the backup. A corrupt cache entry is treated as absent.
    pub fn cached_document(&self, rel: &Path) -> Result<Option<sjson::Value>> {
        let path = self.cache_path(rel);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        match serde_json::from_str(&text) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                log::warn!(
                    "discarding corrupt document cache '{}': {}",
                    path.display(),
                    e
                );
                remove_if_exists(&path)?;
                Ok(None)
            }
        }
    }

    pub fn cache_document(&self, rel: &Path, value: &sjson::Value) -> Result<()> {
        let path = self.cache_path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string(value).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e)
        })?;
        fs::write(&path, text)?;
        log::debug!("cached parsed document for '{}'", rel.display());
        Ok(())
    }
}

fn append_extension(mut path: PathBuf, extension: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.set_file_name(format!("{name}.{extension}"));
    path
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_with_file(content: &[u8]) -> (TempDir, SafetyStore, PathBuf) {
        let root = TempDir::new().unwrap();
        let rel = PathBuf::from("bin/engine.dll");
        let live = root.path().join(&rel);
        fs::create_dir_all(live.parent().unwrap()).unwrap();
        fs::write(&live, content).unwrap();
        let store = SafetyStore::new(root.path());
        (root, store, rel)
    }

    #[test]
    fn untracked_file_is_pristine() {
        let (_root, store, rel) = store_with_file(b"original");
        assert_eq!(store.check(&rel).unwrap(), FileState::Pristine);
    }

    #[test]
    fn acquire_backs_up_then_serves_backup_on_repatch() {
        let (_root, store, rel) = store_with_file(b"original");
        assert_eq!(store.acquire_original(&rel, false).unwrap(), b"original");
        store.commit(&rel, b"patched").unwrap();
        assert_eq!(store.check(&rel).unwrap(), FileState::SafeToRepatch);
        // The patch basis is the backup, never the (patched) live file.
        assert_eq!(store.acquire_original(&rel, false).unwrap(), b"original");
    }

    #[test]
    fn out_of_band_edit_is_drift_and_blocks_acquire() {
        let (root, store, rel) = store_with_file(b"original");
        store.acquire_original(&rel, false).unwrap();
        store.commit(&rel, b"patched").unwrap();
        fs::write(root.path().join(&rel), b"updated by the game").unwrap();
        assert_eq!(store.check(&rel).unwrap(), FileState::Drifted);
        assert!(matches!(
            store.acquire_original(&rel, false),
            Err(PatchError::HashMismatch { .. })
        ));
    }

    #[test]
    fn force_discards_stale_state_and_rebackups_from_live() {
        let (root, store, rel) = store_with_file(b"original");
        store.acquire_original(&rel, false).unwrap();
        store.commit(&rel, b"patched").unwrap();
        fs::write(root.path().join(&rel), b"updated").unwrap();
        assert_eq!(store.acquire_original(&rel, true).unwrap(), b"updated");
        // The new backup is the updated content.
        store.commit(&rel, b"repatched").unwrap();
        assert_eq!(store.acquire_original(&rel, false).unwrap(), b"updated");
    }

    #[test]
    fn stray_backup_is_an_internal_consistency_error() {
        let (root, store, rel) = store_with_file(b"original");
        let stray = root
            .path()
            .join(DATA_DIR_NAME)
            .join(BACKUP_DIR)
            .join(&rel);
        fs::create_dir_all(stray.parent().unwrap()).unwrap();
        fs::write(&stray, b"who wrote this").unwrap();
        assert!(matches!(
            store.acquire_original(&rel, false),
            Err(PatchError::AlreadyBackedUp(_))
        ));
    }

    #[test]
    fn abandon_removes_orphan_backup_only() {
        let (_root, store, rel) = store_with_file(b"original");
        store.acquire_original(&rel, false).unwrap();
        // Patch failed before commit: abandon must clear the backup.
        store.abandon(&rel).unwrap();
        assert_eq!(store.check(&rel).unwrap(), FileState::Pristine);
        assert_eq!(store.acquire_original(&rel, false).unwrap(), b"original");
        store.commit(&rel, b"patched").unwrap();
        // After a successful commit, abandon is a no-op.
        store.abandon(&rel).unwrap();
        assert_eq!(store.check(&rel).unwrap(), FileState::SafeToRepatch);
    }

    #[test]
    fn restore_round_trips_pristine_bytes() {
        let (root, store, rel) = store_with_file(b"original");
        store.acquire_original(&rel, false).unwrap();
        store.commit(&rel, b"patched").unwrap();
        assert_eq!(store.restore_all().unwrap(), 1);
        assert_eq!(fs::read(root.path().join(&rel)).unwrap(), b"original");
        assert_eq!(store.check(&rel).unwrap(), FileState::Pristine);
        assert!(!root.path().join(DATA_DIR_NAME).exists());
        // Restoring again is a no-op, not an error.
        assert_eq!(store.restore_all().unwrap(), 0);
    }

    #[test]
    fn document_cache_round_trips_and_forgets_with_force() {
        let (_root, store, rel) = store_with_file(b"X = 1\n");
        let doc = sjson::parse("X = 1\n").unwrap();
        assert!(store.cached_document(&rel).unwrap().is_none());
        store.cache_document(&rel, &doc).unwrap();
        assert_eq!(store.cached_document(&rel).unwrap(), Some(doc));
        store.acquire_original(&rel, false).unwrap();
        store.commit(&rel, b"X = 2\n").unwrap();
        // Drift + force wipes the cache together with the backup.
        fs::write(store.live_path(&rel), b"X = 3\n").unwrap();
        store.acquire_original(&rel, true).unwrap();
        assert!(store.cached_document(&rel).unwrap().is_none());
    }
}
