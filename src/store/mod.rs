//! Content-addressable persistence of per-file result blobs.
//!
//! Every blob is serialized to canonical JSON (UTF-8, sorted keys, compact separators, no
//! trailing newline), digested with sha256, gzip-compressed and written to
//! `objects/<aa>/<rest>.json.gz`, where `aa` is the first two hex digits of the digest. Blob and
//! manifest writes go through a temp file plus rename, so a crashed run never leaves a partial
//! object behind, and writing an already-present digest is a no-op — re-running an index over
//! unchanged sources touches nothing.
//!
//! A per-commit manifest maps module names to digests. Housekeeping works off the manifests:
//! [`ContentStore::prune`] deletes every blob no manifest references, and
//! [`ContentStore::trim`] keeps only the most recent manifests. A successful run writes its
//! manifest before pruning so the new blobs are always protected.

use crate::{
    config::Config,
    error::{IndexerError, Result},
    utils,
};
use flate2::{write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest as _, Sha256};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::SystemTime,
};

pub mod retriever;
pub use retriever::Retriever;

/// Hex digest of a blob's canonical JSON bytes.
pub type Digest = String;

/// Sentinel digest recorded in a manifest for modules whose task failed; never the address of an
/// actual blob.
pub const ERROR_SENTINEL: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

const BLOB_SUFFIX: &str = ".json.gz";

/// Per-commit manifest: module name to blob digest, with an error side-table for modules that
/// failed indexing (those carry [`ERROR_SENTINEL`] in `modules`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub modules: BTreeMap<String, Digest>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
}

impl Manifest {
    /// Module names with a real blob, i.e. everything except error sentinels.
    pub fn stored_modules(&self) -> impl Iterator<Item = (&str, &str)> {
        self.modules
            .iter()
            .filter(|(_, digest)| digest.as_str() != ERROR_SENTINEL)
            .map(|(name, digest)| (name.as_str(), digest.as_str()))
    }
}

/// Handle on the on-disk object and manifest tree.
#[derive(Clone, Debug)]
pub struct ContentStore {
    objects_dir: PathBuf,
    manifests_dir: PathBuf,
}

impl ContentStore {
    /// Opens the store, creating both directories if needed.
    pub fn open(objects_dir: impl Into<PathBuf>, manifests_dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { objects_dir: objects_dir.into(), manifests_dir: manifests_dir.into() };
        fs::create_dir_all(&store.objects_dir)
            .map_err(|err| IndexerError::io(err, &store.objects_dir))?;
        fs::create_dir_all(&store.manifests_dir)
            .map_err(|err| IndexerError::io(err, &store.manifests_dir))?;
        Ok(store)
    }

    /// Opens the store at the locations the config names under `repo_root`.
    pub fn from_config(config: &Config, repo_root: &Path) -> Result<Self> {
        Self::open(config.objects_dir(repo_root), config.manifests_dir(repo_root))
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    pub fn manifests_dir(&self) -> &Path {
        &self.manifests_dir
    }

    /// Canonical JSON bytes of a blob: UTF-8, sorted keys, `","`/`":"` separators, no trailing
    /// newline.
    pub fn canonical_json(blob: &Value) -> Result<Vec<u8>> {
        // serde_json objects are BTreeMap-backed, so compact serialization is already canonical
        serde_json::to_vec(blob).map_err(Into::into)
    }

    /// Content digest of a blob, without writing anything.
    pub fn digest(blob: &Value) -> Result<Digest> {
        Ok(hex::encode(Sha256::digest(Self::canonical_json(blob)?)))
    }

    /// Path a digest's blob lives at.
    pub fn blob_path(&self, digest: &str) -> PathBuf {
        self.objects_dir.join(&digest[..2]).join(format!("{}{BLOB_SUFFIX}", &digest[2..]))
    }

    /// Path of the manifest for `commit`.
    pub fn manifest_path(&self, commit: &str) -> PathBuf {
        self.manifests_dir.join(format!("{commit}.json"))
    }

    /// Stores the blob under its content digest and returns the digest. Storing an
    /// already-present blob is a no-op.
    pub fn put(&self, blob: &Value) -> Result<Digest> {
        let data = Self::canonical_json(blob)?;
        let digest = hex::encode(Sha256::digest(&data));
        let path = self.blob_path(&digest);
        if path.exists() {
            trace!("blob {digest} already stored");
            return Ok(digest);
        }
        utils::create_parent_dir_all(&path)?;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&data).map_err(|err| IndexerError::io(err, &path))?;
        let compressed = encoder.finish().map_err(|err| IndexerError::io(err, &path))?;
        utils::write_atomic(&compressed, &path)?;
        trace!("stored blob {digest} ({} bytes compressed)", compressed.len());
        Ok(digest)
    }

    /// Atomically writes the manifest for `commit`.
    pub fn commit_manifest(&self, commit: &str, manifest: &Manifest) -> Result<()> {
        let path = self.manifest_path(commit);
        trace!(
            "writing manifest for {commit} with {} modules to \"{}\"",
            manifest.modules.len(),
            path.display()
        );
        utils::write_json_file(manifest, &path)
    }

    /// Digests referenced by any manifest currently on disk. Unreadable manifests are skipped.
    fn referenced_digests(&self) -> Result<BTreeSet<Digest>> {
        let mut referenced = BTreeSet::new();
        for entry in self.manifest_files()? {
            match utils::read_json_file::<Manifest>(&entry) {
                Ok(manifest) => {
                    referenced
                        .extend(manifest.stored_modules().map(|(_, digest)| digest.to_string()));
                }
                Err(err) => debug!("skipping unreadable manifest \"{}\": {err}", entry.display()),
            }
        }
        Ok(referenced)
    }

    /// Deletes every blob not referenced by any manifest, then any emptied prefix directory.
    /// Returns the number of blobs removed.
    pub fn prune(&self) -> Result<usize> {
        let referenced = self.referenced_digests()?;
        let mut removed = 0usize;

        let entries =
            fs::read_dir(&self.objects_dir).map_err(|err| IndexerError::io(err, &self.objects_dir))?;
        for entry in entries {
            let prefix = entry.map_err(|err| IndexerError::io(err, &self.objects_dir))?.path();
            let Some(prefix_name) = prefix.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if !prefix.is_dir() || prefix_name.len() != 2 {
                continue;
            }
            let blobs = fs::read_dir(&prefix).map_err(|err| IndexerError::io(err, &prefix))?;
            for blob in blobs {
                let blob = blob.map_err(|err| IndexerError::io(err, &prefix))?.path();
                let Some(name) = blob.file_name().and_then(|name| name.to_str()) else { continue };
                let Some(tail) = name.strip_suffix(BLOB_SUFFIX) else { continue };
                let digest = format!("{prefix_name}{tail}");
                if !referenced.contains(&digest) {
                    trace!("pruning unreferenced blob {digest}");
                    fs::remove_file(&blob).map_err(|err| IndexerError::io(err, &blob))?;
                    removed += 1;
                }
            }
            let is_empty = fs::read_dir(&prefix)
                .map_err(|err| IndexerError::io(err, &prefix))?
                .next()
                .is_none();
            if is_empty {
                fs::remove_dir(&prefix).map_err(|err| IndexerError::io(err, &prefix))?;
            }
        }
        debug!("pruned {removed} unreferenced blobs");
        Ok(removed)
    }

    /// Keeps only the `keep` most recently modified manifests; returns how many were deleted.
    pub fn trim(&self, keep: usize) -> Result<usize> {
        let mut manifests: Vec<(SystemTime, PathBuf)> = Vec::new();
        for path in self.manifest_files()? {
            let modified = fs::metadata(&path)
                .and_then(|meta| meta.modified())
                .map_err(|err| IndexerError::io(err, &path))?;
            manifests.push((modified, path));
        }
        // newest first; equal timestamps fall back to path order so the outcome is reproducible
        manifests.sort_by(|a, b| b.cmp(a));

        let mut removed = 0usize;
        for (_, path) in manifests.into_iter().skip(keep) {
            trace!("trimming manifest \"{}\"", path.display());
            fs::remove_file(&path).map_err(|err| IndexerError::io(err, &path))?;
            removed += 1;
        }
        Ok(removed)
    }

    fn manifest_files(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.manifests_dir)
            .map_err(|err| IndexerError::io(err, &self.manifests_dir))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|err| IndexerError::io(err, &self.manifests_dir))?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn store() -> (tempfile::TempDir, ContentStore) {
        let dir = tempfile::tempdir().unwrap();
        let store =
            ContentStore::open(dir.path().join("objects"), dir.path().join("manifests")).unwrap();
        (dir, store)
    }

    fn blob(n: u64) -> Value {
        json!({ "module": format!("/repo/m{n}.py"), "value": n })
    }

    #[test]
    fn canonical_json_sorts_keys_and_stays_compact() {
        let value: Value = serde_json::from_str(r#"{ "z": 1, "a": { "y": 2, "b": [1, 2] } }"#).unwrap();
        let bytes = ContentStore::canonical_json(&value).unwrap();
        assert_eq!(bytes, br#"{"a":{"b":[1,2],"y":2},"z":1}"#.to_vec());
    }

    #[test]
    fn put_is_idempotent() {
        let (_dir, store) = store();
        let first = store.put(&blob(1)).unwrap();
        let mtime = fs::metadata(store.blob_path(&first)).unwrap().modified().unwrap();
        let second = store.put(&blob(1)).unwrap();
        assert_eq!(first, second);
        // the existing object was not rewritten
        assert_eq!(fs::metadata(store.blob_path(&first)).unwrap().modified().unwrap(), mtime);
    }

    #[test]
    fn equal_content_shares_one_blob() {
        let (_dir, store) = store();
        let a = store.put(&json!({ "k": 1, "j": 2 })).unwrap();
        let b = store.put(&serde_json::from_str(r#"{ "j": 2, "k": 1 }"#).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn manifest_roundtrip() {
        let (_dir, store) = store();
        let digest = store.put(&blob(1)).unwrap();
        let mut manifest = Manifest::default();
        manifest.modules.insert("pkg.m1".to_string(), digest);
        manifest.modules.insert("pkg.broken".to_string(), ERROR_SENTINEL.to_string());
        manifest.errors.insert("pkg.broken".to_string(), "task failed".to_string());
        store.commit_manifest("abc123", &manifest).unwrap();

        let read: Manifest = utils::read_json_file(&store.manifest_path("abc123")).unwrap();
        assert_eq!(read, manifest);
        assert_eq!(read.stored_modules().count(), 1);
    }

    #[test]
    fn prune_keeps_only_referenced_blobs() {
        let (_dir, store) = store();
        let kept = store.put(&blob(1)).unwrap();
        let dropped = store.put(&blob(2)).unwrap();

        let mut manifest = Manifest::default();
        manifest.modules.insert("m1".to_string(), kept.clone());
        manifest.modules.insert("broken".to_string(), ERROR_SENTINEL.to_string());
        store.commit_manifest("head", &manifest).unwrap();

        let removed = store.prune().unwrap();
        assert_eq!(removed, 1);
        assert!(store.blob_path(&kept).exists());
        assert!(!store.blob_path(&dropped).exists());
    }

    #[test]
    fn prune_on_empty_manifest_dir_clears_objects() {
        let (_dir, store) = store();
        let digest = store.put(&blob(1)).unwrap();
        assert_eq!(store.prune().unwrap(), 1);
        assert!(!store.blob_path(&digest).exists());
        // the emptied prefix directory is gone too
        assert!(!store.blob_path(&digest).parent().unwrap().exists());
    }

    #[test]
    fn trim_keeps_most_recent_manifests() {
        let (_dir, store) = store();
        for (i, commit) in ["one", "two", "three"].iter().enumerate() {
            store.commit_manifest(commit, &Manifest::default()).unwrap();
            // stagger mtimes so recency is unambiguous
            let time = fs::metadata(store.manifest_path(commit)).unwrap().modified().unwrap();
            let bumped = time + std::time::Duration::from_secs(i as u64 + 1);
            let file = fs::File::options()
                .write(true)
                .open(store.manifest_path(commit))
                .unwrap();
            file.set_times(fs::FileTimes::new().set_modified(bumped)).unwrap();
        }

        assert_eq!(store.trim(2).unwrap(), 1);
        assert!(!store.manifest_path("one").exists());
        assert!(store.manifest_path("two").exists());
        assert!(store.manifest_path("three").exists());
    }
}
