//! Rehydration of stored blobs and manifests.

use crate::{
    error::{IndexerError, Result},
    store::{ContentStore, Manifest},
    utils,
};
use flate2::read::GzDecoder;
use serde_json::Value;
use sha2::{Digest as _, Sha256};
use std::{collections::BTreeMap, fs, io::Read};

/// Read access to a [`ContentStore`].
///
/// Strict mode (the default) re-hashes the decompressed bytes of every blob read and rejects
/// content that no longer matches its address.
#[derive(Clone, Debug)]
pub struct Retriever {
    store: ContentStore,
    strict: bool,
}

impl Retriever {
    pub fn new(store: ContentStore) -> Self {
        Self { store, strict: true }
    }

    /// Disables digest verification on read.
    pub fn trusting(store: ContentStore) -> Self {
        Self { store, strict: false }
    }

    /// The manifest written for `commit`.
    pub fn load_manifest(&self, commit: &str) -> Result<Manifest> {
        let path = self.store.manifest_path(commit);
        if !path.exists() {
            return Err(IndexerError::ManifestNotFound(commit.to_string()));
        }
        utils::read_json_file(&path)
    }

    /// Decompresses and deserializes the blob stored under `digest`.
    pub fn load_blob(&self, digest: &str) -> Result<Value> {
        let path = self.store.blob_path(digest);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(IndexerError::BlobNotFound(digest.to_string()));
            }
            Err(err) => return Err(IndexerError::io(err, &path)),
        };

        let mut data = Vec::new();
        GzDecoder::new(file)
            .read_to_end(&mut data)
            .map_err(|err| IndexerError::io(err, &path))?;

        if self.strict {
            let actual = hex::encode(Sha256::digest(&data));
            if actual != digest {
                return Err(IndexerError::CorruptBlob { digest: digest.to_string(), actual });
            }
        }
        serde_json::from_slice(&data).map_err(Into::into)
    }

    /// Streams every successfully indexed module of `commit` as `(module name, blob)` pairs,
    /// skipping error sentinels.
    pub fn load_all(
        &self,
        commit: &str,
    ) -> Result<impl Iterator<Item = Result<(String, Value)>> + '_> {
        let manifest = self.load_manifest(commit)?;
        let modules: Vec<(String, String)> = manifest
            .stored_modules()
            .map(|(name, digest)| (name.to_string(), digest.to_string()))
            .collect();
        Ok(modules
            .into_iter()
            .map(move |(name, digest)| self.load_blob(&digest).map(|blob| (name, blob))))
    }

    /// The error side-table recorded for `commit`.
    pub fn load_errors(&self, commit: &str) -> Result<BTreeMap<String, String>> {
        Ok(self.load_manifest(commit)?.errors)
    }
}
