use crate::canonical;
use crate::error::Result;
use crate::manifest::{KeyDocument, VersionManifest, KEYS_FILE, VERSIONS_FILE};
use crate::verifier::{encode_verifying_key, BASE64};
use base64::Engine as _;
use ed25519_dalek::{Signer, SigningKey};
use flate2::{write::GzEncoder, Compression};
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Signs version manifests and writes them, with the key document, to a
/// directory served by the file server.
pub struct ManifestPublisher {
    root_key: SigningKey,
    app_key: SigningKey,
}

impl ManifestPublisher {
    /// `root_key` vouches for `app_key`; `app_key` signs manifests.
    pub fn new(root_key: SigningKey, app_key: SigningKey) -> Self {
        Self { root_key, app_key }
    }

    /// Key document binding the app key to the root key.
    pub fn key_document(&self) -> KeyDocument {
        let app_public = encode_verifying_key(&self.app_key.verifying_key());
        let signature = self.root_key.sign(app_public.as_bytes());
        KeyDocument {
            app_public,
            signature: BASE64.encode(signature.to_bytes()),
        }
    }

    /// Canonical JSON of `manifest` with its `signature` field filled in.
    pub fn sign_manifest(&self, manifest: &VersionManifest) -> Result<Vec<u8>> {
        let mut payload = serde_json::to_value(manifest)?;
        let signature = self.app_key.sign(&canonical::to_vec(&payload));
        if let Value::Object(object) = &mut payload {
            object.insert(
                "signature".to_string(),
                Value::String(BASE64.encode(signature.to_bytes())),
            );
        }
        Ok(canonical::to_vec(&payload))
    }

    /// Write `keys.gz` and `versions.gz` into `dir`.
    pub fn publish(&self, dir: &Path, manifest: &VersionManifest) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let keys = serde_json::to_value(self.key_document())?;
        write_gzip(&dir.join(KEYS_FILE), &canonical::to_vec(&keys))?;
        write_gzip(&dir.join(VERSIONS_FILE), &self.sign_manifest(manifest)?)?;
        info!(target: "updater", dir = %dir.display(), "published signed manifest");
        Ok(())
    }
}

fn write_gzip(path: &Path, bytes: &[u8]) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()?.sync_all()?;
    Ok(())
}
