use crate::canonical;
use crate::error::VerificationError;
use crate::manifest::{KeyDocument, VersionManifest};
use base64::{
    alphabet,
    engine::{
        general_purpose::{GeneralPurpose, GeneralPurposeConfig},
        DecodePaddingMode,
    },
    Engine as _,
};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde_json::{Map, Value};
use std::convert::TryInto;

type VerifyResult<T> = std::result::Result<T, VerificationError>;

/// Keys and signatures are exchanged as standard base64; the reference
/// publisher omits padding, so both forms are accepted.
pub(crate) const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const REQUIRED_FIELDS: [&str; 2] = ["updates", "latest"];

/// Parse a base64 encoded Ed25519 public key.
pub fn decode_verifying_key(encoded: &str) -> VerifyResult<VerifyingKey> {
    let raw = BASE64
        .decode(encoded.trim())
        .map_err(|err| VerificationError::InvalidKey(err.to_string()))?;
    let bytes: [u8; 32] = raw
        .try_into()
        .map_err(|_| VerificationError::InvalidKey("public key must be 32 bytes".into()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|err| VerificationError::InvalidKey(err.to_string()))
}

/// Render a public key the way it is stored in key documents.
pub fn encode_verifying_key(key: &VerifyingKey) -> String {
    BASE64.encode(key.as_bytes())
}

fn decode_signature(encoded: &str) -> VerifyResult<Signature> {
    let raw = BASE64
        .decode(encoded.trim())
        .map_err(|err| VerificationError::InvalidSignatureEncoding(err.to_string()))?;
    let bytes: [u8; 64] = raw.try_into().map_err(|_| {
        VerificationError::InvalidSignatureEncoding("signature must be 64 bytes".into())
    })?;
    Ok(Signature::from_bytes(&bytes))
}

fn parse_object(bytes: &[u8]) -> VerifyResult<Map<String, Value>> {
    match serde_json::from_slice(bytes) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(VerificationError::MalformedJson(
            "manifest must be a JSON object".into(),
        )),
        Err(err) => Err(VerificationError::MalformedJson(err.to_string())),
    }
}

/// Verify a manifest carrying its own `signature` field and decode it.
pub fn verify_manifest(bytes: &[u8], public_key: &VerifyingKey) -> VerifyResult<VersionManifest> {
    let mut object = parse_object(bytes)?;
    let signature = match object.remove("signature") {
        Some(Value::String(signature)) => signature,
        Some(_) => {
            return Err(VerificationError::InvalidSignatureEncoding(
                "signature must be a string".into(),
            ))
        }
        None => return Err(VerificationError::MissingSignature),
    };
    verify_object(object, &signature, public_key)
}

/// Verify a manifest against a signature delivered separately. A `signature`
/// field inside the manifest, if any, is ignored.
pub fn verify_detached(
    bytes: &[u8],
    signature: &str,
    public_key: &VerifyingKey,
) -> VerifyResult<VersionManifest> {
    let mut object = parse_object(bytes)?;
    object.remove("signature");
    verify_object(object, signature, public_key)
}

fn verify_object(
    object: Map<String, Value>,
    signature: &str,
    public_key: &VerifyingKey,
) -> VerifyResult<VersionManifest> {
    let signature = decode_signature(signature)?;
    let payload = Value::Object(object);
    public_key
        .verify(&canonical::to_vec(&payload), &signature)
        .map_err(|_| VerificationError::SignatureMismatch)?;

    // Nothing below runs on unsigned content.
    for field in REQUIRED_FIELDS {
        if payload.get(field).is_none() {
            return Err(VerificationError::MissingField(field));
        }
    }
    let manifest: VersionManifest = serde_json::from_value(payload)
        .map_err(|err| VerificationError::MalformedJson(err.to_string()))?;
    manifest.check_consistency()?;
    Ok(manifest)
}

/// Verify a key document with the root key and return the app key it vouches for.
pub fn verify_key_document(
    document: &KeyDocument,
    root_key: &VerifyingKey,
) -> VerifyResult<VerifyingKey> {
    let signature = decode_signature(&document.signature)?;
    root_key
        .verify(document.app_public.as_bytes(), &signature)
        .map_err(|_| VerificationError::SignatureMismatch)?;
    decode_verifying_key(&document.app_public)
}

/// Holds the trusted root key and verifies manifests fetched from a server.
#[derive(Debug, Clone)]
pub struct ManifestVerifier {
    root_key: VerifyingKey,
}

impl ManifestVerifier {
    pub fn new(root_key: VerifyingKey) -> Self {
        Self { root_key }
    }

    /// Build a verifier from a base64 encoded root key.
    pub fn from_base64(encoded: &str) -> VerifyResult<Self> {
        decode_verifying_key(encoded).map(Self::new)
    }

    pub fn root_key(&self) -> &VerifyingKey {
        &self.root_key
    }

    /// Resolve the key that signs the manifest: the app key from a verified
    /// key document when one is published, the root key otherwise.
    pub fn signing_key(&self, document: Option<&KeyDocument>) -> VerifyResult<VerifyingKey> {
        match document {
            Some(document) => verify_key_document(document, &self.root_key),
            None => Ok(self.root_key),
        }
    }

    /// Verify `manifest_bytes` (with embedded signature) against the key
    /// resolved from `document`.
    pub fn verify(
        &self,
        document: Option<&KeyDocument>,
        manifest_bytes: &[u8],
    ) -> VerifyResult<VersionManifest> {
        let key = self.signing_key(document)?;
        verify_manifest(manifest_bytes, &key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ArtifactInfo;
    use crate::publisher::ManifestPublisher;
    use crate::version::{AppVersion, Channel, Platform};
    use ed25519_dalek::{Signer, SigningKey};
    use serde_json::json;

    fn sample_manifest() -> VersionManifest {
        let mut manifest = VersionManifest::default();
        manifest.insert_release(
            "Demo",
            &AppVersion::stable(0, 0, 2),
            Channel::Stable,
            Platform::Mac,
            ArtifactInfo {
                file_hash: "ab".repeat(32),
                filename: "Demo-mac-0.0.2.tar.gz".into(),
                file_size: 42,
            },
        );
        manifest
    }

    fn key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    #[test]
    fn signed_manifest_verifies_with_matching_key() {
        let signing = key(7);
        let bytes = ManifestPublisher::new(signing.clone(), signing.clone())
            .sign_manifest(&sample_manifest())
            .unwrap();

        let verified = verify_manifest(&bytes, &signing.verifying_key()).unwrap();
        assert_eq!(verified, sample_manifest());
    }

    #[test]
    fn other_key_is_rejected() {
        let bytes = ManifestPublisher::new(key(7), key(7))
            .sign_manifest(&sample_manifest())
            .unwrap();

        assert_eq!(
            verify_manifest(&bytes, &key(8).verifying_key()),
            Err(VerificationError::SignatureMismatch)
        );
    }

    #[test]
    fn tampered_field_is_rejected() {
        let signing = key(3);
        let bytes = ManifestPublisher::new(signing.clone(), signing.clone())
            .sign_manifest(&sample_manifest())
            .unwrap();
        let mut value: Value = serde_json::from_slice(&bytes).unwrap();
        value["updates"]["Demo"]["0.0.2.2.0"]["mac"]["file_size"] = json!(43);
        let tampered = serde_json::to_vec(&value).unwrap();

        assert_eq!(
            verify_manifest(&tampered, &signing.verifying_key()),
            Err(VerificationError::SignatureMismatch)
        );
    }

    #[test]
    fn unknown_fields_are_covered_by_the_signature() {
        let signing = key(4);
        let mut payload = serde_json::to_value(sample_manifest()).unwrap();
        payload["extra"] = json!({"note": "kept"});
        let signature = signing.sign(&canonical::to_vec(&payload));
        let encoded = BASE64.encode(signature.to_bytes());

        let bytes = serde_json::to_vec(&payload).unwrap();
        assert!(verify_detached(&bytes, &encoded, &signing.verifying_key()).is_ok());

        payload["extra"]["note"] = json!("changed");
        let bytes = serde_json::to_vec(&payload).unwrap();
        assert_eq!(
            verify_detached(&bytes, &encoded, &signing.verifying_key()),
            Err(VerificationError::SignatureMismatch)
        );
    }

    #[test]
    fn missing_signature_and_fields_are_reported() {
        let signing = key(5);
        let unsigned = serde_json::to_vec(&sample_manifest()).unwrap();
        assert_eq!(
            verify_manifest(&unsigned, &signing.verifying_key()),
            Err(VerificationError::MissingSignature)
        );

        let payload = json!({"updates": {}});
        let signature = BASE64.encode(signing.sign(&canonical::to_vec(&payload)).to_bytes());
        assert_eq!(
            verify_detached(
                &serde_json::to_vec(&payload).unwrap(),
                &signature,
                &signing.verifying_key()
            ),
            Err(VerificationError::MissingField("latest"))
        );

        assert!(matches!(
            verify_manifest(b"not json", &signing.verifying_key()),
            Err(VerificationError::MalformedJson(_))
        ));
    }

    #[test]
    fn key_document_chain() {
        let root = key(1);
        let app = key(2);
        let publisher = ManifestPublisher::new(root.clone(), app.clone());
        let document = publisher.key_document();
        let verifier = ManifestVerifier::new(root.verifying_key());

        assert_eq!(
            verifier.signing_key(Some(&document)).unwrap(),
            app.verifying_key()
        );
        let bytes = publisher.sign_manifest(&sample_manifest()).unwrap();
        assert!(verifier.verify(Some(&document), &bytes).is_ok());
        // Without the key document the root key is expected to sign directly.
        assert_eq!(
            verifier.verify(None, &bytes),
            Err(VerificationError::SignatureMismatch)
        );

        let forged = ManifestVerifier::new(key(9).verifying_key());
        assert_eq!(
            forged.signing_key(Some(&document)),
            Err(VerificationError::SignatureMismatch)
        );
    }

    #[test]
    fn keys_round_trip_through_base64() {
        let verifying = key(6).verifying_key();
        let encoded = encode_verifying_key(&verifying);
        assert!(!encoded.ends_with('='));
        assert_eq!(decode_verifying_key(&encoded).unwrap(), verifying);
        assert_eq!(
            decode_verifying_key(&format!("{encoded}=")).unwrap(),
            verifying
        );
        assert!(matches!(
            decode_verifying_key("c2hvcnQ"),
            Err(VerificationError::InvalidKey(_))
        ));
    }
}
