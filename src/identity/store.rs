//! Durable persistence of the identity record pair.
//!
//! Two files per node: `identity_public.json` (shareable) and
//! `identity.json` (confidential, owner-only permissions). Each file is
//! written to a temp file in the output directory and atomically renamed
//! over the target, so a crash mid-write can never leave a partial record.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Shareable record file name.
pub const PUBLIC_FILE_NAME: &str = "identity_public.json";
/// Confidential record file name.
pub const PRIVATE_FILE_NAME: &str = "identity.json";

const ALGORITHM: &str = "Ed25519";
const PRIVATE_KEY_WARNING: &str = "NEVER share this file. NEVER commit it to git.";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{field} must be {expected} bytes (got {actual})")]
    Validation {
        field: &'static str,
        expected: &'static str,
        actual: usize,
    },
    #[error("failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {record} identity record: {source}")]
    Persistence {
        record: &'static str,
        source: std::io::Error,
    },
}

/// The shareable half of a node identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicIdentityRecord {
    pub node_name: String,
    pub node_id: String,
    pub public_key: String,
    pub fingerprint: String,
    pub algorithm: String,
    pub created_at: String,
}

/// The confidential record embeds the public one, so the shared fields of
/// the two files cannot diverge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateIdentityRecord {
    #[serde(flatten)]
    pub public: PublicIdentityRecord,
    pub private_key_seed: String,
    #[serde(rename = "WARNING")]
    pub warning: String,
}

/// Paths and derived identifiers returned by a successful [`persist`].
#[derive(Debug, Clone)]
pub struct PersistedIdentity {
    pub public_path: PathBuf,
    pub private_path: PathBuf,
    pub fingerprint: String,
    pub node_id: String,
}

/// Derive node_id from Ed25519 public key bytes.
///
/// Formula: node_id = lowercase hex of the full 32-byte public key.
pub fn node_id_from_pubkey(public_bytes: &[u8]) -> String {
    hex::encode(public_bytes)
}

/// Derive the short fingerprint: first 16 hex chars of SHA-256(pubkey).
pub fn fingerprint_from_pubkey(public_bytes: &[u8]) -> String {
    let hash = Sha256::digest(public_bytes);
    hex::encode(hash)[..16].to_string()
}

/// Write both identity records under `output_dir`, creating it if needed.
///
/// The public record is written first: if persistence fails partway, a
/// public file without its private counterpart is the safer leftover.
/// Re-running against the same directory overwrites both files wholesale.
pub fn persist(
    private_bytes: &[u8],
    public_bytes: &[u8],
    output_dir: &Path,
    node_name: &str,
) -> Result<PersistedIdentity, StoreError> {
    if public_bytes.len() != 32 {
        return Err(StoreError::Validation {
            field: "public_bytes",
            expected: "exactly 32",
            actual: public_bytes.len(),
        });
    }
    if private_bytes.len() < 32 {
        return Err(StoreError::Validation {
            field: "private_bytes",
            expected: "at least 32",
            actual: private_bytes.len(),
        });
    }

    fs::create_dir_all(output_dir).map_err(|source| StoreError::CreateDir {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let node_id = node_id_from_pubkey(public_bytes);
    let fingerprint = fingerprint_from_pubkey(public_bytes);

    let public_record = PublicIdentityRecord {
        node_name: node_name.to_string(),
        node_id: node_id.clone(),
        public_key: hex::encode(public_bytes),
        fingerprint: fingerprint.clone(),
        algorithm: ALGORITHM.to_string(),
        created_at: Local::now().to_rfc3339(),
    };

    let public_path = output_dir.join(PUBLIC_FILE_NAME);
    write_atomic(output_dir, &public_path, "public", &public_record)?;

    let private_record = PrivateIdentityRecord {
        public: public_record,
        private_key_seed: hex::encode(private_bytes),
        warning: PRIVATE_KEY_WARNING.to_string(),
    };

    let private_path = output_dir.join(PRIVATE_FILE_NAME);
    write_atomic(output_dir, &private_path, "private", &private_record)?;

    // Best-effort only: a platform that cannot express owner-only
    // permissions must not fail the persist.
    if let Err(e) = restrict_to_owner(&private_path) {
        tracing::warn!(
            "⚠️  Could not restrict permissions on {}: {e}",
            private_path.display()
        );
    }

    Ok(PersistedIdentity {
        public_path,
        private_path,
        fingerprint,
        node_id,
    })
}

/// Serialize `value` to a temp file in `dir` and atomically rename it over
/// `target`. The temp file lives in the target's own directory so the
/// rename stays on one filesystem.
fn write_atomic<T: Serialize>(
    dir: &Path,
    target: &Path,
    record: &'static str,
    value: &T,
) -> Result<(), StoreError> {
    let persist_err = |source: std::io::Error| StoreError::Persistence { record, source };

    let tmp = NamedTempFile::new_in(dir).map_err(persist_err)?;
    serde_json::to_writer_pretty(tmp.as_file(), value).map_err(|e| persist_err(e.into()))?;
    tmp.as_file().sync_all().map_err(persist_err)?;
    tmp.persist(target).map_err(|e| persist_err(e.error))?;
    Ok(())
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o600); // read/write for owner only
    fs::set_permissions(path, perms)?;
    tracing::info!("🔒 Permissions on {} set to 0600 (owner-only)", path.display());
    Ok(())
}

#[cfg(windows)]
fn restrict_to_owner(path: &Path) -> std::io::Result<()> {
    use std::process::Command;

    let user = std::env::var("USERNAME").unwrap_or_else(|_| "*S-1-5-32-544".to_string());
    let output = Command::new("icacls")
        .arg(path)
        .arg("/inheritance:r")
        .arg("/grant:r")
        .arg(format!("{user}:F"))
        .output()?;
    if output.status.success() {
        tracing::info!("🔒 Windows ACL tightened on {} (owner-only)", path.display());
        Ok(())
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "icacls returned non-zero status",
        ))
    }
}

#[cfg(not(any(unix, windows)))]
fn restrict_to_owner(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fingerprint_is_prefix_of_sha256() {
        let public = [0x01u8; 32];
        let fp = fingerprint_from_pubkey(&public);
        let full = hex::encode(Sha256::digest(public));

        assert_eq!(fp.len(), 16);
        assert!(full.starts_with(&fp));
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn node_id_is_full_hex_of_pubkey() {
        let public = [0x01u8; 32];
        assert_eq!(node_id_from_pubkey(&public), "01".repeat(32));
    }

    #[test]
    fn derivations_are_deterministic() {
        let public = [0xabu8; 32];
        assert_eq!(node_id_from_pubkey(&public), node_id_from_pubkey(&public));
        assert_eq!(
            fingerprint_from_pubkey(&public),
            fingerprint_from_pubkey(&public)
        );
    }

    #[test]
    fn persist_roundtrip_shared_fields_match() {
        let dir = tempdir().unwrap();
        let private = [0x42u8; 32];
        let public = [0x01u8; 32];

        let persisted = persist(&private, &public, dir.path(), "alice").unwrap();

        let pub_record: PublicIdentityRecord =
            serde_json::from_str(&fs::read_to_string(&persisted.public_path).unwrap()).unwrap();
        let priv_record: PrivateIdentityRecord =
            serde_json::from_str(&fs::read_to_string(&persisted.private_path).unwrap()).unwrap();

        assert_eq!(pub_record, priv_record.public);
        assert_eq!(pub_record.node_id, pub_record.public_key);
        assert_eq!(pub_record.node_id, "01".repeat(32));
        assert_eq!(pub_record.node_name, "alice");
        assert_eq!(pub_record.algorithm, "Ed25519");
        assert_eq!(pub_record.fingerprint, persisted.fingerprint);
        assert_eq!(priv_record.private_key_seed, hex::encode(private));
    }

    #[test]
    fn persist_overwrites_previous_pair() {
        let dir = tempdir().unwrap();
        persist(&[0x11u8; 32], &[0x22u8; 32], dir.path(), "node").unwrap();
        let second = persist(&[0x33u8; 32], &[0x44u8; 32], dir.path(), "node").unwrap();

        // exactly one public and one private file, no temp residue
        let count = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(count, 2);

        let pub_record: PublicIdentityRecord =
            serde_json::from_str(&fs::read_to_string(&second.public_path).unwrap()).unwrap();
        assert_eq!(pub_record.node_id, hex::encode([0x44u8; 32]));
        assert_eq!(pub_record.node_id, second.node_id);
    }

    #[test]
    fn rejects_wrong_length_public_key() {
        let dir = tempdir().unwrap();
        for len in [31usize, 33] {
            let err = persist(&[0u8; 32], &vec![0u8; len], dir.path(), "node").unwrap_err();
            match err {
                StoreError::Validation { field, actual, .. } => {
                    assert_eq!(field, "public_bytes");
                    assert_eq!(actual, len);
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn rejects_short_private_seed() {
        let dir = tempdir().unwrap();
        let err = persist(&[0u8; 31], &[0u8; 32], dir.path(), "node").unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation {
                field: "private_bytes",
                ..
            }
        ));
    }

    #[test]
    fn validation_happens_before_any_filesystem_effect() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("sub");
        persist(&[0u8; 31], &[0u8; 32], &missing, "node").unwrap_err();
        assert!(!missing.exists());
    }

    #[test]
    fn accepts_longer_private_seed() {
        let dir = tempdir().unwrap();
        let persisted = persist(&[0x07u8; 64], &[0x01u8; 32], dir.path(), "node").unwrap();
        let priv_record: PrivateIdentityRecord =
            serde_json::from_str(&fs::read_to_string(&persisted.private_path).unwrap()).unwrap();
        assert_eq!(priv_record.private_key_seed, hex::encode([0x07u8; 64]));
    }

    #[cfg(unix)]
    #[test]
    fn private_record_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let persisted = persist(&[0x42u8; 32], &[0x01u8; 32], dir.path(), "node").unwrap();
        let mode = fs::metadata(&persisted.private_path)
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn abandoned_temp_file_leaves_target_intact() {
        let dir = tempdir().unwrap();
        let persisted = persist(&[0x42u8; 32], &[0x01u8; 32], dir.path(), "node").unwrap();
        let before = fs::read(&persisted.public_path).unwrap();

        // a writer dying between temp-write and rename leaves only a stray
        // temp file behind; the target must stay byte-identical
        {
            use std::io::Write;
            let mut tmp = NamedTempFile::new_in(dir.path()).unwrap();
            tmp.write_all(b"half-written replacement").unwrap();
            // dropped without persist()
        }

        let after = fs::read(&persisted.public_path).unwrap();
        assert_eq!(before, after);
    }
}
