//! Key material handling for encrypted database files.
//!
//! A symmetric key is derived from login+password via HKDF-SHA256. The
//! database master key (random 32 bytes, generated once per database file)
//! lives in a key file next to the database, protected with AES-256-CTR
//! under the derived key:
//!
//! ```text
//! <db>.key = [iv: 16 bytes][AES-256-CTR(derived_key, iv, MAGIC(8) ‖ master(32))]
//! ```
//!
//! Loading decrypts and verifies MAGIC: wrong credentials produce garbage
//! instead of the magic prefix and fail with a credential error before the
//! engine is ever touched. The master key is what the engine receives as
//! its file-encryption key.

use std::fmt;
use std::path::{Path, PathBuf};

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{DbError, DbResult};

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

const KEY_FILE_MAGIC: &[u8; 8] = b"SPNZKEY1";
const HKDF_INFO: &[u8] = b"spinoza:key-file";

/// The per-database key material: the master key handed to the engine and
/// a digest of the derived credential key used to verify re-open attempts.
#[derive(Clone)]
pub struct KeyMaterial {
    master_key: [u8; 32],
    credential_digest: [u8; 32],
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("master_key", &"[REDACTED]")
            .field("credential_digest", &"[REDACTED]")
            .finish()
    }
}

impl KeyMaterial {
    /// Hex rendering of the master key, the form the engine's `PRAGMA key`
    /// accepts.
    pub fn master_key_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for b in self.master_key {
            out.push_str(&format!("{b:02x}"));
        }
        out
    }

    pub(crate) fn credential_digest(&self) -> [u8; 32] {
        self.credential_digest
    }
}

/// Derive the 32-byte symmetric key protecting the key file.
pub fn derive_key(login: &str, password: &str) -> [u8; 32] {
    let mut ikm = Vec::with_capacity(login.len() + password.len() + 1);
    ikm.extend_from_slice(login.as_bytes());
    ikm.push(0);
    ikm.extend_from_slice(password.as_bytes());

    let hk = Hkdf::<Sha256>::new(Some(KEY_FILE_MAGIC), &ikm);
    let mut derived = [0u8; 32];
    // Expand cannot fail for a 32-byte output.
    let _ = hk.expand(HKDF_INFO, &mut derived);
    derived
}

/// Digest used to verify credentials against an already-open instance.
pub fn credential_digest(login: &str, password: &str) -> [u8; 32] {
    Sha256::digest(derive_key(login, password)).into()
}

/// The key file lives next to the database file.
pub fn key_file_path(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_os_string();
    name.push(".key");
    PathBuf::from(name)
}

/// Load the key file, creating it (with a fresh random master key) when
/// absent. Wrong credentials against an existing key file fail with
/// [`DbError::Credentials`].
pub fn load_or_create(db_path: &Path, login: &str, password: &str) -> DbResult<KeyMaterial> {
    let derived = derive_key(login, password);
    let digest = Sha256::digest(derived).into();
    let path = key_file_path(db_path);

    let master_key = if path.exists() {
        read_key_file(&path, &derived)?
    } else {
        let mut master = [0u8; 32];
        OsRng.fill_bytes(&mut master);
        write_key_file(&path, &derived, &master)?;
        master
    };

    Ok(KeyMaterial {
        master_key,
        credential_digest: digest,
    })
}

fn read_key_file(path: &Path, derived: &[u8; 32]) -> DbResult<[u8; 32]> {
    let raw = std::fs::read(path)
        .map_err(|e| DbError::KeyFile(format!("cannot read {}: {e}", path.display())))?;
    if raw.len() != 16 + 8 + 32 {
        return Err(DbError::KeyFile(format!(
            "{} has unexpected length {}",
            path.display(),
            raw.len()
        )));
    }

    let (iv, body) = raw.split_at(16);
    let mut plain = body.to_vec();
    let mut cipher = Aes256Ctr::new(derived.into(), iv.into());
    cipher.apply_keystream(&mut plain);

    if &plain[..8] != KEY_FILE_MAGIC {
        return Err(DbError::Credentials);
    }
    let mut master = [0u8; 32];
    master.copy_from_slice(&plain[8..]);
    Ok(master)
}

fn write_key_file(path: &Path, derived: &[u8; 32], master: &[u8; 32]) -> DbResult<()> {
    let mut iv = [0u8; 16];
    OsRng.fill_bytes(&mut iv);

    let mut body = Vec::with_capacity(8 + 32);
    body.extend_from_slice(KEY_FILE_MAGIC);
    body.extend_from_slice(master);
    let mut cipher = Aes256Ctr::new(derived.into(), (&iv).into());
    cipher.apply_keystream(&mut body);

    let mut raw = Vec::with_capacity(16 + body.len());
    raw.extend_from_slice(&iv);
    raw.extend_from_slice(&body);
    std::fs::write(path, raw)
        .map_err(|e| DbError::KeyFile(format!("cannot write {}: {e}", path.display())))
}
