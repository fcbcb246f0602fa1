//! OpenPGP key material and passphrase handling.
//!
//! This module loads ASCII-armored key rings into [`PublicKeyMaterial`] and
//! [`PrivateKeyMaterial`] and resolves the [`Passphrase`] that protects a
//! private key.
//!
//! ## Security Features
//!
//! - A key ring must hold exactly one identity; ambiguous rings are rejected
//! - Passphrases are zeroized on drop and never logged
//! - Private key material is unlocked once, up front, so a wrong passphrase
//!   fails before any ciphertext is read

use crate::error::{PackError, Result, Stage};
use pgp::composed::{Deserializable, SignedPublicKey, SignedSecretKey};
use pgp::types::{KeyTrait, SecretKeyTrait};
use std::env;
use std::fmt;
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Environment variable holding the private key passphrase itself.
pub const ENV_PASSPHRASE: &str = "DATAPACK_PASSPHRASE";

/// Secret used to unlock a passphrase-protected private key.
pub struct Passphrase(Zeroizing<String>);

impl Passphrase {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// The empty passphrase, used for unprotected keys.
    pub fn empty() -> Self {
        Self::new(String::new())
    }

    /// Read a passphrase file, trimming surrounding whitespace.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = Zeroizing::new(fs::read_to_string(path).map_err(|e| PackError::io(Stage::Encryption, e))?);
        Ok(Self::new(raw.trim()))
    }

    /// Resolve the passphrase in fixed precedence order: an explicit
    /// passphrase file, then `DATAPACK_PASSPHRASE`, then the empty string.
    pub fn resolve(passphrase_file: Option<&Path>) -> Result<Self> {
        if let Some(path) = passphrase_file {
            debug!(path = %path.display(), "using passphrase file");
            return Self::from_file(path);
        }
        if let Ok(value) = env::var(ENV_PASSPHRASE) {
            debug!("using passphrase from environment");
            return Ok(Self::new(value));
        }
        debug!("no passphrase source, assuming unprotected key");
        Ok(Self::empty())
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(***)")
    }
}

/// Parse every key in an armored ring and require exactly one identity.
fn single_identity<K: Deserializable>(armored: &[u8], kind: &str) -> Result<K> {
    let (keys, _headers) = K::from_armor_many(Cursor::new(armored))
        .map_err(|e| PackError::crypto(format!("failed to read {} key ring: {}", kind, e)))?;
    let mut keys = keys
        .collect::<std::result::Result<Vec<K>, _>>()
        .map_err(|e| PackError::crypto(format!("failed to parse {} key ring: {}", kind, e)))?;

    match keys.len() {
        0 => Err(PackError::crypto(format!("{} key ring contains no keys", kind))),
        1 => Ok(keys.remove(0)),
        n => Err(PackError::key_policy(format!(
            "{} key ring contains {} identities; export exactly one key to use it",
            kind, n
        ))),
    }
}

fn read_source(mut source: impl Read) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    source
        .read_to_end(&mut buf)
        .map_err(|e| PackError::io(Stage::Encryption, e))?;
    Ok(buf)
}

/// Public half of a single identity, used for encryption.
#[derive(Debug, Clone)]
pub struct PublicKeyMaterial {
    key: SignedPublicKey,
}

impl PublicKeyMaterial {
    pub fn from_reader(source: impl Read) -> Result<Self> {
        let armored = read_source(source)?;
        let key: SignedPublicKey = single_identity(&armored, "public")?;
        debug!(key_id = ?key.key_id(), subkeys = key.public_subkeys.len(), "loaded public key");
        Ok(Self { key })
    }

    pub fn load(path: &Path) -> Result<Self> {
        info!(path = %path.display(), "loading public key");
        let file = fs::File::open(path).map_err(|e| PackError::io(Stage::Encryption, e))?;
        Self::from_reader(file)
    }

    pub fn key(&self) -> &SignedPublicKey {
        &self.key
    }
}

/// Private half of a single identity with every component unlocked.
#[derive(Clone)]
pub struct PrivateKeyMaterial {
    key: SignedSecretKey,
    // rpgp takes the passphrase again at message decryption time
    passphrase: Zeroizing<String>,
}

impl fmt::Debug for PrivateKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKeyMaterial")
            .field("key_id", &self.key.key_id())
            .finish_non_exhaustive()
    }
}

impl PrivateKeyMaterial {
    /// Parse the ring and unlock the primary key and every subkey with
    /// `passphrase`. Any single failure is fatal.
    pub fn from_reader(source: impl Read, passphrase: &Passphrase) -> Result<Self> {
        let armored = read_source(source)?;
        let key: SignedSecretKey = single_identity(&armored, "private")?;

        let pw = passphrase.expose();
        key.primary_key
            .unlock(|| pw.to_string(), |_| Ok(()))
            .map_err(|e| PackError::crypto(format!("failed to unlock primary key: {}", e)))?;
        for subkey in &key.secret_subkeys {
            subkey
                .key
                .unlock(|| pw.to_string(), |_| Ok(()))
                .map_err(|e| {
                    PackError::crypto(format!("failed to unlock subkey {:?}: {}", subkey.key.key_id(), e))
                })?;
        }

        debug!(key_id = ?key.key_id(), subkeys = key.secret_subkeys.len(), "unlocked private key");
        Ok(Self {
            key,
            passphrase: Zeroizing::new(pw.to_string()),
        })
    }

    pub fn load(path: &Path, passphrase: &Passphrase) -> Result<Self> {
        info!(path = %path.display(), "loading private key");
        let file = fs::File::open(path).map_err(|e| PackError::io(Stage::Encryption, e))?;
        Self::from_reader(file, passphrase)
    }

    pub fn key(&self) -> &SignedSecretKey {
        &self.key
    }

    pub(crate) fn passphrase(&self) -> &str {
        self.passphrase.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard};

    const PUBLIC: &str = include_str!("tests/fixtures/public.asc");
    const PRIVATE: &str = include_str!("tests/fixtures/private.asc");
    const TWO_IDENTITIES: &str = include_str!("tests/fixtures/two_identities.asc");

    #[test]
    fn loads_single_public_identity() {
        let key = PublicKeyMaterial::from_reader(PUBLIC.as_bytes()).expect("public key");
        assert_eq!(key.key().public_subkeys.len(), 1);
    }

    #[test]
    fn rejects_ambiguous_ring() {
        let err = PublicKeyMaterial::from_reader(TWO_IDENTITIES.as_bytes()).unwrap_err();
        assert!(matches!(err, PackError::KeyPolicy(_)), "got {err:?}");
        assert!(err.to_string().contains("2 identities"));
    }

    #[test]
    fn rejects_garbage_ring() {
        let err = PublicKeyMaterial::from_reader(&b"not a key"[..]).unwrap_err();
        assert!(matches!(err, PackError::Crypto(_)), "got {err:?}");
    }

    #[test]
    fn unlocks_with_correct_passphrase() {
        PrivateKeyMaterial::from_reader(PRIVATE.as_bytes(), &Passphrase::new("password"))
            .expect("unlock");
    }

    #[test]
    fn wrong_passphrase_is_crypto_error() {
        let err = PrivateKeyMaterial::from_reader(PRIVATE.as_bytes(), &Passphrase::new("hunter2"))
            .unwrap_err();
        assert!(matches!(err, PackError::Crypto(_)), "got {err:?}");
    }

    #[test]
    fn passphrase_file_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pass.txt");
        fs::write(&path, "  password\n").unwrap();
        let pass = Passphrase::resolve(Some(&path)).unwrap();
        assert_eq!(pass.expose(), "password");
        assert_eq!(format!("{:?}", pass), "Passphrase(***)");
    }

    // tests that touch DATAPACK_PASSPHRASE hold this lock
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_guard() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[test]
    fn passphrase_from_environment() {
        let _guard = env_guard();
        env::set_var(ENV_PASSPHRASE, "from-env");
        let pass = Passphrase::resolve(None);
        env::remove_var(ENV_PASSPHRASE);
        assert_eq!(pass.unwrap().expose(), "from-env");
    }

    #[test]
    fn passphrase_file_beats_environment() {
        let _guard = env_guard();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pass.txt");
        fs::write(&path, "from-file\n").unwrap();

        env::set_var(ENV_PASSPHRASE, "from-env");
        let pass = Passphrase::resolve(Some(&path));
        env::remove_var(ENV_PASSPHRASE);
        assert_eq!(pass.unwrap().expose(), "from-file");
    }

    #[test]
    fn passphrase_defaults_to_empty() {
        let _guard = env_guard();
        env::remove_var(ENV_PASSPHRASE);
        let pass = Passphrase::resolve(None).unwrap();
        assert_eq!(pass.expose(), "");
    }

    #[test]
    fn missing_passphrase_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Passphrase::resolve(Some(&dir.path().join("absent"))).is_err());
    }
}
