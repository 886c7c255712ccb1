//! Configuration and the local key store
//!
//! [`AccessControlConfig`] is read from TOML; every field has a default, so
//! an empty file is a valid configuration. The [`LocalKeyStore`] holds the
//! caller's own private keys as PEM files in a directory:
//!
//! ```text
//! <key_store_path>/
//!   identity.pem     # signs everything we publish; our user principal
//!   *.pem            # any further private keys we hold
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::{CipherAlgorithm, ContentKeyError, SecretKey};
use crate::name::{Name, NameError};

pub const CONFIG_FILE_NAME: &str = "access.toml";
pub const IDENTITY_KEY_FILE_NAME: &str = "identity.pem";
const PEM_EXTENSION: &str = "pem";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("invalid name in config: {0}")]
    Name(#[from] NameError),
    #[error("invalid algorithm in config: {0}")]
    Algorithm(#[from] ContentKeyError),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("invalid key in {0}: {1}")]
    InvalidKey(PathBuf, String),
    #[error("missing identity key at {0}")]
    MissingIdentity(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessControlConfig {
    /// Root under which user public keys are published
    #[serde(default = "default_user_root")]
    pub user_root: String,
    /// Root under which group keys and membership lists are published
    #[serde(default = "default_group_root")]
    pub group_root: String,
    /// Our friendly name under `user_root`
    #[serde(default = "default_user_name")]
    pub user_name: String,
    /// How long a key directory waits when it has observed nothing yet
    #[serde(default = "default_enumeration_timeout_ms")]
    pub enumeration_timeout_ms: u64,
    /// A read stops waiting for updates after this long without one
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,
    /// Upper bound on update rounds per read
    #[serde(default = "default_max_update_rounds")]
    pub max_update_rounds: usize,
    /// Latest-version queries give up after this many timeouts
    #[serde(default = "default_version_attempts")]
    pub version_attempts: usize,
    /// Directories visited per key resolution, and nesting depth for
    ///  group membership checks
    #[serde(default = "default_max_resolution_depth")]
    pub max_resolution_depth: usize,
    /// KDF label for descendant node keys
    #[serde(default = "default_node_key_label")]
    pub node_key_label: String,
    /// KDF label for content keys
    #[serde(default = "default_content_key_label")]
    pub content_key_label: String,
    /// Cipher for content keys
    #[serde(default = "default_algorithm")]
    pub default_algorithm: String,
    /// Directory holding our PEM private keys
    #[serde(default)]
    pub key_store_path: Option<PathBuf>,
}

fn default_user_root() -> String {
    "/users".to_string()
}

fn default_group_root() -> String {
    "/groups".to_string()
}

fn default_user_name() -> String {
    "me".to_string()
}

fn default_enumeration_timeout_ms() -> u64 {
    3_000
}

fn default_quiet_period_ms() -> u64 {
    250
}

fn default_max_update_rounds() -> usize {
    8
}

fn default_version_attempts() -> usize {
    3
}

fn default_max_resolution_depth() -> usize {
    32
}

fn default_node_key_label() -> String {
    "NodeKey".to_string()
}

fn default_content_key_label() -> String {
    "Data Key".to_string()
}

fn default_algorithm() -> String {
    CipherAlgorithm::Aes128Ctr.to_string()
}

impl Default for AccessControlConfig {
    fn default() -> Self {
        Self {
            user_root: default_user_root(),
            group_root: default_group_root(),
            user_name: default_user_name(),
            enumeration_timeout_ms: default_enumeration_timeout_ms(),
            quiet_period_ms: default_quiet_period_ms(),
            max_update_rounds: default_max_update_rounds(),
            version_attempts: default_version_attempts(),
            max_resolution_depth: default_max_resolution_depth(),
            node_key_label: default_node_key_label(),
            content_key_label: default_content_key_label(),
            default_algorithm: default_algorithm(),
            key_store_path: None,
        }
    }
}

impl AccessControlConfig {
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Reject values that would fail later, at first use
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.user_root()?;
        self.group_root()?;
        self.algorithm()?;
        if self.version_attempts == 0 {
            return Err(ConfigError::Zero("version_attempts"));
        }
        if self.max_update_rounds == 0 {
            return Err(ConfigError::Zero("max_update_rounds"));
        }
        if self.max_resolution_depth == 0 {
            return Err(ConfigError::Zero("max_resolution_depth"));
        }
        if self.user_name.is_empty() {
            return Err(anyhow::anyhow!("user_name must not be empty").into());
        }
        Ok(())
    }

    pub fn user_root(&self) -> Result<Name, ConfigError> {
        Ok(self.user_root.parse()?)
    }

    pub fn group_root(&self) -> Result<Name, ConfigError> {
        Ok(self.group_root.parse()?)
    }

    pub fn algorithm(&self) -> Result<CipherAlgorithm, ConfigError> {
        let algorithm: CipherAlgorithm = self.default_algorithm.parse()?;
        if algorithm.block_size() == 0 {
            return Err(ContentKeyError::NotABlockCipher(algorithm).into());
        }
        Ok(algorithm)
    }

    pub fn enumeration_timeout(&self) -> Duration {
        Duration::from_millis(self.enumeration_timeout_ms)
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }
}

/// The private keys this process holds
#[derive(Debug, Clone)]
pub struct LocalKeyStore {
    identity: SecretKey,
    others: Vec<SecretKey>,
}

impl LocalKeyStore {
    pub fn new(identity: SecretKey) -> Self {
        Self {
            identity,
            others: Vec::new(),
        }
    }

    pub fn generate() -> Self {
        Self::new(SecretKey::generate())
    }

    pub fn with_key(mut self, key: SecretKey) -> Self {
        self.others.push(key);
        self
    }

    pub fn identity(&self) -> &SecretKey {
        &self.identity
    }

    /// Every held private key, identity first
    pub fn keys(&self) -> impl Iterator<Item = &SecretKey> {
        std::iter::once(&self.identity).chain(self.others.iter())
    }

    /// Load all PEM keys from `dir`
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let identity_path = dir.join(IDENTITY_KEY_FILE_NAME);
        if !identity_path.exists() {
            return Err(ConfigError::MissingIdentity(identity_path));
        }
        let mut store = Self::new(read_pem_key(&identity_path)?);

        let mut paths = fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()?;
        paths.sort();
        for path in paths {
            let is_pem = path.extension().and_then(|e| e.to_str()) == Some(PEM_EXTENSION);
            if !is_pem || path == identity_path {
                continue;
            }
            store.others.push(read_pem_key(&path)?);
        }
        tracing::debug!(
            "loaded {} private keys from {}",
            store.others.len() + 1,
            dir.display()
        );
        Ok(store)
    }

    /// Write the identity and every other key to `dir` as PEM files
    pub fn save(&self, dir: &Path) -> Result<(), ConfigError> {
        fs::create_dir_all(dir)?;
        fs::write(dir.join(IDENTITY_KEY_FILE_NAME), self.identity.to_pem())?;
        for key in &self.others {
            let file_name = format!("{}.{}", &key.public().to_hex()[..16], PEM_EXTENSION);
            fs::write(dir.join(file_name), key.to_pem())?;
        }
        Ok(())
    }

    /// Load from `dir`, creating a fresh identity if none exists
    pub fn load_or_init(dir: &Path) -> Result<Self, ConfigError> {
        if dir.join(IDENTITY_KEY_FILE_NAME).exists() {
            return Self::load(dir);
        }
        let store = Self::generate();
        store.save(dir)?;
        Ok(store)
    }
}

fn read_pem_key(path: &Path) -> Result<SecretKey, ConfigError> {
    let pem = fs::read_to_string(path)?;
    SecretKey::from_pem(&pem)
        .map_err(|e| ConfigError::InvalidKey(path.to_path_buf(), e.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AccessControlConfig::from_toml_str("").unwrap();
        assert_eq!(config.user_root, "/users");
        assert_eq!(config.node_key_label, "NodeKey");
        assert_eq!(config.algorithm().unwrap(), CipherAlgorithm::Aes128Ctr);
        assert_eq!(config.quiet_period(), Duration::from_millis(250));
    }

    #[test]
    fn test_partial_config() {
        let config = AccessControlConfig::from_toml_str(
            r#"
            group_root = "/parc/groups"
            default_algorithm = "AES-256-CBC"
            quiet_period_ms = 20
            "#,
        )
        .unwrap();
        assert_eq!(
            config.group_root().unwrap(),
            "/parc/groups".parse::<Name>().unwrap()
        );
        assert_eq!(config.algorithm().unwrap(), CipherAlgorithm::Aes256Cbc);
        assert_eq!(config.quiet_period_ms, 20);
        assert_eq!(config.enumeration_timeout_ms, 3_000);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            AccessControlConfig::from_toml_str("default_algorithm = \"ROT13\""),
            Err(ConfigError::Algorithm(ContentKeyError::UnknownAlgorithm(_)))
        ));
        assert!(matches!(
            AccessControlConfig::from_toml_str("default_algorithm = \"CHACHA20\""),
            Err(ConfigError::Algorithm(ContentKeyError::NotABlockCipher(_)))
        ));
        assert!(matches!(
            AccessControlConfig::from_toml_str("user_root = \"users\""),
            Err(ConfigError::Name(_))
        ));
        assert!(matches!(
            AccessControlConfig::from_toml_str("version_attempts = 0"),
            Err(ConfigError::Zero("version_attempts"))
        ));
        assert!(matches!(
            AccessControlConfig::from_toml_str("quiet_period_ms = \"soon\""),
            Err(ConfigError::TomlDe(_))
        ));
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let config = AccessControlConfig {
            user_name: "alice".to_string(),
            key_store_path: Some(dir.path().join("keys")),
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = AccessControlConfig::load(&path).unwrap();
        assert_eq!(loaded.user_name, "alice");
        assert_eq!(loaded.key_store_path, config.key_store_path);
    }

    #[test]
    fn test_key_store_loads_all_pem_files() {
        let dir = tempfile::tempdir().unwrap();
        let extra = SecretKey::generate();
        let store = LocalKeyStore::generate().with_key(extra.clone());
        store.save(dir.path()).unwrap();
        fs::write(dir.path().join("notes.txt"), "not a key").unwrap();

        let loaded = LocalKeyStore::load(dir.path()).unwrap();
        assert_eq!(loaded.identity(), store.identity());
        let keys: Vec<_> = loaded.keys().cloned().collect();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&extra));
    }

    #[test]
    fn test_key_store_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            LocalKeyStore::load(dir.path()),
            Err(ConfigError::MissingIdentity(_))
        ));

        fs::write(dir.path().join(IDENTITY_KEY_FILE_NAME), "garbage").unwrap();
        assert!(matches!(
            LocalKeyStore::load(dir.path()),
            Err(ConfigError::InvalidKey(_, _))
        ));
    }

    #[test]
    fn test_load_or_init_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let keys = dir.path().join("keys");
        let first = LocalKeyStore::load_or_init(&keys).unwrap();
        let second = LocalKeyStore::load_or_init(&keys).unwrap();
        assert_eq!(first.identity(), second.identity());
    }
}
