//! Wrapped keys
//!
//! A [`WrappedKey`] is the ciphertext of one key under another. It records
//! the digest (and, when known, the name) of the wrapping key so a reader
//! can tell which of its keys to try, but never carries the wrapping key.
//!
//! Two wrapping algorithms are supported:
//!
//! - **AES Key Wrap** (RFC 3394) under a symmetric [`Secret`]. Used for
//!   superseded/previous-key blocks and for the private-key block of a
//!   group's key directory.
//! - **X25519 + AES Key Wrap** under a principal's [`PublicKey`]:
//!   1. Generate an ephemeral Ed25519 keypair
//!   2. Convert both keys to X25519 and perform ECDH
//!   3. Expand the shared secret into a KEK with the [`kdf`](super::kdf)
//!   4. AES-KW the key under that KEK, storing the ephemeral public key
//!      alongside the ciphertext
//!
//! AES-KW carries an integrity check, so unwrapping under any key other
//! than the right one fails rather than producing wrong bytes.

use aes_kw::KekAes256 as Kek;
use serde::{Deserialize, Serialize};

use super::kdf::{derive_key, KdfError};
use super::keys::{KeyDigest, KeyError, PublicKey, SecretKey, PUBLIC_KEY_SIZE};
use super::secret::{Secret, SecretError, SECRET_SIZE};
use crate::name::Name;

/// Label binding ECDH output to its use as a key-wrapping key
const WRAP_KEK_LABEL: &str = "WrappedKey KEK";

#[derive(Debug, thiserror::Error)]
pub enum WrapError {
    #[error("wrap error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
    #[error("kdf error: {0}")]
    Kdf(#[from] KdfError),
    #[error("unwrapping key {actual} does not match wrapping key {expected}")]
    WrongKey {
        expected: KeyDigest,
        actual: KeyDigest,
    },
    #[error("{algorithm:?} cannot be unwrapped with a {kind} key")]
    WrongKeyType {
        algorithm: WrapAlgorithm,
        kind: &'static str,
    },
    #[error("AES-KW unwrap failed: wrong key or corrupted ciphertext")]
    Integrity,
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
}

/// Key material that can be wrapped, or used to unwrap
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Symmetric(Secret),
    Private(SecretKey),
}

impl Key {
    pub fn digest(&self) -> KeyDigest {
        match self {
            Key::Symmetric(secret) => secret.digest(),
            Key::Private(secret_key) => secret_key.digest(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Key::Symmetric(_) => "symmetric",
            Key::Private(_) => "private",
        }
    }

    fn key_type(&self) -> WrappedKeyType {
        match self {
            Key::Symmetric(_) => WrappedKeyType::Symmetric,
            Key::Private(_) => WrappedKeyType::Private,
        }
    }

    fn to_bytes(&self) -> [u8; SECRET_SIZE] {
        match self {
            Key::Symmetric(secret) => **secret,
            Key::Private(secret_key) => secret_key.to_bytes(),
        }
    }

    /// The symmetric secret, if this is one
    pub fn into_secret(self) -> Option<Secret> {
        match self {
            Key::Symmetric(secret) => Some(secret),
            Key::Private(_) => None,
        }
    }

    pub fn into_private(self) -> Option<SecretKey> {
        match self {
            Key::Private(secret_key) => Some(secret_key),
            Key::Symmetric(_) => None,
        }
    }
}

impl From<Secret> for Key {
    fn from(secret: Secret) -> Self {
        Key::Symmetric(secret)
    }
}

impl From<SecretKey> for Key {
    fn from(secret_key: SecretKey) -> Self {
        Key::Private(secret_key)
    }
}

/// A key used to wrap
#[derive(Debug, Clone, Copy)]
pub enum WrappingKey<'a> {
    Symmetric(&'a Secret),
    Public(&'a PublicKey),
}

impl WrappingKey<'_> {
    pub fn digest(&self) -> KeyDigest {
        match self {
            WrappingKey::Symmetric(secret) => secret.digest(),
            WrappingKey::Public(public_key) => public_key.digest(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WrapAlgorithm {
    AesKeyWrap,
    X25519AesKeyWrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WrappedKeyType {
    Symmetric,
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    wrapping_key_id: KeyDigest,
    wrapping_key_name: Option<Name>,
    wrapped_key_name: Option<Name>,
    algorithm: WrapAlgorithm,
    key_type: WrappedKeyType,
    ephemeral_public: Option<[u8; PUBLIC_KEY_SIZE]>,
    ciphertext: Vec<u8>,
}

impl WrappedKey {
    /// Wrap `key` under `wrapping`
    ///
    /// # Arguments
    ///
    /// * `key` - The key to protect
    /// * `wrapping` - The symmetric or public key to wrap it under
    /// * `wrapping_key_name` - Where the wrapping key lives, if it has a name
    pub fn wrap(
        key: &Key,
        wrapping: WrappingKey<'_>,
        wrapping_key_name: Option<Name>,
    ) -> Result<Self, WrapError> {
        let plaintext = key.to_bytes();
        let (algorithm, kek, ephemeral_public) = match wrapping {
            WrappingKey::Symmetric(secret) => {
                (WrapAlgorithm::AesKeyWrap, Kek::from(**secret), None)
            }
            WrappingKey::Public(recipient) => {
                let ephemeral_private = SecretKey::generate();
                let ephemeral_public = ephemeral_private.public();
                let shared = ephemeral_private
                    .to_x25519()
                    .diffie_hellman(&recipient.to_x25519()?);
                let kek = agreement_kek(shared.as_bytes(), &ephemeral_public, recipient)?;
                (
                    WrapAlgorithm::X25519AesKeyWrap,
                    kek,
                    Some(ephemeral_public.to_bytes()),
                )
            }
        };

        let ciphertext = kek
            .wrap_vec(&plaintext)
            .map_err(|_| anyhow::anyhow!("AES-KW wrap error"))?;

        Ok(Self {
            wrapping_key_id: wrapping.digest(),
            wrapping_key_name,
            wrapped_key_name: None,
            algorithm,
            key_type: key.key_type(),
            ephemeral_public,
            ciphertext,
        })
    }

    /// Record the name of the key being wrapped
    pub fn with_wrapped_key_name(mut self, name: Name) -> Self {
        self.wrapped_key_name = Some(name);
        self
    }

    /// Recover the wrapped key
    ///
    /// # Errors
    ///
    /// Returns an error if `unwrapping` is not the counterpart of the key
    /// this was wrapped under, is of the wrong type for the algorithm, or if
    /// the ciphertext fails the AES-KW integrity check.
    pub fn unwrap(&self, unwrapping: &Key) -> Result<Key, WrapError> {
        let actual = unwrapping.digest();
        if actual != self.wrapping_key_id {
            return Err(WrapError::WrongKey {
                expected: self.wrapping_key_id,
                actual,
            });
        }

        let kek = match (self.algorithm, unwrapping) {
            (WrapAlgorithm::AesKeyWrap, Key::Symmetric(secret)) => Kek::from(**secret),
            (WrapAlgorithm::X25519AesKeyWrap, Key::Private(recipient)) => {
                let ephemeral_bytes = self
                    .ephemeral_public
                    .ok_or_else(|| anyhow::anyhow!("missing ephemeral public key"))?;
                let ephemeral_public = PublicKey::try_from(&ephemeral_bytes[..])?;
                let shared = recipient
                    .to_x25519()
                    .diffie_hellman(&ephemeral_public.to_x25519()?);
                agreement_kek(shared.as_bytes(), &ephemeral_public, &recipient.public())?
            }
            (algorithm, key) => {
                return Err(WrapError::WrongKeyType {
                    algorithm,
                    kind: key.kind(),
                })
            }
        };

        let plaintext = kek
            .unwrap_vec(&self.ciphertext)
            .map_err(|_| WrapError::Integrity)?;

        match self.key_type {
            WrappedKeyType::Symmetric => Ok(Key::Symmetric(Secret::from_slice(&plaintext)?)),
            WrappedKeyType::Private => Ok(Key::Private(SecretKey::from_slice(&plaintext)?)),
        }
    }

    pub fn wrapping_key_id(&self) -> KeyDigest {
        self.wrapping_key_id
    }

    pub fn wrapping_key_name(&self) -> Option<&Name> {
        self.wrapping_key_name.as_ref()
    }

    pub fn wrapped_key_name(&self) -> Option<&Name> {
        self.wrapped_key_name.as_ref()
    }

    pub fn algorithm(&self) -> WrapAlgorithm {
        self.algorithm
    }

    pub fn key_type(&self) -> WrappedKeyType {
        self.key_type
    }

    pub fn encode(&self) -> Result<Vec<u8>, WrapError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WrapError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Expand an ECDH shared secret into a KEK bound to both public keys
fn agreement_kek(
    shared: &[u8; 32],
    ephemeral: &PublicKey,
    recipient: &PublicKey,
) -> Result<Kek, WrapError> {
    let bytes = derive_key(shared, WRAP_KEK_LABEL, &[ephemeral, recipient], 256)?;
    let mut kek = [0u8; SECRET_SIZE];
    kek.copy_from_slice(&bytes);
    Ok(Kek::from(kek))
}
