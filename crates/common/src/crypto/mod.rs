//! Cryptographic primitives for access control
//!
//! - **Identity**: Ed25519 keypairs (`SecretKey`/`PublicKey`) identify users
//!   and groups, sign published objects, and receive wrapped keys after
//!   conversion to X25519.
//! - **Symmetric keys**: 256-bit [`Secret`]s serve as node keys and as the
//!   nonce keys protecting group private keys.
//! - **Derivation**: a counter-mode HMAC-SHA-256 [`kdf`] derives descendant
//!   node keys and per-object content keys from a master secret.
//! - **Wrapping**: [`WrappedKey`] protects one key under another with AES-KW,
//!   directly under a secret or via ephemeral ECDH under a public key.
//!
//! Every key is identified by a [`KeyDigest`], the SHA-256 of its canonical
//! encoding. A private key shares the digest of its public key.

mod content_keys;
mod kdf;
mod keys;
mod secret;
mod wrap;

pub use content_keys::{
    segment_nonce, CipherAlgorithm, CipherMode, ContentKeyError, ContentKeys,
    DerivedContentKeys, SegmentCipherMaterial, StaticContentKeys, MAX_SEGMENT, NONCE_SEED_SIZE,
    NONCE_SIZE,
};
pub use ed25519_dalek::Signature;
pub use kdf::{check_master, derive_key, DerivationContext, KdfError};
pub use keys::{KeyDigest, KeyError, PublicKey, SecretKey, KEY_DIGEST_SIZE};
pub use secret::{Secret, SecretError, SECRET_SIZE};
pub use wrap::{Key, WrapAlgorithm, WrapError, WrappedKey, WrappedKeyType, WrappingKey};
