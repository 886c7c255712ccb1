//! Per-segment content key material
//!
//! Content is encrypted segment by segment. A [`ContentKeys`] provider hands
//! the segmentation layer the key and initial counter (or IV) for each
//! segment. Two providers exist:
//!
//! - [`DerivedContentKeys`] holds a master secret and re-derives a fresh
//!   (key, nonce seed) pair for its object on every call, binding the
//!   object's name and publisher into the derivation.
//! - [`StaticContentKeys`] holds a fixed key and nonce seed. It is cheaper,
//!   but in counter mode the same (key, seed) must never encrypt the same
//!   segment twice. A static provider must therefore only be used for a
//!   single save of a single object; it refuses to hand out encryption
//!   material for a segment it has already handed out.
//!
//! Both expand the nonce seed identically:
//!
//! ```text
//! seed (8 bytes) || segment + 1 (6 bytes BE) || block counter = 1 (2 bytes BE)
//! ```
//!
//! In counter mode this block is the initial counter. In block-chained mode
//! it is encrypted once under the key to produce the IV. Nonces for distinct
//! segments differ by construction.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use parking_lot::Mutex;
use rand::RngCore;

use super::kdf::{check_master, derive_key, DerivationContext, KdfError};
use super::keys::KeyDigest;
use crate::name::Name;

/// Size of the per-object nonce seed
pub const NONCE_SEED_SIZE: usize = 8;
/// Size of the expanded nonce: one AES block
pub const NONCE_SIZE: usize = 16;
/// Width of the segment number field in the nonce
const SEGMENT_FIELD_SIZE: usize = 6;
/// Largest segment number that fits the nonce (stored 1-based)
pub const MAX_SEGMENT: u64 = (1 << (8 * SEGMENT_FIELD_SIZE)) - 2;
/// Block counter value at the start of every segment
const INITIAL_BLOCK_COUNTER: u16 = 1;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ContentKeyError {
    #[error("unknown cipher algorithm: {0}")]
    UnknownAlgorithm(String),
    #[error("{0} is not a block cipher, nonce expansion needs one")]
    NotABlockCipher(CipherAlgorithm),
    #[error("key for {algorithm} must be {expected} bytes, got {actual}")]
    InvalidKeyLength {
        algorithm: CipherAlgorithm,
        expected: usize,
        actual: usize,
    },
    #[error("segment {0} does not fit the nonce")]
    SegmentOutOfRange(u64),
    #[error("segment {0} already encrypted with this static key and nonce seed")]
    SegmentReused(u64),
    #[error("kdf error: {0}")]
    Kdf(#[from] KdfError),
}

/// How a block cipher is chained across a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    /// Counter mode; the nonce is the initial counter block
    Counter,
    /// Cipher block chaining; the IV is the nonce encrypted once
    BlockChained,
    /// Native stream cipher without a block structure
    Stream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherAlgorithm {
    Aes128Ctr,
    Aes256Ctr,
    Aes128Cbc,
    Aes256Cbc,
    ChaCha20,
}

impl CipherAlgorithm {
    pub fn key_len(&self) -> usize {
        match self {
            CipherAlgorithm::Aes128Ctr | CipherAlgorithm::Aes128Cbc => 16,
            CipherAlgorithm::Aes256Ctr | CipherAlgorithm::Aes256Cbc | CipherAlgorithm::ChaCha20 => {
                32
            }
        }
    }

    /// Cipher block size in bytes; zero for stream ciphers
    pub fn block_size(&self) -> usize {
        match self {
            CipherAlgorithm::ChaCha20 => 0,
            _ => 16,
        }
    }

    pub fn mode(&self) -> CipherMode {
        match self {
            CipherAlgorithm::Aes128Ctr | CipherAlgorithm::Aes256Ctr => CipherMode::Counter,
            CipherAlgorithm::Aes128Cbc | CipherAlgorithm::Aes256Cbc => CipherMode::BlockChained,
            CipherAlgorithm::ChaCha20 => CipherMode::Stream,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            CipherAlgorithm::Aes128Ctr => "AES-128-CTR",
            CipherAlgorithm::Aes256Ctr => "AES-256-CTR",
            CipherAlgorithm::Aes128Cbc => "AES-128-CBC",
            CipherAlgorithm::Aes256Cbc => "AES-256-CBC",
            CipherAlgorithm::ChaCha20 => "CHACHA20",
        }
    }

    /// Reject algorithms the nonce expansion cannot serve
    fn check_block_cipher(&self) -> Result<(), ContentKeyError> {
        if self.block_size() == 0 {
            return Err(ContentKeyError::NotABlockCipher(*self));
        }
        Ok(())
    }

    fn check_key(&self, key: &[u8]) -> Result<(), ContentKeyError> {
        if key.len() != self.key_len() {
            return Err(ContentKeyError::InvalidKeyLength {
                algorithm: *self,
                expected: self.key_len(),
                actual: key.len(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for CipherAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CipherAlgorithm {
    type Err = ContentKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AES-128-CTR" => Ok(CipherAlgorithm::Aes128Ctr),
            "AES-256-CTR" => Ok(CipherAlgorithm::Aes256Ctr),
            "AES-128-CBC" => Ok(CipherAlgorithm::Aes128Cbc),
            "AES-256-CBC" => Ok(CipherAlgorithm::Aes256Cbc),
            "CHACHA20" => Ok(CipherAlgorithm::ChaCha20),
            _ => Err(ContentKeyError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Key and starting nonce for one segment
#[derive(Clone, PartialEq, Eq)]
pub struct SegmentCipherMaterial {
    algorithm: CipherAlgorithm,
    key: Vec<u8>,
    nonce: [u8; NONCE_SIZE],
}

impl fmt::Debug for SegmentCipherMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentCipherMaterial")
            .field("algorithm", &self.algorithm)
            .field("nonce", &hex::encode(self.nonce))
            .finish_non_exhaustive()
    }
}

impl SegmentCipherMaterial {
    pub fn algorithm(&self) -> CipherAlgorithm {
        self.algorithm
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Initial counter block (counter mode) or IV (block-chained mode)
    pub fn nonce(&self) -> &[u8; NONCE_SIZE] {
        &self.nonce
    }
}

/// Source of per-segment key material for one content object
pub trait ContentKeys: Send + Sync {
    fn algorithm(&self) -> CipherAlgorithm;

    /// Key and nonce for `segment`
    ///
    /// `for_encryption` is false when the material will only be used to
    /// decrypt; providers may enforce single-use rules on encryption.
    fn segment_cipher_material(
        &self,
        segment: u64,
        for_encryption: bool,
    ) -> Result<SegmentCipherMaterial, ContentKeyError>;
}

/// Expand a nonce seed into the starting nonce block for a segment
pub fn segment_nonce(
    seed: &[u8; NONCE_SEED_SIZE],
    segment: u64,
) -> Result<[u8; NONCE_SIZE], ContentKeyError> {
    if segment > MAX_SEGMENT {
        return Err(ContentKeyError::SegmentOutOfRange(segment));
    }
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[..NONCE_SEED_SIZE].copy_from_slice(seed);
    let segment_bytes = (segment + 1).to_be_bytes();
    nonce[NONCE_SEED_SIZE..NONCE_SEED_SIZE + SEGMENT_FIELD_SIZE]
        .copy_from_slice(&segment_bytes[8 - SEGMENT_FIELD_SIZE..]);
    nonce[NONCE_SEED_SIZE + SEGMENT_FIELD_SIZE..]
        .copy_from_slice(&INITIAL_BLOCK_COUNTER.to_be_bytes());
    Ok(nonce)
}

/// Encrypt one block under `key` with an all-zero IV
fn encrypt_block(
    algorithm: CipherAlgorithm,
    key: &[u8],
    block: [u8; NONCE_SIZE],
) -> Result<[u8; NONCE_SIZE], ContentKeyError> {
    let mut block = GenericArray::from(block);
    let invalid = |_| ContentKeyError::InvalidKeyLength {
        algorithm,
        expected: algorithm.key_len(),
        actual: key.len(),
    };
    match algorithm.key_len() {
        16 => aes::Aes128::new_from_slice(key)
            .map_err(invalid)?
            .encrypt_block(&mut block),
        _ => aes::Aes256::new_from_slice(key)
            .map_err(invalid)?
            .encrypt_block(&mut block),
    }
    Ok(block.into())
}

/// Apply the shared seed expansion rule for `algorithm`
fn expand(
    algorithm: CipherAlgorithm,
    key: Vec<u8>,
    seed: &[u8; NONCE_SEED_SIZE],
    segment: u64,
) -> Result<SegmentCipherMaterial, ContentKeyError> {
    let counter = segment_nonce(seed, segment)?;
    let nonce = match algorithm.mode() {
        CipherMode::Counter => counter,
        CipherMode::BlockChained => encrypt_block(algorithm, &key, counter)?,
        CipherMode::Stream => return Err(ContentKeyError::NotABlockCipher(algorithm)),
    };
    Ok(SegmentCipherMaterial {
        algorithm,
        key,
        nonce,
    })
}

/// Content keys derived per object from a master secret
pub struct DerivedContentKeys {
    master: Vec<u8>,
    algorithm: CipherAlgorithm,
    label: String,
    target: Name,
    publisher: Option<KeyDigest>,
}

impl fmt::Debug for DerivedContentKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedContentKeys")
            .field("algorithm", &self.algorithm)
            .field("label", &self.label)
            .field("target", &self.target)
            .field("publisher", &self.publisher)
            .finish_non_exhaustive()
    }
}

impl DerivedContentKeys {
    /// # Errors
    ///
    /// Fails when the master secret is empty or all-zero, or the algorithm
    /// is not a block cipher.
    pub fn new(
        master: &[u8],
        algorithm: CipherAlgorithm,
        label: impl Into<String>,
        target: Name,
        publisher: Option<KeyDigest>,
    ) -> Result<Self, ContentKeyError> {
        check_master(master)?;
        algorithm.check_block_cipher()?;
        Ok(Self {
            master: master.to_vec(),
            algorithm,
            label: label.into(),
            target,
            publisher,
        })
    }

    pub fn target(&self) -> &Name {
        &self.target
    }

    /// Derive this object's (key, nonce seed) pair
    fn object_material(&self) -> Result<(Vec<u8>, [u8; NONCE_SEED_SIZE]), ContentKeyError> {
        let key_len = self.algorithm.key_len();
        let bits = (key_len + NONCE_SEED_SIZE) * 8;
        let mut contexts: Vec<&dyn DerivationContext> = vec![&self.target];
        if let Some(publisher) = &self.publisher {
            contexts.push(publisher);
        }
        let mut material = derive_key(&self.master, &self.label, &contexts, bits)?;
        let mut seed = [0u8; NONCE_SEED_SIZE];
        seed.copy_from_slice(&material[key_len..]);
        material.truncate(key_len);
        Ok((material, seed))
    }
}

impl ContentKeys for DerivedContentKeys {
    fn algorithm(&self) -> CipherAlgorithm {
        self.algorithm
    }

    fn segment_cipher_material(
        &self,
        segment: u64,
        _for_encryption: bool,
    ) -> Result<SegmentCipherMaterial, ContentKeyError> {
        let (key, seed) = self.object_material()?;
        expand(self.algorithm, key, &seed, segment)
    }
}

/// Content keys with a fixed key and nonce seed
///
/// Only safe for a single save of a single object: see the module docs.
pub struct StaticContentKeys {
    algorithm: CipherAlgorithm,
    key: Vec<u8>,
    seed: [u8; NONCE_SEED_SIZE],
    encrypted_segments: Mutex<BTreeSet<u64>>,
}

impl fmt::Debug for StaticContentKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticContentKeys")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl StaticContentKeys {
    pub fn new(
        algorithm: CipherAlgorithm,
        key: Vec<u8>,
        seed: [u8; NONCE_SEED_SIZE],
    ) -> Result<Self, ContentKeyError> {
        algorithm.check_block_cipher()?;
        algorithm.check_key(&key)?;
        check_master(&key)?;
        Ok(Self {
            algorithm,
            key,
            seed,
            encrypted_segments: Mutex::new(BTreeSet::new()),
        })
    }

    /// Fresh random key and seed
    pub fn generate(algorithm: CipherAlgorithm) -> Result<Self, ContentKeyError> {
        let mut key = vec![0u8; algorithm.key_len()];
        let mut seed = [0u8; NONCE_SEED_SIZE];
        let mut rng = rand::rng();
        rng.fill_bytes(&mut key);
        rng.fill_bytes(&mut seed);
        Self::new(algorithm, key, seed)
    }
}

impl ContentKeys for StaticContentKeys {
    fn algorithm(&self) -> CipherAlgorithm {
        self.algorithm
    }

    fn segment_cipher_material(
        &self,
        segment: u64,
        for_encryption: bool,
    ) -> Result<SegmentCipherMaterial, ContentKeyError> {
        if for_encryption && self.algorithm.mode() == CipherMode::Counter {
            let mut encrypted = self.encrypted_segments.lock();
            if !encrypted.insert(segment) {
                return Err(ContentKeyError::SegmentReused(segment));
            }
        }
        expand(self.algorithm, self.key.clone(), &self.seed, segment)
    }
}
