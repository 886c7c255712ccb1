//! Counter-mode HMAC-SHA-256 key derivation
//!
//! Expands a master secret into arbitrary-length key material bound to a
//! label and an ordered list of context objects. Each output block is
//!
//! ```text
//! HMAC(master, counter(u32 BE, from 1) || label || 0x00 || contexts... || output_bits(u32 BE))
//! ```
//!
//! and blocks are concatenated until enough bytes are produced, with the
//! final block truncated.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::crypto::{KeyDigest, PublicKey};
use crate::name::Name;

type HmacSha256 = Hmac<Sha256>;

/// Size of one HMAC-SHA-256 output block
const BLOCK_SIZE: usize = 32;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KdfError {
    #[error("master secret is empty")]
    EmptyMaster,
    #[error("master secret is all zeros")]
    ZeroMaster,
    #[error("output length must be a positive multiple of 8 bits, got {0}")]
    InvalidLength(usize),
}

/// An object that can be bound into a derivation
pub trait DerivationContext {
    fn derivation_bytes(&self) -> Vec<u8>;
}

impl DerivationContext for Name {
    fn derivation_bytes(&self) -> Vec<u8> {
        self.encode()
    }
}

impl DerivationContext for PublicKey {
    fn derivation_bytes(&self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }
}

impl DerivationContext for KeyDigest {
    fn derivation_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

/// Reject master secrets that are empty or all zeros
pub fn check_master(master: &[u8]) -> Result<(), KdfError> {
    if master.is_empty() {
        return Err(KdfError::EmptyMaster);
    }
    if master.iter().all(|b| *b == 0) {
        return Err(KdfError::ZeroMaster);
    }
    Ok(())
}

/// Derive `output_bits / 8` bytes of key material
///
/// # Errors
///
/// Fails with a configuration error when the master secret is empty or
/// all-zero, or when `output_bits` is zero or not a whole number of bytes.
pub fn derive_key(
    master: &[u8],
    label: &str,
    contexts: &[&dyn DerivationContext],
    output_bits: usize,
) -> Result<Vec<u8>, KdfError> {
    check_master(master)?;
    if output_bits == 0 || output_bits % 8 != 0 || output_bits > u32::MAX as usize {
        return Err(KdfError::InvalidLength(output_bits));
    }
    let output_len = output_bits / 8;

    // Everything after the counter is the same for every block
    let mut fixed = Vec::new();
    fixed.extend_from_slice(label.as_bytes());
    fixed.push(0x00);
    for context in contexts {
        fixed.extend_from_slice(&context.derivation_bytes());
    }
    fixed.extend_from_slice(&(output_bits as u32).to_be_bytes());

    let mut out = Vec::with_capacity(output_len + BLOCK_SIZE);
    let mut counter: u32 = 1;
    while out.len() < output_len {
        let Ok(mut mac) = HmacSha256::new_from_slice(master) else {
            unreachable!("HMAC-SHA256 accepts any key size");
        };
        mac.update(&counter.to_be_bytes());
        mac.update(&fixed);
        out.extend_from_slice(&mac.finalize().into_bytes());
        counter += 1;
    }
    out.truncate(output_len);
    Ok(out)
}
