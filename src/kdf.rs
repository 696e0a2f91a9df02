//! Key derivation
//!
//! Argon2id (version 0x13) over (passphrase, salt, label). The label is a
//! short ASCII string fed through the associated-data input to
//! domain-separate the three uses of the master passphrase: encryption
//! keys, item-name keys and item filenames.

use argon2::{Algorithm, Argon2, AssociatedData, ParamsBuilder, Version};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{ErrorCategory, ErrorKind, PwmError, Result};

/// Salt length in bytes.
pub const SALT_SIZE: usize = 32;

/// Label for config and item-data encryption keys.
pub const LABEL_DATA: &[u8] = b"data";
/// Label for the item-name encryption key.
pub const LABEL_NAMES: &[u8] = b"names";
/// Label suffix for item filename derivation.
pub const LABEL_FILES: &[u8] = b"files";

/// Length of a derived item filename in hex characters.
pub const NAME_HEX_LEN: usize = 64;

/// Argon2id cost parameters.
///
/// The shipped binary always runs [`KdfParams::DEFAULT`]; the struct exists
/// so tests can exercise the vault with cheap parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub m_cost_kib: u32,
    /// Number of iterations.
    pub t_cost: u32,
    /// Lanes / threads.
    pub p_cost: u32,
}

impl KdfParams {
    pub const DEFAULT: Self = Self {
        m_cost_kib: 8192,
        t_cost: 100,
        p_cost: 4,
    };
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// The argon2 crate caps associated data at 32 bytes; the per-item filename
/// label `itemName || "files"` can be longer, in which case its SHA-256
/// digest is bound instead.
fn label_associated_data(label: &[u8]) -> Zeroizing<Vec<u8>> {
    if label.len() <= 32 {
        Zeroizing::new(label.to_vec())
    } else {
        Zeroizing::new(Sha256::digest(label).to_vec())
    }
}

/// Derives `out.len()` raw key bytes from the passphrase, salt and label.
pub fn derive_key(
    params: &KdfParams,
    passphrase: &[u8],
    salt: &[u8],
    label: &[u8],
    out: &mut [u8],
) -> Result<()> {
    let kdf_err = |e: argon2::Error| {
        PwmError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::Kdf,
            format!("key derivation failed: {e}"),
        )
    };

    let ad = label_associated_data(label);
    let argon_params = ParamsBuilder::new()
        .m_cost(params.m_cost_kib)
        .t_cost(params.t_cost)
        .p_cost(params.p_cost)
        .data(AssociatedData::new(&ad).map_err(kdf_err)?)
        .build()
        .map_err(kdf_err)?;

    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);
    argon
        .hash_password_into(passphrase, salt, out)
        .map_err(kdf_err)
}

/// Derives an item filename: 32 key bytes hex-encoded to 64 lowercase
/// characters. Deterministic for a fixed (passphrase, salt, label).
pub fn derive_name(
    params: &KdfParams,
    passphrase: &[u8],
    salt: &[u8],
    label: &[u8],
) -> Result<String> {
    let mut bytes = Zeroizing::new([0u8; NAME_HEX_LEN / 2]);
    derive_key(params, passphrase, salt, label, &mut bytes[..])?;
    Ok(hex::encode(&bytes[..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_params() -> KdfParams {
        KdfParams {
            m_cost_kib: 16,
            t_cost: 1,
            p_cost: 1,
        }
    }

    #[test]
    fn derivation_is_deterministic() {
        let params = test_params();
        let salt = [5u8; SALT_SIZE];

        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        derive_key(&params, b"passphrase", &salt, LABEL_DATA, &mut a).unwrap();
        derive_key(&params, b"passphrase", &salt, LABEL_DATA, &mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn labels_separate_domains() {
        let params = test_params();
        let salt = [5u8; SALT_SIZE];

        let mut data_key = [0u8; 32];
        let mut names_key = [0u8; 32];
        let mut files_key = [0u8; 32];
        derive_key(&params, b"passphrase", &salt, LABEL_DATA, &mut data_key).unwrap();
        derive_key(&params, b"passphrase", &salt, LABEL_NAMES, &mut names_key).unwrap();
        derive_key(&params, b"passphrase", &salt, LABEL_FILES, &mut files_key).unwrap();

        assert_ne!(data_key, names_key);
        assert_ne!(data_key, files_key);
        assert_ne!(names_key, files_key);
    }

    #[test]
    fn salt_separates_keys() {
        let params = test_params();

        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        derive_key(&params, b"passphrase", &[1u8; SALT_SIZE], LABEL_DATA, &mut a).unwrap();
        derive_key(&params, b"passphrase", &[2u8; SALT_SIZE], LABEL_DATA, &mut b).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn derived_name_is_stable_lowercase_hex() {
        let params = test_params();
        let salt = [9u8; SALT_SIZE];
        let label: Vec<u8> = [b"github".as_slice(), LABEL_FILES].concat();

        let first = derive_name(&params, b"passphrase", &salt, &label).unwrap();
        let second = derive_name(&params, b"passphrase", &salt, &label).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), NAME_HEX_LEN);
        assert!(first.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
    }

    #[test]
    fn long_labels_still_separate() {
        // Item names can push the filename label past the 32-byte
        // associated-data cap; the digested label must still be distinct
        // per item name.
        let params = test_params();
        let salt = [9u8; SALT_SIZE];
        let long_a: Vec<u8> = ["a".repeat(60).into_bytes(), LABEL_FILES.to_vec()].concat();
        let long_b: Vec<u8> = ["b".repeat(60).into_bytes(), LABEL_FILES.to_vec()].concat();

        let name_a = derive_name(&params, b"passphrase", &salt, &long_a).unwrap();
        let name_b = derive_name(&params, b"passphrase", &salt, &long_b).unwrap();
        assert_ne!(name_a, name_b);
        assert_eq!(name_a.len(), NAME_HEX_LEN);
    }
}
