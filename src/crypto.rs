//! Authenticated encryption
//!
//! ChaCha20-Poly1305 with a 256-bit key, 96-bit nonce and 128-bit detached
//! tag. Associated data is empty in all uses. Encryption and decryption are
//! in place so plaintext only ever exists inside caller-owned sensitive
//! buffers.

use chacha20poly1305::aead::AeadInPlace;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce, Tag};

use crate::error::{ErrorCategory, ErrorKind, PwmError, Result};

/// Key length in bytes.
pub const KEY_SIZE: usize = 32;
/// Authentication tag length in bytes.
pub const TAG_SIZE: usize = 16;
/// Nonce length in bytes.
pub const NONCE_SIZE: usize = 12;

fn check_lengths(key: &[u8], nonce: &[u8]) -> Result<()> {
    if key.len() != KEY_SIZE {
        return Err(PwmError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::Cipher,
            format!("cipher key must be {KEY_SIZE} bytes, got {}", key.len()),
        ));
    }
    if nonce.len() != NONCE_SIZE {
        return Err(PwmError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::Cipher,
            format!("nonce must be {NONCE_SIZE} bytes, got {}", nonce.len()),
        ));
    }
    Ok(())
}

/// Encrypts `buf` in place and returns the detached authentication tag.
pub fn encrypt(key: &[u8], nonce: &[u8], buf: &mut [u8]) -> Result<[u8; TAG_SIZE]> {
    check_lengths(key, nonce)?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(nonce), b"", buf)
        .map_err(|_| {
            PwmError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::Cipher,
                "encryption failed",
            )
        })?;

    Ok(tag.into())
}

/// Decrypts `buf` in place, verifying the detached tag.
///
/// A tag that fails to verify yields `ErrorKind::AuthenticationFailed`; at
/// the config layer that is the wrong-master-passphrase signal, everywhere
/// else it means corrupted or tampered-with data.
pub fn decrypt(key: &[u8], nonce: &[u8], buf: &mut [u8], tag: &[u8]) -> Result<()> {
    check_lengths(key, nonce)?;
    if tag.len() != TAG_SIZE {
        return Err(PwmError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::Cipher,
            format!("tag must be {TAG_SIZE} bytes, got {}", tag.len()),
        ));
    }

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt_in_place_detached(Nonce::from_slice(nonce), b"", buf, Tag::from_slice(tag))
        .map_err(|_| {
            PwmError::with_kind(
                ErrorCategory::Corruption,
                ErrorKind::AuthenticationFailed,
                "authentication tag mismatch",
            )
        })
}
