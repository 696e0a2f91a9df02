//! Cryptographically strong randomness
//!
//! Salts, item-name nonces and generated passwords all come from here. A
//! short read is never returned; any failure of the operating system source
//! is fatal to the calling operation.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{ErrorCategory, ErrorKind, PwmError, Result};

/// Fills `buf` with cryptographically strong bytes without blocking.
pub fn fill_random(buf: &mut [u8]) -> Result<()> {
    OsRng.try_fill_bytes(buf).map_err(|e| {
        PwmError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::RandomSource,
            "operating system random source failed",
            e,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_requested_length() {
        let mut buf = [0u8; 64];
        fill_random(&mut buf).unwrap();
        // 64 zero bytes from a healthy generator is a 2^-512 event.
        assert!(buf.iter().any(|&b| b != 0));
    }

    #[test]
    fn consecutive_draws_differ() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        fill_random(&mut a).unwrap();
        fill_random(&mut b).unwrap();
        assert_ne!(a, b);
    }
}
