//! pwm - Single-user password vault backed by an encrypted file store
//!
//! Each stored item holds a name, username, password and free-form notes.
//! Item data is encrypted with ChaCha20-Poly1305 under keys derived from a
//! single master passphrase via Argon2id; item names are hidden from
//! directory listings by deriving each filename from the master passphrase.

pub mod crypto;
pub mod error;
pub mod kdf;
pub mod prompt;
pub mod pwgen;
pub mod random;
pub mod record;
pub mod sensitive;
pub mod vault;
