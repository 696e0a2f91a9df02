//! Password generation
//!
//! Draws passwords from a configurable symbol alphabet using rejection
//! sampling over operating-system randomness, so every enabled symbol is
//! equally likely.

use zeroize::Zeroizing;

use crate::error::{ErrorCategory, ErrorKind, PwmError, Result};
use crate::prompt::is_printable;
use crate::random;

/// Minimum password length in characters.
pub const MIN_PASSWORD_LEN: usize = 8;
/// Maximum password length in characters.
pub const MAX_PASSWORD_LEN: usize = 63;

/// Serialized size of the generation settings in bytes.
pub const CONFIG_DATA_SIZE: usize = 4;

const NUMBERS: &[u8] = b"0123456789";
const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const SPECIALS: &[u8] = b"!@#$%^&*()-_=+[{}]\\|;:'\",<.>/?";

/// Password generation settings, stored encrypted in the system record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PwGenConfig {
    pub use_numbers: bool,
    pub use_letters: bool,
    pub use_specials: bool,
    pub length: u8,
}

impl Default for PwGenConfig {
    fn default() -> Self {
        Self {
            use_numbers: true,
            use_letters: true,
            use_specials: true,
            length: 25,
        }
    }
}

impl PwGenConfig {
    /// Serializes to the fixed on-disk layout: three 0/1 flag bytes
    /// followed by the length byte.
    pub fn serialize(&self) -> [u8; CONFIG_DATA_SIZE] {
        [
            self.use_numbers as u8,
            self.use_letters as u8,
            self.use_specials as u8,
            self.length,
        ]
    }

    /// Deserializes previously stored settings.
    ///
    /// The bytes come out of an authenticated ciphertext we wrote
    /// ourselves, so anything out of range is corruption.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let corrupt = |msg: &str| {
            PwmError::with_kind(ErrorCategory::Corruption, ErrorKind::InvalidInput, msg)
        };

        if data.len() != CONFIG_DATA_SIZE {
            return Err(corrupt("config data has wrong size"));
        }
        for &flag in &data[..3] {
            if flag > 1 {
                return Err(corrupt("config flag byte out of range"));
            }
        }
        let length = data[3];
        if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&(length as usize)) {
            return Err(corrupt("config password length out of range"));
        }
        if data[..3] == [0, 0, 0] {
            return Err(corrupt("config enables no symbol classes"));
        }

        Ok(Self {
            use_numbers: data[0] == 1,
            use_letters: data[1] == 1,
            use_specials: data[2] == 1,
            length,
        })
    }

    fn symbols(&self) -> Vec<u8> {
        let mut table = Vec::with_capacity(NUMBERS.len() + LETTERS.len() + SPECIALS.len());
        if self.use_numbers {
            table.extend_from_slice(NUMBERS);
        }
        if self.use_letters {
            table.extend_from_slice(LETTERS);
        }
        if self.use_specials {
            table.extend_from_slice(SPECIALS);
        }
        table
    }

    /// Generates a password of the configured length.
    pub fn generate(&self) -> Result<Zeroizing<String>> {
        let symbols = self.symbols();
        if symbols.is_empty() {
            return Err(PwmError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::InvalidInput,
                "no symbol classes enabled",
            ));
        }

        let count = symbols.len();
        // Largest byte value that maps onto the table without bias.
        let max_index = ((256 / count) * count - 1) as u8;
        let wanted = self.length as usize;

        let mut out = Zeroizing::new(String::with_capacity(wanted));
        let mut block = Zeroizing::new([0u8; MAX_PASSWORD_LEN + 1]);
        while out.len() < wanted {
            random::fill_random(&mut block[..])?;
            for &byte in block.iter() {
                if byte <= max_index {
                    out.push(symbols[byte as usize % count] as char);
                    if out.len() == wanted {
                        break;
                    }
                }
            }
        }

        Ok(out)
    }
}

/// Checks the printable/length rules shared by passwords and the master
/// passphrase.
pub fn is_valid_password(password: &str) -> bool {
    (MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&password.len()) && is_printable(password)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_round_trip() {
        let config = PwGenConfig {
            use_numbers: false,
            use_letters: true,
            use_specials: false,
            length: 40,
        };
        let restored = PwGenConfig::deserialize(&config.serialize()).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn default_serializes_to_expected_bytes() {
        assert_eq!(PwGenConfig::default().serialize(), [1, 1, 1, 25]);
    }

    #[test]
    fn deserialize_rejects_bad_flag_byte() {
        let err = PwGenConfig::deserialize(&[2, 1, 1, 25]).unwrap_err();
        assert_eq!(err.category, crate::error::ErrorCategory::Corruption);
    }

    #[test]
    fn deserialize_rejects_out_of_range_length() {
        assert!(PwGenConfig::deserialize(&[1, 1, 1, 7]).is_err());
        assert!(PwGenConfig::deserialize(&[1, 1, 1, 64]).is_err());
        assert!(PwGenConfig::deserialize(&[1, 1, 1, 25]).is_ok());
    }

    #[test]
    fn deserialize_rejects_empty_alphabet() {
        assert!(PwGenConfig::deserialize(&[0, 0, 0, 25]).is_err());
    }

    #[test]
    fn generated_password_has_configured_length() {
        let config = PwGenConfig::default();
        let password = config.generate().unwrap();
        assert_eq!(password.len(), 25);
        assert!(is_valid_password(&password));
    }

    #[test]
    fn numbers_only_config_draws_only_digits() {
        let config = PwGenConfig {
            use_numbers: true,
            use_letters: false,
            use_specials: false,
            length: 32,
        };
        let password = config.generate().unwrap();
        assert!(password.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn specials_only_config_draws_only_specials() {
        let config = PwGenConfig {
            use_numbers: false,
            use_letters: false,
            use_specials: true,
            length: 32,
        };
        let password = config.generate().unwrap();
        assert!(password.bytes().all(|b| SPECIALS.contains(&b)));
    }

    #[test]
    fn letters_cover_whole_alphabet() {
        // A long draw from the letters-only alphabet should produce no
        // character outside a-zA-Z and is overwhelmingly likely to contain
        // an 'e' (the full alphabet, no duplicated symbols).
        let config = PwGenConfig {
            use_numbers: false,
            use_letters: true,
            use_specials: false,
            length: 63,
        };
        let mut seen = std::collections::HashSet::new();
        for _ in 0..50 {
            let password = config.generate().unwrap();
            assert!(password.chars().all(|c| c.is_ascii_alphabetic()));
            seen.extend(password.chars());
        }
        assert!(seen.contains(&'e'));
        assert!(seen.contains(&'E'));
    }

    #[test]
    fn password_validity_rules() {
        assert!(is_valid_password("8charsok"));
        assert!(is_valid_password(&"a".repeat(63)));
        assert!(!is_valid_password("short7!"));
        assert!(!is_valid_password(&"a".repeat(64)));
        assert!(!is_valid_password("tab\tcharacter"));
        assert!(is_valid_password("spaces are fine"));
    }

    #[test]
    fn alphabet_sizes() {
        assert_eq!(NUMBERS.len(), 10);
        assert_eq!(LETTERS.len(), 52);
        assert_eq!(SPECIALS.len(), 30);
    }
}
