//! On-disk record layout
//!
//! Both vault files are fixed-size byte arrays with every field at a fixed
//! offset, prefixed by a one-byte format version. The system record holds
//! the three salts and the encrypted password-generation config; each item
//! record holds the encrypted item name and the encrypted item data.

use zeroize::Zeroizing;

use crate::crypto::{NONCE_SIZE, TAG_SIZE};
use crate::error::{ErrorCategory, ErrorKind, PwmError, Result};
use crate::kdf::{NAME_HEX_LEN, SALT_SIZE};
use crate::prompt::is_printable;
use crate::pwgen::{CONFIG_DATA_SIZE, MAX_PASSWORD_LEN};
use crate::sensitive::SecretBuf;

/// Current on-disk format version.
pub const FORMAT_VERSION: u8 = 1;

/// Maximum item name length in characters.
pub const MAX_ITEM_NAME: usize = 100;
/// Maximum username length in characters.
pub const MAX_USERNAME: usize = 100;
/// Maximum other-info length in characters.
pub const MAX_OTHER_INFO: usize = 300;

/// Size of the zero-padded item plaintext: the three fields joined by
/// newlines never exceed this, so the padding is what makes every item
/// file the same size.
pub const ITEM_PLAINTEXT_SIZE: usize =
    MAX_ITEM_NAME + MAX_USERNAME + (MAX_PASSWORD_LEN + 1) + MAX_OTHER_INFO;

/// Total size of the system file in bytes.
pub const SYSTEM_FILE_SIZE: usize = 1 + 3 * SALT_SIZE + TAG_SIZE + CONFIG_DATA_SIZE;
/// Total size of an item file in bytes.
pub const ITEM_FILE_SIZE: usize =
    1 + NONCE_SIZE + TAG_SIZE + MAX_ITEM_NAME + SALT_SIZE + TAG_SIZE + ITEM_PLAINTEXT_SIZE;

fn corrupt(msg: impl Into<String>) -> PwmError {
    PwmError::with_kind(ErrorCategory::Corruption, ErrorKind::TruncatedInput, msg)
}

fn check_version(byte: u8) -> Result<()> {
    if byte != FORMAT_VERSION {
        return Err(PwmError::with_kind(
            ErrorCategory::Corruption,
            ErrorKind::UnsupportedVersion,
            format!("unknown format version {byte}"),
        ));
    }
    Ok(())
}

/// The single per-vault record, stored under the fixed name `system`.
#[derive(Clone, Debug)]
pub struct SystemRecord {
    pub file_salt: [u8; SALT_SIZE],
    pub name_salt: [u8; SALT_SIZE],
    pub config_salt: [u8; SALT_SIZE],
    pub config_tag: [u8; TAG_SIZE],
    pub config_ct: [u8; CONFIG_DATA_SIZE],
}

impl SystemRecord {
    pub fn to_bytes(&self) -> [u8; SYSTEM_FILE_SIZE] {
        let mut out = [0u8; SYSTEM_FILE_SIZE];
        out[0] = FORMAT_VERSION;
        let mut pos = 1;
        for field in [
            &self.file_salt[..],
            &self.name_salt[..],
            &self.config_salt[..],
            &self.config_tag[..],
            &self.config_ct[..],
        ] {
            out[pos..pos + field.len()].copy_from_slice(field);
            pos += field.len();
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SYSTEM_FILE_SIZE {
            return Err(corrupt(format!(
                "system record is {} bytes, expected {SYSTEM_FILE_SIZE}",
                bytes.len()
            )));
        }
        check_version(bytes[0])?;

        let mut record = Self {
            file_salt: [0; SALT_SIZE],
            name_salt: [0; SALT_SIZE],
            config_salt: [0; SALT_SIZE],
            config_tag: [0; TAG_SIZE],
            config_ct: [0; CONFIG_DATA_SIZE],
        };
        let mut pos = 1;
        for field in [
            &mut record.file_salt[..],
            &mut record.name_salt[..],
            &mut record.config_salt[..],
            &mut record.config_tag[..],
            &mut record.config_ct[..],
        ] {
            let len = field.len();
            field.copy_from_slice(&bytes[pos..pos + len]);
            pos += len;
        }
        Ok(record)
    }
}

/// One stored item, kept under its derived 64-hex-digit filename.
///
/// The name fields are written at item creation and preserved verbatim by
/// updates; the data fields are rewritten (with a fresh salt) on every
/// write.
#[derive(Clone)]
pub struct ItemRecord {
    pub name_nonce: [u8; NONCE_SIZE],
    pub name_tag: [u8; TAG_SIZE],
    pub name_ct: [u8; MAX_ITEM_NAME],
    pub data_salt: [u8; SALT_SIZE],
    pub data_tag: [u8; TAG_SIZE],
    pub data_ct: [u8; ITEM_PLAINTEXT_SIZE],
}

impl ItemRecord {
    pub fn to_bytes(&self) -> [u8; ITEM_FILE_SIZE] {
        let mut out = [0u8; ITEM_FILE_SIZE];
        out[0] = FORMAT_VERSION;
        let mut pos = 1;
        for field in [
            &self.name_nonce[..],
            &self.name_tag[..],
            &self.name_ct[..],
            &self.data_salt[..],
            &self.data_tag[..],
            &self.data_ct[..],
        ] {
            out[pos..pos + field.len()].copy_from_slice(field);
            pos += field.len();
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != ITEM_FILE_SIZE {
            return Err(corrupt(format!(
                "item record is {} bytes, expected {ITEM_FILE_SIZE}",
                bytes.len()
            )));
        }
        check_version(bytes[0])?;

        let mut record = Self {
            name_nonce: [0; NONCE_SIZE],
            name_tag: [0; TAG_SIZE],
            name_ct: [0; MAX_ITEM_NAME],
            data_salt: [0; SALT_SIZE],
            data_tag: [0; TAG_SIZE],
            data_ct: [0; ITEM_PLAINTEXT_SIZE],
        };
        let mut pos = 1;
        for field in [
            &mut record.name_nonce[..],
            &mut record.name_tag[..],
            &mut record.name_ct[..],
            &mut record.data_salt[..],
            &mut record.data_tag[..],
            &mut record.data_ct[..],
        ] {
            let len = field.len();
            field.copy_from_slice(&bytes[pos..pos + len]);
            pos += len;
        }
        Ok(record)
    }
}

/// Checks whether a directory entry looks like a derived item filename.
pub fn is_item_filename(name: &str) -> bool {
    name.len() == NAME_HEX_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

/// The three decrypted fields of an item.
pub struct ItemFields {
    pub username: Zeroizing<String>,
    pub password: Zeroizing<String>,
    pub other_info: Zeroizing<String>,
}

/// Joins the three fields with newline separators and zero-pads to
/// [`ITEM_PLAINTEXT_SIZE`] inside a sensitive buffer.
pub fn pack_item_fields(username: &str, password: &str, other_info: &str) -> Result<SecretBuf> {
    let invalid = |msg: &str| {
        PwmError::with_kind(ErrorCategory::Internal, ErrorKind::InvalidInput, msg)
    };

    if username.len() > MAX_USERNAME || !is_printable(username) {
        return Err(invalid("username failed validation"));
    }
    if password.len() > MAX_PASSWORD_LEN || !is_printable(password) {
        return Err(invalid("password failed validation"));
    }
    if other_info.len() > MAX_OTHER_INFO || !is_printable(other_info) {
        return Err(invalid("other info failed validation"));
    }

    let mut buf = SecretBuf::zeroed(ITEM_PLAINTEXT_SIZE)?;
    let mut pos = 0;
    for (field, separator) in [(username, true), (password, true), (other_info, false)] {
        buf[pos..pos + field.len()].copy_from_slice(field.as_bytes());
        pos += field.len();
        if separator {
            buf[pos] = b'\n';
            pos += 1;
        }
    }
    Ok(buf)
}

/// Parses a decrypted item plaintext back into its three fields.
///
/// The first two fields end at a newline; the final field ends at the
/// first zero byte of the padding. Each field is printable, so the zero
/// padding is unambiguous.
pub fn unpack_item_fields(buf: &[u8]) -> Result<ItemFields> {
    let corrupt = |msg: &str| PwmError::new(ErrorCategory::Corruption, msg.to_string());

    let mut parts = buf.splitn(3, |&b| b == b'\n');
    let username = parts.next().ok_or_else(|| corrupt("missing username"))?;
    let password = parts.next().ok_or_else(|| corrupt("missing password"))?;
    let rest = parts.next().ok_or_else(|| corrupt("missing other info"))?;
    let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    let other_info = &rest[..end];

    let field = |bytes: &[u8]| -> Result<Zeroizing<String>> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| corrupt("item field is not valid UTF-8"))?;
        if !is_printable(text) {
            return Err(corrupt("item field contains unprintable characters"));
        }
        Ok(Zeroizing::new(text.to_string()))
    };

    Ok(ItemFields {
        username: field(username)?,
        password: field(password)?,
        other_info: field(other_info)?,
    })
}
