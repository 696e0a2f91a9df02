//! Vault engine
//!
//! Owns the on-disk layout and every vault operation. All secrets flow
//! through the sensitive-buffer pool and all persistence goes through the
//! authenticated cipher.
//!
//! Key discipline: config and item-data keys are derived from salts that
//! are rotated on every write, so those encryptions use a fixed nonce.
//! The item-name key is stable for the life of the vault (its salt never
//! changes), so item names are encrypted under per-item random nonces.
//! Item filenames are derived from the master passphrase so a directory
//! listing reveals nothing about item names.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use zeroize::Zeroizing;

use crate::crypto::{self, KEY_SIZE, NONCE_SIZE};
use crate::error::{ErrorCategory, ErrorKind, PwmError, Result};
use crate::kdf::{self, KdfParams, LABEL_DATA, LABEL_FILES, LABEL_NAMES, SALT_SIZE};
use crate::prompt::{is_printable, Prompter};
use crate::pwgen::{PwGenConfig, CONFIG_DATA_SIZE, MAX_PASSWORD_LEN, MIN_PASSWORD_LEN};
use crate::random::fill_random;
use crate::record::{
    self, ItemFields, ItemRecord, SystemRecord, ITEM_PLAINTEXT_SIZE, MAX_ITEM_NAME,
    MAX_OTHER_INFO, MAX_USERNAME,
};
use crate::sensitive::{constant_time_eq, SecretBuf};

/// Name of the system record inside the storage directory.
pub const SYSTEM_FILE_NAME: &str = "system";
/// Name of the transient file used for atomic rewrites.
pub const TEMP_FILE_NAME: &str = "temp";

/// Fixed nonce for config and item-data encryption.
///
/// Safe only because the paired key is derived from a salt that is rotated
/// on every write; removing the salt rotation would turn this into nonce
/// reuse.
const DATA_NONCE: [u8; NONCE_SIZE] = [0u8; NONCE_SIZE];

/// The three paths every operation starts from.
pub struct VaultPaths {
    root: PathBuf,
    system: PathBuf,
    temp: PathBuf,
}

impl VaultPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            system: root.join(SYSTEM_FILE_NAME),
            temp: root.join(TEMP_FILE_NAME),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn system(&self) -> &Path {
        &self.system
    }

    pub fn temp(&self) -> &Path {
        &self.temp
    }

    pub fn item(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }
}

/// Computes the storage root: `$HOME/PwmStore` in release builds, a
/// directory under the current working directory in development builds.
pub fn default_root() -> Result<PathBuf> {
    if cfg!(debug_assertions) {
        Ok(PathBuf::from("PwmStore"))
    } else {
        match std::env::var_os("HOME") {
            Some(home) if !home.is_empty() => Ok(PathBuf::from(home).join("PwmStore")),
            _ => Err(PwmError::new(
                ErrorCategory::User,
                "HOME is not set; cannot locate the vault storage directory.",
            )),
        }
    }
}

fn validate_item_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_ITEM_NAME || !is_printable(name) {
        return Err(PwmError::with_kind(
            ErrorCategory::User,
            ErrorKind::InvalidInput,
            format!("Item names must be 1 to {MAX_ITEM_NAME} printable characters."),
        ));
    }
    Ok(())
}

fn io_error(msg: impl Into<String>, err: std::io::Error) -> PwmError {
    PwmError::with_kind_and_source(ErrorCategory::Internal, ErrorKind::Io, msg, err)
}

/// The vault: storage paths, KDF parameters, the loaded password-generation
/// config and the prompter used for all interaction. One per process.
pub struct Vault<'a> {
    paths: VaultPaths,
    kdf: KdfParams,
    pwgen: PwGenConfig,
    prompter: &'a mut dyn Prompter,
}

impl<'a> Vault<'a> {
    pub fn new(root: impl Into<PathBuf>, prompter: &'a mut dyn Prompter) -> Self {
        Self::with_kdf_params(root, prompter, KdfParams::DEFAULT)
    }

    /// Builds a vault with explicit Argon2 cost parameters (tests use cheap
    /// ones; the binary always passes the defaults).
    pub fn with_kdf_params(
        root: impl Into<PathBuf>,
        prompter: &'a mut dyn Prompter,
        kdf: KdfParams,
    ) -> Self {
        Self {
            paths: VaultPaths::new(root),
            kdf,
            pwgen: PwGenConfig::default(),
            prompter,
        }
    }

    pub fn paths(&self) -> &VaultPaths {
        &self.paths
    }

    /// Initializes the vault: fresh salts, default config, new storage
    /// directory and system file. Fails if the vault already exists.
    pub fn init(&mut self) -> Result<()> {
        if self.paths.system().exists() {
            return Err(PwmError::with_kind(
                ErrorCategory::User,
                ErrorKind::AlreadyInitialized,
                "Vault is already initialized.",
            ));
        }

        let passphrase = self.prompter.read_password("Master passphrase:")?;
        let confirm = self.prompter.read_password("Confirm master passphrase:")?;
        if !constant_time_eq(passphrase.as_bytes(), confirm.as_bytes()) {
            return Err(PwmError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidInput,
                "Passphrases do not match.",
            ));
        }
        let master = SecretBuf::from_bytes(passphrase.as_bytes())?;
        drop(passphrase);
        drop(confirm);

        let mut file_salt = [0u8; SALT_SIZE];
        let mut name_salt = [0u8; SALT_SIZE];
        let mut config_salt = [0u8; SALT_SIZE];
        fill_random(&mut file_salt)?;
        fill_random(&mut name_salt)?;
        fill_random(&mut config_salt)?;

        self.pwgen = PwGenConfig::default();
        let (config_tag, config_ct) = self.seal_config(&master, &config_salt)?;

        self.create_storage_dir()?;
        let record = SystemRecord {
            file_salt,
            name_salt,
            config_salt,
            config_tag,
            config_ct,
        };
        self.write_record_atomic(self.paths.system(), &record.to_bytes())?;
        self.prompter.show("Vault initialized.");
        Ok(())
    }

    /// Reconfigures password generation. The config salt and ciphertext are
    /// rotated; `fileSalt` and `nameSalt` are preserved verbatim so every
    /// existing item stays addressable and decryptable.
    pub fn config(&mut self) -> Result<()> {
        let (master, record) = self.authenticate()?;

        self.show_pwgen_config();
        let new_config = loop {
            let use_numbers = self
                .prompter
                .read_yes_no("Use numbers? [y/n]:", self.pwgen.use_numbers)?;
            let use_letters = self
                .prompter
                .read_yes_no("Use letters? [y/n]:", self.pwgen.use_letters)?;
            let use_specials = self
                .prompter
                .read_yes_no("Use special characters? [y/n]:", self.pwgen.use_specials)?;
            if !(use_numbers || use_letters || use_specials) {
                self.prompter
                    .show("At least one symbol class must be enabled.");
                continue;
            }
            let length = self.prompter.read_uint(
                &format!("Generated password length ({MIN_PASSWORD_LEN}-{MAX_PASSWORD_LEN}):"),
                MIN_PASSWORD_LEN,
                MAX_PASSWORD_LEN,
            )?;
            break PwGenConfig {
                use_numbers,
                use_letters,
                use_specials,
                length: length as u8,
            };
        };

        self.pwgen = new_config;
        let mut config_salt = [0u8; SALT_SIZE];
        fill_random(&mut config_salt)?;
        let (config_tag, config_ct) = self.seal_config(&master, &config_salt)?;

        let updated = SystemRecord {
            file_salt: record.file_salt,
            name_salt: record.name_salt,
            config_salt,
            config_tag,
            config_ct,
        };
        self.write_record_atomic(self.paths.system(), &updated.to_bytes())?;
        self.prompter.show("Configuration saved.");
        Ok(())
    }

    /// Creates a new item after prompting for its fields.
    pub fn create(&mut self, item_name: &str) -> Result<()> {
        validate_item_name(item_name)?;
        let (master, record) = self.authenticate()?;

        let filename = self.derive_item_filename(&master, &record.file_salt, item_name)?;
        let item_path = self.paths.item(&filename);
        if item_path.exists() {
            return Err(PwmError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidInput,
                "An item with that name already exists.",
            ));
        }

        let username = Zeroizing::new(self.prompter.read_field("Username:", MAX_USERNAME)?);
        let password = self.read_new_password()?;
        let other_info = Zeroizing::new(self.prompter.read_field("Other info:", MAX_OTHER_INFO)?);

        self.prompter.show("New item:");
        self.prompter.show(&format!("  Item name: {item_name}"));
        self.prompter.show(&format!("  Username: {}", &*username));
        self.prompter.show(&format!("  Password: {}", &*password));
        self.prompter.show(&format!("  Other info: {}", &*other_info));
        if !self.prompter.read_yes_no("Save this item? [Y/n]:", true)? {
            self.prompter.show("Canceled.");
            return Ok(());
        }

        let (data_salt, data_tag, data_ct) =
            self.seal_item_data(&master, &username, &password, &other_info)?;

        // The item name is sealed once at creation; updates preserve these
        // three fields byte for byte.
        let name_key = self.derive_key_buf(&master, &record.name_salt, LABEL_NAMES)?;
        let mut name_nonce = [0u8; NONCE_SIZE];
        fill_random(&mut name_nonce)?;
        let mut name_buf = SecretBuf::zeroed(MAX_ITEM_NAME)?;
        name_buf[..item_name.len()].copy_from_slice(item_name.as_bytes());
        let name_tag = crypto::encrypt(&name_key, &name_nonce, &mut name_buf)?;
        let mut name_ct = [0u8; MAX_ITEM_NAME];
        name_ct.copy_from_slice(&name_buf);

        let item = ItemRecord {
            name_nonce,
            name_tag,
            name_ct,
            data_salt,
            data_tag,
            data_ct,
        };
        self.write_record_atomic(&item_path, &item.to_bytes())?;
        self.prompter.show("Item saved.");
        Ok(())
    }

    /// Reads and decrypts one item.
    pub fn get(&mut self, item_name: &str) -> Result<ItemFields> {
        validate_item_name(item_name)?;
        let (master, record) = self.authenticate()?;
        let filename = self.derive_item_filename(&master, &record.file_salt, item_name)?;
        let item = self.read_item_record(&self.paths.item(&filename))?;
        self.open_item_data(&master, &item)
    }

    /// Updates selected fields of an existing item. The encrypted name is
    /// preserved verbatim; the data fields are re-sealed under a fresh
    /// salt. Selecting done without changing anything writes nothing.
    pub fn update(&mut self, item_name: &str) -> Result<()> {
        validate_item_name(item_name)?;
        let (master, record) = self.authenticate()?;
        let filename = self.derive_item_filename(&master, &record.file_salt, item_name)?;
        let item_path = self.paths.item(&filename);
        let item = self.read_item_record(&item_path)?;
        let mut fields = self.open_item_data(&master, &item)?;

        let mut changed = false;
        loop {
            let choice = self
                .prompter
                .read_line("Update username, password, other info, or done? [u/p/o/d]:")?
                .to_ascii_lowercase();
            match choice.as_str() {
                "u" | "username" => {
                    fields.username =
                        Zeroizing::new(self.prompter.read_field("Username:", MAX_USERNAME)?);
                    changed = true;
                }
                "p" | "password" => {
                    fields.password = self.read_new_password()?;
                    changed = true;
                }
                "o" | "other" | "other info" => {
                    fields.other_info =
                        Zeroizing::new(self.prompter.read_field("Other info:", MAX_OTHER_INFO)?);
                    changed = true;
                }
                "d" | "done" => break,
                _ => self
                    .prompter
                    .show("I don't understand.  Please answer u, p, o, or d."),
            }
        }
        if !changed {
            return Ok(());
        }

        let (data_salt, data_tag, data_ct) = self.seal_item_data(
            &master,
            &fields.username,
            &fields.password,
            &fields.other_info,
        )?;

        let updated = ItemRecord {
            name_nonce: item.name_nonce,
            name_tag: item.name_tag,
            name_ct: item.name_ct,
            data_salt,
            data_tag,
            data_ct,
        };
        self.write_record_atomic(&item_path, &updated.to_bytes())?;
        self.prompter.show("Item updated.");
        Ok(())
    }

    /// Deletes one item after confirmation.
    pub fn delete(&mut self, item_name: &str) -> Result<()> {
        validate_item_name(item_name)?;
        let (master, record) = self.authenticate()?;
        let filename = self.derive_item_filename(&master, &record.file_salt, item_name)?;
        let item_path = self.paths.item(&filename);
        if !item_path.exists() {
            return Err(PwmError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidInput,
                "Item does not exist.",
            ));
        }

        if !self
            .prompter
            .read_yes_no(&format!("Delete item '{item_name}'? [y/N]:"), false)?
        {
            self.prompter.show("Canceled.");
            return Ok(());
        }
        fs::remove_file(&item_path)
            .map_err(|e| io_error("could not remove item file", e))?;
        self.prompter.show("Item deleted.");
        Ok(())
    }

    /// Removes the whole storage directory after double confirmation and
    /// authentication.
    pub fn destroy(&mut self) -> Result<()> {
        if !self.paths.system().exists() {
            return Err(self.not_initialized());
        }

        if !self.prompter.read_yes_no(
            "This will permanently delete every stored item.  Continue? [y/N]:",
            false,
        )? {
            self.prompter.show("Canceled.");
            return Ok(());
        }
        if !self.prompter.read_yes_no("Are you sure? [y/N]:", false)? {
            self.prompter.show("Canceled.");
            return Ok(());
        }

        let (_master, _record) = self.authenticate()?;
        fs::remove_dir_all(self.paths.root())
            .map_err(|e| io_error("could not remove storage directory", e))?;
        self.prompter.show("Vault destroyed.");
        Ok(())
    }

    /// Decrypts every stored item name and returns them sorted
    /// lexicographically, hiding any correspondence between on-disk
    /// filename order and item-name order.
    pub fn list(&mut self) -> Result<Vec<String>> {
        let (master, record) = self.authenticate()?;
        let name_key = self.derive_key_buf(&master, &record.name_salt, LABEL_NAMES)?;

        let mut names = Vec::new();
        let entries = fs::read_dir(self.paths.root())
            .map_err(|e| io_error("could not read storage directory", e))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_error("could not read directory entry", e))?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if !record::is_item_filename(&file_name) {
                // The system file, temp residue, or foreign files.
                continue;
            }

            let item = self.read_item_record(&entry.path())?;
            let mut name_buf = SecretBuf::from_bytes(&item.name_ct)?;
            crypto::decrypt(&name_key, &item.name_nonce, &mut name_buf, &item.name_tag)
                .map_err(|e| e.with_context("could not decrypt an item name"))?;

            let end = name_buf.iter().position(|&b| b == 0).unwrap_or(name_buf.len());
            let name = std::str::from_utf8(&name_buf[..end])
                .map_err(|_| {
                    PwmError::new(ErrorCategory::Corruption, "item name is not valid UTF-8")
                })?
                .to_string();
            names.push(name);
        }

        names.sort();
        Ok(names)
    }

    /// Prompts for the master passphrase until the config ciphertext
    /// decrypts, sleeping an exponentially growing number of seconds after
    /// each failure (shown as dots). Loads the decrypted config into the
    /// password generator.
    fn authenticate(&mut self) -> Result<(SecretBuf, SystemRecord)> {
        let record = self.read_system_record()?;

        let mut delay_secs: u64 = 1;
        loop {
            let passphrase = self.prompter.read_password("Master passphrase:")?;
            let master = SecretBuf::from_bytes(passphrase.as_bytes())?;
            drop(passphrase);

            let config_key = self.derive_key_buf(&master, &record.config_salt, LABEL_DATA)?;
            let mut config = SecretBuf::from_bytes(&record.config_ct)?;
            match crypto::decrypt(&config_key, &DATA_NONCE, &mut config, &record.config_tag) {
                Ok(()) => {
                    self.pwgen = PwGenConfig::deserialize(&config)?;
                    return Ok((master, record));
                }
                Err(err) if err.kind == Some(ErrorKind::AuthenticationFailed) => {
                    self.prompter.show("Incorrect master passphrase.");
                    for _ in 0..delay_secs {
                        self.prompter.show_progress(".");
                        thread::sleep(Duration::from_secs(1));
                    }
                    self.prompter.show("");
                    delay_secs = delay_secs.saturating_mul(2);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn show_pwgen_config(&mut self) {
        let yes_no = |flag: bool| if flag { "yes" } else { "no" };
        let lines = [
            "Password generation uses:".to_string(),
            format!("  Numbers: {}", yes_no(self.pwgen.use_numbers)),
            format!("  Letters: {}", yes_no(self.pwgen.use_letters)),
            format!("  Special characters: {}", yes_no(self.pwgen.use_specials)),
            format!("  Length: {}", self.pwgen.length),
        ];
        for line in lines {
            self.prompter.show(&line);
        }
    }

    /// Generates a password or prompts for one, per the user's choice.
    fn read_new_password(&mut self) -> Result<Zeroizing<String>> {
        if self
            .prompter
            .read_yes_no("Generate a password? [Y/n]:", true)?
        {
            self.pwgen.generate()
        } else {
            self.prompter.read_password("Password:")
        }
    }

    fn derive_key_buf(&self, master: &[u8], salt: &[u8], label: &[u8]) -> Result<SecretBuf> {
        let mut key = SecretBuf::zeroed(KEY_SIZE)?;
        kdf::derive_key(&self.kdf, master, salt, label, &mut key)?;
        Ok(key)
    }

    fn derive_item_filename(
        &self,
        master: &[u8],
        file_salt: &[u8],
        item_name: &str,
    ) -> Result<String> {
        let label: Vec<u8> = [item_name.as_bytes(), LABEL_FILES].concat();
        kdf::derive_name(&self.kdf, master, file_salt, &label)
    }

    /// Serializes and seals the current password-generation config under a
    /// key derived from `config_salt`.
    fn seal_config(
        &self,
        master: &[u8],
        config_salt: &[u8],
    ) -> Result<([u8; 16], [u8; CONFIG_DATA_SIZE])> {
        let config_key = self.derive_key_buf(master, config_salt, LABEL_DATA)?;
        let mut config = SecretBuf::from_bytes(&self.pwgen.serialize())?;
        let config_tag = crypto::encrypt(&config_key, &DATA_NONCE, &mut config)?;
        let mut config_ct = [0u8; CONFIG_DATA_SIZE];
        config_ct.copy_from_slice(&config);
        Ok((config_tag, config_ct))
    }

    /// Packs the item fields and seals them under a key derived from a
    /// fresh data salt.
    fn seal_item_data(
        &self,
        master: &[u8],
        username: &str,
        password: &str,
        other_info: &str,
    ) -> Result<([u8; SALT_SIZE], [u8; 16], [u8; ITEM_PLAINTEXT_SIZE])> {
        let mut plaintext = record::pack_item_fields(username, password, other_info)?;
        let mut data_salt = [0u8; SALT_SIZE];
        fill_random(&mut data_salt)?;
        let data_key = self.derive_key_buf(master, &data_salt, LABEL_DATA)?;
        let data_tag = crypto::encrypt(&data_key, &DATA_NONCE, &mut plaintext)?;
        let mut data_ct = [0u8; ITEM_PLAINTEXT_SIZE];
        data_ct.copy_from_slice(&plaintext);
        Ok((data_salt, data_tag, data_ct))
    }

    /// Decrypts an item's data fields with a key derived from its stored
    /// salt. A tag mismatch here is corruption, not a wrong passphrase.
    fn open_item_data(&self, master: &[u8], item: &ItemRecord) -> Result<ItemFields> {
        let data_key = self.derive_key_buf(master, &item.data_salt, LABEL_DATA)?;
        let mut plaintext = SecretBuf::from_bytes(&item.data_ct)?;
        crypto::decrypt(&data_key, &DATA_NONCE, &mut plaintext, &item.data_tag)
            .map_err(|e| e.with_context("could not decrypt item data"))?;
        record::unpack_item_fields(&plaintext)
    }

    fn not_initialized(&self) -> PwmError {
        PwmError::with_kind(
            ErrorCategory::User,
            ErrorKind::NotInitialized,
            "Vault is not initialized.  Run init first.",
        )
    }

    fn read_system_record(&self) -> Result<SystemRecord> {
        let bytes = fs::read(self.paths.system()).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                self.not_initialized()
            } else {
                io_error("could not read system file", e)
            }
        })?;
        SystemRecord::from_bytes(&bytes)
    }

    fn read_item_record(&self, path: &Path) -> Result<ItemRecord> {
        let bytes = fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PwmError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::InvalidInput,
                    "Item does not exist.",
                )
            } else {
                io_error("could not read item file", e)
            }
        })?;
        ItemRecord::from_bytes(&bytes)
    }

    fn create_storage_dir(&self) -> Result<()> {
        let mut builder = fs::DirBuilder::new();
        builder.mode(0o700);
        match builder.create(self.paths.root()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(io_error("could not create storage directory", e)),
        }
    }

    /// Writes a full record to the fixed temp path, flushes it to stable
    /// storage, then renames over the target so the target always holds
    /// either the old record or the new one.
    fn write_record_atomic(&self, target: &Path, bytes: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(self.paths.temp())
            .map_err(|e| io_error("could not create temp file", e))?;
        file.write_all(bytes)
            .map_err(|e| io_error("could not write temp file", e))?;
        file.sync_all()
            .map_err(|e| io_error("could not flush temp file to disk", e))?;
        drop(file);

        fs::rename(self.paths.temp(), target)
            .map_err(|e| io_error("could not rename temp file over target", e))
    }
}
