//! Vault operation tests
//!
//! Drives whole operations through the library with scripted prompts and
//! cheap Argon2 parameters against throwaway storage directories.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use pwm::error::{ErrorCategory, ErrorKind, Result};
use pwm::kdf::KdfParams;
use pwm::prompt::ScriptedPrompter;
use pwm::record::{ItemFields, ITEM_FILE_SIZE, SYSTEM_FILE_SIZE};
use pwm::vault::Vault;

const MASTER: &str = "correct horse battery";

fn test_kdf() -> KdfParams {
    KdfParams {
        m_cost_kib: 16,
        t_cost: 1,
        p_cost: 1,
    }
}

fn vault_root(dir: &TempDir) -> PathBuf {
    dir.path().join("PwmStore")
}

fn init_vault(root: &Path) {
    let mut prompter = ScriptedPrompter::new([MASTER, MASTER]);
    let mut vault = Vault::with_kdf_params(root, &mut prompter, test_kdf());
    vault.init().unwrap();
}

fn create_item(root: &Path, name: &str, username: &str, password: &str, other_info: &str) {
    let mut prompter = ScriptedPrompter::new([MASTER, username, "n", password, other_info, "y"]);
    let mut vault = Vault::with_kdf_params(root, &mut prompter, test_kdf());
    vault.create(name).unwrap();
}

fn get_item(root: &Path, name: &str) -> Result<ItemFields> {
    let mut prompter = ScriptedPrompter::new([MASTER]);
    let mut vault = Vault::with_kdf_params(root, &mut prompter, test_kdf());
    vault.get(name)
}

/// Paths of every item file (everything except the system file and temp
/// residue).
fn item_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(root)
        .unwrap()
        .map(|entry| entry.unwrap())
        .filter(|entry| {
            let name = entry.file_name();
            name != "system" && name != "temp"
        })
        .map(|entry| entry.path())
        .collect();
    files.sort();
    files
}

#[test]
fn init_create_get_round_trip() {
    let dir = TempDir::new().unwrap();
    let root = vault_root(&dir);

    init_vault(&root);
    create_item(
        &root,
        "github",
        "alice",
        "Hunter2!hunter2!hunter2!A",
        "work account",
    );

    let fields = get_item(&root, "github").unwrap();
    assert_eq!(&*fields.username, "alice");
    assert_eq!(&*fields.password, "Hunter2!hunter2!hunter2!A");
    assert_eq!(&*fields.other_info, "work account");
}

#[test]
fn wrong_passphrase_backs_off_then_succeeds() {
    let dir = TempDir::new().unwrap();
    let root = vault_root(&dir);

    init_vault(&root);
    create_item(&root, "github", "alice", "Hunter2!hunter2!", "notes");

    let wrong = format!("{MASTER}x");
    let mut prompter = ScriptedPrompter::new([wrong.as_str(), MASTER]);
    let fields = {
        let mut vault = Vault::with_kdf_params(&root, &mut prompter, test_kdf());
        vault.get("github").unwrap()
    };
    assert_eq!(&*fields.username, "alice");

    assert!(prompter
        .transcript
        .iter()
        .any(|line| line.contains("Incorrect master passphrase")));
    assert!(prompter.transcript.iter().any(|line| line == "."));
}

#[test]
fn update_preserves_name_encryption() {
    let dir = TempDir::new().unwrap();
    let root = vault_root(&dir);

    init_vault(&root);
    create_item(&root, "github", "alice", "OldPassword!OldPassword!", "notes");

    let item_path = item_files(&root).pop().unwrap();
    let before = fs::read(&item_path).unwrap();

    let mut prompter = ScriptedPrompter::new([MASTER, "p", "n", "NewPassword?NewPassword?", "d"]);
    let mut vault = Vault::with_kdf_params(&root, &mut prompter, test_kdf());
    vault.update("github").unwrap();

    let after = fs::read(&item_path).unwrap();
    assert_eq!(after.len(), before.len());

    // Version byte plus the nameNonce/nameTag/nameCiphertext prefix are
    // byte-identical; the data salt, tag and ciphertext all changed.
    let name_prefix_len = 1 + 12 + 16 + 100;
    assert_eq!(before[..name_prefix_len], after[..name_prefix_len]);
    assert_ne!(before[name_prefix_len..], after[name_prefix_len..]);

    let fields = get_item(&root, "github").unwrap();
    assert_eq!(&*fields.username, "alice");
    assert_eq!(&*fields.password, "NewPassword?NewPassword?");
    assert_eq!(&*fields.other_info, "notes");
}

#[test]
fn update_done_without_changes_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let root = vault_root(&dir);

    init_vault(&root);
    create_item(&root, "github", "alice", "Hunter2!hunter2!", "notes");

    let item_path = item_files(&root).pop().unwrap();
    let before = fs::read(&item_path).unwrap();

    let mut prompter = ScriptedPrompter::new([MASTER, "d"]);
    let mut vault = Vault::with_kdf_params(&root, &mut prompter, test_kdf());
    vault.update("github").unwrap();

    assert_eq!(fs::read(&item_path).unwrap(), before);
}

#[test]
fn list_is_sorted_by_item_name() {
    let dir = TempDir::new().unwrap();
    let root = vault_root(&dir);

    init_vault(&root);
    for name in ["zeta", "alpha", "mu"] {
        create_item(&root, name, "user", "SomePassword123!", "");
    }

    let mut prompter = ScriptedPrompter::new([MASTER]);
    let mut vault = Vault::with_kdf_params(&root, &mut prompter, test_kdf());
    let names = vault.list().unwrap();
    assert_eq!(names, ["alpha", "mu", "zeta"]);
}

#[test]
fn item_filenames_reveal_nothing() {
    let dir = TempDir::new().unwrap();
    let root = vault_root(&dir);

    init_vault(&root);
    create_item(&root, "github", "alice", "Hunter2!hunter2!", "");

    let files = item_files(&root);
    assert_eq!(files.len(), 1);
    let filename = files[0].file_name().unwrap().to_string_lossy().to_string();
    assert_eq!(filename.len(), 64);
    assert!(filename.bytes().all(|b| b.is_ascii_hexdigit()));
    assert!(!filename.contains("github"));
}

#[test]
fn destroy_removes_storage_directory() {
    let dir = TempDir::new().unwrap();
    let root = vault_root(&dir);

    init_vault(&root);
    create_item(&root, "github", "alice", "Hunter2!hunter2!", "");

    let mut prompter = ScriptedPrompter::new(["y", "y", MASTER]);
    let mut vault = Vault::with_kdf_params(&root, &mut prompter, test_kdf());
    vault.destroy().unwrap();

    assert!(!root.exists());
}

#[test]
fn tampered_item_data_reports_corruption() {
    let dir = TempDir::new().unwrap();
    let root = vault_root(&dir);

    init_vault(&root);
    create_item(&root, "github", "alice", "Hunter2!hunter2!", "notes");

    let item_path = item_files(&root).pop().unwrap();
    let mut bytes = fs::read(&item_path).unwrap();
    // Flip one bit inside dataCiphertext (it starts at offset 177).
    bytes[200] ^= 0x01;
    fs::write(&item_path, &bytes).unwrap();

    let err = get_item(&root, "github").unwrap_err();
    assert_eq!(err.category, ErrorCategory::Corruption);
}

#[test]
fn config_rotates_only_config_fields() {
    let dir = TempDir::new().unwrap();
    let root = vault_root(&dir);

    init_vault(&root);
    create_item(&root, "github", "alice", "Hunter2!hunter2!", "");

    let system_path = root.join("system");
    let before = fs::read(&system_path).unwrap();

    // Keep all three symbol classes (empty answers take the current
    // defaults), change the generated length.
    let mut prompter = ScriptedPrompter::new([MASTER, "", "", "", "30"]);
    let mut vault = Vault::with_kdf_params(&root, &mut prompter, test_kdf());
    vault.config().unwrap();

    let after = fs::read(&system_path).unwrap();
    assert_eq!(after.len(), before.len());

    // fileSalt and nameSalt are preserved verbatim; configSalt and the
    // config ciphertext are rotated.
    assert_eq!(before[..65], after[..65]);
    assert_ne!(before[65..97], after[65..97]);
    assert_ne!(before[97..], after[97..]);

    // Existing items remain decryptable.
    let fields = get_item(&root, "github").unwrap();
    assert_eq!(&*fields.username, "alice");
}

#[test]
fn generated_password_length_follows_config() {
    let dir = TempDir::new().unwrap();
    let root = vault_root(&dir);

    init_vault(&root);

    let mut prompter = ScriptedPrompter::new([MASTER, "", "", "", "42"]);
    let mut vault = Vault::with_kdf_params(&root, &mut prompter, test_kdf());
    vault.config().unwrap();

    // Create an item with a generated password and read it back.
    let mut prompter = ScriptedPrompter::new([MASTER, "bob", "y", "", "y"]);
    let mut vault = Vault::with_kdf_params(&root, &mut prompter, test_kdf());
    vault.create("forge").unwrap();

    let fields = get_item(&root, "forge").unwrap();
    assert_eq!(fields.password.len(), 42);
}

#[test]
fn fixed_file_sizes() {
    let dir = TempDir::new().unwrap();
    let root = vault_root(&dir);

    init_vault(&root);
    create_item(&root, "one", "u1", "PasswordOne1!", "");
    create_item(&root, "two", "u2", "PasswordTwo2!", &"x".repeat(300));

    assert_eq!(
        fs::metadata(root.join("system")).unwrap().len(),
        SYSTEM_FILE_SIZE as u64
    );
    for path in item_files(&root) {
        assert_eq!(fs::metadata(path).unwrap().len(), ITEM_FILE_SIZE as u64);
    }
}

#[test]
fn init_twice_fails() {
    let dir = TempDir::new().unwrap();
    let root = vault_root(&dir);

    init_vault(&root);

    let mut prompter = ScriptedPrompter::new([MASTER, MASTER]);
    let mut vault = Vault::with_kdf_params(&root, &mut prompter, test_kdf());
    let err = vault.init().unwrap_err();
    assert_eq!(err.kind, Some(ErrorKind::AlreadyInitialized));
    assert_eq!(err.category, ErrorCategory::User);
}

#[test]
fn init_passphrase_mismatch_fails_without_side_effects() {
    let dir = TempDir::new().unwrap();
    let root = vault_root(&dir);

    let mut prompter = ScriptedPrompter::new(["first passphrase", "second passphrase"]);
    let mut vault = Vault::with_kdf_params(&root, &mut prompter, test_kdf());
    let err = vault.init().unwrap_err();
    assert_eq!(err.category, ErrorCategory::User);
    assert!(!root.exists());
}

#[test]
fn operations_before_init_fail() {
    let dir = TempDir::new().unwrap();
    let root = vault_root(&dir);

    let mut prompter = ScriptedPrompter::new([MASTER]);
    let mut vault = Vault::with_kdf_params(&root, &mut prompter, test_kdf());
    let err = vault.get("github").unwrap_err();
    assert_eq!(err.kind, Some(ErrorKind::NotInitialized));
}

#[test]
fn create_duplicate_item_fails() {
    let dir = TempDir::new().unwrap();
    let root = vault_root(&dir);

    init_vault(&root);
    create_item(&root, "github", "alice", "Hunter2!hunter2!", "");

    let mut prompter = ScriptedPrompter::new([MASTER]);
    let mut vault = Vault::with_kdf_params(&root, &mut prompter, test_kdf());
    let err = vault.create("github").unwrap_err();
    assert_eq!(err.category, ErrorCategory::User);
    assert!(err.message().contains("already exists"));
}

#[test]
fn delete_removes_only_that_item() {
    let dir = TempDir::new().unwrap();
    let root = vault_root(&dir);

    init_vault(&root);
    create_item(&root, "github", "alice", "Hunter2!hunter2!", "");
    create_item(&root, "mail", "bob", "Password1234!...", "");

    let mut prompter = ScriptedPrompter::new([MASTER, "y"]);
    let mut vault = Vault::with_kdf_params(&root, &mut prompter, test_kdf());
    vault.delete("github").unwrap();

    let err = get_item(&root, "github").unwrap_err();
    assert_eq!(err.category, ErrorCategory::User);

    let fields = get_item(&root, "mail").unwrap();
    assert_eq!(&*fields.username, "bob");
}

#[test]
fn canceled_create_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let root = vault_root(&dir);

    init_vault(&root);

    let mut prompter =
        ScriptedPrompter::new([MASTER, "alice", "n", "Hunter2!hunter2!", "notes", "n"]);
    let mut vault = Vault::with_kdf_params(&root, &mut prompter, test_kdf());
    vault.create("github").unwrap();

    assert!(item_files(&root).is_empty());
}

#[test]
fn invalid_item_names_are_rejected_before_prompting() {
    let dir = TempDir::new().unwrap();
    let root = vault_root(&dir);

    init_vault(&root);

    let mut prompter = ScriptedPrompter::new(Vec::<String>::new());
    let mut vault = Vault::with_kdf_params(&root, &mut prompter, test_kdf());
    assert!(vault.create("").is_err());
    assert!(vault.get(&"x".repeat(101)).is_err());
    assert!(vault.delete("bad\tname").is_err());
}
