//! pwm CLI - securely stores usernames and passwords for multiple items
//! (such as websites), protected by one master passphrase.

use std::process;

use clap::{Parser, Subcommand};

use pwm::error::{ErrorCategory, PwmError, Result};
use pwm::prompt::TerminalPrompter;
use pwm::sensitive;
use pwm::vault::{self, Vault};

#[derive(Parser)]
#[command(name = "pwm")]
#[command(version)]
#[command(about = "Securely creates/stores usernames and passwords for multiple items.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the vault.  This must be done once before any other command.
    Init,
    /// Destroy the vault and all stored items.
    Destroy,
    /// List all stored item names.
    List,
    /// Configure password generation.
    Config,
    /// Create a new item.
    Create { name: String },
    /// Show the stored info for an item.
    Get { name: String },
    /// Update the stored info for an item.
    Update { name: String },
    /// Delete an item.
    Delete { name: String },
}

fn main() {
    let exit_code = match run() {
        Ok(()) => 0,
        Err(err) => {
            report(&err);
            1
        }
    };

    sensitive::zeroize_all();
    process::exit(exit_code);
}

fn run() -> Result<()> {
    sensitive::install_signal_handlers()?;
    sensitive::lock_process_memory();

    let cli = Cli::parse();
    let root = vault::default_root()?;
    let mut prompter = TerminalPrompter::new();
    let mut vault = Vault::new(root, &mut prompter);

    match cli.command {
        Commands::Init => vault.init(),
        Commands::Destroy => vault.destroy(),
        Commands::List => {
            for name in vault.list()? {
                println!("{name}");
            }
            Ok(())
        }
        Commands::Config => vault.config(),
        Commands::Create { name } => vault.create(&name),
        Commands::Get { name } => {
            let fields = vault.get(&name)?;
            println!("Username: {}", &*fields.username);
            println!("Password: {}", &*fields.password);
            println!("Other info: {}", &*fields.other_info);
            Ok(())
        }
        Commands::Update { name } => vault.update(&name),
        Commands::Delete { name } => vault.delete(&name),
    }
}

fn report(err: &PwmError) {
    match err.category {
        ErrorCategory::User => eprintln!("{err}"),
        ErrorCategory::Corruption => {
            eprintln!("Data corrupted");
            #[cfg(debug_assertions)]
            eprintln!("debug: {err:?}");
        }
        _ => {
            eprintln!("Internal error");
            #[cfg(debug_assertions)]
            eprintln!("debug: {err:?}");
        }
    }
}
