use std::path::PathBuf;
use std::process::{Command, ExitCode};
use std::time::Instant;

use clap::{Parser, Subcommand};
use rand::RngCore;
use tracing_subscriber::EnvFilter;

use lockstash::kdf::{CodenameKey, KEY_SALT_SIZE};
use lockstash::store::{Store, StoreError};

#[derive(Parser)]
#[command(name = "lockstash", version, about = "Deniable encrypted key-value storage in a single file")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set an entry from text given on the command line
    Set {
        /// Container file (defaults to $CODN_STORAGE_FILE)
        #[arg(short, long, env = "CODN_STORAGE_FILE")]
        storage: String,
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        text: String,
    },
    /// Set an entry from text, prompting for the codename and the text
    Sett {
        #[arg(short, long, env = "CODN_STORAGE_FILE")]
        storage: String,
    },
    /// Print an entry's text to stdout
    Gett {
        #[arg(short, long, env = "CODN_STORAGE_FILE")]
        storage: String,
        /// Codename; prompted for (hidden) when omitted
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Set an entry from the contents of a binary file
    Setf {
        #[arg(short, long, env = "CODN_STORAGE_FILE")]
        storage: String,
        #[arg(short, long)]
        name: Option<String>,
        /// Source file
        file: PathBuf,
    },
    /// Write an entry to a binary file
    Getf {
        #[arg(short, long, env = "CODN_STORAGE_FILE")]
        storage: String,
        #[arg(short, long)]
        name: Option<String>,
        /// Target file
        file: PathBuf,
    },
    /// Fetch an entry's text and run it as a shell command
    Eval {
        #[arg(short, long, env = "CODN_STORAGE_FILE")]
        storage: String,
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Measure the key derivation speed
    Bench,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match cli.command {
        // ── Set ──────────────────────────────────────────────────────────────
        Commands::Set { storage, name, text } => {
            open_store(&storage)?.set_text(&name, &text)?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Sett { storage } => {
            let store = open_store(&storage)?;
            let name = prompt_new_codename()?;
            let text = inquire::Text::new("Text:").prompt()?;
            store.set_text(&name, &text)?;
            Ok(ExitCode::SUCCESS)
        }

        // ── Get ──────────────────────────────────────────────────────────────
        Commands::Gett { storage, name } => {
            let store = open_store(&storage)?;
            let name = codename_or_prompt(name)?;
            match store.get_text(&name) {
                Ok(text) => {
                    println!("{text}");
                    Ok(ExitCode::SUCCESS)
                }
                Err(StoreError::NotFound) => {
                    eprintln!("error: no entry under that codename");
                    Ok(ExitCode::from(2))
                }
                Err(e) => Err(e.into()),
            }
        }

        // ── Files ────────────────────────────────────────────────────────────
        Commands::Setf { storage, name, file } => {
            let store = open_store(&storage)?;
            let name = match name {
                Some(n) => n,
                None => prompt_new_codename()?,
            };
            store.set_file(&name, &file)?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Getf { storage, name, file } => {
            let store = open_store(&storage)?;
            let name = codename_or_prompt(name)?;
            store.get_file(&name, &file)?;
            Ok(ExitCode::SUCCESS)
        }

        // ── Eval ─────────────────────────────────────────────────────────────
        Commands::Eval { storage, name } => {
            let store = open_store(&storage)?;
            let name = codename_or_prompt(name)?;
            let text = match store.get_text(&name) {
                Ok(text) => text,
                Err(StoreError::NotFound) => {
                    eprintln!("error: no entry under that codename");
                    return Ok(ExitCode::from(2));
                }
                Err(e) => return Err(e.into()),
            };
            let status = Command::new("sh").arg("-c").arg(&text).status()?;
            let code = status.code().unwrap_or(1).clamp(0, 255);
            Ok(ExitCode::from(code as u8))
        }

        // ── Bench ────────────────────────────────────────────────────────────
        Commands::Bench => {
            bench_kdf()?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn open_store(storage: &str) -> Result<Store, Box<dyn std::error::Error>> {
    if storage.trim().is_empty() {
        return Err("storage filename must be specified".into());
    }
    Ok(Store::new(storage))
}

/// Hidden single prompt, for reads.
fn codename_or_prompt(name: Option<String>) -> Result<String, inquire::InquireError> {
    match name {
        Some(n) => Ok(n),
        None => inquire::Password::new("Codename:")
            .with_display_mode(inquire::PasswordDisplayMode::Hidden)
            .without_confirmation()
            .prompt(),
    }
}

/// Hidden prompt with confirmation, for writes — a typo in a write would
/// store the entry under an unrecoverable name.
fn prompt_new_codename() -> Result<String, inquire::InquireError> {
    inquire::Password::new("Codename:")
        .with_display_mode(inquire::PasswordDisplayMode::Hidden)
        .with_custom_confirmation_message("Repeat:")
        .prompt()
}

fn bench_kdf() -> Result<(), lockstash::kdf::KdfError> {
    let mut salt = [0u8; KEY_SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    let mut total = 0.0;
    for i in 0..4 {
        let started = Instant::now();
        CodenameKey::derive(&i.to_string(), &salt)?;
        let secs = started.elapsed().as_secs_f64();
        total += secs;
        println!("{} {:.3} sec", i + 1, secs);
    }
    println!("Mean {:.3} sec", total / 4.0);
    Ok(())
}
