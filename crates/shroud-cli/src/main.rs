//! shroud: command-line shell around the vault engine
//!
//! The engine takes its collaborators (config store, session store, cancel
//! token) as explicit arguments; this binary is the only place they are
//! instantiated. Device enumeration and hotkey capture live in platform
//! front-ends, so drives are addressed here by mountpoint.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use shroud_core::{ConfigStore, ProgressFn, VaultState};
use shroud_vault::panic::{panic_encrypt_all, OpenDrive, PanicLatch};
use shroud_vault::pipeline::{self, VaultOptions};
use shroud_vault::session::{drive_identity, SessionStore};
use shroud_vault::AutoLock;

#[derive(Parser, Debug)]
#[command(
    name = "shroud",
    version,
    about = "Turn a removable drive into a scattering of temp files",
    long_about = "shroud: encrypt a whole drive into decoy-padded, camouflage-named \
                  fragments behind an authenticated manifest, and back"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, short = 'c', env = "SHROUD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a drive (prompts for the passphrase)
    Lock {
        /// Drive mountpoint
        drive: PathBuf,
    },

    /// Decrypt a drive and cache the session
    Unlock {
        drive: PathBuf,
    },

    /// Re-encrypt using the cached session, no passphrase needed
    Quick {
        drive: PathBuf,
    },

    /// Show the decrypted manifest of a locked drive
    Info {
        drive: PathBuf,
    },

    /// Show drive state (plain, locked, or open)
    Status {
        drive: PathBuf,
    },

    /// Delete every hidden vault artifact and forget the session
    Erase {
        drive: PathBuf,
    },

    /// List cached sessions
    Sessions,

    /// Forget one session, or all of them
    Forget {
        /// Drive mountpoint (omit with --all)
        drive: Option<PathBuf>,
        #[arg(long)]
        all: bool,
    },

    /// Sit resident: auto-lock open drives after the configured idle timeout
    Guard {
        /// Open drives to watch (mountpoints)
        drives: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = Arc::new(match &cli.config {
        Some(path) => ConfigStore::open(path)?,
        None => ConfigStore::open_default()?,
    });
    let sessions = Arc::new(SessionStore::new(Arc::clone(&config)));
    let opts = VaultOptions::from_config(&config.snapshot());
    let cancel = CancellationToken::new();

    match cli.command {
        Commands::Lock { drive } => {
            let id = id_for(&drive);
            let passphrase = prompt_passphrase("Passphrase: ")?;
            let bar = progress_bar();
            pipeline::encrypt_drive(
                &drive,
                &id,
                &passphrase,
                &opts,
                &sessions,
                &cancel,
                Some(&bar_progress(&bar)),
            )
            .map_err(present)?;
            bar.finish_and_clear();
            remember_drive(&config, &drive);
            println!("locked {}", drive.display());
        }

        Commands::Unlock { drive } => {
            let id = id_for(&drive);
            let passphrase = prompt_passphrase("Passphrase: ")?;
            let bar = progress_bar();
            pipeline::decrypt_drive(
                &drive,
                &id,
                &passphrase,
                &opts,
                &sessions,
                &cancel,
                Some(&bar_progress(&bar)),
            )
            .map_err(present)?;
            bar.finish_and_clear();
            remember_drive(&config, &drive);
            println!("unlocked {}", drive.display());
        }

        Commands::Quick { drive } => {
            let id = id_for(&drive);
            let bar = progress_bar();
            pipeline::quick_encrypt(&drive, &id, &opts, &sessions, &cancel, Some(&bar_progress(&bar)))
                .map_err(present)?;
            bar.finish_and_clear();
            println!("locked {}", drive.display());
        }

        Commands::Info { drive } => {
            let passphrase = prompt_passphrase("Passphrase: ")?;
            let manifest = pipeline::vault_info(&drive, &passphrase, &opts.kdf).map_err(present)?;
            println!("version:        {}", manifest.version);
            println!("files:          {}", manifest.file_count);
            println!("original bytes: {}", manifest.original_size);
            println!("chunks:         {}", manifest.total_chunks);
            println!("decoys:         {}", manifest.has_decoys);
            println!("double layer:   {}", manifest.double_encrypted);
            if manifest.is_legacy_unauthenticated() {
                println!("WARNING: legacy vault without chunk MACs (unauthenticated)");
            }
        }

        Commands::Status { drive } => {
            let id = id_for(&drive);
            let state = pipeline::vault_state(&drive, &id, &sessions);
            let label = match state {
                VaultState::Plain => "plain",
                VaultState::Locked => "locked",
                VaultState::Open => "open (session cached)",
            };
            println!("{}: {label}", drive.display());
        }

        Commands::Erase { drive } => {
            let id = id_for(&drive);
            let secure = config.snapshot().secure_wipe;
            pipeline::erase_vault(&drive, &id, secure, &sessions, &cancel).map_err(present)?;
            println!("erased vault artifacts on {}", drive.display());
        }

        Commands::Sessions => {
            sessions.load_from_config();
            let infos = sessions.infos();
            if infos.is_empty() {
                println!("no cached sessions");
            }
            for info in infos {
                println!("{}  {}", info.drive_id, info.drive_path.display());
            }
        }

        Commands::Forget { drive, all } => {
            if all {
                sessions.clear_all()?;
                println!("all sessions cleared");
            } else {
                let drive = drive.context("pass a drive mountpoint or --all")?;
                sessions.clear(&id_for(&drive))?;
                println!("session cleared for {}", drive.display());
            }
        }

        Commands::Guard { drives } => {
            run_guard(config, sessions, opts, drives)?;
        }
    }

    Ok(())
}

/// Resident mode: an auto-lock timer that panic-encrypts every watched open
/// drive once the idle timeout passes, and on ctrl-c before exiting.
fn run_guard(
    config: Arc<ConfigStore>,
    sessions: Arc<SessionStore>,
    opts: VaultOptions,
    drives: Vec<PathBuf>,
) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        sessions.load_from_config();

        let watched: Vec<OpenDrive> = drives
            .iter()
            .map(|path| OpenDrive {
                path: path.clone(),
                drive_id: id_for(path),
            })
            .collect();
        if watched.is_empty() {
            println!("no drives to guard");
            return Ok(());
        }

        let snapshot = config.snapshot();
        let timeout = Duration::from_secs(snapshot.auto_lock_minutes.max(1) * 60);
        let autolock = AutoLock::new(timeout);
        let latch = PanicLatch::new();

        let lock_all = {
            let sessions = Arc::clone(&sessions);
            let latch = latch.clone();
            let opts = opts.clone();
            let watched = watched.clone();
            Arc::new(move || {
                let fired = latch.trigger(|| {
                    let failures =
                        panic_encrypt_all(&watched, &sessions, &opts, &CancellationToken::new());
                    for (drive_id, err) in failures {
                        debug!(drive_id, "guard lock failed: {err}");
                    }
                });
                if !fired {
                    debug!("panic latch still armed, skipping");
                }
            })
        };

        autolock.start(Arc::clone(&lock_all) as Arc<dyn Fn() + Send + Sync>);
        println!(
            "guarding {} drive(s); idle timeout {}m, ctrl-c locks and exits",
            watched.len(),
            snapshot.auto_lock_minutes.max(1)
        );

        tokio::signal::ctrl_c().await?;
        autolock.stop().await;
        lock_all();
        Ok(())
    })
}

fn id_for(drive: &Path) -> String {
    drive_identity(&drive.to_string_lossy(), "")
}

fn remember_drive(config: &ConfigStore, drive: &Path) {
    let _ = config.update(|cfg| cfg.last_drive = drive.to_string_lossy().into_owned());
}

fn prompt_passphrase(prompt: &str) -> Result<SecretString> {
    eprint!("{prompt}");
    std::io::stderr().flush().ok();

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading passphrase")?;
    let trimmed = line.trim_end_matches(['\r', '\n']).to_string();
    Ok(SecretString::from(trimmed))
}

/// The one place engine errors become user-facing text: integrity failures
/// are reported as a wrong password on purpose.
fn present(err: shroud_core::VaultError) -> anyhow::Error {
    if err.presents_as_wrong_password() {
        debug!("masked failure: {err}");
        anyhow::anyhow!("wrong password")
    } else {
        anyhow::Error::new(err)
    }
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(1);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {percent:>3}% {msg}")
            .expect("static progress template"),
    );
    bar
}

fn bar_progress(bar: &ProgressBar) -> ProgressFn {
    let bar = bar.clone();
    Box::new(move |current, total, stage| {
        bar.set_length(total.max(1));
        bar.set_position(current);
        bar.set_message(stage.to_string());
    })
}
