//! lrm-backup: command-line front end for resource file backups.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lrm_backup::diff::{ChangeType, DiffResult};
use lrm_backup::{utils, BackupStore, Config, DiffEngine, JsonResourceCodec, RestoreEngine};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Backup root directory (overrides config)
    #[arg(short, long, value_name = "DIR", global = true)]
    backup_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Snapshot a resource file
    Backup {
        file: PathBuf,
        /// Label describing why the backup was taken
        #[arg(short, long, default_value = "manual")]
        operation: String,
    },
    /// List backups of a file, most recent first
    List { name: String },
    /// List every file that has backups
    Files,
    /// Diff two versions, or a version against the live file
    Diff {
        name: String,
        from: u32,
        to: Option<u32>,
        /// Live file to compare `from` against when `to` is omitted
        #[arg(long, value_name = "FILE")]
        current: Option<PathBuf>,
        /// Include unchanged keys
        #[arg(long)]
        all: bool,
    },
    /// Restore a version onto a file
    Restore {
        name: String,
        version: u32,
        #[arg(short, long, value_name = "FILE")]
        target: PathBuf,
        /// Only restore these keys (comma separated)
        #[arg(long, value_delimiter = ',')]
        keys: Vec<String>,
        /// Skip the pre-restore snapshot of the target
        #[arg(long)]
        no_backup: bool,
        /// Show what would change without writing
        #[arg(long)]
        preview: bool,
    },
    /// Check a stored payload against its recorded hash
    Verify { name: String, version: u32 },
    /// Delete one version
    Delete { name: String, version: u32 },
    /// Apply the retention policy now
    Rotate { name: String },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _ = dotenvy::dotenv();

    // Load configuration
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(dir) = args.backup_dir {
        config.backup.root_dir = dir;
    }

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level, &config.log.format)?;

    tracing::debug!(
        "lrm-backup v{} (root: {})",
        env!("CARGO_PKG_VERSION"),
        config.backup.root_dir.display()
    );

    let codec = Arc::new(JsonResourceCodec::new());
    let store = Arc::new(BackupStore::new(
        config.backup.root_dir.clone(),
        config.retention.clone(),
        codec.clone(),
    ));

    match args.command {
        Command::Backup { file, operation } => {
            let record = store.create_backup(&file, &operation).await?;
            println!(
                "Created {} v{} ({} keys, {})",
                file.display(),
                record.version,
                record.key_count,
                short_hash(&record.content_hash)
            );
        }
        Command::List { name } => {
            let records = store.list_backups(&name).await?;
            if records.is_empty() {
                println!("No backups for {name}");
            }
            for r in records {
                println!(
                    "v{:<4} {}  {:<12} {:>5} keys  {}",
                    r.version,
                    r.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    r.operation,
                    r.key_count,
                    short_hash(&r.content_hash)
                );
            }
        }
        Command::Files => {
            for name in store.list_files().await? {
                println!("{name}");
            }
        }
        Command::Diff {
            name,
            from,
            to,
            current,
            all,
        } => {
            let engine = DiffEngine::new(codec);
            let old = store
                .get_backup(&name, from)
                .await?
                .with_context(|| format!("{name} has no version {from}"))?;
            let old_file = store.backup_file_path(&name, from)?;

            let result = match (to, current) {
                (Some(to), _) => {
                    let new = store
                        .get_backup(&name, to)
                        .await?
                        .with_context(|| format!("{name} has no version {to}"))?;
                    let new_file = store.backup_file_path(&name, to)?;
                    engine.compare(&old, &new, &old_file, &new_file, all).await?
                }
                (None, Some(current)) => engine.compare_with_current(&old, &old_file, &current, all).await?,
                (None, None) => bail!("give a second version or --current <FILE>"),
            };
            print_diff(&result);
        }
        Command::Restore {
            name,
            version,
            target,
            keys,
            no_backup,
            preview,
        } => {
            let engine = RestoreEngine::new(store.clone());

            if preview {
                let result = engine.preview_restore(&name, version, &target).await?;
                print_diff(&result);
                return Ok(());
            }

            let validation = engine.validate_restore(&name, version, &target).await?;
            if !validation.is_valid {
                bail!(validation.message.unwrap_or_else(|| "invalid restore".into()));
            }

            let result = if keys.is_empty() {
                engine.restore(&name, version, &target, !no_backup).await?
            } else {
                engine.restore_keys(&name, version, keys, &target, !no_backup).await?
            };

            if let Some(pre) = &result.pre_restore_backup {
                println!("Saved current state as v{}", pre.version);
            }
            if result.restored_keys.is_empty() && result.missing_keys.is_empty() {
                println!("Restored {} from v{}", target.display(), result.restored_version);
            } else {
                println!(
                    "Restored {} key(s) into {} from v{}",
                    result.restored_keys.len(),
                    target.display(),
                    result.restored_version
                );
                for key in &result.missing_keys {
                    println!("  not in backup: {key}");
                }
            }
        }
        Command::Verify { name, version } => {
            let record = store.verify_backup(&name, version).await?;
            println!("{} v{} OK ({})", name, record.version, record.content_hash);
        }
        Command::Delete { name, version } => {
            if !store.delete_backup(&name, version).await? {
                bail!("{name} has no version {version}");
            }
            println!("Deleted {name} v{version}");
        }
        Command::Rotate { name } => {
            let removed = store.apply_rotation(&name).await?;
            println!("Removed {} version(s) of {}", removed.len(), name);
        }
        Command::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

fn print_diff(result: &DiffResult) {
    for change in &result.changes {
        let old = change.old_value.as_deref().unwrap_or("");
        let new = change.new_value.as_deref().unwrap_or("");
        match change.change_type {
            ChangeType::Added => println!("+ {}: {}", change.key, new),
            ChangeType::Deleted => println!("- {}: {}", change.key, old),
            ChangeType::Modified => println!("~ {}: {} -> {}", change.key, old, new),
            ChangeType::CommentChanged => println!(
                "# {}: {} -> {}",
                change.key,
                change.old_comment.as_deref().unwrap_or(""),
                change.new_comment.as_deref().unwrap_or("")
            ),
            ChangeType::Unchanged => println!("  {}: {}", change.key, old),
        }
    }
    println!("{}", result.summary());
}
