//! snapvault: encrypted cluster snapshot backups in S3-compatible storage
//!
//! Commands:
//!   backup              - upload the current snapshot (encrypted when a master key is configured)
//!   restore             - download a backup (latest by default) to the snapshot path
//!   prune               - delete expired backups, always keeping a minimum count
//!   rotate-key          - re-wrap every stored data key under the current master key
//!   list                - show stored backups
//!   generate-key        - create a new master key file
//!   config show         - display current configuration

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use secrecy::ExposeSecret;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use snapvault_catalog::{BackupEntry, RetentionPolicy};
use snapvault_core::config::{parse_max_age, SnapvaultConfig};
use snapvault_core::credentials::S3Credentials;
use snapvault_core::keyfile::{load_master_key, write_master_key};
use snapvault_crypto::{rewrap_converter, MasterKey};
use snapvault_storage::ProgressFn;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "snapvault",
    version,
    about = "Encrypted cluster snapshot backups",
    long_about = "snapvault: back up, restore, prune and re-key cluster store snapshots \
                  kept in S3-compatible storage"
)]
struct Cli {
    /// Path to config.toml
    #[arg(
        long,
        short = 'c',
        env = "SNAPVAULT_CONFIG",
        default_value = "/etc/snapvault/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides log.level
    #[arg(long, env = "SNAPVAULT_LOG")]
    log: Option<String>,

    /// Log format; overrides log.format
    #[arg(long, env = "SNAPVAULT_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload a snapshot as a new backup
    Backup {
        /// Snapshot file to upload (default: snapshot_path from config)
        #[arg(long, short = 's')]
        snapshot: Option<PathBuf>,
    },

    /// Restore a backup to the snapshot path
    Restore {
        /// RFC 3339 timestamp of the backup (default: latest)
        #[arg(long, short = 't', value_parser = parse_timestamp)]
        backup_timestamp: Option<DateTime<Utc>>,
        /// Destination file (default: snapshot_path from config)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Delete expired backups, keeping at least --min-count valid ones
    Prune {
        /// Age after which backups may be deleted, e.g. 15d or 1d12h (overrides retention.max_age)
        #[arg(long, short = 'a')]
        max_age: Option<String>,
        /// Minimum number of backups to keep regardless of age (overrides retention.min_count)
        #[arg(long, short = 'i')]
        min_count: Option<usize>,
        /// Show what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Re-wrap all stored data keys from a previous master key to the configured one
    #[command(name = "rotate-key")]
    RotateKey {
        /// Hex master key file the existing backups were written with
        #[arg(long, short = 'p')]
        previous_key: PathBuf,
    },

    /// List stored backups
    List {
        /// Output JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Generate a new random master key
    #[command(name = "generate-key")]
    GenerateKey {
        /// Write the key to this file (mode 0600) instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, found) = load_config(&cli.config).await?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.clone().unwrap_or(match config.log.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);

    if !found {
        tracing::warn!(
            "config file not found: {}  (using defaults)",
            cli.config.display()
        );
    }

    match cli.command {
        Commands::Backup { snapshot } => cmd_backup(&config, snapshot.as_deref()).await,
        Commands::Restore {
            backup_timestamp,
            output,
        } => cmd_restore(&config, backup_timestamp, output.as_deref()).await,
        Commands::Prune {
            max_age,
            min_count,
            dry_run,
        } => cmd_prune(&config, max_age.as_deref(), min_count, dry_run).await,
        Commands::RotateKey { previous_key } => cmd_rotate_key(&config, &previous_key).await,
        Commands::List { json } => cmd_list(&config, json).await,
        Commands::GenerateKey { output } => cmd_generate_key(output.as_deref()),
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Config, storage and key loading ───────────────────────────────────────────

/// Returns the config and whether the file existed.
async fn load_config(path: &Path) -> Result<(SnapvaultConfig, bool)> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        let config = SnapvaultConfig::from_toml(&content)
            .with_context(|| format!("parsing config: {}", path.display()))?;
        Ok((config, true))
    } else {
        Ok((SnapvaultConfig::default(), false))
    }
}

fn storage_operator(config: &SnapvaultConfig) -> Result<opendal::Operator> {
    let credentials = S3Credentials::load(&config.storage).context("loading S3 credentials")?;
    tracing::debug!(source = %credentials.source, "S3 credentials loaded");

    snapvault_storage::build_operator(&config.storage, &credentials)
        .context("building storage operator")
}

fn configured_master_key(config: &SnapvaultConfig) -> Result<Option<MasterKey>> {
    config
        .encryption_key_path
        .as_deref()
        .map(|path| {
            load_master_key(path)
                .with_context(|| format!("loading master key: {}", path.display()))
        })
        .transpose()
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp such as 2024-03-01T12:00:00Z: {e}"))
}

// ── Progress helpers ──────────────────────────────────────────────────────────

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn byte_progress(pb: &ProgressBar) -> ProgressFn {
    let pb = pb.clone();
    Arc::new(move |bytes| pb.set_message(HumanBytes(bytes).to_string()))
}

// ── `snapvault backup` ────────────────────────────────────────────────────────

async fn cmd_backup(config: &SnapvaultConfig, snapshot: Option<&Path>) -> Result<()> {
    let snapshot = snapshot.unwrap_or(&config.snapshot_path);
    let file = std::fs::File::open(snapshot)
        .with_context(|| format!("opening snapshot: {}", snapshot.display()))?;

    let op = storage_operator(config)?;
    let naming = config.naming()?;
    let master_key = configured_master_key(config)?;

    println!(
        "Backing up {} → {}:{} (endpoint: {})",
        snapshot.display(),
        config.storage.bucket,
        naming.prefix(),
        config.storage.endpoint,
    );

    let pb = make_spinner("backup");
    let report = snapvault_storage::upload_backup(
        &op,
        &naming,
        Utc::now(),
        file,
        master_key.as_ref(),
        config.encryption.chunk_size,
        Some(byte_progress(&pb)),
    )
    .await
    .context("uploading backup");
    pb.finish_and_clear();
    let report = report?;

    println!("  payload:   {} ({})", report.payload_object, HumanBytes(report.bytes_written));
    match &report.key_object {
        Some(key) => println!("  key:       {key}"),
        None => println!("  key:       none (unencrypted)"),
    }
    Ok(())
}

// ── `snapvault restore` ───────────────────────────────────────────────────────

async fn cmd_restore(
    config: &SnapvaultConfig,
    timestamp: Option<DateTime<Utc>>,
    output: Option<&Path>,
) -> Result<()> {
    let output = output.unwrap_or(&config.snapshot_path);
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating directory: {}", dir.display()))?;

    let op = storage_operator(config)?;
    let naming = config.naming()?;
    let master_key = configured_master_key(config)?;

    // Written beside the target and renamed into place once complete;
    // dropped (and deleted) on any failure
    let tmp = tempfile::Builder::new()
        .prefix(".snapvault-restore-")
        .tempfile_in(&dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;
    let (file, tmp_path) = tmp.into_parts();

    let pb = make_spinner("restore");
    let result = snapvault_storage::download_backup(
        &op,
        &naming,
        timestamp,
        master_key.as_ref(),
        config.encryption.chunk_size,
        file,
        Some(byte_progress(&pb)),
    )
    .await
    .context("restoring backup");
    pb.finish_and_clear();
    let (report, file) = result?;

    file.sync_all().context("syncing restored snapshot")?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .context("setting snapshot permissions")?;
    }
    drop(file);
    tmp_path
        .persist(output)
        .with_context(|| format!("moving restored snapshot to {}", output.display()))?;

    println!(
        "Restored {} ({}{}) → {}",
        report.timestamp.to_rfc3339(),
        HumanBytes(report.bytes_written),
        if report.encrypted { ", decrypted" } else { "" },
        output.display()
    );
    Ok(())
}

// ── `snapvault prune` ─────────────────────────────────────────────────────────

async fn cmd_prune(
    config: &SnapvaultConfig,
    max_age: Option<&str>,
    min_count: Option<usize>,
    dry_run: bool,
) -> Result<()> {
    let mut policy: RetentionPolicy = config.retention.policy()?;
    if let Some(max_age) = max_age {
        policy.max_age = parse_max_age(max_age).context("parsing --max-age")?;
    }
    if let Some(min_count) = min_count {
        policy.min_keep = min_count;
    }

    let op = storage_operator(config)?;
    let naming = config.naming()?;
    let now = Utc::now();

    let deleted = if dry_run {
        let catalog = snapvault_storage::load_catalog(&op, &naming).await?;
        policy.deletable(&catalog, now)
    } else {
        snapvault_storage::prune_backups(&op, &naming, &policy, now)
            .await
            .context("pruning backups")?
    };

    let verb = if dry_run { "would delete" } else { "deleted" };
    println!(
        "Prune (cutoff {}, keep at least {}): {} {} backup(s)",
        policy.cutoff(now).to_rfc3339(),
        policy.min_keep,
        verb,
        deleted.len()
    );
    for entry in &deleted {
        println!("  {}", describe(entry));
    }
    Ok(())
}

// ── `snapvault rotate-key` ────────────────────────────────────────────────────

async fn cmd_rotate_key(config: &SnapvaultConfig, previous_key: &Path) -> Result<()> {
    let new_key = configured_master_key(config)?.context(
        "no encryption_key_path configured; rotation needs the new master key in the config",
    )?;
    let old_key = load_master_key(previous_key)
        .with_context(|| format!("loading previous master key: {}", previous_key.display()))?;

    let op = storage_operator(config)?;
    let naming = config.naming()?;

    let report = snapvault_storage::rotate_keys(&op, &naming, rewrap_converter(old_key, new_key))
        .await
        .context("rotating data keys (safe to re-run)")?;

    println!(
        "Rotated {} key(s), {} already under the current master key",
        report.rotated, report.unchanged
    );
    Ok(())
}

// ── `snapvault list` ──────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ListRow {
    #[serde(flatten)]
    entry: BackupEntry,
    latest: bool,
}

async fn cmd_list(config: &SnapvaultConfig, json: bool) -> Result<()> {
    let op = storage_operator(config)?;
    let naming = config.naming()?;
    let catalog = snapvault_storage::load_catalog(&op, &naming).await?;
    let latest = catalog.latest().ok().map(|e| e.timestamp);

    let rows: Vec<ListRow> = catalog
        .entries()
        .map(|entry| ListRow {
            entry: *entry,
            latest: Some(entry.timestamp) == latest,
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows).context("serializing backup list")?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No backups under prefix '{}'", naming.prefix());
        return Ok(());
    }
    for row in &rows {
        println!(
            "{}{}",
            describe(&row.entry),
            if row.latest { "  (latest)" } else { "" }
        );
    }
    println!("{} backup(s), {} restorable", catalog.len(), catalog.valid_count());
    Ok(())
}

fn describe(entry: &BackupEntry) -> String {
    let state = match (entry.payload_present, entry.key_present) {
        (true, true) => "encrypted",
        (true, false) => "plain",
        (false, _) => "orphaned key",
    };
    format!("{}  {state}", entry.timestamp.to_rfc3339())
}

// ── `snapvault generate-key` ──────────────────────────────────────────────────

fn cmd_generate_key(output: Option<&Path>) -> Result<()> {
    let key = MasterKey::generate();
    match output {
        Some(path) => {
            write_master_key(path, &key)
                .with_context(|| format!("writing master key: {}", path.display()))?;
            println!("Wrote new master key to {}", path.display());
        }
        None => println!("{}", key.to_hex().expose_secret()),
    }
    Ok(())
}

// ── `snapvault config show` ───────────────────────────────────────────────────

fn cmd_config_show(config: &SnapvaultConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
