//! bisync: Keep two directory trees in sync
//!
//! - Watches both roots and propagates creates, edits, deletes and moves
//! - BLAKE3 content hashing, last-writer-wins on conflicts
//! - Persisted snapshot with a catch-up scan on startup

mod logging;
mod report;

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, Subcommand, ValueEnum, builder::Styles};
use color_eyre::Result;
use tracing::info;

use bisync_core::{CONFIG_FILE, InitialScanner, SnapshotStore, SyncConfig, SyncDaemon, open_engine};

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default())
    .valid(AnsiColor::Green.on_default())
    .invalid(AnsiColor::Red.on_default());

#[derive(Parser)]
#[command(name = "bisync")]
#[command(version)]
#[command(styles = STYLES)]
#[command(about = "Two-way sync between a local tree and a remote tree")]
#[command(long_about = r#"
bisync keeps two directory trees identical while it runs.

Features:
  • Two-way        - changes on either side propagate to the other
  • Conflict rule  - the newer modification time wins
  • Catch-up scan  - files changed while stopped are synced on startup

Examples:
  bisync run                              Watch the roots from bisync.toml
  bisync --local ./work --remote /mnt/mirror run
  bisync scan                             One-shot reconciliation
  bisync status --format json             Dump the snapshot
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file
    #[arg(short, long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Local root (overrides the config file)
    #[arg(long, global = true)]
    local: Option<PathBuf>,

    /// Remote root (overrides the config file)
    #[arg(long, global = true)]
    remote: Option<PathBuf>,

    /// Snapshot location (overrides the config file)
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    /// Also write a detailed log to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan, then watch both roots until Ctrl+C
    Run,

    /// Reconcile both roots once and exit
    Scan,

    /// Print the snapshot
    Status {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Summary)]
        format: Format,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Summary,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let _log_guard = logging::init(cli.verbose, cli.log_file.as_deref())?;

    let config = resolve_config(&cli)?;

    match cli.command {
        Commands::Run => run_command(&config).await?,
        Commands::Scan => scan_command(&config)?,
        Commands::Status { format } => status_command(&config, format)?,
    }

    Ok(())
}

/// Config file values with command-line overrides applied
fn resolve_config(cli: &Cli) -> Result<SyncConfig> {
    let mut config = SyncConfig::load(&cli.config)?;
    if let Some(local) = &cli.local {
        config.local_root.clone_from(local);
    }
    if let Some(remote) = &cli.remote {
        config.remote_root.clone_from(remote);
    }
    if let Some(snapshot) = &cli.snapshot {
        config.snapshot.clone_from(snapshot);
    }
    config.validate(&cli.config)?;
    Ok(config)
}

async fn run_command(config: &SyncConfig) -> Result<()> {
    let start = Instant::now();
    let (daemon, scan) = SyncDaemon::start(config)?;
    report::scan_finished(&scan, start.elapsed());

    let engine = daemon.engine();
    report::watching(engine.local().path(), engine.remote().root());

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received");

    let handled = daemon.shutdown();
    report::stopped(handled);
    Ok(())
}

fn scan_command(config: &SyncConfig) -> Result<()> {
    let start = Instant::now();
    let engine = open_engine(config)?;
    let scan = InitialScanner::new(&engine).run()?;
    report::scan_finished(&scan, start.elapsed());
    Ok(())
}

fn status_command(config: &SyncConfig, format: Format) -> Result<()> {
    let snapshot = SnapshotStore::load(&config.snapshot);
    print_status(snapshot.path(), &snapshot, format)
}

fn print_status(path: &Path, snapshot: &SnapshotStore, format: Format) -> Result<()> {
    let entries = snapshot.entries();
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        Format::Summary => print!("{}", report::snapshot_summary(path, &entries)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory as _;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_status_format() {
        let cli = Cli::try_parse_from(["bisync", "status", "--format", "json"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Status {
                format: Format::Json
            }
        ));
        assert_eq!(cli.config, PathBuf::from(CONFIG_FILE));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["bisync", "run", "-v", "--local", "work"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.local, Some(PathBuf::from("work")));
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let config_path = dir.path().join(CONFIG_FILE);
        std::fs::write(
            &config_path,
            "local_root = \"from-file\"\nremote_root = \"mirror\"\nignore = [\"*.swp\"]\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "bisync",
            "--config",
            config_path.to_str().unwrap(),
            "--local",
            "from-flag",
            "scan",
        ])
        .unwrap();
        let config = resolve_config(&cli).unwrap();

        assert_eq!(config.local_root, PathBuf::from("from-flag"));
        assert_eq!(config.remote_root, PathBuf::from("mirror"));
        assert_eq!(config.ignore, vec!["*.swp"]);
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let cli = Cli::try_parse_from([
            "bisync",
            "--config",
            dir.path().join("absent.toml").to_str().unwrap(),
            "status",
        ])
        .unwrap();

        let config = resolve_config(&cli).unwrap();
        assert_eq!(config, SyncConfig::default());
    }

    #[test]
    fn test_override_to_same_root_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let cli = Cli::try_parse_from([
            "bisync",
            "--config",
            dir.path().join("absent.toml").to_str().unwrap(),
            "--local",
            "same",
            "--remote",
            "same",
            "run",
        ])
        .unwrap();
        assert!(resolve_config(&cli).is_err());
    }
}
