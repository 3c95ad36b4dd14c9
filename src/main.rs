use clap::{Parser, Subcommand};

use keepsake::cli::{
    handle_backup_command, handle_update_command, run_startup_check, BackupCommands,
    StartupAction, UpdateCommands,
};
use keepsake::config::update::{REPOSITORY_URL, RELEASE_ENDPOINT};
use keepsake::config::{paths::KeepsakePaths, settings::Settings};
use keepsake::update::LastCheckRecord;
use keepsake::KeepsakeError;

#[derive(Parser)]
#[command(
    name = "keepsake",
    version,
    about = "Snapshot and restore files and registry values",
    long_about = "Keepsake captures files and Windows registry values into timestamped \
                  snapshots before they are modified and restores them on request. \
                  It keeps itself up to date from its GitHub releases."
)]
struct Cli {
    /// Increase log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Snapshot management commands
    #[command(subcommand)]
    Backup(BackupCommands),

    /// Self-update commands
    #[command(subcommand)]
    Update(UpdateCommands),

    /// Show current configuration and paths
    Config,
}

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(exit_code(&e));
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let paths = KeepsakePaths::new()?;
    paths.ensure_directories()?;
    let settings = Settings::load_or_create(&paths)?;

    // `update` runs the flow itself and `config` must work offline
    let wants_startup_check = settings.update.check_on_startup
        && matches!(cli.command, Some(Commands::Backup(_)) | None);
    if wants_startup_check && run_startup_check(&paths, &settings)? == StartupAction::Exit {
        return Ok(());
    }

    match cli.command {
        Some(Commands::Backup(cmd)) => {
            handle_backup_command(&paths, &settings, cmd)?;
        }
        Some(Commands::Update(cmd)) => {
            handle_update_command(&paths, &settings, cmd)?;
        }
        Some(Commands::Config) => {
            println!("Keepsake Configuration");
            println!("======================");
            println!("Data directory:   {}", paths.base_dir().display());
            println!("Backup directory: {}", paths.backup_dir().display());
            println!("Update directory: {}", paths.updates_dir().display());
            println!("Settings file:    {}", paths.settings_file().display());
            println!();
            println!("Settings:");
            println!(
                "  Keep per scope:      {}",
                settings.backup_retention.keep_per_scope
            );
            println!(
                "  Max snapshot age:    {} days",
                settings.backup_retention.max_age_days
            );
            println!("  Check on startup:    {}", settings.update.check_on_startup);
            println!(
                "  Check cooldown:      {} minutes",
                settings.update.cooldown_minutes
            );
            println!();
            println!("Updates:");
            println!("  Release feed: {}", RELEASE_ENDPOINT);
            println!("  Releases:     {}/releases", REPOSITORY_URL);
            match LastCheckRecord::load(&paths.update_state_file()) {
                Some(record) => println!(
                    "  Last check:   {} (latest {})",
                    record.checked_at.format("%Y-%m-%d %H:%M:%S UTC"),
                    record.latest_version
                ),
                None => println!("  Last check:   never"),
            }
        }
        None => {
            println!("Keepsake - snapshot and restore for files and registry values");
            println!();
            println!("Run 'keepsake --help' for usage information.");
            println!("Run 'keepsake backup list' to see existing snapshots.");
        }
    }

    Ok(())
}

/// Declined required updates exit with 2, every other failure with 1
fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<KeepsakeError>()
        .map_or(1, KeepsakeError::exit_code)
}
