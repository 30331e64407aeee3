//! linkvault command-line entry point

use clap::{Parser, Subcommand};
use linkvault::{
    cli::{
        AddArgs, CategoryCommand, CheckArgs, EditArgs, ExportArgs, IdArgs, ImportArgs, ListArgs,
        QrArgs, UserCommand, WatchArgs,
    },
    config::settings::DEFAULT_CONFIG_FILE,
    init_logger_with_config, log_debug, log_error,
    runtime::run_with_runtime,
    AppConfig,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "linkvault")]
#[command(about = "Save, organize and health-check your bookmarks")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Check URLs (or every saved bookmark) once
    Check(CheckArgs),

    /// Re-check saved bookmarks periodically until interrupted
    Watch(WatchArgs),

    /// Save a URL
    Add(AddArgs),

    /// Change a saved bookmark
    Edit(EditArgs),

    /// List saved bookmarks
    List(ListArgs),

    /// Delete a bookmark
    Remove(IdArgs),

    /// Toggle a bookmark's favorite flag
    Favorite(IdArgs),

    /// Print a bookmark's URL and count the visit
    Visit(IdArgs),

    /// Export the collection as JSON or CSV
    Export(ExportArgs),

    /// Import a JSON backup
    Import(ImportArgs),

    /// Print a QR code image link for a URL
    Qr(QrArgs),

    /// Category management commands
    #[command(subcommand)]
    Category(CategoryCommand),

    /// Session user commands
    #[command(subcommand)]
    User(UserCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match AppConfig::load_from(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    if cli.verbose {
        config.log_level = "debug".to_string();
    } else if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }

    init_logger_with_config(
        &config.log_level,
        config.logging.enable_file_logging,
        &config.logging.log_dir,
    );
    log_debug!("📋 Version: {}", env!("CARGO_PKG_VERSION"));

    let runtime_config = config.runtime.clone();
    run_with_runtime(&runtime_config, async_main_cli(cli.command, config))
}

async fn async_main_cli(command: Commands, config: AppConfig) -> anyhow::Result<()> {
    let result = match command {
        Commands::Check(args) => args.execute(&config).await,
        Commands::Watch(args) => args.execute(&config).await,
        Commands::Add(args) => args.execute(&config),
        Commands::Edit(args) => args.execute(&config),
        Commands::List(args) => args.execute(&config),
        Commands::Remove(args) => args.remove(&config),
        Commands::Favorite(args) => args.toggle_favorite(&config),
        Commands::Visit(args) => args.visit(&config),
        Commands::Export(args) => args.execute(&config),
        Commands::Import(args) => args.execute(&config),
        Commands::Qr(args) => args.execute(&config),
        Commands::Category(command) => command.execute(&config),
        Commands::User(command) => command.execute(&config),
    };

    if let Err(e) = result {
        log_error!("{:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
