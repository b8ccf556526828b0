//! Moledro CLI
//!
//! Command-line interface for Moledro - cataloging books into libraries.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use moledro_core::{Config, SortBy};

mod commands;
mod editor;
mod output;

use commands::library::SettingsUpdate;
use commands::Context;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "moledro")]
#[command(about = "Moledro - Catalog your books into libraries")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use a specific config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List your libraries
    #[command(alias = "ls")]
    Libraries,
    /// Follow your libraries and print every change
    Watch,
    /// Manage a library
    Library {
        #[command(subcommand)]
        command: LibraryCommands,
    },
    /// List the books in a library
    Books {
        /// Library ID
        library_id: String,
        /// Only books whose title contains this text
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Look up an ISBN and add the book to a library
    Scan {
        /// Library ID
        library_id: String,
        /// Scanned ISBN-10 or ISBN-13
        code: String,
    },
    /// Remove a book from a library
    #[command(alias = "rm")]
    Remove {
        /// Library ID
        library_id: String,
        /// Book ID (full UUID or prefix)
        book_id: String,
    },
    /// Add or remove a tag on a book
    Tag {
        /// Library ID
        library_id: String,
        /// Book ID (full UUID or prefix)
        book_id: String,
        /// Tag text
        tag: String,
        /// Remove the tag instead of adding it
        #[arg(short, long)]
        remove: bool,
    },
    /// Show or change library display settings
    Settings {
        /// Library ID
        library_id: String,
        #[arg(long)]
        show_ddc: Option<bool>,
        #[arg(long)]
        show_subjects: Option<bool>,
        #[arg(long)]
        show_tags: Option<bool>,
        #[arg(long)]
        show_preview: Option<bool>,
        /// author, title, ddc-author or ddc-title
        #[arg(long)]
        sort_by: Option<SortBy>,
    },
    /// Compare prices for a book on Bookscouter
    Price {
        /// Library ID
        library_id: String,
        /// Book ID (full UUID or prefix)
        book_id: String,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum LibraryCommands {
    /// Create a new library
    #[command(alias = "add")]
    Create {
        /// Library name
        name: String,
        /// Cover image (JPEG)
        #[arg(short, long)]
        cover: PathBuf,
    },
    /// Delete a library and its cover
    #[command(alias = "rm")]
    Delete {
        /// Library ID
        id: String,
    },
    /// Show library details and settings
    Show {
        /// Library ID
        id: String,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, user_id, lookup_url, lookup_timeout_secs, log_level)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_ref();

    // Config commands don't need the store
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), config_path, &output);
    }

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    init_logging(&config.log_level);

    let ctx = Context::open(config)?;

    match cli.command {
        Commands::Libraries => commands::library::list(&ctx, &output).await,
        Commands::Watch => commands::library::watch(&ctx, &output).await,
        Commands::Library { command } => handle_library_command(command, &ctx, &output).await,
        Commands::Books { library_id, search } => {
            commands::book::list(&ctx, library_id, search, &output).await
        }
        Commands::Scan { library_id, code } => {
            commands::book::scan(&ctx, library_id, code, &output).await
        }
        Commands::Remove {
            library_id,
            book_id,
        } => commands::book::remove(&ctx, library_id, book_id, &output).await,
        Commands::Tag {
            library_id,
            book_id,
            tag,
            remove,
        } => commands::book::tag(&ctx, library_id, book_id, tag, remove, &output).await,
        Commands::Settings {
            library_id,
            show_ddc,
            show_subjects,
            show_tags,
            show_preview,
            sort_by,
        } => {
            let update = SettingsUpdate {
                show_ddc,
                show_subjects,
                show_tags,
                show_preview,
                sort_by,
            };
            commands::library::settings(&ctx, library_id, update, &output).await
        }
        Commands::Price {
            library_id,
            book_id,
        } => commands::book::price(&ctx, library_id, book_id, &output).await,
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

async fn handle_library_command(
    command: LibraryCommands,
    ctx: &Context,
    output: &Output,
) -> Result<()> {
    match command {
        LibraryCommands::Create { name, cover } => {
            commands::library::create(ctx, name, &cover, output).await
        }
        LibraryCommands::Delete { id } => commands::library::delete(ctx, id, output).await,
        LibraryCommands::Show { id } => commands::library::show(ctx, id, output).await,
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

/// Initialize logging to stderr
///
/// stdout is reserved for command output, so JSON stays parseable.
fn init_logging(log_level: &str) {
    let env_filter = EnvFilter::new(format!(
        "moledro_core={},moledro_cli={}",
        log_level, log_level
    ));

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
