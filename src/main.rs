use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use api_lookup::Config;

mod commands;

#[derive(Parser)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about = "Index API declarations with ctags and look them up", long_about = None)]
struct Cli {
    /// Config file (default: <data dir>/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory, overrides the config file and API_LOOKUP_HOME
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Paging {
    /// Results to skip
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    offset: i64,

    /// Page size (0 = default for the command)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    limit: i64,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh tag sources, then serve MCP over stdio
    Serve,

    /// Re-import changed tag files and drop groups whose file is gone
    Refresh {
        /// Output results as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Run ctags over a directory and index it under the directory's name
    Generate {
        /// Source directory to index
        dir: PathBuf,

        /// Output results as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Search declarations by name
    Search {
        /// Name or fragment (case-insensitive)
        name: String,

        #[command(flatten)]
        paging: Paging,

        /// Output results as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// List indexed APIs
    Apis {
        /// Output results as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// List the files indexed for an API
    Files {
        /// API name
        api: String,

        #[command(flatten)]
        paging: Paging,

        /// Output results as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// List the declarations in a file, across APIs
    Functions {
        /// File path as shown by `files`
        file: String,

        #[command(flatten)]
        paging: Paging,

        /// Output results as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Remove an API and its tag file
    Remove {
        /// API name
        api: String,
    },

    /// Show indexed APIs and where data lives
    Status {
        /// Output results as JSON
        #[arg(short, long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref(), cli.data_dir.as_deref())?;
    let indexer = commands::open_indexer(config)?;

    match cli.command {
        Commands::Serve => {
            commands::serve::execute(indexer)?;
        }
        Commands::Refresh { json } => {
            commands::index::refresh(&indexer, json)?;
        }
        Commands::Generate { dir, json } => {
            commands::index::generate(&indexer, &dir, json)?;
        }
        Commands::Search { name, paging, json } => {
            commands::query::search(&indexer, &name, paging.offset, paging.limit, json)?;
        }
        Commands::Apis { json } => {
            commands::query::apis(&indexer, json)?;
        }
        Commands::Files { api, paging, json } => {
            commands::query::files(&indexer, &api, paging.offset, paging.limit, json)?;
        }
        Commands::Functions { file, paging, json } => {
            commands::query::functions(&indexer, &file, paging.offset, paging.limit, json)?;
        }
        Commands::Remove { api } => {
            commands::index::remove(&indexer, &api)?;
        }
        Commands::Status { json } => {
            commands::index::status(&indexer, json)?;
        }
    }

    Ok(())
}
