//! CLI module for FoodAtlas
//!
//! Provides command-line interface parsing and handling for the foodatlas-server binary.
//! Uses clap for argument parsing and owo-colors for colored terminal output.

pub mod commands;
pub mod init;
pub mod output;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// FoodAtlas - restaurant analytics server
///
/// Multi-tenant restaurant analytics with a natural-language chat over
/// uploaded documents and warehouse data.
#[derive(Parser, Debug)]
#[command(
    name = "foodatlas-server",
    author = "FoodAtlas <dev@foodatlas.com.br>",
    version,
    about = "FoodAtlas - restaurant analytics server",
    long_about = "Multi-tenant restaurant analytics with a natural-language chat over\n\
                  uploaded documents and warehouse data.\n\n\
                  Run without arguments to start the server, or use 'init' to scaffold a new project.",
    after_help = "EXAMPLES:\n    \
                  foodatlas-server init                        # Scaffold a project with a local warehouse\n    \
                  foodatlas-server init --warehouse bigquery   # Scaffold for BigQuery\n    \
                  foodatlas-server token --user owner-1        # Mint a development JWT\n    \
                  foodatlas-server                             # Start the server (requires foodatlas.toml)\n    \
                  foodatlas-server --config my.toml            # Use a custom config file"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "foodatlas.toml", global = true)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Warehouse backend written by `init`.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum WarehouseChoice {
    /// SQLite file under data/
    Local,
    /// Google BigQuery
    Bigquery,
}

/// One of the shared dashboard tables.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DashboardTable {
    /// Stock control report
    Stock,
    /// Integrated sales report
    Integrated,
    /// Delivery report
    Delivery,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server (the default)
    Serve,

    /// Initialize a new FoodAtlas project
    ///
    /// Creates foodatlas.toml, .env.example and the data/ directory.
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite existing files
        #[arg(short, long)]
        force: bool,

        /// Warehouse backend to configure
        #[arg(long, value_enum, default_value = "local")]
        warehouse: WarehouseChoice,
    },

    /// Mint a JWT for development
    Token {
        /// Tenant (user) id placed in the `sub` claim
        #[arg(short, long)]
        user: String,

        /// Email claim
        #[arg(short, long, default_value = "dev@foodatlas.local")]
        email: String,

        /// Lifetime in seconds (defaults to auth.jwt_access_expiry)
        #[arg(long)]
        ttl: Option<i64>,
    },

    /// Show configuration information
    Config {
        /// Validate the configuration, including referenced env vars
        #[arg(long)]
        validate: bool,
    },

    /// Append a CSV report to a shared dashboard table
    Import {
        /// Restaurant the rows belong to
        #[arg(short, long)]
        restaurant: String,

        /// Target dashboard table
        #[arg(short, long, value_enum)]
        table: DashboardTable,

        /// CSV file to load
        file: PathBuf,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
