pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "fedimirror")]
#[command(about = "Mirror upstream accounts as ActivityPub actors", long_about = None)]
pub struct Cli {
    /// Path to the config file (default: $FEDIMIRROR_CONFIG or ~/.config/fedimirror/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the federation endpoints and harvest in the background
    Serve,
    /// Run one harvest cycle in the foreground
    Harvest,
    /// List the newest stored posts of an account
    List {
        /// Local username of the account
        username: String,

        /// Maximum number of posts to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Print the identifier for a foreign post id
    Id {
        /// Local account id (0-255)
        account: u8,
        /// Source tag (0 = Twitter)
        source: u8,
        /// Numeric post id in the source system
        foreign_id: u64,
    },
}
