//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Hallucigenia - Bitbucket branch watcher
#[derive(Parser)]
#[command(
    name = "hg",
    about = "Watch repository branches and run scripts when they move",
    version = env!("GIT_DESCRIBE"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Override the data directory
    #[arg(long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Watch observed branches until interrupted
    Watch,

    /// Run a single watch cycle and print what happened
    Check,

    /// Manage watched repositories
    Repo {
        #[command(subcommand)]
        command: RepoCommand,
    },

    /// Manage side-effect scripts
    Script {
        #[command(subcommand)]
        command: ScriptCommand,
    },

    /// Remove cached working trees of branches no longer observed
    Clean,
}

/// Repository subcommands
#[derive(Debug, Subcommand)]
pub enum RepoCommand {
    /// Attach a new repository and sync its branches
    Add {
        /// Bitbucket workspace
        workspace: String,

        /// Repository name within the workspace
        name: String,

        /// Local folder name (defaults to the repository name)
        #[arg(short, long)]
        slug: Option<String>,

        /// Repository access token
        #[arg(short, long, env = "HG_ACCESS_TOKEN", hide_env_values = true)]
        token: String,
    },

    /// List repositories with their status
    List,

    /// Delete a repository with its cache, scripts and logs
    Remove {
        slug: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Rename a repository folder
    Rename { slug: String, new_slug: String },

    /// Check every repository and update its status
    Check,

    /// Refresh the known branch list from the remote
    Sync { slug: String },

    /// Show known branches with observation and cache state
    Branches { slug: String },

    /// Replace the observed branch set
    Observe {
        slug: String,

        /// Branches to observe
        #[arg(required_unless_present = "clear", conflicts_with = "clear")]
        branches: Vec<String>,

        /// Observe nothing
        #[arg(long)]
        clear: bool,
    },
}

/// Script subcommands
#[derive(Debug, Subcommand)]
pub enum ScriptCommand {
    /// List scripts of a repository
    List { slug: String },

    /// Set a script from a file, or from stdin with `-`
    Set {
        slug: String,

        /// Branch the script belongs to (default script when omitted)
        #[arg(short, long)]
        branch: Option<String>,

        /// Script body source
        file: PathBuf,
    },

    /// Print a script
    Show {
        slug: String,

        #[arg(short, long)]
        branch: Option<String>,
    },

    /// Delete a script
    Remove {
        slug: String,

        #[arg(short, long)]
        branch: Option<String>,
    },
}
