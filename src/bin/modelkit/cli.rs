//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// modelkit - module resolution and package management for domain models
#[derive(Parser)]
#[command(name = "modelkit")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create model.yaml in a directory
    Init(InitArgs),

    /// Resolve, fetch and lock dependencies (writes model.lock)
    Install(InstallArgs),

    /// Re-resolve dependencies to their newest matching commits
    Update(UpdateArgs),

    /// Add a dependency to model.yaml
    Add(AddArgs),

    /// Remove a dependency from model.yaml
    Remove(RemoveArgs),

    /// List locked packages
    List,

    /// Compare model.yaml, model.lock and the package cache
    Status,

    /// Display the dependency tree
    Tree(TreeArgs),

    /// Explain why a package is in the dependency graph
    Why(WhyArgs),

    /// Check the manifest, lock file and import graph
    Validate,

    /// Report floating refs, pre-releases and cache problems
    Audit,

    /// Check the workspace against its governance policy
    Compliance,

    /// Package cache management
    Cache(CacheArgs),
}

#[derive(Args)]
pub struct InitArgs {
    /// Model name (defaults to directory name)
    #[arg(long)]
    pub name: Option<String>,

    /// Directory to initialize (defaults to current directory)
    pub path: Option<PathBuf>,
}

/// What to do on a package cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CycleArg {
    Error,
    Warn,
}

#[derive(Args)]
pub struct InstallArgs {
    /// Override `resolve.cycle_policy` from the config file
    #[arg(long, value_enum)]
    pub cycles: Option<CycleArg>,
}

#[derive(Args)]
pub struct UpdateArgs {
    /// Packages to update (all if none given)
    pub packages: Vec<String>,

    /// Override `resolve.cycle_policy` from the config file
    #[arg(long, value_enum)]
    pub cycles: Option<CycleArg>,
}

#[derive(Args)]
pub struct AddArgs {
    /// Package (`owner/repo`, `host/owner/repo`, or a URL), or a name with --path
    pub package: String,

    /// Git ref: tag, branch, commit, `latest` or `stable`
    #[arg(long = "ref", value_name = "REF")]
    pub git_ref: Option<String>,

    /// Path to a local dependency
    #[arg(long, conflicts_with = "git_ref")]
    pub path: Option<String>,

    /// Description stored with the dependency
    #[arg(long)]
    pub description: Option<String>,

    /// Run install afterwards
    #[arg(long)]
    pub install: bool,
}

#[derive(Args)]
pub struct RemoveArgs {
    /// Dependency name or package key
    pub name: String,
}

#[derive(Args)]
pub struct TreeArgs {
    /// Maximum depth to display
    #[arg(short, long)]
    pub depth: Option<usize>,
}

#[derive(Args)]
pub struct WhyArgs {
    /// Package key to explain
    pub package: String,
}

#[derive(Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommands,
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// List cached package entries
    List,

    /// Remove cached packages
    Clear(CacheClearArgs),

    /// Show the cache directory path
    Path,
}

#[derive(Args)]
pub struct CacheClearArgs {
    /// Only remove this package's entries
    pub package: Option<String>,
}
