use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "batuta")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Convergent host configuration - declare state, converge idempotently", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Converge the host to the recipe's declared state
    Apply(ApplyArgs),

    /// Show what apply would change, without touching the host
    Plan(PlanArgs),

    /// Validate a recipe without touching the host
    Validate(ValidateArgs),

    /// Show recent converge runs
    History(HistoryArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Apply
// ============================================================================

#[derive(Parser)]
pub struct ApplyArgs {
    /// Recipe file (defaults to ./recipe.toml, then the config directory)
    pub recipe: Option<PathBuf>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Override a recipe binding (repeatable)
    #[arg(short, long, value_name = "KEY=VALUE")]
    pub bind: Vec<String>,

    /// Default per-resource timeout for provider calls, in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Print the run report as JSON instead of the summary view
    #[arg(long)]
    pub json: bool,
}

// ============================================================================
// Plan
// ============================================================================

#[derive(Parser)]
pub struct PlanArgs {
    /// Recipe file (defaults to ./recipe.toml, then the config directory)
    pub recipe: Option<PathBuf>,

    /// Override a recipe binding (repeatable)
    #[arg(short, long, value_name = "KEY=VALUE")]
    pub bind: Vec<String>,
}

// ============================================================================
// Validate
// ============================================================================

#[derive(Parser)]
pub struct ValidateArgs {
    /// Recipe file (defaults to ./recipe.toml, then the config directory)
    pub recipe: Option<PathBuf>,
}

// ============================================================================
// History
// ============================================================================

#[derive(Parser)]
pub struct HistoryArgs {
    /// Number of runs to show
    #[arg(short, long, default_value = "10")]
    pub limit: usize,
}
