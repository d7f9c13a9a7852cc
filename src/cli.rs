use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "vigil", version, about = "Always-on supervisor for an autonomous agent")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the supervisor: mailbox server plus the epoch life loop
    Run(RunArgs),
    /// Run a single subagent task read as JSON from stdin (spawned by the supervisor)
    #[command(hide = true)]
    Worker,
}

#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Base URL of the kernel API
    #[arg(long, env = "VIGIL_KERNEL_URL")]
    pub kernel_url: Option<String>,

    /// Brain directory (the agent's working directory)
    #[arg(short, long, env = "VIGIL_BRAIN")]
    pub brain: Option<PathBuf>,

    /// Port for the /health and /inbox endpoints
    #[arg(short, long, env = "VIGIL_PORT")]
    pub port: Option<u16>,

    /// Seconds to sleep between epochs
    #[arg(long, env = "VIGIL_SLEEP_SECONDS")]
    pub sleep: Option<u64>,

    /// Timeout in seconds for a single think call
    #[arg(long, env = "VIGIL_THINK_TIMEOUT")]
    pub think_timeout: Option<u64>,

    /// Shell command timeout in seconds
    #[arg(long, env = "VIGIL_EXEC_TIMEOUT")]
    pub exec_timeout: Option<u64>,

    /// Maximum number of concurrently running subagents
    #[arg(long, env = "VIGIL_MAX_SUBAGENTS")]
    pub max_subagents: Option<usize>,

    /// Default subagent timeout in seconds
    #[arg(long, env = "VIGIL_SUBAGENT_TIMEOUT")]
    pub subagent_timeout: Option<u64>,

    /// Path to config file (overrides default search)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}
