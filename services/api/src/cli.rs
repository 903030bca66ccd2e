use crate::render::{run_deadlines_list, run_queue_rank, DeadlinesListArgs, QueueRankArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use dossier_desk::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Dossier Desk",
    about = "Serve and inspect the deadline-aware urbanism request queue",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Rank exported request batches offline
    Queue {
        #[command(subcommand)]
        command: QueueCommand,
    },
    /// Inspect the statutory deadline registry
    Deadlines {
        #[command(subcommand)]
        command: DeadlinesCommand,
    },
}

#[derive(Subcommand, Debug)]
enum QueueCommand {
    /// Rank a JSON array of request-store rows
    Rank(QueueRankArgs),
}

#[derive(Subcommand, Debug)]
enum DeadlinesCommand {
    /// List configured resolution windows and aliases
    List(DeadlinesListArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Queue {
            command: QueueCommand::Rank(args),
        } => run_queue_rank(args),
        Command::Deadlines {
            command: DeadlinesCommand::List(args),
        } => run_deadlines_list(args),
    }
}
