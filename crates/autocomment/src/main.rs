mod commands;

use std::net::IpAddr;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

use autocomment::logging;
use commands::Workspace;

// ============================================================================
// CLI Types
// ============================================================================

/// Autocomment - reply to new channel posts from many accounts
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "autocomment.yaml", global = true)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP control server
    Serve {
        /// Host to bind to (overrides config file)
        #[arg(long)]
        host: Option<IpAddr>,

        /// Port to listen on (overrides config file)
        #[arg(short, long)]
        port: Option<u16>,

        /// Start the engine right away
        #[arg(long)]
        start: bool,
    },

    /// Run the engine without the HTTP server until interrupted
    Run,

    /// Manage accounts
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },

    /// Manage the comment pool
    Comment {
        #[command(subcommand)]
        action: CommentAction,
    },

    /// Print the end of the log file
    Logs {
        /// Number of lines (defaults to logging.tail_lines)
        #[arg(short = 'n', long)]
        lines: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
enum AccountAction {
    /// List known accounts
    List,
    /// Ask the service to send a verification code
    RequestCode {
        /// Account phone number
        phone: String,
    },
    /// Finish sign-in with the received code
    Confirm {
        /// Account phone number
        phone: String,
        /// Verification code
        code: String,
        /// Second-factor password, if the account has one
        #[arg(long)]
        password: Option<String>,
    },
    /// Forget an account and delete its session file
    Remove {
        /// Account phone number
        phone: String,
    },
}

#[derive(Subcommand, Debug)]
enum CommentAction {
    /// List comments
    List,
    /// Add a comment
    Add {
        /// Comment text
        text: String,
    },
    /// Remove the first comment with this exact text
    Remove {
        /// Comment text
        text: String,
    },
}

impl Commands {
    /// Long-running commands also log to the workspace log file.
    fn logs_to_file(&self) -> bool {
        matches!(self, Commands::Serve { .. } | Commands::Run)
    }
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let workspace = match Workspace::load(&cli.config).await {
        Ok(workspace) => workspace,
        Err(e) => {
            let _guard = logging::init(None);
            error!("{e:#}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let log_file = cli
        .command
        .logs_to_file()
        .then(|| workspace.paths.log_file.clone());
    let _guard = logging::init(log_file.as_deref());

    match run(cli.command, workspace).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, workspace: Workspace) -> Result<()> {
    match command {
        Commands::Serve { host, port, start } => {
            commands::serve::run(workspace, host, port, start).await
        }
        Commands::Run => commands::run::run(workspace).await,
        Commands::Account { action } => match action {
            AccountAction::List => commands::account::list(&workspace).await,
            AccountAction::RequestCode { phone } => {
                commands::account::request_code(&workspace, &phone).await
            }
            AccountAction::Confirm {
                phone,
                code,
                password,
            } => commands::account::confirm(&workspace, &phone, &code, password.as_deref()).await,
            AccountAction::Remove { phone } => commands::account::remove(&workspace, &phone).await,
        },
        Commands::Comment { action } => match action {
            CommentAction::List => commands::comment::list(&workspace).await,
            CommentAction::Add { text } => commands::comment::add(&workspace, &text).await,
            CommentAction::Remove { text } => commands::comment::remove(&workspace, &text).await,
        },
        Commands::Logs { lines } => commands::logs::run(&workspace, lines).await,
    }
}
