//! Baton CLI: run and inspect multi-agent development workflows.
//!
//! `run`, `status`, `graph`, `validate` and `respond` are for the operator.
//! `agent`, `message`, `todo` and `progress` are the tool surface the agent
//! processes call during their turns; they identify the caller through
//! `BATON_AGENT` / `BATON_MODEL`, which the engine sets for every turn.

use std::io::Write;
use std::path::{Path, PathBuf};

use baton_cli::commands::{self, Caller};
use baton_core::workflow::InteractiveMode;
use clap::{Parser, Subcommand};

/// Baton: multi-agent workflow orchestrator
#[derive(Parser)]
#[command(name = "baton", version, about = "Baton — multi-agent workflow orchestrator")]
pub struct Cli {
    /// Project directory (holds GOAL.md and .baton/)
    #[arg(long, global = true, env = "BATON_PROJECT_DIR", default_value = ".")]
    project_dir: PathBuf,

    /// Calling agent (set by the engine for agent turns)
    #[arg(long, global = true, env = "BATON_AGENT")]
    agent: Option<String>,

    /// Calling model variant (set by the engine for multi-model agents)
    #[arg(long, global = true, env = "BATON_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run (or resume) the workflow
    Run {
        /// Discard any resumable state and start over
        #[arg(long)]
        fresh: bool,
        /// Goal document (default: <project>/GOAL.md)
        #[arg(long)]
        goal: Option<PathBuf>,
        /// Interaction mode: yes, no or auto
        #[arg(long, env = "BATON_INTERACTIVE")]
        interactive: Option<InteractiveMode>,
    },

    /// Show workflow status
    Status {
        /// Print the raw state as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the flow graph in DOT format
    Graph {
        #[arg(long)]
        goal: Option<PathBuf>,
    },

    /// Check the goal document and flow specification
    Validate {
        #[arg(long)]
        goal: Option<PathBuf>,
    },

    /// Answer the pending human question
    Respond {
        /// Response text
        text: Option<String>,
        /// Read the response from a file
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,
    },

    /// Report the calling agent's disposition
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },

    /// Inter-agent mailbox
    Message {
        #[command(subcommand)]
        action: MessageAction,
    },

    /// Agent and project todos
    Todo {
        #[command(subcommand)]
        action: TodoAction,
    },

    /// Append an entry to the progress log
    Progress {
        description: String,
    },
}

#[derive(Subcommand)]
enum AgentAction {
    /// This agent's part is finished
    Done,
    /// The whole workflow is complete (coordinator only)
    Complete,
    /// Still working; the engine will run another turn
    Working,
    /// Suspend the workflow until a human answers
    Ask {
        message: String,
        /// Multiple-choice questions as JSON
        #[arg(long)]
        choices_json: Option<String>,
    },
}

#[derive(Subcommand)]
enum MessageAction {
    /// Send a message to another agent (or `agent:model`)
    Send {
        #[arg(long)]
        to: String,
        body: String,
    },
    /// List messages addressed to the caller
    List {
        #[arg(long)]
        unread: bool,
        /// List every message regardless of recipient
        #[arg(long)]
        all: bool,
    },
    /// Show a message and mark it read
    Read {
        id: u64,
    },
}

#[derive(Subcommand)]
enum TodoAction {
    /// Add a todo
    Add {
        content: String,
        /// high, medium or low
        #[arg(long, default_value = "medium")]
        priority: String,
        /// Add to the project list instead of the caller's
        #[arg(long)]
        project: bool,
    },
    /// Change a todo's status
    Update {
        id: String,
        /// pending, in_progress, completed or cancelled
        status: String,
        #[arg(long)]
        project: bool,
    },
    /// List todos
    List {
        #[arg(long)]
        project: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "baton_core=info,baton=info,baton_cli=info".into()),
        )
        .init();

    let project_dir = cli.project_dir;
    let caller = Caller::new(cli.agent, cli.model);

    let result = match cli.command {
        Some(command) => dispatch(command, &project_dir, &caller).await,
        None => {
            // No subcommand: show help
            use clap::CommandFactory;
            Cli::command().print_help().ok();
            println!();
            Ok(0)
        }
    };

    let code = match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };
    // Exit without dropping the runtime: a withdrawn terminal prompt may
    // still be blocked on stdin, and the runtime would wait for it.
    let _ = std::io::stdout().flush();
    std::process::exit(code);
}

/// Run one command, returning the process exit code.
async fn dispatch(command: Commands, project_dir: &Path, caller: &Caller) -> Result<i32, String> {
    let result = match command {
        Commands::Run {
            fresh,
            goal,
            interactive,
        } => return commands::run::run(project_dir, goal, fresh, interactive).await,
        Commands::Status { json } => commands::status::show(project_dir, json),
        Commands::Graph { goal } => commands::graph::print_dot(project_dir, goal),
        Commands::Validate { goal } => commands::validate::validate(project_dir, goal),
        Commands::Respond { text, file } => {
            commands::respond::respond(project_dir, text.as_deref(), file.as_deref())
        }
        Commands::Agent { action } => match action {
            AgentAction::Done => commands::agent::done(project_dir, caller),
            AgentAction::Complete => commands::agent::complete(project_dir, caller),
            AgentAction::Working => commands::agent::working(project_dir, caller),
            AgentAction::Ask {
                message,
                choices_json,
            } => commands::agent::ask(project_dir, caller, &message, choices_json.as_deref()),
        },
        Commands::Message { action } => match action {
            MessageAction::Send { to, body } => {
                commands::message::send(project_dir, caller, &to, &body)
            }
            MessageAction::List { unread, all } => {
                commands::message::list(project_dir, caller, unread, all)
            }
            MessageAction::Read { id } => commands::message::read(project_dir, caller, id),
        },
        Commands::Todo { action } => match action {
            TodoAction::Add {
                content,
                priority,
                project,
            } => commands::todo::add(project_dir, caller, &content, &priority, project),
            TodoAction::Update {
                id,
                status,
                project,
            } => commands::todo::update(project_dir, caller, &id, &status, project),
            TodoAction::List { project } => commands::todo::list(project_dir, caller, project),
        },
        Commands::Progress { description } => {
            commands::progress::record(project_dir, caller, &description)
        }
    };
    result.map(|_| 0)
}
