//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros. One subcommand
//! per exposed engine operation.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// RL4-RS: proof-based development-memory engine for AI coding agents.
///
/// Answers questions about a workspace from its recorded evidence
/// (saves, chats, commands, decisions) with cited sources, and selects
/// lessons to inject before edits.
#[derive(Parser, Debug)]
#[command(name = "rl4-rs")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Workspace root (the directory containing `.rl4/`).
    ///
    /// Defaults to the current directory.
    #[arg(short, long, env = "RL4_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Enable verbose logging to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the `.rl4` layout in the workspace.
    Init,

    /// Print the aggregated evidence dashboard.
    Evidence,

    /// Print the timeline: a compact index, or day bundles in a range.
    Timeline {
        /// Inclusive ISO-date lower bound.
        #[arg(long)]
        from: Option<String>,

        /// Inclusive ISO-date upper bound.
        #[arg(long)]
        to: Option<String>,
    },

    /// Print the coupling/intent graph as JSON.
    IntentGraph,

    /// Search the corpus with optional metadata filters.
    Search {
        /// Natural-language query.
        query: String,

        /// Restrict to a source kind (evidence, timeline, decisions,
        /// chat, cli, code).
        #[arg(long)]
        source: Option<String>,

        /// Restrict to a tag (FIX, FEAT, ARCH, ...).
        #[arg(long)]
        tag: Option<String>,

        /// Restrict to chunks whose file path contains this substring.
        #[arg(long)]
        file: Option<String>,

        /// Inclusive ISO-date lower bound.
        #[arg(long)]
        from: Option<String>,

        /// Inclusive ISO-date upper bound.
        #[arg(long)]
        to: Option<String>,

        /// Maximum results (default 10, max 20).
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Search chat history only.
    SearchChats {
        /// Natural-language query.
        query: String,

        /// Maximum results.
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Search shell history only.
    SearchCli {
        /// Natural-language query.
        query: String,

        /// Maximum results.
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Ask a question: full bundle with related questions and stats.
    Ask {
        /// Natural-language question.
        query: String,

        /// Restrict to a source kind.
        #[arg(long)]
        source: Option<String>,

        /// Restrict to a tag.
        #[arg(long)]
        tag: Option<String>,

        /// Restrict to a file-path substring.
        #[arg(long)]
        file: Option<String>,

        /// Inclusive ISO-date lower bound.
        #[arg(long)]
        from: Option<String>,

        /// Inclusive ISO-date upper bound.
        #[arg(long)]
        to: Option<String>,

        /// Maximum results.
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Select lessons before editing a file.
    SuggestEdit {
        /// Workspace-relative file path.
        file: String,

        /// Optional edit intent.
        #[arg(long)]
        intent: Option<String>,
    },

    /// Apply an edit with a pre-edit backup and intervention logging.
    ApplyEdit {
        /// Workspace-relative file path.
        file: String,

        /// New content (reads from stdin if not provided).
        #[arg(long)]
        content: Option<String>,

        /// Edit description.
        #[arg(short, long, default_value = "edit")]
        description: String,
    },

    /// Resolve pending intervention outcomes and refresh CRE state.
    ResolveOutcomes,

    /// Run a command inside the workspace.
    Run {
        /// Program to execute.
        command: String,

        /// Program arguments.
        args: Vec<String>,

        /// Timeout in milliseconds (default 30000).
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// List known workspaces.
    Workspaces,

    /// Select a workspace by id.
    UseWorkspace {
        /// Workspace id from `workspaces`.
        id: String,
    },

    /// Snapshot the source tree into the content-addressed store.
    Snapshot,

    /// Rotate oversized streams into archives and prune orphan blobs.
    FinalizeSnapshot,

    /// Check a query or response against the guardrail.
    Guardrail {
        /// Text to check.
        text: String,

        /// Guardrail kind: query or response.
        #[arg(long, default_value = "query")]
        kind: String,

        /// File path the guarded edit targets.
        #[arg(long)]
        file: Option<String>,
    },

    /// Rebuild both dashboards from the evidence streams.
    Dashboards,
}

impl Cli {
    /// Returns the workspace root, defaulting to the current directory.
    #[must_use]
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
