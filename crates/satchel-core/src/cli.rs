use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "satchel",
    version,
    about = "Satchel: a local task list with categories, due dates and subtasks",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    /// Config overrides, e.g. --rc color=off
    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    /// Alternate rc file
    #[arg(long = "rcfile", global = true)]
    pub rcfile: Option<PathBuf>,

    /// Alternate data directory
    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Add a task
    Add {
        title: String,

        #[arg(short = 'd', long)]
        description: Option<String>,

        #[arg(short = 'c', long)]
        category: Option<String>,

        /// low, medium or high
        #[arg(short = 'p', long)]
        priority: Option<String>,

        /// today, tomorrow, +Nd or YYYY-MM-DD
        #[arg(long)]
        due: Option<String>,

        /// Repeatable; each becomes a subtask
        #[arg(long = "subtask", action = ArgAction::Append)]
        subtasks: Vec<String>,
    },

    /// List tasks, filtered and sorted
    List {
        /// Substring match against title or description
        #[arg(short = 's', long)]
        search: Option<String>,

        /// Exact category name
        #[arg(short = 'c', long)]
        category: Option<String>,

        /// all, todo or completed
        #[arg(long, default_value = "all")]
        status: String,

        /// created, due, priority or title
        #[arg(long, default_value = "created")]
        sort: String,

        #[arg(long)]
        desc: bool,
    },

    /// Show one task in full
    Show { id: String },

    /// Flip a task's completion flag
    Toggle { id: String },

    /// Set every task's completion flag at once
    ToggleAll {
        #[arg(long)]
        completed: bool,
    },

    /// Update fields of one or more tasks
    Edit {
        ids: Vec<String>,

        #[arg(short = 't', long)]
        title: Option<String>,

        #[arg(short = 'd', long)]
        description: Option<String>,

        #[arg(short = 'c', long)]
        category: Option<String>,

        #[arg(short = 'p', long)]
        priority: Option<String>,

        /// A date expression, or "none" to clear
        #[arg(long)]
        due: Option<String>,

        #[arg(long)]
        completed: Option<bool>,
    },

    /// Delete one or more tasks
    Rm { ids: Vec<String> },

    /// Remove every completed task
    ClearCompleted,

    /// Work with a task's subtasks
    #[command(subcommand)]
    Subtask(SubtaskCommand),

    /// List categories with their task counts
    Categories,

    /// Manage categories
    #[command(subcommand)]
    Category(CategoryCommand),

    /// Aggregate statistics
    Stats,

    /// Write a full-snapshot export bundle
    Export {
        /// Output path; defaults to todo-backup-<date>.json in the
        /// current directory. "-" writes to stdout.
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Replace both collections from an export bundle
    Import {
        /// Input path; "-" reads from stdin
        path: PathBuf,
    },

    /// Restore the backup taken by the last import
    Restore,

    /// Clear the task collection
    Reset,

    /// Remove every persisted key
    ClearAll,

    /// Show storage usage
    Storage,

    /// Drop structurally broken records from storage
    Optimize,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubtaskCommand {
    /// Append a subtask to a task
    Add { task_id: String, title: String },

    /// Flip a subtask's completion flag
    Toggle { task_id: String, subtask_id: String },

    /// Update a subtask's fields
    Edit {
        task_id: String,
        subtask_id: String,

        #[arg(short = 't', long)]
        title: Option<String>,

        #[arg(long)]
        completed: Option<bool>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum CategoryCommand {
    /// Add a category
    Add {
        name: String,

        /// 6-hex-digit color like #3B82F6; invalid values fall back to gray
        #[arg(long)]
        color: Option<String>,
    },

    /// Rename or recolor a category (tasks are not rewritten)
    Edit {
        id: String,

        #[arg(short = 'n', long)]
        name: Option<String>,

        #[arg(long)]
        color: Option<String>,
    },

    /// Delete a category (tasks keep the stale name)
    Rm { id: String },

    /// Restore the built-in default set
    Reset,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}
