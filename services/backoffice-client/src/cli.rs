//! Command-line interface

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::api::TransactionQuery;

#[derive(Debug, Parser)]
#[command(name = "backoffice-client", version, about = "Back-office API client with a self-refreshing session")]
pub struct Cli {
    /// Config file (falls back to CONFIG_PATH, then ./backoffice-client.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in and store the token pair
    Login {
        #[arg(long)]
        email: String,
        /// File holding the password (BACKOFFICE_PASSWORD wins if set)
        #[arg(long)]
        password_file: Option<PathBuf>,
    },
    /// Cancel the refresh timer and clear stored credentials
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Create an account
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        role: String,
        #[arg(long)]
        password_file: Option<PathBuf>,
    },
    /// Change the password, then log out
    UpdatePassword {
        /// Current password (BACKOFFICE_PASSWORD wins if set)
        #[arg(long)]
        password_file: Option<PathBuf>,
        /// New password (BACKOFFICE_NEW_PASSWORD wins if set)
        #[arg(long)]
        new_password_file: Option<PathBuf>,
    },
    /// Send an arbitrary authenticated request
    Request {
        method: String,
        path: String,
        /// JSON request body
        #[arg(long)]
        body: Option<String>,
    },
    /// Transaction endpoints
    #[command(subcommand)]
    Transactions(TransactionsCommand),
    /// Keep the session alive with the refresh timer until interrupted
    Watch,
}

#[derive(Debug, Subcommand)]
pub enum TransactionsCommand {
    /// List transactions, optionally only those with one status
    List {
        #[command(flatten)]
        paging: PagingArgs,
        #[arg(long)]
        status: Option<String>,
    },
    /// List overdue transactions
    Overdue {
        #[command(flatten)]
        paging: PagingArgs,
    },
    /// Show one transaction
    Get { id: u64 },
    /// Set a transaction's status and note
    Update {
        id: u64,
        #[arg(long)]
        status: String,
        #[arg(long, default_value = "")]
        note: String,
    },
}

#[derive(Debug, Args)]
pub struct PagingArgs {
    #[arg(long, default_value_t = 1)]
    pub page: u32,
    #[arg(long, default_value_t = 10)]
    pub limit: u32,
    #[arg(long, default_value = "")]
    pub search: String,
}

impl From<PagingArgs> for TransactionQuery {
    fn from(args: PagingArgs) -> Self {
        Self {
            page: args.page,
            limit: args.limit,
            search: args.search,
        }
    }
}
