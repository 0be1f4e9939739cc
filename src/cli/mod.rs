pub mod agency;
pub mod agents;
pub mod backup;
pub mod balance;
pub mod demo;
pub mod import;
pub mod init;
pub mod report;
pub mod status;
pub mod transactions;

use clap::{Parser, Subcommand};

use crate::error::{RemitError, Result};

/// Parse repeated `--assign ROW=AGENT` flags into (row index, agent name).
pub(crate) fn parse_assignments(raw: &[String]) -> Result<Vec<(usize, String)>> {
    raw.iter()
        .map(|pair| {
            let (row, agent) = pair.split_once('=').ok_or_else(|| {
                RemitError::Other(format!("--assign expects ROW=AGENT, got '{pair}'"))
            })?;
            let row_index: usize = row.trim().parse().map_err(|_| {
                RemitError::Other(format!("--assign row '{row}' is not a number"))
            })?;
            Ok((row_index, agent.trim().to_string()))
        })
        .collect()
}

#[derive(Parser)]
#[command(
    name = "remit",
    about = "Commission statement reconciliation for multi-agent insurance agencies."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up remit: choose a data directory and initialize the database.
    Init {
        /// Path for remit data (default: ~/Documents/remit)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Manage agencies.
    Agency {
        #[command(subcommand)]
        command: AgencyCommands,
    },
    /// Manage sales agents.
    Agents {
        #[command(subcommand)]
        command: AgentsCommands,
    },
    /// Record and inspect policy transactions.
    Transactions {
        #[command(subcommand)]
        command: TransactionsCommands,
    },
    /// Import a carrier commission statement and reconcile it.
    Import {
        /// Path to the statement file (CSV or XLSX)
        file: String,
        /// Agency name (default from settings)
        #[arg(long)]
        agency: Option<String>,
        /// Assignment mode: auto, assign-all, manual
        #[arg(long, default_value = "auto")]
        mode: String,
        /// Agent receiving every row (assign-all mode)
        #[arg(long)]
        agent: Option<String>,
        /// JSON column-mapping file (default: inferred from the header row)
        #[arg(long)]
        mapping: Option<String>,
        /// Create base transactions for unmatched rows
        #[arg(long = "create-unmatched")]
        create_unmatched: bool,
        /// Also create zero-amount NEW siblings for created RWL/CAN rows
        #[arg(long = "offset-renewals")]
        offset_renewals: bool,
        /// Manual assignment: ROW=AGENT (repeatable)
        #[arg(long = "assign", value_name = "ROW=AGENT")]
        assign: Vec<String>,
        /// Statement date: YYYY-MM-DD (default: today)
        #[arg(long = "statement-date")]
        statement_date: Option<String>,
        /// Only match against transactions effective on/after this date
        #[arg(long = "effective-after")]
        effective_after: Option<String>,
        /// Run the pipeline and show the outcome without writing anything
        #[arg(long = "dry-run")]
        dry_run: bool,
    },
    /// Show the outstanding balance for one transaction.
    Balance {
        /// Transaction id
        transaction_id: String,
        /// Agency name (default from settings)
        #[arg(long)]
        agency: Option<String>,
        /// Trailing ledger window in months
        #[arg(long = "window-months", default_value_t = 18)]
        window_months: u32,
    },
    /// Generate reports.
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },
    /// Show current database and summary statistics.
    Status,
    /// Back up the database.
    Backup {
        /// Output path (default: <data_dir>/backups/remit-YYYYMMDD-HHMMSS.db)
        #[arg(long)]
        output: Option<String>,
    },
    /// Load sample data (agency, agents, transactions, statement) to explore remit.
    Demo,
}

#[derive(Subcommand)]
pub enum AgencyCommands {
    /// Add a new agency.
    Add {
        /// Agency name, e.g. 'Harbor Insurance Group'
        name: String,
        /// Owner name
        #[arg(long)]
        owner: Option<String>,
    },
    /// List all agencies.
    List,
    /// Make an agency the default for commands that omit --agency.
    Use {
        /// Agency name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum AgentsCommands {
    /// Add an agent to an agency.
    Add {
        /// Agent name
        name: String,
        /// Agency name (default from settings)
        #[arg(long)]
        agency: Option<String>,
        /// Record the agent as inactive (historical reference only)
        #[arg(long)]
        inactive: bool,
    },
    /// List agents.
    List {
        /// Agency name (default from settings)
        #[arg(long)]
        agency: Option<String>,
    },
    /// Deactivate an agent. Historical attribution is kept; new attribution
    /// is refused.
    Deactivate {
        /// Agent name
        name: String,
        /// Agency name (default from settings)
        #[arg(long)]
        agency: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum TransactionsCommands {
    /// Record a base policy transaction.
    Add {
        /// Agency name (default from settings)
        #[arg(long)]
        agency: Option<String>,
        /// Customer name
        #[arg(long)]
        customer: String,
        /// Policy number
        #[arg(long)]
        policy: String,
        /// Effective date: YYYY-MM-DD
        #[arg(long)]
        effective: Option<String>,
        /// Transaction type: NEW, RWL, CAN
        #[arg(long = "type", default_value = "NEW")]
        transaction_type: String,
        /// Carrier name
        #[arg(long)]
        carrier: Option<String>,
        /// Premium sold
        #[arg(long, default_value_t = 0.0)]
        premium: f64,
        /// Expected commission amount
        #[arg(long)]
        commission: f64,
        /// Agent credited with the sale
        #[arg(long)]
        agent: String,
        /// Explicit transaction id (default: generated)
        #[arg(long)]
        id: Option<String>,
    },
    /// List transactions.
    List {
        /// Agency name (default from settings)
        #[arg(long)]
        agency: Option<String>,
        /// Filter by customer name
        #[arg(long)]
        customer: Option<String>,
        /// Show reconciliation ledger entries instead of base transactions
        #[arg(long)]
        ledger: bool,
    },
}

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Outstanding commission balance per agent.
    Agents {
        /// Agency name (default from settings)
        #[arg(long)]
        agency: Option<String>,
    },
    /// Recent import batches.
    Batches {
        /// Agency name (default from settings)
        #[arg(long)]
        agency: Option<String>,
        /// How many batches to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}
