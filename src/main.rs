mod attribution;
mod balance;
mod candidates;
mod cli;
mod db;
mod error;
mod fmt;
mod matcher;
mod materializer;
mod models;
mod normalizer;
mod orchestrator;
mod settings;
mod store;

use clap::Parser;

use cli::{AgencyCommands, AgentsCommands, Cli, Commands, ReportCommands, TransactionsCommands};

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Agency { command } => match command {
            AgencyCommands::Add { name, owner } => cli::agency::add(&name, owner.as_deref()),
            AgencyCommands::List => cli::agency::list(),
            AgencyCommands::Use { name } => cli::agency::use_agency(&name),
        },
        Commands::Agents { command } => match command {
            AgentsCommands::Add { name, agency, inactive } => {
                cli::agents::add(&name, agency.as_deref(), inactive)
            }
            AgentsCommands::List { agency } => cli::agents::list(agency.as_deref()),
            AgentsCommands::Deactivate { name, agency } => {
                cli::agents::deactivate(&name, agency.as_deref())
            }
        },
        Commands::Transactions { command } => match command {
            TransactionsCommands::Add {
                agency,
                customer,
                policy,
                effective,
                transaction_type,
                carrier,
                premium,
                commission,
                agent,
                id,
            } => cli::transactions::add(
                agency.as_deref(),
                &customer,
                &policy,
                effective.as_deref(),
                &transaction_type,
                carrier.as_deref(),
                premium,
                commission,
                &agent,
                id.as_deref(),
            ),
            TransactionsCommands::List { agency, customer, ledger } => {
                cli::transactions::list(agency.as_deref(), customer.as_deref(), ledger)
            }
        },
        Commands::Import {
            file,
            agency,
            mode,
            agent,
            mapping,
            create_unmatched,
            offset_renewals,
            assign,
            statement_date,
            effective_after,
            dry_run,
        } => cli::import::run(cli::import::ImportArgs {
            file,
            agency,
            mode,
            agent,
            mapping,
            create_unmatched,
            offset_renewals,
            assign,
            statement_date,
            effective_after,
            dry_run,
        }),
        Commands::Balance { transaction_id, agency, window_months } => {
            cli::balance::run(&transaction_id, agency.as_deref(), window_months)
        }
        Commands::Report { command } => match command {
            ReportCommands::Agents { agency } => cli::report::agents(agency.as_deref()),
            ReportCommands::Batches { agency, limit } => {
                cli::report::batches(agency.as_deref(), limit)
            }
        },
        Commands::Status => cli::status::run(),
        Commands::Backup { output } => cli::backup::run(output.as_deref()),
        Commands::Demo => cli::demo::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
