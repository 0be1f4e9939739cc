use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Local;
use colored::Colorize;
use comfy_table::{Cell, Table};
use sha2::{Digest, Sha256};

use crate::cli::parse_assignments;
use crate::db::get_connection;
use crate::error::{RemitError, Result};
use crate::fmt::money;
use crate::models::{AssignmentMode, BatchStatus, RowDisposition, TenantContext};
use crate::normalizer::{infer_mapping, load_mapping, normalize_rows, read_statement};
use crate::orchestrator::{run_import, ImportOptions};
use crate::settings::{db_path, resolve_agency};
use crate::store;

pub struct ImportArgs {
    pub file: String,
    pub agency: Option<String>,
    pub mode: String,
    pub agent: Option<String>,
    pub mapping: Option<String>,
    pub create_unmatched: bool,
    pub offset_renewals: bool,
    pub assign: Vec<String>,
    pub statement_date: Option<String>,
    pub effective_after: Option<String>,
    pub dry_run: bool,
}

fn compute_checksum(file_path: &Path) -> Result<String> {
    let data = std::fs::read(file_path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

pub fn run(args: ImportArgs) -> Result<()> {
    let mode = AssignmentMode::parse(&args.mode)
        .ok_or_else(|| RemitError::Other(format!("unknown mode '{}'", args.mode)))?;
    if mode == AssignmentMode::AssignAll && args.agent.is_none() {
        return Err(RemitError::Other(
            "--mode assign-all requires --agent".to_string(),
        ));
    }

    let file_path = PathBuf::from(&args.file);
    let mut conn = get_connection(&db_path())?;
    let agency = store::agency_by_name(&conn, &resolve_agency(args.agency.as_deref())?)?;
    let ctx = TenantContext { agency_id: agency.id.clone() };
    let agents = store::load_agents(&conn, &agency.id)?;
    let agent_names: HashMap<&str, &str> =
        agents.iter().map(|a| (a.id.as_str(), a.name.as_str())).collect();

    // Normalize the statement up front; parse problems are per-row, not fatal.
    let raw = read_statement(&file_path)?;
    let mapping = match args.mapping.as_deref() {
        Some(path) => load_mapping(Path::new(path))?,
        None => infer_mapping(&raw.headers)?,
    };
    let (rows, parse_errors) = normalize_rows(&raw, &mapping)?;

    let selected_agent = match args.agent.as_deref() {
        Some(name) => Some(store::agent_by_name(&conn, &agency.id, name)?.id),
        None => None,
    };
    let mut manual_assignments = HashMap::new();
    for (row_index, agent_name) in parse_assignments(&args.assign)? {
        let agent = store::agent_by_name(&conn, &agency.id, &agent_name)?;
        manual_assignments.insert(row_index, agent.id);
    }

    let statement_date = match args.statement_date.as_deref() {
        Some(raw) => crate::normalizer::parse_date(raw)
            .ok_or_else(|| RemitError::Other(format!("unparseable date '{raw}'")))?,
        None => Local::now().date_naive().format("%Y-%m-%d").to_string(),
    };

    let opts = ImportOptions {
        mode,
        selected_agent,
        manual_assignments,
        create_unmatched: args.create_unmatched,
        offset_renewals: args.offset_renewals,
        source_file: file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("statement")
            .to_string(),
        checksum: Some(compute_checksum(&file_path)?),
        statement_date,
        imported_at: Local::now().naive_local(),
        effective_after: args.effective_after.clone(),
        dry_run: args.dry_run,
    };

    let summary = run_import(&mut conn, &ctx, &rows, parse_errors, &opts)?;

    // Per-row outcomes
    let mut table = Table::new();
    table.set_header(vec!["Row", "Customer", "Policy", "Amount", "Outcome", "Agent", "Detail"]);
    for report in &summary.rows {
        let agent = report
            .agent_id
            .as_deref()
            .and_then(|id| agent_names.get(id).copied())
            .unwrap_or("");
        let (outcome, detail) = match &report.disposition {
            RowDisposition::Matched { transaction_id, confidence, match_type, outstanding } => (
                format!("matched {confidence} ({match_type})"),
                format!("{transaction_id}, outstanding {}", money(*outstanding)),
            ),
            RowDisposition::Created { transaction_id } => {
                ("created".to_string(), transaction_id.clone())
            }
            RowDisposition::NeedsReview { candidates } => {
                let hint = candidates
                    .first()
                    .map(|c| format!("closest: {} ({})", c.customer_name, c.score))
                    .unwrap_or_else(|| "no candidates".to_string());
                ("needs review".to_string(), hint)
            }
        };
        table.add_row(vec![
            Cell::new(report.row_index),
            Cell::new(&report.customer_name),
            Cell::new(&report.policy_number),
            Cell::new(money(report.amount)),
            Cell::new(outcome),
            Cell::new(agent),
            Cell::new(detail),
        ]);
    }
    println!("{table}");

    println!(
        "{} matched, {} created, {} ledger entries written",
        summary.matched_count, summary.created_count, summary.ledger_entries_created
    );
    if summary.review_count > 0 {
        println!(
            "{}",
            format!(
                "{} unmatched row(s) need review (re-run with --create-unmatched to create them)",
                summary.review_count
            )
            .yellow()
        );
    }
    if summary.skipped_count > 0 {
        println!(
            "{}",
            format!("{} row(s) skipped during parsing:", summary.skipped_count).yellow()
        );
        for err in &summary.errors {
            println!("  row {}: {}", err.row_index, err.reason);
        }
    }
    if summary.unassigned_count > 0 {
        println!(
            "{}",
            format!(
                "{} row(s) still need an agent; supply --assign ROW=AGENT or pick another mode",
                summary.unassigned_count
            )
            .yellow()
        );
    }
    if summary.duplicate_count > 0 {
        println!(
            "{}",
            format!(
                "{} row(s) were already imported in an earlier batch; a second set of ledger entries was created",
                summary.duplicate_count
            )
            .red()
        );
    }
    if summary.status == BatchStatus::Committed {
        println!("Batch {} committed.", summary.batch_id);
    } else {
        println!("{}", "Dry run: nothing was written.".cyan());
    }
    Ok(())
}
