use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::db::get_connection;
use crate::error::Result;
use crate::fmt::money;
use crate::settings::{db_path, resolve_agency};
use crate::store;

pub fn agents(agency: Option<&str>) -> Result<()> {
    let conn = get_connection(&db_path())?;
    let agency = store::agency_by_name(&conn, &resolve_agency(agency)?)?;
    let positions = store::agent_positions(&conn, &agency.id)?;

    let mut table = Table::new();
    table.set_header(vec!["Agent", "Expected", "Reconciled", "Outstanding"]);
    let mut total_expected = 0.0;
    let mut total_reconciled = 0.0;
    for p in &positions {
        total_expected += p.expected;
        total_reconciled += p.reconciled;
        table.add_row(vec![
            Cell::new(&p.agent_name),
            Cell::new(money(p.expected)),
            Cell::new(money(p.reconciled)),
            Cell::new(money(p.balance)),
        ]);
    }
    println!("Commission position for {}\n{table}", agency.name);

    let outstanding = total_expected - total_reconciled;
    let line = format!(
        "Total expected {}, reconciled {}, outstanding {}",
        money(total_expected),
        money(total_reconciled),
        money(outstanding)
    );
    if outstanding.abs() < 0.01 {
        println!("{}", line.green());
    } else {
        println!("{}", line.yellow());
    }
    Ok(())
}

pub fn batches(agency: Option<&str>, limit: usize) -> Result<()> {
    let conn = get_connection(&db_path())?;
    let agency = store::agency_by_name(&conn, &resolve_agency(agency)?)?;
    let batches = store::recent_batches(&conn, &agency.id, limit)?;

    let mut table = Table::new();
    table.set_header(vec![
        "Batch", "File", "Stmt Date", "Mode", "Matched", "Created", "Entries", "Imported",
    ]);
    for b in batches {
        table.add_row(vec![
            Cell::new(b.batch_id),
            Cell::new(b.source_file),
            Cell::new(b.statement_date.unwrap_or_default()),
            Cell::new(b.assignment_mode),
            Cell::new(b.matched_count),
            Cell::new(b.created_count),
            Cell::new(b.entry_count),
            Cell::new(b.imported_at),
        ]);
    }
    println!("Recent imports for {}\n{table}", agency.name);
    Ok(())
}
