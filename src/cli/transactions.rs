use comfy_table::{Cell, Table};

use crate::db::get_connection;
use crate::error::{RemitError, Result};
use crate::fmt::money;
use crate::materializer::short_id;
use crate::models::Transaction;
use crate::normalizer::parse_date;
use crate::settings::{db_path, resolve_agency};
use crate::store;

#[allow(clippy::too_many_arguments)]
pub fn add(
    agency: Option<&str>,
    customer: &str,
    policy: &str,
    effective: Option<&str>,
    transaction_type: &str,
    carrier: Option<&str>,
    premium: f64,
    commission: f64,
    agent: &str,
    id: Option<&str>,
) -> Result<()> {
    let conn = get_connection(&db_path())?;
    let agency = store::agency_by_name(&conn, &resolve_agency(agency)?)?;
    let agent = store::agent_by_name(&conn, &agency.id, agent)?;

    let effective_date = match effective {
        Some(raw) => Some(
            parse_date(raw)
                .ok_or_else(|| RemitError::Other(format!("unparseable date '{raw}'")))?,
        ),
        None => None,
    };

    let txn = Transaction {
        transaction_id: id.map(|i| i.to_string()).unwrap_or_else(|| format!("T-{}", short_id())),
        agency_id: agency.id.clone(),
        agent_id: Some(agent.id),
        customer_name: customer.to_string(),
        policy_number: policy.to_string(),
        effective_date,
        transaction_type: transaction_type.to_uppercase(),
        policy_type: None,
        carrier: carrier.map(|c| c.to_string()),
        premium,
        expected_commission: commission,
        amount_paid: 0.0,
        statement_date: None,
        reconciliation_status: None,
        batch_id: None,
        source_transaction_id: None,
        idempotency_key: None,
    };
    store::insert_transaction(&conn, &txn)?;
    println!("Recorded {} for {}", txn.transaction_id, txn.customer_name);
    Ok(())
}

pub fn list(agency: Option<&str>, customer: Option<&str>, ledger: bool) -> Result<()> {
    let conn = get_connection(&db_path())?;
    let agency = store::agency_by_name(&conn, &resolve_agency(agency)?)?;
    let pool = store::load_transactions(&conn, &agency.id, None)?;

    let wanted = customer.map(|c| c.to_lowercase());
    let rows: Vec<&Transaction> = pool
        .iter()
        .filter(|t| t.is_ledger_entry() == ledger)
        .filter(|t| {
            wanted
                .as_deref()
                .map_or(true, |w| t.customer_name.to_lowercase().contains(w))
        })
        .collect();

    let mut table = Table::new();
    if ledger {
        table.set_header(vec!["ID", "Customer", "Policy", "Paid", "Stmt Date", "Source"]);
        for t in rows {
            table.add_row(vec![
                Cell::new(&t.transaction_id),
                Cell::new(&t.customer_name),
                Cell::new(&t.policy_number),
                Cell::new(money(t.amount_paid)),
                Cell::new(t.statement_date.as_deref().unwrap_or("")),
                Cell::new(t.source_transaction_id.as_deref().unwrap_or("")),
            ]);
        }
        println!("Ledger entries for {}\n{table}", agency.name);
    } else {
        table.set_header(vec!["ID", "Customer", "Policy", "Effective", "Type", "Commission"]);
        for t in rows {
            table.add_row(vec![
                Cell::new(&t.transaction_id),
                Cell::new(&t.customer_name),
                Cell::new(&t.policy_number),
                Cell::new(t.effective_date.as_deref().unwrap_or("")),
                Cell::new(&t.transaction_type),
                Cell::new(money(t.expected_commission)),
            ]);
        }
        println!("Transactions for {}\n{table}", agency.name);
    }
    Ok(())
}
