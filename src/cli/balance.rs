use chrono::Local;

use crate::balance::compute_balance;
use crate::db::get_connection;
use crate::error::Result;
use crate::fmt::money;
use crate::settings::{db_path, resolve_agency};
use crate::store;

pub fn run(transaction_id: &str, agency: Option<&str>, window_months: u32) -> Result<()> {
    let conn = get_connection(&db_path())?;
    let agency = store::agency_by_name(&conn, &resolve_agency(agency)?)?;

    // Fails early with UnknownTransaction if the id is wrong or foreign.
    let txn = store::transaction_by_id(&conn, &agency.id, transaction_id)?;
    let pool = store::load_transactions(&conn, &agency.id, None)?;

    let balance = compute_balance(
        transaction_id,
        &pool,
        Local::now().date_naive(),
        window_months,
    );

    println!("{} ({}, {})", txn.transaction_id, txn.customer_name, txn.policy_number);
    println!("  Expected:   {}", money(balance.credit));
    println!("  Reconciled: {}  (last {window_months} months)", money(balance.debit));
    println!("  Balance:    {}", money(balance.balance));
    Ok(())
}
