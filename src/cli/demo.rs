use chrono::{Datelike, Local};

use crate::db::{get_connection, init_db};
use crate::error::{RemitError, Result};
use crate::models::Transaction;
use crate::settings::{db_path, get_data_dir, load_settings, save_settings};
use crate::store;

const AGENCY_NAME: &str = "Harbor Insurance Group";

struct DemoTxn {
    id: &'static str,
    customer: &'static str,
    policy: &'static str,
    carrier: &'static str,
    premium: f64,
    commission: f64,
    agent: usize, // index into the demo agents
}

const AGENTS: &[&str] = &["Dana Whitfield", "Marcus Webb", "Priya Anand"];

const TXNS: &[DemoTxn] = &[
    DemoTxn { id: "T-1001", customer: "John Carver", policy: "AUTO-4821", carrier: "Progressive", premium: 2400.0, commission: 288.0, agent: 0 },
    DemoTxn { id: "T-1002", customer: "Elena Ruiz", policy: "HOME-1177", carrier: "Allstate", premium: 1850.0, commission: 222.0, agent: 1 },
    DemoTxn { id: "T-1003", customer: "Bright Path Daycare LLC", policy: "BOP-0093", carrier: "Nationwide", premium: 5200.0, commission: 624.0, agent: 2 },
    DemoTxn { id: "T-1004", customer: "Samuel Osei", policy: "AUTO-7754", carrier: "Progressive", premium: 1600.0, commission: 192.0, agent: 0 },
];

pub fn run() -> Result<()> {
    let conn = get_connection(&db_path())?;
    init_db(&conn)?;

    if store::agency_by_name(&conn, AGENCY_NAME).is_ok() {
        return Err(RemitError::Other(format!(
            "demo data already loaded ({AGENCY_NAME} exists)"
        )));
    }

    let agency = store::insert_agency(&conn, AGENCY_NAME, Some("Sam Harbor"))?;
    let mut agent_ids = Vec::new();
    for name in AGENTS {
        agent_ids.push(store::insert_agent(&conn, &agency.id, name, true)?.id);
    }

    let today = Local::now().date_naive();
    let effective = today
        .with_day(1)
        .unwrap_or(today)
        .format("%Y-%m-%d")
        .to_string();

    for t in TXNS {
        let txn = Transaction {
            transaction_id: t.id.to_string(),
            agency_id: agency.id.clone(),
            agent_id: Some(agent_ids[t.agent].clone()),
            customer_name: t.customer.to_string(),
            policy_number: t.policy.to_string(),
            effective_date: Some(effective.clone()),
            transaction_type: "NEW".to_string(),
            policy_type: None,
            carrier: Some(t.carrier.to_string()),
            premium: t.premium,
            expected_commission: t.commission,
            amount_paid: 0.0,
            statement_date: None,
            reconciliation_status: None,
            batch_id: None,
            source_transaction_id: None,
            idempotency_key: None,
        };
        store::insert_transaction(&conn, &txn)?;
    }

    // A sample carrier statement exercising the matcher: an exact policy+date
    // match, a reversed name, a business-name variant, a brand-new customer,
    // and a totals row the normalizer should drop.
    let stmt_path = get_data_dir().join("sample-statement.csv");
    let statement = format!(
        "Carrier Commission Statement,,,\n\
         Customer,Policy Number,Effective Date,Amount\n\
         John Carver,AUTO-4821,{effective},288.00\n\
         \"Ruiz, Elena\",HOME-1177,,222.00\n\
         Bright Path Daycare L.L.C.,BOP-0093,,620.00\n\
         Nora Quinn,AUTO-9912,{effective},150.00\n\
         Grand Total,,,1280.00\n"
    );
    std::fs::write(&stmt_path, statement)?;

    let mut settings = load_settings();
    if settings.default_agency.is_empty() {
        settings.default_agency = AGENCY_NAME.to_string();
        save_settings(&settings)?;
    }

    println!("Loaded demo agency '{AGENCY_NAME}' with {} agents and {} transactions.", AGENTS.len(), TXNS.len());
    println!("Sample statement: {}", stmt_path.display());
    println!();
    println!("Try:");
    println!("  remit import {} --mode auto --dry-run", stmt_path.display());
    println!("  remit report agents");
    Ok(())
}
