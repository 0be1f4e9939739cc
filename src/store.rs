use rusqlite::{params, Connection, Row};

use crate::error::{RemitError, Result};
use crate::materializer::short_id;
use crate::models::{Agency, Agent, ImportBatch, Transaction};

// ---------------------------------------------------------------------------
// Agencies and agents
// ---------------------------------------------------------------------------

pub fn insert_agency(conn: &Connection, name: &str, owner: Option<&str>) -> Result<Agency> {
    let id = format!("AG-{}", short_id());
    conn.execute(
        "INSERT INTO agencies (id, name, owner) VALUES (?1, ?2, ?3)",
        params![id, name, owner],
    )?;
    Ok(Agency {
        id,
        name: name.to_string(),
        owner: owner.map(|o| o.to_string()),
    })
}

pub fn agency_by_name(conn: &Connection, name: &str) -> Result<Agency> {
    conn.query_row(
        "SELECT id, name, owner FROM agencies WHERE name = ?1",
        [name],
        |row| {
            Ok(Agency {
                id: row.get(0)?,
                name: row.get(1)?,
                owner: row.get(2)?,
            })
        },
    )
    .map_err(|_| RemitError::UnknownAgency(name.to_string()))
}

pub fn list_agencies(conn: &Connection) -> Result<Vec<Agency>> {
    let mut stmt = conn.prepare("SELECT id, name, owner FROM agencies ORDER BY name")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Agency {
                id: row.get(0)?,
                name: row.get(1)?,
                owner: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn insert_agent(conn: &Connection, agency_id: &str, name: &str, active: bool) -> Result<Agent> {
    let id = format!("A-{}", short_id());
    conn.execute(
        "INSERT INTO agents (id, agency_id, name, is_active) VALUES (?1, ?2, ?3, ?4)",
        params![id, agency_id, name, active as i32],
    )?;
    Ok(Agent {
        id,
        agency_id: agency_id.to_string(),
        name: name.to_string(),
        is_active: active,
    })
}

pub fn agent_by_name(conn: &Connection, agency_id: &str, name: &str) -> Result<Agent> {
    conn.query_row(
        "SELECT id, agency_id, name, is_active FROM agents WHERE agency_id = ?1 AND name = ?2",
        params![agency_id, name],
        |row| {
            Ok(Agent {
                id: row.get(0)?,
                agency_id: row.get(1)?,
                name: row.get(2)?,
                is_active: row.get::<_, i64>(3)? != 0,
            })
        },
    )
    .map_err(|_| RemitError::UnknownAgent(name.to_string()))
}

pub fn set_agent_active(conn: &Connection, agency_id: &str, name: &str, active: bool) -> Result<()> {
    let changed = conn.execute(
        "UPDATE agents SET is_active = ?1 WHERE agency_id = ?2 AND name = ?3",
        params![active as i32, agency_id, name],
    )?;
    if changed == 0 {
        return Err(RemitError::UnknownAgent(name.to_string()));
    }
    Ok(())
}

pub fn load_agents(conn: &Connection, agency_id: &str) -> Result<Vec<Agent>> {
    let mut stmt = conn.prepare(
        "SELECT id, agency_id, name, is_active FROM agents WHERE agency_id = ?1 ORDER BY name",
    )?;
    let rows = stmt
        .query_map([agency_id], |row| {
            Ok(Agent {
                id: row.get(0)?,
                agency_id: row.get(1)?,
                name: row.get(2)?,
                is_active: row.get::<_, i64>(3)? != 0,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

fn txn_from_row(row: &Row) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        transaction_id: row.get(0)?,
        agency_id: row.get(1)?,
        agent_id: row.get(2)?,
        customer_name: row.get(3)?,
        policy_number: row.get(4)?,
        effective_date: row.get(5)?,
        transaction_type: row.get(6)?,
        policy_type: row.get(7)?,
        carrier: row.get(8)?,
        premium: row.get(9)?,
        expected_commission: row.get(10)?,
        amount_paid: row.get(11)?,
        statement_date: row.get(12)?,
        reconciliation_status: row.get(13)?,
        batch_id: row.get(14)?,
        source_transaction_id: row.get(15)?,
        idempotency_key: row.get(16)?,
    })
}

const TXN_COLUMNS: &str = "transaction_id, agency_id, agent_id, customer_name, policy_number, \
     effective_date, transaction_type, policy_type, carrier, premium, expected_commission, \
     amount_paid, statement_date, reconciliation_status, batch_id, source_transaction_id, \
     idempotency_key";

/// Load the agency's transaction pool. Every query here is agency-scoped;
/// there is no unscoped variant. `effective_after` bounds base transactions
/// by effective date; ledger entries always come along so balances stay
/// complete.
pub fn load_transactions(
    conn: &Connection,
    agency_id: &str,
    effective_after: Option<&str>,
) -> Result<Vec<Transaction>> {
    let sql = format!(
        "SELECT {TXN_COLUMNS} FROM transactions \
         WHERE agency_id = ?1 \
           AND (?2 IS NULL OR source_transaction_id IS NOT NULL \
                OR effective_date IS NULL OR effective_date >= ?2) \
         ORDER BY transaction_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![agency_id, effective_after], txn_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn transaction_by_id(conn: &Connection, agency_id: &str, id: &str) -> Result<Transaction> {
    let sql = format!(
        "SELECT {TXN_COLUMNS} FROM transactions WHERE agency_id = ?1 AND transaction_id = ?2"
    );
    conn.query_row(&sql, params![agency_id, id], txn_from_row)
        .map_err(|_| RemitError::UnknownTransaction(id.to_string()))
}

pub fn insert_transaction(conn: &Connection, txn: &Transaction) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO transactions ({TXN_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
        ),
        params![
            txn.transaction_id,
            txn.agency_id,
            txn.agent_id,
            txn.customer_name,
            txn.policy_number,
            txn.effective_date,
            txn.transaction_type,
            txn.policy_type,
            txn.carrier,
            txn.premium,
            txn.expected_commission,
            txn.amount_paid,
            txn.statement_date,
            txn.reconciliation_status,
            txn.batch_id,
            txn.source_transaction_id,
            txn.idempotency_key,
        ],
    )
    .map_err(|e| RemitError::WriteFailure {
        item: txn.transaction_id.clone(),
        source: e,
    })?;
    Ok(())
}

pub fn count_existing_idempotency_keys(
    conn: &Connection,
    agency_id: &str,
    keys: &[String],
) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "SELECT count(*) FROM transactions WHERE agency_id = ?1 AND idempotency_key = ?2",
    )?;
    let mut found = 0usize;
    for key in keys {
        let n: i64 = stmt.query_row(params![agency_id, key], |r| r.get(0))?;
        if n > 0 {
            found += 1;
        }
    }
    Ok(found)
}

// ---------------------------------------------------------------------------
// Batches and leases
// ---------------------------------------------------------------------------

pub fn insert_batch(
    conn: &Connection,
    batch: &ImportBatch,
    matched: usize,
    created: usize,
    entries: usize,
) -> Result<()> {
    conn.execute(
        "INSERT INTO import_batches (batch_id, agency_id, source_file, checksum, \
         assignment_mode, status, statement_date, matched_count, created_count, entry_count) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            batch.batch_id,
            batch.agency_id,
            batch.source_file,
            batch.checksum,
            batch.assignment_mode.as_str(),
            batch.status.as_str(),
            batch.statement_date,
            matched as i64,
            created as i64,
            entries as i64,
        ],
    )
    .map_err(|e| RemitError::WriteFailure {
        item: batch.batch_id.clone(),
        source: e,
    })?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct BatchListing {
    pub batch_id: String,
    pub source_file: String,
    pub statement_date: Option<String>,
    pub assignment_mode: String,
    pub matched_count: i64,
    pub created_count: i64,
    pub entry_count: i64,
    pub imported_at: String,
}

pub fn recent_batches(conn: &Connection, agency_id: &str, limit: usize) -> Result<Vec<BatchListing>> {
    let mut stmt = conn.prepare(
        "SELECT batch_id, source_file, statement_date, assignment_mode, matched_count, \
         created_count, entry_count, imported_at \
         FROM import_batches WHERE agency_id = ?1 \
         ORDER BY imported_at DESC, batch_id DESC LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![agency_id, limit as i64], |row| {
            Ok(BatchListing {
                batch_id: row.get(0)?,
                source_file: row.get(1)?,
                statement_date: row.get(2)?,
                assignment_mode: row.get(3)?,
                matched_count: row.get(4)?,
                created_count: row.get(5)?,
                entry_count: row.get(6)?,
                imported_at: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// One import per agency at a time. Losing the race surfaces as
/// `ImportInProgress`, not a database error.
pub fn acquire_lease(conn: &Connection, agency_id: &str, batch_id: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO import_leases (agency_id, batch_id) VALUES (?1, ?2)",
        params![agency_id, batch_id],
    )
    .map_err(|e| {
        if e.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation) {
            RemitError::ImportInProgress(agency_id.to_string())
        } else {
            RemitError::Db(e)
        }
    })?;
    Ok(())
}

pub fn release_lease(conn: &Connection, agency_id: &str) -> Result<()> {
    conn.execute("DELETE FROM import_leases WHERE agency_id = ?1", [agency_id])?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AgentPosition {
    pub agent_name: String,
    pub expected: f64,
    pub reconciled: f64,
    pub balance: f64,
}

/// Expected vs reconciled commission per agent: base transactions carry the
/// expectation, `-STMT-` entries carry what was actually paid.
pub fn agent_positions(conn: &Connection, agency_id: &str) -> Result<Vec<AgentPosition>> {
    let mut stmt = conn.prepare(
        "SELECT a.name, \
           COALESCE(SUM(CASE WHEN t.source_transaction_id IS NULL THEN t.expected_commission END), 0), \
           COALESCE(SUM(CASE WHEN t.source_transaction_id IS NOT NULL THEN t.amount_paid END), 0) \
         FROM agents a \
         LEFT JOIN transactions t ON t.agent_id = a.id AND t.agency_id = a.agency_id \
         WHERE a.agency_id = ?1 \
         GROUP BY a.id, a.name \
         ORDER BY a.name",
    )?;
    let rows = stmt
        .query_map([agency_id], |row| {
            let expected: f64 = row.get(1)?;
            let reconciled: f64 = row.get(2)?;
            Ok(AgentPosition {
                agent_name: row.get(0)?,
                expected,
                reconciled,
                balance: expected - reconciled,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
