use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS agencies (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    owner TEXT,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS agents (
    id TEXT PRIMARY KEY,
    agency_id TEXT NOT NULL,
    name TEXT NOT NULL,
    is_active INTEGER DEFAULT 1,
    created_at TEXT DEFAULT (datetime('now')),
    UNIQUE (agency_id, name),
    FOREIGN KEY (agency_id) REFERENCES agencies(id)
);

CREATE TABLE IF NOT EXISTS transactions (
    transaction_id TEXT PRIMARY KEY,
    agency_id TEXT NOT NULL,
    agent_id TEXT,
    customer_name TEXT NOT NULL,
    policy_number TEXT NOT NULL DEFAULT '',
    effective_date TEXT,
    transaction_type TEXT NOT NULL DEFAULT 'NEW',
    policy_type TEXT,
    carrier TEXT,
    premium REAL NOT NULL DEFAULT 0,
    expected_commission REAL NOT NULL DEFAULT 0,
    amount_paid REAL NOT NULL DEFAULT 0,
    statement_date TEXT,
    reconciliation_status TEXT,
    batch_id TEXT,
    source_transaction_id TEXT,
    idempotency_key TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (agency_id) REFERENCES agencies(id),
    FOREIGN KEY (agent_id) REFERENCES agents(id),
    FOREIGN KEY (source_transaction_id) REFERENCES transactions(transaction_id)
);

CREATE INDEX IF NOT EXISTS idx_transactions_agency ON transactions(agency_id);
CREATE INDEX IF NOT EXISTS idx_transactions_policy ON transactions(agency_id, policy_number);
CREATE INDEX IF NOT EXISTS idx_transactions_source ON transactions(source_transaction_id);

CREATE TABLE IF NOT EXISTS import_batches (
    batch_id TEXT PRIMARY KEY,
    agency_id TEXT NOT NULL,
    source_file TEXT NOT NULL,
    checksum TEXT,
    assignment_mode TEXT NOT NULL,
    status TEXT NOT NULL,
    statement_date TEXT,
    matched_count INTEGER DEFAULT 0,
    created_count INTEGER DEFAULT 0,
    entry_count INTEGER DEFAULT 0,
    imported_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (agency_id) REFERENCES agencies(id)
);

CREATE TABLE IF NOT EXISTS import_leases (
    agency_id TEXT PRIMARY KEY,
    batch_id TEXT NOT NULL,
    acquired_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (agency_id) REFERENCES agencies(id)
);
";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}
