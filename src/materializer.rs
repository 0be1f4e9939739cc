use std::collections::HashSet;

use chrono::NaiveDateTime;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::{RemitError, Result};
use crate::matcher::normalize_policy;
use crate::models::{
    ImportBatch, StatementRow, TenantContext, Transaction, IMPORT_MARKER, STMT_MARKER,
};

/// What the orchestrator decided to do with one accepted row.
#[derive(Debug, Clone)]
pub enum RowPlan<'a> {
    /// Matched an existing base transaction; spawn one ledger entry.
    Reconcile {
        row: &'a StatementRow,
        transaction_id: String,
        agent_id: Option<String>,
    },
    /// Unmatched row approved for creation; spawn a base transaction plus its
    /// ledger entry.
    Create {
        row: &'a StatementRow,
        agent_id: Option<String>,
    },
}

impl RowPlan<'_> {
    fn row_index(&self) -> usize {
        match self {
            Self::Reconcile { row, .. } | Self::Create { row, .. } => row.row_index,
        }
    }

    fn agent_id(&self) -> Option<&str> {
        match self {
            Self::Reconcile { agent_id, .. } | Self::Create { agent_id, .. } => agent_id.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MaterializeOutput {
    pub transactions: Vec<Transaction>,
    pub ledger_entries: Vec<Transaction>,
}

// Ambiguous characters left out.
const ID_CHARS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

pub fn short_id() -> String {
    let mut rng = rand::thread_rng();
    (0..6)
        .map(|_| ID_CHARS[rng.gen_range(0..ID_CHARS.len())] as char)
        .collect()
}

/// The id segment before any import/reconciliation marker; ledger-entry ids
/// are built from it so they tie back to their base transaction.
fn id_stem(transaction_id: &str) -> &str {
    let stem = transaction_id
        .split(IMPORT_MARKER)
        .next()
        .unwrap_or(transaction_id);
    stem.split(STMT_MARKER).next().unwrap_or(stem)
}

/// Hash of tenant + source file + row content. Recorded on every ledger entry
/// so a re-imported statement can be recognized; it does not block one.
pub fn idempotency_key(agency_id: &str, source_label: &str, row: &StatementRow) -> String {
    let mut hasher = Sha256::new();
    hasher.update(agency_id.as_bytes());
    hasher.update(b"|");
    hasher.update(source_label.as_bytes());
    hasher.update(b"|");
    hasher.update(row.customer_name.trim().to_lowercase().as_bytes());
    hasher.update(b"|");
    hasher.update(normalize_policy(&row.policy_number).as_bytes());
    hasher.update(b"|");
    hasher.update(row.effective_date.as_deref().unwrap_or("").as_bytes());
    hasher.update(b"|");
    hasher.update(((row.amount * 100.0).round() as i64).to_le_bytes());
    hex::encode(hasher.finalize())
}

fn unique_id(wanted: String, used: &mut HashSet<String>) -> String {
    if used.insert(wanted.clone()) {
        return wanted;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{wanted}-{n}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn new_base_transaction(
    row: &StatementRow,
    ctx: &TenantContext,
    agent_id: &str,
    batch: &ImportBatch,
    date_tag: &str,
) -> Transaction {
    Transaction {
        transaction_id: format!("{}{IMPORT_MARKER}{date_tag}", short_id()),
        agency_id: ctx.agency_id.clone(),
        agent_id: Some(agent_id.to_string()),
        customer_name: row.customer_name.clone(),
        policy_number: row.policy_number.clone(),
        effective_date: row.effective_date.clone(),
        transaction_type: row.transaction_type.clone(),
        policy_type: row.policy_type.clone(),
        carrier: row.carrier.clone(),
        premium: row.premium.unwrap_or(0.0),
        // The statement amount stands in for the expected commission until
        // someone corrects it.
        expected_commission: row.amount,
        amount_paid: 0.0,
        statement_date: None,
        reconciliation_status: None,
        batch_id: Some(batch.batch_id.clone()),
        source_transaction_id: None,
        idempotency_key: None,
    }
}

/// Build every record a committed batch will write. Rows without a resolved
/// agent abort the whole call; proceeding with a null agent is forbidden.
pub fn materialize(
    plans: &[RowPlan],
    pool: &[Transaction],
    ctx: &TenantContext,
    batch: &ImportBatch,
    imported_at: NaiveDateTime,
    offset_renewals: bool,
) -> Result<MaterializeOutput> {
    let unassigned: Vec<usize> = plans
        .iter()
        .filter(|p| p.agent_id().is_none())
        .map(|p| p.row_index())
        .collect();
    if !unassigned.is_empty() {
        return Err(RemitError::UnassignedRows(unassigned));
    }

    let date_tag = imported_at.format("%Y%m%d").to_string();
    let stamp = imported_at.format("%Y%m%d%H%M%S").to_string();
    let mut used_ids: HashSet<String> = pool.iter().map(|t| t.transaction_id.clone()).collect();

    let mut out = MaterializeOutput::default();

    for plan in plans {
        let (row, agent_id, source) = match plan {
            RowPlan::Reconcile { row, transaction_id, agent_id } => {
                let source = pool
                    .iter()
                    .find(|t| &t.transaction_id == transaction_id)
                    .ok_or_else(|| RemitError::UnknownTransaction(transaction_id.clone()))?
                    .clone();
                (row, agent_id.as_deref().unwrap_or_default(), source)
            }
            RowPlan::Create { row, agent_id } => {
                let agent_id = agent_id.as_deref().unwrap_or_default();
                let mut base = new_base_transaction(row, ctx, agent_id, batch, &date_tag);
                base.transaction_id = unique_id(base.transaction_id, &mut used_ids);

                // Optional zero-amount NEW sibling keeps the policy's history
                // contiguous when the statement starts at a renewal or
                // cancellation.
                if offset_renewals && matches!(row.transaction_type.as_str(), "RWL" | "CAN") {
                    let mut offset = new_base_transaction(row, ctx, agent_id, batch, &date_tag);
                    offset.transaction_id = unique_id(offset.transaction_id, &mut used_ids);
                    offset.transaction_type = "NEW".to_string();
                    offset.expected_commission = 0.0;
                    offset.premium = 0.0;
                    out.transactions.push(offset);
                }

                let source = base.clone();
                out.transactions.push(base);
                (row, agent_id, source)
            }
        };

        let entry_id = unique_id(
            format!("{}{STMT_MARKER}{stamp}", id_stem(&source.transaction_id)),
            &mut used_ids,
        );
        out.ledger_entries.push(Transaction {
            transaction_id: entry_id,
            agency_id: ctx.agency_id.clone(),
            agent_id: Some(agent_id.to_string()),
            customer_name: source.customer_name.clone(),
            policy_number: source.policy_number.clone(),
            effective_date: source.effective_date.clone(),
            transaction_type: source.transaction_type.clone(),
            policy_type: source.policy_type.clone(),
            carrier: source.carrier.clone(),
            // Estimate fields never carry over to a reconciliation entry.
            premium: 0.0,
            expected_commission: 0.0,
            amount_paid: row.amount,
            statement_date: Some(batch.statement_date.clone()),
            reconciliation_status: Some("reconciled".to_string()),
            batch_id: Some(batch.batch_id.clone()),
            source_transaction_id: Some(source.transaction_id.clone()),
            idempotency_key: Some(idempotency_key(&ctx.agency_id, &batch.source_file, row)),
        });
    }

    Ok(out)
}
