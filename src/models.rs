use std::collections::HashMap;

/// Marker embedded in reconciliation-entry transaction ids.
pub const STMT_MARKER: &str = "-STMT-";
/// Marker embedded in ids of transactions created from a statement import.
pub const IMPORT_MARKER: &str = "-IMPORT-";

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Agency {
    pub id: String,
    pub name: String,
    pub owner: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Agent {
    pub id: String,
    pub agency_id: String,
    pub name: String,
    pub is_active: bool,
}

/// Explicit tenant scope threaded through every engine call. Never read from
/// ambient state.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub agency_id: String,
}

/// One row of the `transactions` table. Base transactions and reconciliation
/// ledger entries share the table; an entry is recognized by the `-STMT-`
/// marker in its id and its `source_transaction_id` linkage.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub transaction_id: String,
    pub agency_id: String,
    pub agent_id: Option<String>,
    pub customer_name: String,
    pub policy_number: String,
    pub effective_date: Option<String>,
    pub transaction_type: String,
    pub policy_type: Option<String>,
    pub carrier: Option<String>,
    pub premium: f64,
    pub expected_commission: f64,
    pub amount_paid: f64,
    pub statement_date: Option<String>,
    pub reconciliation_status: Option<String>,
    pub batch_id: Option<String>,
    pub source_transaction_id: Option<String>,
    pub idempotency_key: Option<String>,
}

impl Transaction {
    pub fn is_ledger_entry(&self) -> bool {
        self.source_transaction_id.is_some() || self.transaction_id.contains(STMT_MARKER)
    }
}

/// Canonical statement row produced by the normalizer. Immutable; discarded
/// once the batch completes.
#[derive(Debug, Clone)]
pub struct StatementRow {
    pub row_index: usize,
    pub customer_name: String,
    pub policy_number: String,
    pub effective_date: Option<String>,
    pub amount: f64,
    pub premium: Option<f64>,
    pub carrier: Option<String>,
    pub transaction_type: String,
    pub policy_type: Option<String>,
    pub raw_fields: HashMap<String, String>,
}

/// Scored customer-name candidate. Ephemeral, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchCandidate {
    pub customer_name: String,
    pub score: u8,
    pub strategy: &'static str,
}

#[derive(Debug, Clone)]
pub struct MatchResult {
    pub row_index: usize,
    pub matched_transaction_id: Option<String>,
    pub confidence: u8,
    pub match_type: String,
    pub resolved_agent_id: Option<String>,
    /// Top candidates for manual review when unmatched.
    pub candidates: Vec<MatchCandidate>,
}

impl MatchResult {
    pub fn is_matched(&self) -> bool {
        self.matched_transaction_id.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentMode {
    AssignAll,
    AutoAssign,
    Manual,
}

impl AssignmentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AssignAll => "assign_all",
            Self::AutoAssign => "auto_assign",
            Self::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "assign_all" | "assign-all" => Some(Self::AssignAll),
            "auto_assign" | "auto-assign" | "auto" => Some(Self::AutoAssign),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Parsed,
    Matched,
    Reviewed,
    Committed,
    Aborted,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parsed => "parsed",
            Self::Matched => "matched",
            Self::Reviewed => "reviewed",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
        }
    }
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct ImportBatch {
    pub batch_id: String,
    pub agency_id: String,
    pub source_file: String,
    pub checksum: Option<String>,
    pub assignment_mode: AssignmentMode,
    pub status: BatchStatus,
    pub statement_date: String,
}

/// A row the normalizer rejected. Non-fatal; reported in the summary.
#[derive(Debug, Clone)]
pub struct RowError {
    pub row_index: usize,
    pub reason: String,
}

/// Per-row outcome for display and review.
#[derive(Debug, Clone)]
pub enum RowDisposition {
    Matched {
        transaction_id: String,
        confidence: u8,
        match_type: String,
        /// Outstanding balance on the matched transaction before this entry.
        outstanding: f64,
    },
    Created {
        transaction_id: String,
    },
    /// Unmatched and not approved for creation; carries review candidates.
    NeedsReview {
        candidates: Vec<MatchCandidate>,
    },
}

#[derive(Debug, Clone)]
pub struct RowReport {
    pub row_index: usize,
    pub customer_name: String,
    pub policy_number: String,
    pub amount: f64,
    pub agent_id: Option<String>,
    pub disposition: RowDisposition,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub batch_id: String,
    pub status: BatchStatus,
    pub matched_count: usize,
    pub created_count: usize,
    pub ledger_entries_created: usize,
    pub review_count: usize,
    pub skipped_count: usize,
    pub unassigned_count: usize,
    pub duplicate_count: usize,
    pub errors: Vec<RowError>,
    pub rows: Vec<RowReport>,
}
