use crate::candidates::find_candidates;
use crate::models::{MatchResult, StatementRow, Transaction};

/// Name strategies at or above this score pair with a policy number alone;
/// weaker ones additionally need the amount to agree.
pub const STRONG_NAME_SCORE: u8 = 88;
pub const AMOUNT_TOLERANCE_PCT: f64 = 5.0;
/// How many candidates an unmatched result carries for manual review.
pub const REVIEW_CANDIDATES: usize = 5;

/// Policy numbers compare with spaces and dashes removed, case-insensitive.
pub fn normalize_policy(policy: &str) -> String {
    policy
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect::<String>()
        .to_uppercase()
}

fn amount_agrees(txn: &Transaction, amount: f64) -> bool {
    if txn.expected_commission == 0.0 {
        return false;
    }
    let tolerance = txn.expected_commission.abs() * AMOUNT_TOLERANCE_PCT / 100.0;
    (txn.expected_commission - amount).abs() <= tolerance
}

/// Lowest transaction id wins among equally-good hits, so results never
/// depend on pool order.
fn first_by_id<'a>(mut hits: Vec<&'a Transaction>) -> Option<&'a Transaction> {
    hits.sort_by(|a, b| a.transaction_id.cmp(&b.transaction_id));
    hits.into_iter().next()
}

fn matched(row: &StatementRow, txn: &Transaction, confidence: u8, match_type: String) -> MatchResult {
    MatchResult {
        row_index: row.row_index,
        matched_transaction_id: Some(txn.transaction_id.clone()),
        confidence,
        match_type,
        resolved_agent_id: txn.agent_id.clone(),
        candidates: Vec::new(),
    }
}

/// Tiered matching: policy+date (100) > customer+policy (95) >
/// customer+policy+amount (90) > unmatched. Pure over the given pool; an
/// empty pool just means every row is unmatched.
pub fn match_row(row: &StatementRow, pool: &[Transaction]) -> MatchResult {
    let bases: Vec<&Transaction> = pool.iter().filter(|t| !t.is_ledger_entry()).collect();
    let row_policy = normalize_policy(&row.policy_number);

    // Tier 1: unambiguous policy number + effective date.
    if !row_policy.is_empty() {
        if let Some(date) = row.effective_date.as_deref() {
            let hits: Vec<&Transaction> = bases
                .iter()
                .copied()
                .filter(|t| {
                    normalize_policy(&t.policy_number) == row_policy
                        && t.effective_date.as_deref() == Some(date)
                })
                .collect();
            if let Some(txn) = first_by_id(hits) {
                return matched(row, txn, 100, "policy+date".to_string());
            }
        }
    }

    let candidates = find_candidates(
        &row.customer_name,
        bases.iter().map(|t| t.customer_name.as_str()),
    );

    if !row_policy.is_empty() {
        // Tier 2: strong customer-name strategy + policy number.
        for cand in candidates.iter().filter(|c| c.score >= STRONG_NAME_SCORE) {
            let hits: Vec<&Transaction> = bases
                .iter()
                .copied()
                .filter(|t| {
                    t.customer_name == cand.customer_name
                        && normalize_policy(&t.policy_number) == row_policy
                })
                .collect();
            if let Some(txn) = first_by_id(hits) {
                return matched(row, txn, 95, format!("{}+policy", cand.strategy));
            }
        }

        // Tier 3: weaker name strategy, validated by the statement amount.
        for cand in candidates.iter().filter(|c| c.score < STRONG_NAME_SCORE) {
            let hits: Vec<&Transaction> = bases
                .iter()
                .copied()
                .filter(|t| {
                    t.customer_name == cand.customer_name
                        && normalize_policy(&t.policy_number) == row_policy
                        && amount_agrees(t, row.amount)
                })
                .collect();
            if let Some(txn) = first_by_id(hits) {
                return matched(row, txn, 90, format!("{}+policy+amount", cand.strategy));
            }
        }
    }

    let mut top = candidates;
    top.truncate(REVIEW_CANDIDATES);
    MatchResult {
        row_index: row.row_index,
        matched_transaction_id: None,
        confidence: 0,
        match_type: "unmatched".to_string(),
        resolved_agent_id: None,
        candidates: top,
    }
}
