use chrono::{Months, NaiveDate};

use crate::models::Transaction;

pub const DEFAULT_WINDOW_MONTHS: u32 = 18;

/// Outstanding commission position for one base transaction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Balance {
    /// Expected commission on the base transaction (0 for placeholders).
    pub credit: f64,
    /// Total reconciled against it inside the window.
    pub debit: f64,
    pub balance: f64,
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

/// Reconstruct the outstanding balance for a transaction from the ledger.
/// Debits only count entries whose statement date falls inside the trailing
/// window, never the unbounded history. Pure read; informational only, a
/// discrepancy never blocks a match.
pub fn compute_balance(
    transaction_id: &str,
    pool: &[Transaction],
    as_of: NaiveDate,
    window_months: u32,
) -> Balance {
    let credit = pool
        .iter()
        .find(|t| t.transaction_id == transaction_id && !t.is_ledger_entry())
        .map(|t| t.expected_commission)
        .filter(|c| *c != 0.0)
        .unwrap_or(0.0);

    let cutoff = as_of
        .checked_sub_months(Months::new(window_months))
        .unwrap_or(NaiveDate::MIN);

    let debit: f64 = pool
        .iter()
        .filter(|t| t.is_ledger_entry())
        .filter(|t| t.source_transaction_id.as_deref() == Some(transaction_id))
        .filter(|t| {
            t.statement_date
                .as_deref()
                .and_then(parse_date)
                .is_some_and(|d| d >= cutoff && d <= as_of)
        })
        .map(|t| t.amount_paid)
        .sum();

    Balance {
        credit,
        debit,
        balance: credit - debit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(id: &str, commission: f64) -> Transaction {
        Transaction {
            transaction_id: id.to_string(),
            agency_id: "ag1".to_string(),
            agent_id: Some("A1".to_string()),
            customer_name: "John Doe".to_string(),
            policy_number: "POL-1".to_string(),
            effective_date: Some("2025-01-01".to_string()),
            transaction_type: "NEW".to_string(),
            policy_type: None,
            carrier: None,
            premium: 1000.0,
            expected_commission: commission,
            amount_paid: 0.0,
            statement_date: None,
            reconciliation_status: None,
            batch_id: None,
            source_transaction_id: None,
            idempotency_key: None,
        }
    }

    fn entry(source: &str, paid: f64, stmt_date: &str) -> Transaction {
        let mut t = base(&format!("{source}-STMT-20250101000000"), 0.0);
        t.expected_commission = 0.0;
        t.amount_paid = paid;
        t.statement_date = Some(stmt_date.to_string());
        t.source_transaction_id = Some(source.to_string());
        t.reconciliation_status = Some("reconciled".to_string());
        t
    }

    fn apr(y: i32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, 4, 15).unwrap()
    }

    #[test]
    fn test_credit_minus_debit() {
        let pool = vec![
            base("T-1", 500.0),
            entry("T-1", 200.0, "2025-02-01"),
            entry("T-1", 100.0, "2025-03-01"),
        ];
        let b = compute_balance("T-1", &pool, apr(2025), DEFAULT_WINDOW_MONTHS);
        assert_eq!(b.credit, 500.0);
        assert_eq!(b.debit, 300.0);
        assert_eq!(b.balance, 200.0);
    }

    #[test]
    fn test_entries_outside_window_excluded() {
        let pool = vec![
            base("T-1", 500.0),
            entry("T-1", 200.0, "2025-02-01"),
            entry("T-1", 300.0, "2023-01-01"), // more than 18 months back
        ];
        let b = compute_balance("T-1", &pool, apr(2025), DEFAULT_WINDOW_MONTHS);
        assert_eq!(b.debit, 200.0);
        assert_eq!(b.balance, 300.0);
    }

    #[test]
    fn test_other_transactions_ignored() {
        let pool = vec![
            base("T-1", 500.0),
            base("T-2", 900.0),
            entry("T-2", 900.0, "2025-02-01"),
        ];
        let b = compute_balance("T-1", &pool, apr(2025), DEFAULT_WINDOW_MONTHS);
        assert_eq!(b.debit, 0.0);
        assert_eq!(b.balance, 500.0);
    }

    #[test]
    fn test_placeholder_transactions_carry_no_credit() {
        let pool = vec![base("T-1", 0.0), entry("T-1", 50.0, "2025-02-01")];
        let b = compute_balance("T-1", &pool, apr(2025), DEFAULT_WINDOW_MONTHS);
        assert_eq!(b.credit, 0.0);
        assert_eq!(b.balance, -50.0);
    }

    #[test]
    fn test_pure_read_is_idempotent() {
        let pool = vec![base("T-1", 500.0), entry("T-1", 200.0, "2025-02-01")];
        let first = compute_balance("T-1", &pool, apr(2025), DEFAULT_WINDOW_MONTHS);
        let second = compute_balance("T-1", &pool, apr(2025), DEFAULT_WINDOW_MONTHS);
        assert_eq!(first, second);
    }
}
