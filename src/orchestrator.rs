use std::collections::HashMap;

use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::attribution::{resolve_agent, AssignmentContext, Resolution};
use crate::balance::{compute_balance, DEFAULT_WINDOW_MONTHS};
use crate::error::{RemitError, Result};
use crate::matcher::match_row;
use crate::materializer::{materialize, short_id, RowPlan};
use crate::models::{
    AssignmentMode, BatchStatus, ImportBatch, ImportSummary, RowDisposition, RowError, RowReport,
    StatementRow, TenantContext,
};
use crate::store;

pub struct ImportOptions {
    pub mode: AssignmentMode,
    /// Agent id every row goes to under `assign_all`.
    pub selected_agent: Option<String>,
    /// Explicit per-row assignments for `manual` mode, keyed by row index.
    pub manual_assignments: HashMap<usize, String>,
    /// Whether unmatched rows become new base transactions.
    pub create_unmatched: bool,
    /// Also synthesize a zero-amount NEW sibling for created RWL/CAN rows.
    pub offset_renewals: bool,
    pub source_file: String,
    pub checksum: Option<String>,
    pub statement_date: String,
    pub imported_at: NaiveDateTime,
    /// Bound on the matching pool; ledger entries always load.
    pub effective_after: Option<String>,
    pub dry_run: bool,
}

/// Run the whole pipeline for one normalized statement: match, attribute,
/// materialize, commit. The commit is a single database transaction, so a
/// failed write rolls the entire batch back rather than leaving it half
/// applied. One import per agency runs at a time.
pub fn run_import(
    conn: &mut Connection,
    ctx: &TenantContext,
    rows: &[StatementRow],
    parse_errors: Vec<RowError>,
    opts: &ImportOptions,
) -> Result<ImportSummary> {
    let batch_id = format!(
        "BATCH-{}-{}",
        opts.imported_at.format("%Y%m%d"),
        short_id()
    );

    if opts.dry_run {
        return run_pipeline(conn, ctx, rows, parse_errors, opts, batch_id);
    }

    store::acquire_lease(conn, &ctx.agency_id, &batch_id)?;
    let result = run_pipeline(conn, ctx, rows, parse_errors, opts, batch_id);
    // Release even when the batch failed; the error from the pipeline wins.
    let released = store::release_lease(conn, &ctx.agency_id);
    match (result, released) {
        (Ok(summary), Ok(())) => Ok(summary),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), _) => Err(e),
    }
}

fn run_pipeline(
    conn: &mut Connection,
    ctx: &TenantContext,
    rows: &[StatementRow],
    parse_errors: Vec<RowError>,
    opts: &ImportOptions,
    batch_id: String,
) -> Result<ImportSummary> {
    let pool = store::load_transactions(conn, &ctx.agency_id, opts.effective_after.as_deref())?;
    let agents = store::load_agents(conn, &ctx.agency_id)?;
    let assignment_ctx = AssignmentContext {
        tenant: ctx,
        agents: &agents,
        pool: &pool,
    };

    let mut batch = ImportBatch {
        batch_id,
        agency_id: ctx.agency_id.clone(),
        source_file: opts.source_file.clone(),
        checksum: opts.checksum.clone(),
        assignment_mode: opts.mode,
        status: BatchStatus::Parsed,
        statement_date: opts.statement_date.clone(),
    };
    let as_of = opts.imported_at.date();

    let mut plans: Vec<RowPlan> = Vec::new();
    let mut reports: Vec<RowReport> = Vec::new();
    let mut unassigned: Vec<usize> = Vec::new();
    let mut review_count = 0usize;

    for row in rows {
        let result = match_row(row, &pool);

        if result.is_matched() {
            let resolution = resolve_agent(
                row,
                &result,
                opts.mode,
                opts.selected_agent.as_deref(),
                &opts.manual_assignments,
                &assignment_ctx,
            )?;
            let agent_id = match resolution {
                Resolution::Resolved { agent_id, .. } => Some(agent_id),
                Resolution::NeedsManual => {
                    unassigned.push(row.row_index);
                    None
                }
            };
            let transaction_id = result
                .matched_transaction_id
                .clone()
                .unwrap_or_default();
            let outstanding =
                compute_balance(&transaction_id, &pool, as_of, DEFAULT_WINDOW_MONTHS).balance;
            reports.push(RowReport {
                row_index: row.row_index,
                customer_name: row.customer_name.clone(),
                policy_number: row.policy_number.clone(),
                amount: row.amount,
                agent_id: agent_id.clone(),
                disposition: RowDisposition::Matched {
                    transaction_id: transaction_id.clone(),
                    confidence: result.confidence,
                    match_type: result.match_type.clone(),
                    outstanding,
                },
            });
            plans.push(RowPlan::Reconcile {
                row,
                transaction_id,
                agent_id,
            });
        } else if opts.create_unmatched {
            let resolution = resolve_agent(
                row,
                &result,
                opts.mode,
                opts.selected_agent.as_deref(),
                &opts.manual_assignments,
                &assignment_ctx,
            )?;
            let agent_id = match resolution {
                Resolution::Resolved { agent_id, .. } => Some(agent_id),
                Resolution::NeedsManual => {
                    unassigned.push(row.row_index);
                    None
                }
            };
            reports.push(RowReport {
                row_index: row.row_index,
                customer_name: row.customer_name.clone(),
                policy_number: row.policy_number.clone(),
                amount: row.amount,
                agent_id: agent_id.clone(),
                disposition: RowDisposition::Created {
                    transaction_id: String::new(),
                },
            });
            plans.push(RowPlan::Create { row, agent_id });
        } else {
            // No match and not approved for creation: manual review queue.
            review_count += 1;
            reports.push(RowReport {
                row_index: row.row_index,
                customer_name: row.customer_name.clone(),
                policy_number: row.policy_number.clone(),
                amount: row.amount,
                agent_id: None,
                disposition: RowDisposition::NeedsReview {
                    candidates: result.candidates.clone(),
                },
            });
        }
    }

    batch.status = BatchStatus::Matched;

    // Reviewed -> Committed is gated on every materializing row having an
    // agent. Nothing has been written yet, so failing here writes nothing. A
    // dry run reports the gap instead so the operator can fill it in.
    if !unassigned.is_empty() {
        unassigned.sort_unstable();
        if opts.dry_run {
            return Ok(ImportSummary {
                batch_id: batch.batch_id,
                status: BatchStatus::Aborted,
                matched_count: plans
                    .iter()
                    .filter(|p| matches!(p, RowPlan::Reconcile { .. }))
                    .count(),
                created_count: plans
                    .iter()
                    .filter(|p| matches!(p, RowPlan::Create { .. }))
                    .count(),
                ledger_entries_created: 0,
                review_count,
                skipped_count: parse_errors.len(),
                unassigned_count: unassigned.len(),
                duplicate_count: 0,
                errors: parse_errors,
                rows: reports,
            });
        }
        return Err(RemitError::UnassignedRows(unassigned));
    }
    batch.status = BatchStatus::Reviewed;

    let output = materialize(
        &plans,
        &pool,
        ctx,
        &batch,
        opts.imported_at,
        opts.offset_renewals,
    )?;

    // Fill created transaction ids back into the reports. Materialization
    // yields exactly one ledger entry per plan, in plan order, and each
    // entry's linkage names the base transaction it reconciles.
    for (plan, entry) in plans.iter().zip(&output.ledger_entries) {
        if let RowPlan::Create { row, .. } = plan {
            if let Some(report) = reports.iter_mut().find(|r| r.row_index == row.row_index) {
                if let RowDisposition::Created { transaction_id } = &mut report.disposition {
                    *transaction_id = entry.source_transaction_id.clone().unwrap_or_default();
                }
            }
        }
    }

    let keys: Vec<String> = output
        .ledger_entries
        .iter()
        .filter_map(|e| e.idempotency_key.clone())
        .collect();
    let duplicate_count = store::count_existing_idempotency_keys(conn, &ctx.agency_id, &keys)?;

    let matched_count = plans
        .iter()
        .filter(|p| matches!(p, RowPlan::Reconcile { .. }))
        .count();
    let created_count = plans
        .iter()
        .filter(|p| matches!(p, RowPlan::Create { .. }))
        .count();

    let mut summary = ImportSummary {
        batch_id: batch.batch_id.clone(),
        status: BatchStatus::Reviewed,
        matched_count,
        created_count,
        ledger_entries_created: output.ledger_entries.len(),
        review_count,
        skipped_count: parse_errors.len(),
        unassigned_count: 0,
        duplicate_count,
        errors: parse_errors,
        rows: reports,
    };

    if opts.dry_run {
        return Ok(summary);
    }

    // Committed: one database transaction for the batch record, the created
    // base transactions, and the ledger entries. Any failure rolls back all
    // of it.
    let tx = conn.transaction()?;
    let committed = ImportBatch {
        status: BatchStatus::Committed,
        ..batch
    };
    store::insert_batch(
        &tx,
        &committed,
        matched_count,
        created_count,
        output.ledger_entries.len(),
    )?;
    for txn in &output.transactions {
        store::insert_transaction(&tx, txn)?;
    }
    for entry in &output.ledger_entries {
        store::insert_transaction(&tx, entry)?;
    }
    tx.commit()?;

    summary.status = BatchStatus::Committed;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_connection, init_db};
    use crate::models::Transaction;

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    fn seed_agency(conn: &Connection) -> (TenantContext, String, String) {
        let agency = store::insert_agency(conn, "Coastal", None).unwrap();
        let a1 = store::insert_agent(conn, &agency.id, "Dana", true).unwrap();
        let a2 = store::insert_agent(conn, &agency.id, "Marcus", true).unwrap();
        (TenantContext { agency_id: agency.id }, a1.id, a2.id)
    }

    fn seed_txn(conn: &Connection, ctx: &TenantContext, id: &str, agent: &str, policy: &str) {
        let txn = Transaction {
            transaction_id: id.to_string(),
            agency_id: ctx.agency_id.clone(),
            agent_id: Some(agent.to_string()),
            customer_name: "John Doe".to_string(),
            policy_number: policy.to_string(),
            effective_date: Some("2025-03-01".to_string()),
            transaction_type: "NEW".to_string(),
            policy_type: None,
            carrier: None,
            premium: 2500.0,
            expected_commission: 250.0,
            amount_paid: 0.0,
            statement_date: None,
            reconciliation_status: None,
            batch_id: None,
            source_transaction_id: None,
            idempotency_key: None,
        };
        store::insert_transaction(conn, &txn).unwrap();
    }

    fn stmt_row(index: usize, customer: &str, policy: &str, amount: f64) -> StatementRow {
        StatementRow {
            row_index: index,
            customer_name: customer.to_string(),
            policy_number: policy.to_string(),
            effective_date: Some("2025-03-01".to_string()),
            amount,
            premium: None,
            carrier: None,
            transaction_type: "NEW".to_string(),
            policy_type: None,
            raw_fields: Default::default(),
        }
    }

    fn opts(mode: AssignmentMode) -> ImportOptions {
        ImportOptions {
            mode,
            selected_agent: None,
            manual_assignments: HashMap::new(),
            create_unmatched: false,
            offset_renewals: false,
            source_file: "march.csv".to_string(),
            checksum: None,
            statement_date: "2025-03-31".to_string(),
            imported_at: chrono::NaiveDate::from_ymd_opt(2025, 4, 2)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            effective_after: None,
            dry_run: false,
        }
    }

    fn count(conn: &Connection, sql: &str) -> i64 {
        conn.query_row(sql, [], |r| r.get(0)).unwrap()
    }

    #[test]
    fn test_scenario_a_matched_row_reconciles() {
        let (_dir, mut conn) = test_db();
        let (ctx, a1, _) = seed_agency(&conn);
        seed_txn(&conn, &ctx, "T-1", &a1, "POL-1");

        let rows = vec![stmt_row(1, "John Doe", "POL-1", 250.0)];
        let summary = run_import(
            &mut conn,
            &ctx,
            &rows,
            Vec::new(),
            &opts(AssignmentMode::AutoAssign),
        )
        .unwrap();

        assert_eq!(summary.status, BatchStatus::Committed);
        assert_eq!(summary.matched_count, 1);
        assert_eq!(summary.created_count, 0);
        assert_eq!(summary.ledger_entries_created, 1);

        match &summary.rows[0].disposition {
            RowDisposition::Matched { confidence, outstanding, .. } => {
                assert_eq!(*confidence, 100);
                assert_eq!(*outstanding, 250.0);
            }
            other => panic!("expected matched disposition, got {other:?}"),
        }
        assert_eq!(summary.rows[0].agent_id.as_deref(), Some(a1.as_str()));

        let (paid, agent): (f64, String) = conn
            .query_row(
                "SELECT amount_paid, agent_id FROM transactions WHERE source_transaction_id = 'T-1'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(paid, 250.0);
        assert_eq!(agent, a1);
    }

    #[test]
    fn test_scenario_b_new_customer_assign_all() {
        let (_dir, mut conn) = test_db();
        let (ctx, _, a2) = seed_agency(&conn);

        let rows = vec![stmt_row(1, "Fresh Face LLC", "NP-1", 80.0)];
        let mut o = opts(AssignmentMode::AssignAll);
        o.selected_agent = Some(a2.clone());
        o.create_unmatched = true;

        let summary = run_import(&mut conn, &ctx, &rows, Vec::new(), &o).unwrap();
        assert_eq!(summary.created_count, 1);
        assert_eq!(summary.ledger_entries_created, 1);

        let agents: Vec<String> = conn
            .prepare("SELECT agent_id FROM transactions")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(agents.len(), 2); // base + ledger entry
        assert!(agents.iter().all(|a| a == &a2));
    }

    #[test]
    fn test_scenario_c_duplicate_import_is_permitted_and_flagged() {
        let (_dir, mut conn) = test_db();
        let (ctx, a1, _) = seed_agency(&conn);
        seed_txn(&conn, &ctx, "T-1", &a1, "POL-1");

        let rows = vec![stmt_row(1, "John Doe", "POL-1", 250.0)];
        let first = run_import(
            &mut conn,
            &ctx,
            &rows,
            Vec::new(),
            &opts(AssignmentMode::AutoAssign),
        )
        .unwrap();
        assert_eq!(first.duplicate_count, 0);

        let mut later = opts(AssignmentMode::AutoAssign);
        later.imported_at = later.imported_at + chrono::Duration::hours(1);
        let second = run_import(&mut conn, &ctx, &rows, Vec::new(), &later).unwrap();

        // The second set of entries is created; the re-import is only flagged.
        assert_eq!(second.ledger_entries_created, 1);
        assert_eq!(second.duplicate_count, 1);
        let entries = count(
            &conn,
            "SELECT count(*) FROM transactions WHERE source_transaction_id = 'T-1'",
        );
        assert_eq!(entries, 2);
    }

    #[test]
    fn test_manual_mode_unassigned_blocks_commit() {
        let (_dir, mut conn) = test_db();
        let (ctx, a1, _) = seed_agency(&conn);
        seed_txn(&conn, &ctx, "T-1", &a1, "POL-1");

        let rows = vec![stmt_row(1, "John Doe", "POL-1", 250.0)];
        let err = run_import(
            &mut conn,
            &ctx,
            &rows,
            Vec::new(),
            &opts(AssignmentMode::Manual),
        );
        match err {
            Err(RemitError::UnassignedRows(list)) => assert_eq!(list, vec![1]),
            other => panic!("expected UnassignedRows, got {other:?}"),
        }

        // Zero records were created, and the lease was released.
        assert_eq!(count(&conn, "SELECT count(*) FROM import_batches"), 0);
        assert_eq!(
            count(&conn, "SELECT count(*) FROM transactions WHERE source_transaction_id IS NOT NULL"),
            0
        );
        assert_eq!(count(&conn, "SELECT count(*) FROM import_leases"), 0);
    }

    #[test]
    fn test_manual_mode_with_assignments_commits() {
        let (_dir, mut conn) = test_db();
        let (ctx, a1, a2) = seed_agency(&conn);
        seed_txn(&conn, &ctx, "T-1", &a1, "POL-1");

        let rows = vec![stmt_row(1, "John Doe", "POL-1", 250.0)];
        let mut o = opts(AssignmentMode::Manual);
        o.manual_assignments.insert(1, a2.clone());

        let summary = run_import(&mut conn, &ctx, &rows, Vec::new(), &o).unwrap();
        assert_eq!(summary.status, BatchStatus::Committed);
        assert_eq!(summary.rows[0].agent_id.as_deref(), Some(a2.as_str()));
    }

    #[test]
    fn test_unmatched_without_create_goes_to_review() {
        let (_dir, mut conn) = test_db();
        let (ctx, a1, _) = seed_agency(&conn);
        seed_txn(&conn, &ctx, "T-1", &a1, "POL-1");

        let rows = vec![stmt_row(1, "Total Stranger", "ZZ-9", 10.0)];
        let summary = run_import(
            &mut conn,
            &ctx,
            &rows,
            Vec::new(),
            &opts(AssignmentMode::AutoAssign),
        )
        .unwrap();
        assert_eq!(summary.review_count, 1);
        assert_eq!(summary.ledger_entries_created, 0);
        assert!(matches!(
            summary.rows[0].disposition,
            RowDisposition::NeedsReview { .. }
        ));
    }

    #[test]
    fn test_lease_blocks_concurrent_import() {
        let (_dir, mut conn) = test_db();
        let (ctx, a1, _) = seed_agency(&conn);
        seed_txn(&conn, &ctx, "T-1", &a1, "POL-1");
        store::acquire_lease(&conn, &ctx.agency_id, "OTHER-BATCH").unwrap();

        let rows = vec![stmt_row(1, "John Doe", "POL-1", 250.0)];
        let err = run_import(
            &mut conn,
            &ctx,
            &rows,
            Vec::new(),
            &opts(AssignmentMode::AutoAssign),
        );
        assert!(matches!(err, Err(RemitError::ImportInProgress(_))));
    }

    #[test]
    fn test_invalid_assignment_is_fatal_and_clean() {
        let (_dir, mut conn) = test_db();
        let (ctx, _, _) = seed_agency(&conn);
        let inactive = store::insert_agent(&conn, &ctx.agency_id, "Ghost", false).unwrap();

        let rows = vec![stmt_row(1, "Fresh Face LLC", "NP-1", 80.0)];
        let mut o = opts(AssignmentMode::AssignAll);
        o.selected_agent = Some(inactive.id);
        o.create_unmatched = true;

        let err = run_import(&mut conn, &ctx, &rows, Vec::new(), &o);
        assert!(matches!(err, Err(RemitError::InvalidAgentAssignment(_))));
        assert_eq!(count(&conn, "SELECT count(*) FROM transactions"), 0);
        assert_eq!(count(&conn, "SELECT count(*) FROM import_leases"), 0);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let (_dir, mut conn) = test_db();
        let (ctx, a1, _) = seed_agency(&conn);
        seed_txn(&conn, &ctx, "T-1", &a1, "POL-1");

        let rows = vec![stmt_row(1, "John Doe", "POL-1", 250.0)];
        let mut o = opts(AssignmentMode::AutoAssign);
        o.dry_run = true;

        let summary = run_import(&mut conn, &ctx, &rows, Vec::new(), &o).unwrap();
        assert_eq!(summary.status, BatchStatus::Reviewed);
        assert_eq!(summary.ledger_entries_created, 1);
        assert_eq!(count(&conn, "SELECT count(*) FROM import_batches"), 0);
        assert_eq!(count(&conn, "SELECT count(*) FROM import_leases"), 0);
        assert_eq!(count(&conn, "SELECT count(*) FROM transactions"), 1);
    }

    #[test]
    fn test_ledger_linkage_no_orphans() {
        let (_dir, mut conn) = test_db();
        let (ctx, a1, _) = seed_agency(&conn);
        seed_txn(&conn, &ctx, "T-1", &a1, "POL-1");

        let rows = vec![
            stmt_row(1, "John Doe", "POL-1", 250.0),
            stmt_row(2, "Fresh Face LLC", "NP-1", 80.0),
        ];
        let mut o = opts(AssignmentMode::AssignAll);
        o.selected_agent = Some(a1);
        o.create_unmatched = true;
        run_import(&mut conn, &ctx, &rows, Vec::new(), &o).unwrap();

        let orphans = count(
            &conn,
            "SELECT count(*) FROM transactions e WHERE e.source_transaction_id IS NOT NULL \
             AND NOT EXISTS (SELECT 1 FROM transactions b \
                             WHERE b.transaction_id = e.source_transaction_id)",
        );
        assert_eq!(orphans, 0);
    }

    #[test]
    fn test_parse_errors_carried_into_summary() {
        let (_dir, mut conn) = test_db();
        let (ctx, a1, _) = seed_agency(&conn);
        seed_txn(&conn, &ctx, "T-1", &a1, "POL-1");

        let rows = vec![stmt_row(1, "John Doe", "POL-1", 250.0)];
        let errors = vec![RowError {
            row_index: 4,
            reason: "unparseable amount 'n/a'".to_string(),
        }];
        let summary = run_import(
            &mut conn,
            &ctx,
            &rows,
            errors,
            &opts(AssignmentMode::AutoAssign),
        )
        .unwrap();
        assert_eq!(summary.skipped_count, 1);
        assert_eq!(summary.errors[0].row_index, 4);
    }

    #[test]
    fn test_dry_run_reports_unassigned_instead_of_failing() {
        let (_dir, mut conn) = test_db();
        let (ctx, a1, _) = seed_agency(&conn);
        seed_txn(&conn, &ctx, "T-1", &a1, "POL-1");

        let rows = vec![stmt_row(1, "John Doe", "POL-1", 250.0)];
        let mut o = opts(AssignmentMode::Manual);
        o.dry_run = true;

        let summary = run_import(&mut conn, &ctx, &rows, Vec::new(), &o).unwrap();
        assert_eq!(summary.status, BatchStatus::Aborted);
        assert_eq!(summary.unassigned_count, 1);
        assert_eq!(summary.ledger_entries_created, 0);
        assert_eq!(count(&conn, "SELECT count(*) FROM transactions WHERE source_transaction_id IS NOT NULL"), 0);
    }
}
