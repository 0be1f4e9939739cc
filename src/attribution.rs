use std::collections::HashMap;

use crate::error::{RemitError, Result};
use crate::models::{Agent, AssignmentMode, MatchResult, StatementRow, TenantContext, Transaction};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved {
        agent_id: String,
        method: &'static str,
    },
    NeedsManual,
}

/// Everything the resolver may consult. Tenant scope is explicit; nothing is
/// read from ambient state.
pub struct AssignmentContext<'a> {
    pub tenant: &'a TenantContext,
    pub agents: &'a [Agent],
    pub pool: &'a [Transaction],
}

/// An agent receiving new attribution must belong to the importing agency and
/// be active. Inactive agents remain valid as historical references only.
fn validate_assignment(agent_id: &str, ctx: &AssignmentContext) -> Result<()> {
    let agent = ctx
        .agents
        .iter()
        .find(|a| a.id == agent_id)
        .ok_or_else(|| {
            RemitError::InvalidAgentAssignment(format!("agent {agent_id} not found in agency"))
        })?;
    if agent.agency_id != ctx.tenant.agency_id {
        return Err(RemitError::InvalidAgentAssignment(format!(
            "agent {} does not belong to agency {}",
            agent.name, ctx.tenant.agency_id
        )));
    }
    if !agent.is_active {
        return Err(RemitError::InvalidAgentAssignment(format!(
            "agent {} is inactive",
            agent.name
        )));
    }
    Ok(())
}

/// Most common agent across the customer's existing base transactions.
/// Ties break toward the lowest agent id so the result is deterministic.
fn customer_history_agent(customer_name: &str, ctx: &AssignmentContext) -> Option<String> {
    let wanted = customer_name.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for txn in ctx.pool.iter().filter(|t| !t.is_ledger_entry()) {
        if txn.customer_name.trim().to_lowercase() != wanted {
            continue;
        }
        if let Some(agent_id) = txn.agent_id.as_deref() {
            *counts.entry(agent_id).or_insert(0) += 1;
        }
    }

    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(a.0)))
        .map(|(id, _)| id.to_string())
}

/// Decide which agent a row is credited to under the batch's assignment mode.
pub fn resolve_agent(
    row: &StatementRow,
    match_result: &MatchResult,
    mode: AssignmentMode,
    selected_agent: Option<&str>,
    manual_assignments: &HashMap<usize, String>,
    ctx: &AssignmentContext,
) -> Result<Resolution> {
    match mode {
        // One operator-chosen agent takes every row, even matched ones.
        AssignmentMode::AssignAll => {
            let agent_id = selected_agent.ok_or_else(|| {
                RemitError::InvalidAgentAssignment(
                    "assign_all mode requires a selected agent".to_string(),
                )
            })?;
            validate_assignment(agent_id, ctx)?;
            Ok(Resolution::Resolved {
                agent_id: agent_id.to_string(),
                method: "bulk_assigned",
            })
        }

        AssignmentMode::AutoAssign => {
            // Matched rows inherit the agent already on the transaction; that
            // is a historical reference, not a new assignment, so an inactive
            // agent is allowed here.
            if match_result.is_matched() {
                if let Some(agent_id) = match_result.resolved_agent_id.as_deref() {
                    return Ok(Resolution::Resolved {
                        agent_id: agent_id.to_string(),
                        method: "matched_policy",
                    });
                }
            }
            match customer_history_agent(&row.customer_name, ctx) {
                Some(agent_id) if validate_assignment(&agent_id, ctx).is_ok() => {
                    Ok(Resolution::Resolved {
                        agent_id,
                        method: "customer_history",
                    })
                }
                _ => Ok(Resolution::NeedsManual),
            }
        }

        AssignmentMode::Manual => match manual_assignments.get(&row.row_index) {
            Some(agent_id) => {
                validate_assignment(agent_id, ctx)?;
                Ok(Resolution::Resolved {
                    agent_id: agent_id.clone(),
                    method: "manual",
                })
            }
            None => Ok(Resolution::NeedsManual),
        },
    }
}
