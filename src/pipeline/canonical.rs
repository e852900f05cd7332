//! Exception-reason canonicalization
//!
//! The backend decides whether a record is an Exception; the wording of the
//! reason is recomputed here from the raw role-holder IDs so that every
//! report renders the same overlap the same way. The backend's own free-text
//! explanation for Exception rows is discarded.

use super::{Outcome, Status};
use crate::context::SodContextRow;
use crate::tables::UNKNOWN;
use std::collections::HashMap;

/// The four controlled roles on one change, in canonical render order.
#[derive(Debug, Clone, Copy)]
pub struct RoleHolders<'a> {
    pub requestor: &'a str,
    pub developer: &'a str,
    pub deployer: &'a str,
    pub approver: &'a str,
}

fn render_group(roles: &[&str], id: &str) -> String {
    match roles {
        [a, b] => format!("{} and {} share the same ID ({})", a, b, id),
        [a, b, c] => format!("{}, {} & {} share the same ID ({})", a, b, c, id),
        _ => format!(
            "Requestor, Developer, Deployer & Approver share the same ID ({})",
            id
        ),
    }
}

/// Compute the canonical overlap description, or `None` when no two roles
/// share an ID. Role order within a group follows the fixed sequence
/// Requestor, Developer, Deployer, Approver; independent overlap groups are
/// joined with "; " in first-appearance order.
pub fn canonical_reason(holders: &RoleHolders<'_>) -> Option<String> {
    let slots = [
        ("Requestor", holders.requestor),
        ("Developer", holders.developer),
        ("Deployer", holders.deployer),
        ("Approver", holders.approver),
    ];

    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&str>> = HashMap::new();
    for (role, id) in slots {
        if id == UNKNOWN || id.is_empty() {
            continue;
        }
        let roles = groups.entry(id).or_insert_with(|| {
            order.push(id);
            Vec::new()
        });
        roles.push(role);
    }

    let parts: Vec<String> = order
        .iter()
        .filter_map(|id| {
            let roles = &groups[id];
            (roles.len() >= 2).then(|| render_group(roles, id))
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

/// Rewrite the reason of every Exception outcome from its row's role-holder
/// IDs. Outcomes whose IDs show no actual overlap keep the backend's text.
pub fn canonicalize_exceptions(outcomes: &mut [Outcome], rows: &[SodContextRow]) {
    let by_id: HashMap<&str, &SodContextRow> =
        rows.iter().map(|r| (r.change_id.as_str(), r)).collect();

    for outcome in outcomes {
        if outcome.status != Status::Exception {
            continue;
        }
        let Some(row) = by_id.get(outcome.change_id.as_str()) else {
            continue;
        };
        let holders = RoleHolders {
            requestor: &row.requestor_id,
            developer: &row.developer_id,
            deployer: &row.deployer_id,
            approver: &row.approver_id,
        };
        if let Some(reason) = canonical_reason(&holders) {
            outcome.reason = reason;
        }
    }
}
