//! Per-record analysis context
//!
//! Joins the subject records with the reference tables so each record carries
//! everything the reasoning backend needs to judge it, without re-sending the
//! full reference tables on every request. Lookups are best-effort: a missing
//! key resolves to "Unknown", never an error.

use crate::pipeline::Subject;
use crate::tables::{ChangeRecord, DeploymentRecord, IamUser, UNKNOWN};
use serde::Serialize;
use std::collections::HashMap;

/// One change enriched with deployment and identity lookups, ready to be
/// serialized into an analysis request. Field names match the source extract
/// columns so the backend sees familiar records.
#[derive(Debug, Clone, Serialize)]
pub struct SodContextRow {
    #[serde(rename = "Change_ID")]
    pub change_id: String,
    #[serde(rename = "Asset_Name")]
    pub asset_name: String,
    #[serde(rename = "Change_Type")]
    pub change_type: String,
    #[serde(rename = "Risk_Rating")]
    pub risk_rating: String,
    #[serde(rename = "Requestor_ID")]
    pub requestor_id: String,
    #[serde(rename = "Requestor_Name")]
    pub requestor_name: String,
    #[serde(rename = "Requestor_Role")]
    pub requestor_role: String,
    #[serde(rename = "Developer_ID")]
    pub developer_id: String,
    #[serde(rename = "Developer_Name")]
    pub developer_name: String,
    #[serde(rename = "Developer_Role")]
    pub developer_role: String,
    #[serde(rename = "Deployer_ID")]
    pub deployer_id: String,
    #[serde(rename = "Deployer_Name")]
    pub deployer_name: String,
    #[serde(rename = "Deployer_Role")]
    pub deployer_role: String,
    #[serde(rename = "Approver_ID")]
    pub approver_id: String,
    #[serde(rename = "Approver_Name")]
    pub approver_name: String,
    #[serde(rename = "Approver_Role")]
    pub approver_role: String,
    #[serde(rename = "Deployment_ID")]
    pub deployment_id: String,
}

impl Subject for SodContextRow {
    fn change_id(&self) -> &str {
        &self.change_id
    }
}

/// Result of the SOD context build: the joined rows plus how many subject
/// records could not be joined and were skipped.
#[derive(Debug)]
pub struct SodContext {
    pub rows: Vec<SodContextRow>,
    pub skipped: usize,
}

/// Join changes with the deployment log on (Change_ID, Asset_Name) and attach
/// the mapped authority role for every role-holder ID. Changes without a
/// matching deployment are unprocessable and counted, not fatal.
pub fn build_sod_context(
    changes: &[ChangeRecord],
    deployments: &[DeploymentRecord],
    iam_users: &[IamUser],
) -> SodContext {
    let roles: HashMap<&str, &str> = iam_users
        .iter()
        .map(|u| (u.user_id.as_str(), u.mapped_doa_role.as_str()))
        .collect();
    let role_of = |id: &str| -> String {
        roles.get(id).map_or_else(|| UNKNOWN.to_string(), |r| r.to_string())
    };

    let mut rows = Vec::with_capacity(changes.len());
    let mut skipped = 0;

    for change in changes {
        if change.change_id.is_empty() || change.asset_name.is_empty() {
            tracing::warn!("skipping change with missing identifier");
            skipped += 1;
            continue;
        }

        let deployment = deployments.iter().find(|d| {
            d.linked_change_id == change.change_id && d.asset_name == change.asset_name
        });
        let Some(deployment) = deployment else {
            tracing::warn!(
                change_id = %change.change_id,
                asset = %change.asset_name,
                "no deployment log entry for change"
            );
            skipped += 1;
            continue;
        };

        rows.push(SodContextRow {
            change_id: change.change_id.clone(),
            asset_name: change.asset_name.clone(),
            change_type: change.change_type.clone(),
            risk_rating: change.risk_rating.clone(),
            requestor_role: role_of(&change.requestor_id),
            requestor_id: change.requestor_id.clone(),
            requestor_name: change.requestor_name.clone(),
            developer_role: role_of(&change.developer_id),
            developer_id: change.developer_id.clone(),
            developer_name: change.developer_name.clone(),
            deployer_role: role_of(&deployment.deployer_id),
            deployer_id: deployment.deployer_id.clone(),
            deployer_name: deployment.deployer_name.clone(),
            approver_role: role_of(&change.approver_id),
            approver_id: change.approver_id.clone(),
            approver_name: change.approver_name.clone(),
            deployment_id: deployment.deployment_id.clone(),
        });
    }

    SodContext { rows, skipped }
}

/// One change plus the derived identity sets the backend needs to check
/// approver authorization by membership, not by table scan.
#[derive(Debug, Clone, Serialize)]
pub struct ApproverContextRow {
    #[serde(rename = "Change_ID")]
    pub change_id: String,
    #[serde(rename = "Asset_Name")]
    pub asset_name: String,
    #[serde(rename = "Approver_ID")]
    pub approver_id: String,
    #[serde(rename = "Approver_Name")]
    pub approver_name: String,
    /// All known identity IDs, comma-joined.
    #[serde(rename = "IAM_User_IDs")]
    pub iam_user_ids: String,
    /// IDs holding the Approver capability, comma-joined.
    #[serde(rename = "IAM_Approver_IDs")]
    pub iam_approver_ids: String,
    /// Approver-capability IDs also holding a manager-tier authority role.
    #[serde(rename = "IT_BU_Manager_IDs")]
    pub it_bu_manager_ids: String,
}

impl Subject for ApproverContextRow {
    fn change_id(&self) -> &str {
        &self.change_id
    }
}

fn is_manager_role(mapped_role: &str) -> bool {
    let lower = mapped_role.to_lowercase();
    lower.contains("it manager") || lower.contains("business manager")
}

/// Attach the three derived identity sets to every change row.
pub fn build_approver_context(
    changes: &[ChangeRecord],
    iam_users: &[IamUser],
) -> Vec<ApproverContextRow> {
    let all_ids: Vec<&str> = iam_users.iter().map(|u| u.user_id.as_str()).collect();
    let approvers: Vec<&IamUser> = iam_users
        .iter()
        .filter(|u| u.iam_role == "Approver")
        .collect();
    let approver_ids: Vec<&str> = approvers.iter().map(|u| u.user_id.as_str()).collect();
    let manager_ids: Vec<&str> = approvers
        .iter()
        .filter(|u| is_manager_role(&u.mapped_doa_role))
        .map(|u| u.user_id.as_str())
        .collect();

    let iam_user_ids = all_ids.join(",");
    let iam_approver_ids = approver_ids.join(",");
    let it_bu_manager_ids = manager_ids.join(",");

    changes
        .iter()
        .map(|change| ApproverContextRow {
            change_id: change.change_id.clone(),
            asset_name: change.asset_name.clone(),
            approver_id: change.approver_id.clone(),
            approver_name: change.approver_name.clone(),
            iam_user_ids: iam_user_ids.clone(),
            iam_approver_ids: iam_approver_ids.clone(),
            it_bu_manager_ids: it_bu_manager_ids.clone(),
        })
        .collect()
}
