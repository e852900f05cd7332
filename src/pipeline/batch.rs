//! Batch partitioning and request rendering
//!
//! Rows are split into fixed-size contiguous batches, each rendered into one
//! natural-language analysis request. Boundaries depend only on input order
//! and batch size, so the same row sequence always yields the same batches.

use super::Subject;
use anyhow::Result;
use serde::Serialize;

/// Default number of rows per analysis request.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// One unit of work for the dispatcher: a rendered request plus the member
/// identifiers it covers.
#[derive(Debug, Clone)]
pub struct Batch {
    pub index: usize,
    pub member_ids: Vec<String>,
    pub prompt: String,
}

/// Split rows into contiguous batches and render each one. The final batch
/// may be shorter. `render` receives the batch's rows serialized as a JSON
/// record array.
pub fn partition<T>(
    rows: &[T],
    batch_size: usize,
    render: impl Fn(&str) -> String,
) -> Result<Vec<Batch>>
where
    T: Serialize + Subject,
{
    let batch_size = batch_size.max(1);
    let mut batches = Vec::with_capacity(rows.len().div_ceil(batch_size));

    for (index, chunk) in rows.chunks(batch_size).enumerate() {
        let payload = serde_json::to_string(chunk)?;
        batches.push(Batch {
            index,
            member_ids: chunk.iter().map(|r| r.change_id().to_string()).collect(),
            prompt: render(&payload),
        });
    }

    Ok(batches)
}

/// Render the SOD analysis request for one batch.
pub fn sod_prompt(batch_json: &str) -> String {
    format!(
        r#"Analyze the following change management records for Segregation of Duties (SOD) violations:

{batch_json}

For each record, determine if there are any SOD violations by checking if the same person
(identified by ID) is performing multiple roles:

1. Requestor
2. Developer
3. Approver
4. Deployer

SOD principles require that these roles should be performed by different individuals.

IDEAL SCENARIO: For a single Change_ID and Asset_Name, the Requestor_ID, Approver_ID, Developer_ID, and Deployer_ID should all be different.

VIOLATION SCENARIOS:
- If any two or more roles have the same ID, this is a violation
- If all four roles have the same ID, this is a high-risk violation

Return your analysis as a JSON array with one object per record, each containing:
- change_id
- asset_name
- status: "OK" if no violations, "Exception" if any violations
- exception_reason: for each role pair sharing an ID, "Role1 and Role2 share the same ID (UserID)", multiple violations separated by semicolons

Include ALL records in your response, both those with violations and those without.

IMPORTANT: You must return ALL records that were provided to you, with no omissions.
If there are multiple records, make sure to include every single one in your response."#
    )
}

/// Render the approver validation request for one batch.
pub fn approver_prompt(batch_json: &str) -> String {
    format!(
        r#"You are validating approvers in a change management system. Here are the records to analyze:
{batch_json}

For each record, follow these exact steps:
1. Get the Approver_ID from the record
2. Check if Approver_ID is in IAM_User_IDs list
    - If NOT found: Status="Exception", Reason_Code="Unauthorized Approver - User not found in IAM"
    - If found: Continue to step 3

3. Check if Approver_ID is in IAM_Approver_IDs list
    - If NOT found: Status="Exception", Reason_Code="Unauthorized Approver - User does not have approver role"
    - If found: Continue to step 4

4. Check if Approver_ID is in IT_BU_Manager_IDs list
    - If NOT found: Status="Exception", Reason_Code="Unauthorized Approver - Not IT/Business Manager"
    - If found: Status="OK", Reason_Code="Valid approver"

REQUIRED OUTPUT FORMAT:
A JSON array containing one object for each input record, with these exact fields:
- Change_ID: The ID from the record
- Status: Either "OK" or "Exception"
- Reason_Code: The reason based on the validation steps

EXAMPLE OUTPUT:
[
    {{"Change_ID": "CHG1000", "Status": "Exception", "Reason_Code": "Unauthorized Approver - User not found in IAM"}},
    {{"Change_ID": "CHG1001", "Status": "OK", "Reason_Code": "Valid approver"}}
]

CRITICAL: You MUST analyze EVERY record in the input data. Do not skip any records.
Return ONLY the JSON array with no additional text."#
    )
}
