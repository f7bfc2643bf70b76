use crate::errors::PlanError;

use super::types::Stage;

/// Parses a JSON array of aggregation stage descriptors.
///
/// # Errors
/// Returns an error if the JSON string cannot be parsed into the closed
/// stage union.
pub fn parse_stages_json(json: &str) -> Result<Vec<Stage>, PlanError> {
    Ok(serde_json::from_str(json)?)
}
