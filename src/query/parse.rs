use crate::errors::PlanError;

use super::types::QueryNode;

/// Parses a JSON array of query nodes as supplied by endpoint definitions.
///
/// # Errors
/// Returns an error if the JSON string cannot be parsed into query nodes.
pub fn parse_query_json(json: &str) -> Result<Vec<QueryNode>, PlanError> {
    Ok(serde_json::from_str(json)?)
}
