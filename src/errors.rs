use thiserror::Error;

/// Errors surfaced at the descriptor parsing seam. Compilation itself never
/// fails: malformed predicates and stages are dropped from the output.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),
}
