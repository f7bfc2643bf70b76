//! Translates a store-agnostic query/aggregation description into the
//! filter documents and aggregation pipelines of a document store, and
//! provides opaque stateless continuation tokens for cursor pagination
//! over flat and grouped result sets.
//!
//! Everything here is a pure function over immutable descriptors: no I/O,
//! no shared state, no locks. The surrounding orchestration layer owns
//! connections, change streams and result interpretation; it hands this
//! crate the abstract description and issues the single store call with
//! the compiled output. Compilation never fails: malformed predicates and
//! stages degrade to a broader query instead of failing the request.

pub mod aggregate;
pub mod cursor;
pub mod errors;
pub mod escape;
pub mod logger;
pub mod query;
pub mod types;

pub use aggregate::{Stage, compile_pipeline, parse_stages_json};
pub use cursor::ParsedPageCursor;
pub use errors::PlanError;
pub use query::{FilterContext, QueryNode, QueryObject, compile_filter, parse_query_json};
pub use types::{Order, SortSpec};

/// Initializes the logging system; call once before any compilation if
/// diagnostic output is wanted.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    logger::init()?;
    Ok(())
}
