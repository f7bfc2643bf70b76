// Submodules for separation of concerns
mod compile;
mod parse;
mod types;

pub use compile::{compile_expr, compile_filter};
pub use parse::parse_query_json;
pub use types::{FilterContext, QueryNode, QueryObject, QueryOp};

pub(crate) use compile::resolve_path;
