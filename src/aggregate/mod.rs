// Submodules for separation of concerns
mod compile;
mod parse;
mod types;

pub use compile::compile_pipeline;
pub use parse::parse_stages_json;
pub use types::{ExprNode, GroupKey, GroupValue, SearchField, SetValue, Stage};
