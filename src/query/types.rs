use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::cursor::ParsedPageCursor;

/// Operators accepted by the filter compiler. Anything else is dropped at
/// compile time, never rejected with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    In,
    Nin,
    Regex,
    IsArray,
    Search,
    Match,
    IsSet,
    NotSet,
}

impl QueryOp {
    pub(crate) fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "eq" => Self::Eq,
            "ne" => Self::Ne,
            "lt" => Self::Lt,
            "gt" => Self::Gt,
            "lte" => Self::Lte,
            "gte" => Self::Gte,
            "in" => Self::In,
            "nin" => Self::Nin,
            "regex" => Self::Regex,
            "isArray" => Self::IsArray,
            "search" => Self::Search,
            "match" => Self::Match,
            "isset" => Self::IsSet,
            "notset" => Self::NotSet,
            _ => return None,
        })
    }

    /// Native operator token for the plain single-field operators.
    pub(crate) const fn token(self) -> Option<&'static str> {
        Some(match self {
            Self::Ne => "$ne",
            Self::Lt => "$lt",
            Self::Gt => "$gt",
            Self::Lte => "$lte",
            Self::Gte => "$gte",
            Self::In => "$in",
            Self::Nin => "$nin",
            Self::Regex => "$regex",
            _ => return None,
        })
    }

    /// Native token in expression context, where comparisons take the form
    /// `{$op: ["$path", value]}`.
    pub(crate) const fn expr_token(self) -> Option<&'static str> {
        Some(match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Lt => "$lt",
            Self::Gt => "$gt",
            Self::Lte => "$lte",
            Self::Gte => "$gte",
            Self::In => "$in",
            _ => return None,
        })
    }
}

/// One leaf predicate of the abstract query description. Exactly one of
/// `value`, `param` or `variable` supplies the operand; `op` defaults to
/// equality; `expr` switches the predicate into expression context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryObject {
    pub path: String,
    pub op: Option<String>,
    pub value: Option<Bson>,
    pub param: Option<String>,
    pub variable: Option<String>,
    pub expr: bool,
}

impl QueryObject {
    /// Plain comparison predicate, the shape cursor decoding synthesizes.
    #[must_use]
    pub fn cmp(path: impl Into<String>, op: &str, value: impl Into<Bson>) -> Self {
        Self {
            path: path.into(),
            op: Some(op.to_string()),
            value: Some(value.into()),
            ..Self::default()
        }
    }
}

/// A query node is either a leaf predicate or a nested array denoting a
/// disjunction; arrays nested inside a disjunction branch are conjunctions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryNode {
    Leaf(QueryObject),
    Any(Vec<QueryNode>),
}

/// Ambient inputs threaded explicitly through every compilation so that
/// concurrent requests with different aliasing modes cannot interfere.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterContext<'a> {
    /// Ambient parameter map resolved by `param` operands.
    pub params: Option<&'a Document>,
    /// Decoded continuation cursor; its range predicates are the
    /// lowest-precedence filter source.
    pub cursor: Option<&'a ParsedPageCursor>,
    /// Rewrite the logical identifier to the store's internal key field.
    pub alias_id: bool,
    /// Identifier of a single-item request, used for identity injection
    /// when no explicit query was supplied.
    pub target_id: Option<&'a Bson>,
    /// Append-only mode suppresses identity injection so the operation
    /// always creates a new record.
    pub append_only: bool,
}

impl<'a> FilterContext<'a> {
    #[must_use]
    pub fn with_params(params: &'a Document) -> Self {
        Self { params: Some(params), ..Self::default() }
    }
}
