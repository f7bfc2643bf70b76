use std::collections::BTreeMap;

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::query::QueryNode;

/// One stage of the abstract aggregation description.
///
/// The union is closed: an unknown stage kind fails descriptor parsing
/// instead of flowing into the compiler. A stage that is present but
/// missing its required fields compiles to nothing and is filtered out of
/// the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Stage {
    Sort {
        /// Field path to direction, `1` ascending / `-1` descending.
        #[serde(default)]
        sort: Document,
    },
    Group {
        #[serde(default, rename = "groupBy")]
        group_by: Vec<GroupKey>,
        #[serde(default)]
        values: BTreeMap<String, GroupValue>,
    },
    Query {
        #[serde(default)]
        query: Vec<QueryNode>,
    },
    Set {
        #[serde(default)]
        set: BTreeMap<String, SetValue>,
    },
    Reduce {
        #[serde(default)]
        input: Option<ExprNode>,
        #[serde(default, rename = "initialValue")]
        initial_value: Option<Bson>,
        #[serde(default, rename = "in")]
        combine: Option<ExprNode>,
    },
    If {
        #[serde(default)]
        cond: Vec<QueryNode>,
        #[serde(default)]
        then: Option<ExprNode>,
        #[serde(default, rename = "else")]
        otherwise: Option<ExprNode>,
    },
    Limit {
        #[serde(default)]
        limit: Option<i64>,
    },
    Unwind {
        #[serde(default)]
        path: Option<String>,
    },
    Root {
        #[serde(default, rename = "newRoot")]
        new_root: Option<ExprNode>,
    },
    Lookup {
        #[serde(default)]
        from: Option<String>,
        #[serde(default, rename = "localField")]
        local_field: Option<String>,
        #[serde(default, rename = "foreignField")]
        foreign_field: Option<String>,
        /// Pipeline variables binding local paths for the correlated form.
        #[serde(default, rename = "let")]
        bindings: BTreeMap<String, String>,
        #[serde(default)]
        stages: Vec<Stage>,
        /// Output path for the joined documents; defaults to the local
        /// field name.
        #[serde(default)]
        path: Option<String>,
    },
    Project {
        #[serde(default)]
        fields: BTreeMap<String, ExprNode>,
    },
    ConcatArrays {
        #[serde(default)]
        arrays: Vec<ExprNode>,
    },
    MergeObjects {
        #[serde(default)]
        objects: Vec<ExprNode>,
    },
    Search {
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        param: Option<String>,
        #[serde(default)]
        fields: Vec<SearchField>,
        #[serde(default)]
        fuzzy: bool,
    },
}

/// A grouping key: either a plain field path or a named computed
/// expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupKey {
    Path(String),
    Computed { key: String, expr: ExprNode },
}

/// An accumulated output field of a `group` stage. The short string form
/// applies the accumulator to the source path of the same name; the mapped
/// form names an explicit source, or the whole current row when `path` is
/// absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupValue {
    Op(String),
    Mapped {
        op: String,
        #[serde(default)]
        path: Option<String>,
    },
}

/// A computed field of a `set` stage: a literal `value`, a boolean
/// expression compiled through the query compiler, or a nested
/// sub-pipeline. The first populated field wins, in that order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetValue {
    pub value: Option<Bson>,
    pub query: Option<Vec<QueryNode>>,
    pub stages: Option<Vec<Stage>>,
}

/// A node of a nested expression tree: a recursive stage, an escaped
/// literal (`{value: ...}`), a field path string, or a passthrough literal
/// for non-string scalars and documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExprNode {
    Stage(Box<Stage>),
    Value { value: Bson },
    Path(String),
    Literal(Bson),
}

/// One target of a `search` stage, optionally carrying a score boost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchField {
    Path(String),
    Boosted {
        path: String,
        #[serde(default)]
        boost: Option<f64>,
    },
}

impl SearchField {
    pub(crate) fn path(&self) -> &str {
        match self {
            Self::Path(p) | Self::Boosted { path: p, .. } => p,
        }
    }

    pub(crate) fn boost(&self) -> Option<f64> {
        match self {
            Self::Path(_) => None,
            Self::Boosted { boost, .. } => *boost,
        }
    }
}
