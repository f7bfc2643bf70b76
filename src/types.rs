use serde::{Deserialize, Serialize};

/// Logical identifier field used by the generic data model.
pub const ID_FIELD: &str = "id";

/// Reserved primary-key field of the document store.
pub const STORE_ID_FIELD: &str = "_id";

/// Internal change counter maintained by the store layer; stripped from
/// every document during normalization.
pub const VERSION_FIELD: &str = "__v";

/// Field carrying the windowed total-count annotation appended to every row
/// of a top-level aggregation. Read once by the caller, then stripped.
pub const TOTAL_FIELD: &str = "_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    /// Native sort direction: `1` ascending, `-1` descending.
    #[must_use]
    pub const fn native(self) -> i32 {
        match self {
            Self::Asc => 1,
            Self::Desc => -1,
        }
    }

    /// Arrow used in the cursor token grammar.
    #[must_use]
    pub const fn arrow(self) -> char {
        match self {
            Self::Asc => '>',
            Self::Desc => '<',
        }
    }
}

/// One entry of an ordered sort specification. Only the first entry of a
/// multi-field sort is significant for cursor encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: Order,
}

impl SortSpec {
    #[must_use]
    pub fn new(field: impl Into<String>, order: Order) -> Self {
        Self { field: field.into(), order }
    }
}
