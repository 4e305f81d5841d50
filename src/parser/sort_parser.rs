use crate::models::ID_FIELD;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
    Unsorted,
}

impl SortOrder {
    pub fn from_str(s: &str) -> SortOrder {
        match s.to_lowercase().as_str() {
            "ascending" | "asc" | "1" => SortOrder::Ascending,
            "descending" | "desc" | "-1" => SortOrder::Descending,
            _ => SortOrder::Unsorted,
        }
    }

    /// Numeric direction as document stores spell it
    pub fn direction(&self) -> i32 {
        match self {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
            SortOrder::Unsorted => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    pub field: String,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn new(field: impl Into<String>, order: SortOrder) -> Self {
        SortSpec {
            field: field.into(),
            order,
        }
    }

    pub fn ascending(field: impl Into<String>) -> Self {
        Self::new(field, SortOrder::Ascending)
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self::new(field, SortOrder::Descending)
    }

    pub fn unsorted() -> Self {
        Self::new(ID_FIELD, SortOrder::Unsorted)
    }

    pub fn is_sorted(&self) -> bool {
        self.order != SortOrder::Unsorted
    }

    /// Parse CLI-style `sort_by` / `sort_order` parameters
    pub fn from_params(sort_by: Option<&str>, sort_order: Option<&str>) -> SortSpec {
        let order = sort_order
            .map(SortOrder::from_str)
            .unwrap_or(SortOrder::Unsorted);
        SortSpec::new(sort_by.unwrap_or(ID_FIELD), order)
    }
}

impl Default for SortSpec {
    fn default() -> Self {
        Self::unsorted()
    }
}
