//! Normalized outcomes of write operations.
//!
//! Each adapter builds these from its driver's native response; nothing above
//! the adapter layer ever sees a driver result object.

/// Outcome of a delete
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteResult {
    pub count: u64,
}

impl DeleteResult {
    pub fn new(count: u64) -> Self {
        Self { count }
    }

    pub fn del_count(&self) -> u64 {
        self.count
    }

    pub fn succeeded(&self) -> bool {
        self.count > 0
    }
}

/// Outcome of an update, upsert or list mutation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
    /// Id of the record created when an upsert matched nothing
    pub upserted_id: Option<String>,
}

impl UpdateResult {
    pub fn new(matched_count: u64, modified_count: u64) -> Self {
        Self {
            matched_count,
            modified_count,
            upserted_id: None,
        }
    }

    pub fn upserted(id: String) -> Self {
        Self {
            matched_count: 0,
            modified_count: 0,
            upserted_id: Some(id),
        }
    }

    pub fn num_updated(&self) -> u64 {
        self.modified_count
    }

    pub fn succeeded(&self) -> bool {
        self.matched_count > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_result() {
        assert!(DeleteResult::new(1).succeeded());
        assert!(!DeleteResult::new(0).succeeded());
        assert_eq!(DeleteResult::default().del_count(), 0);
    }

    #[test]
    fn test_update_result_uses_matched_count() {
        // matched but unchanged still counts as success
        assert!(UpdateResult::new(1, 0).succeeded());
        assert!(!UpdateResult::new(0, 0).succeeded());

        let upserted = UpdateResult::upserted("42".to_string());
        assert!(!upserted.succeeded());
        assert_eq!(upserted.upserted_id.as_deref(), Some("42"));
    }
}
