use crate::error::{StoreError, StoreResult};
use crate::models::FieldValue;
use std::sync::atomic::{AtomicU32, Ordering};

const COUNTER_MASK: u32 = 0x00FF_FFFF;

/// Fabricates record ids for tables whose callers did not supply one.
///
/// An id packs `(epoch seconds, random byte, counter)` into one positive
/// `i64`: seconds in the high 31 bits, then 8 random bits, then a 24-bit
/// counter. Ids are unique within one generator for up to 2^24 ids per
/// second; two processes started within the same second can collide.
#[derive(Debug, Default)]
pub struct IdGenerator {
    counter: AtomicU32,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> i64 {
        let seconds = chrono::Utc::now().timestamp() & 0x7FFF_FFFF;
        let salt: u8 = rand::random();
        let count = self.counter.fetch_add(1, Ordering::Relaxed) & COUNTER_MASK;
        (seconds << 32) | ((salt as i64) << 24) | count as i64
    }
}

/// Parse a caller-supplied id string
pub fn parse_id(id: &str) -> StoreResult<i64> {
    id.trim()
        .parse::<i64>()
        .map_err(|_| StoreError::InvalidArgument(format!("Malformed record id: '{}'", id)))
}

/// Accept an integer id or its decimal string form
pub fn id_from_value(value: &FieldValue) -> StoreResult<i64> {
    match value {
        FieldValue::Int(i) => Ok(*i),
        FieldValue::Text(s) => parse_id(s),
        other => Err(StoreError::InvalidArgument(format!(
            "Record ids must be integers, got {}",
            other.type_name()
        ))),
    }
}
