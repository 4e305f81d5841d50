use crate::error::{StoreError, StoreResult};
use std::str::FromStr;
use tracing::Level;

/// Parse a configured level name (`trace` .. `error`)
pub fn parse_level(level: &str) -> StoreResult<Level> {
    Level::from_str(level.trim())
        .map_err(|_| StoreError::Configuration(format!("Unknown log level: {}", level)))
}

/// Install the global fmt subscriber at `level`.
///
/// Only binaries call this; a second call is ignored.
pub fn init_tracing(level: &str) -> StoreResult<()> {
    let level = parse_level(level)?;
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_level("WARN").unwrap(), Level::WARN);
        assert!(parse_level("loud").is_err());
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing("info").unwrap();
        init_tracing("debug").unwrap();
    }
}
