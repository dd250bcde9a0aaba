//! Eager loader configuration.

use crate::sql::DatabaseType;

/// How the eager loader generates and dispatches statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Dialect override. `None` uses the runner's [`DatabaseType`].
    pub database_type: Option<DatabaseType>,
    /// Dispatch sibling associations at one depth together.
    pub concurrent_siblings: bool,
    /// Emit a warning when a single-row association matches several rows.
    pub warn_on_ambiguous_single: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            database_type: None,
            concurrent_siblings: true,
            warn_on_ambiguous_single: true,
        }
    }
}

impl LoaderConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate statements for `database_type` regardless of the runner.
    pub fn database_type(mut self, database_type: DatabaseType) -> Self {
        self.database_type = Some(database_type);
        self
    }

    /// Run sibling loads at one depth concurrently.
    pub fn concurrent_siblings(mut self, enabled: bool) -> Self {
        self.concurrent_siblings = enabled;
        self
    }

    /// Log a warning when a single-row association matched several rows.
    pub fn warn_on_ambiguous_single(mut self, enabled: bool) -> Self {
        self.warn_on_ambiguous_single = enabled;
        self
    }

    /// Sequential dispatch, one statement in flight at a time.
    pub fn sequential() -> Self {
        Self::default().concurrent_siblings(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoaderConfig::default();
        assert_eq!(config.database_type, None);
        assert!(config.concurrent_siblings);
        assert!(config.warn_on_ambiguous_single);
    }

    #[test]
    fn test_builder() {
        let config = LoaderConfig::new()
            .database_type(DatabaseType::MySQL)
            .warn_on_ambiguous_single(false);
        assert_eq!(config.database_type, Some(DatabaseType::MySQL));
        assert!(!config.warn_on_ambiguous_single);
        assert!(!LoaderConfig::sequential().concurrent_siblings);
    }
}
