/// Opening parameters for a [`crate::Database`], following the teacher's
/// `message_log::OpenOptions` builder convention: a plain struct with
/// `Default`, mutated through chained setters, consumed once by `open`.
#[derive(Clone, Debug)]
pub struct Config {
    /// Bytes pre-allocated for the record log before its first doubling.
    pub initial_log_capacity: usize,
    /// Distinct SQL strings the query bridge's statement cache holds before
    /// it clears itself (see `framedb_query::QueryBridge`).
    pub statement_cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_log_capacity: 4096,
            statement_cache_capacity: 100,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initial_log_capacity(mut self, bytes: usize) -> Self {
        self.initial_log_capacity = bytes;
        self
    }

    pub fn statement_cache_capacity(mut self, entries: usize) -> Self {
        self.statement_cache_capacity = entries;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_values() {
        let config = Config::default();
        assert_eq!(config.initial_log_capacity, 4096);
        assert_eq!(config.statement_cache_capacity, 100);
    }

    #[test]
    fn builder_overrides_individual_fields() {
        let config = Config::new().initial_log_capacity(65536);
        assert_eq!(config.initial_log_capacity, 65536);
        assert_eq!(config.statement_cache_capacity, 100);
    }
}
