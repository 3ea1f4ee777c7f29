/// Orchestrator-wide tuning, read once at construction.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Overrides every provider's default worker count when set. Per-job
    /// `FetchOptions::concurrency` still wins.
    pub concurrency_override: Option<usize>,
    /// Failures within one job before the circuit breaker trips.
    pub failure_limit: usize,
    /// Retention for forensic snapshots of failed extractions.
    pub forensics_ttl_seconds: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency_override: None,
            failure_limit: 10,
            forensics_ttl_seconds: 48 * 3600,
        }
    }
}

impl OrchestratorConfig {
    /// Load overrides from `FETCH_CONCURRENCY` and `FETCH_FAILURE_LIMIT`.
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("FETCH_CONCURRENCY").ok().as_deref(),
            std::env::var("FETCH_FAILURE_LIMIT").ok().as_deref(),
        )
    }

    fn from_vars(concurrency: Option<&str>, failure_limit: Option<&str>) -> Self {
        let defaults = Self::default();
        Self {
            concurrency_override: concurrency.and_then(|v| v.parse().ok()),
            failure_limit: failure_limit
                .and_then(|v| v.parse().ok())
                .filter(|limit| *limit > 0)
                .unwrap_or(defaults.failure_limit),
            forensics_ttl_seconds: defaults.forensics_ttl_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.concurrency_override, None);
        assert_eq!(config.failure_limit, 10);
        assert_eq!(config.forensics_ttl_seconds, 172_800);
    }

    #[test]
    fn vars_override_and_garbage_falls_back() {
        let config = OrchestratorConfig::from_vars(Some("8"), Some("25"));
        assert_eq!(config.concurrency_override, Some(8));
        assert_eq!(config.failure_limit, 25);

        let config = OrchestratorConfig::from_vars(Some("lots"), Some("0"));
        assert_eq!(config.concurrency_override, None);
        assert_eq!(config.failure_limit, 10);
    }
}
