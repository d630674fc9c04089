//! Named circuit breakers.
//!
//! # Responsibilities
//! - Hand out one shared breaker per protected resource name
//! - Create breakers lazily from a default configuration
//! - Expose a stats snapshot over every breaker it holds
//!
//! # Design Decisions
//! - Owned by the caller; there is no process-wide instance
//! - Backed by `DashMap` so lookups from many tasks do not serialize

use dashmap::DashMap;
use std::sync::Arc;

use crate::config::CircuitBreakerConfig;
use crate::resilience::circuit_breaker::{BreakerStats, CircuitBreaker};

#[derive(Debug, Default)]
pub struct BreakerRegistry {
    defaults: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new(defaults: CircuitBreakerConfig) -> Self {
        Self {
            defaults,
            breakers: DashMap::new(),
        }
    }

    /// Breaker for `name`, created with the registry defaults if missing.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_or_create_with(name, &self.defaults)
    }

    /// Breaker for `name`, created with `config` if missing.
    ///
    /// An existing breaker keeps its original configuration.
    pub fn get_or_create_with(&self, name: &str, config: &CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return Arc::clone(existing.value());
        }
        let entry = self.breakers.entry(name.to_string()).or_insert_with(|| {
            tracing::debug!(breaker = %name, "Registering circuit breaker");
            Arc::new(CircuitBreaker::new(name, config))
        });
        Arc::clone(entry.value())
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Drop the registry's handle. Holders of the `Arc` keep working.
    pub fn remove(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.remove(name).map(|(_, breaker)| breaker)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Stats for every breaker, ordered by name.
    pub fn stats(&self) -> Vec<BreakerStats> {
        let mut stats: Vec<BreakerStats> = self.breakers.iter().map(|e| e.value().stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::circuit_breaker::CircuitState;

    fn registry() -> BreakerRegistry {
        BreakerRegistry::new(CircuitBreakerConfig {
            max_failures: 2,
            ..CircuitBreakerConfig::default()
        })
    }

    #[test]
    fn test_same_name_same_breaker() {
        let registry = registry();
        let a = registry.get_or_create("payments");
        let b = registry.get_or_create("payments");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_existing_breaker_keeps_config() {
        let registry = registry();
        let first = registry.get_or_create("db");
        let again = registry.get_or_create_with(
            "db",
            &CircuitBreakerConfig {
                max_failures: 50,
                ..CircuitBreakerConfig::default()
            },
        );
        assert!(Arc::ptr_eq(&first, &again));

        again.record_failure();
        again.record_failure();
        assert_eq!(first.state(), CircuitState::Open);
    }

    #[test]
    fn test_stats_and_reset_all() {
        let registry = registry();
        let search = registry.get_or_create("search");
        registry.get_or_create("auth");
        search.record_failure();
        search.record_failure();

        assert_eq!(registry.names(), vec!["auth".to_string(), "search".to_string()]);
        let stats = registry.stats();
        assert_eq!(stats[1].state, CircuitState::Open);
        assert_eq!(stats[0].state, CircuitState::Closed);

        registry.reset_all();
        assert_eq!(search.state(), CircuitState::Closed);
    }

    #[test]
    fn test_remove() {
        let registry = registry();
        let held = registry.get_or_create("cache");
        let removed = registry.remove("cache").expect("registered");
        assert!(Arc::ptr_eq(&held, &removed));
        assert!(registry.get("cache").is_none());
        assert!(registry.is_empty());

        let fresh = registry.get_or_create("cache");
        assert!(!Arc::ptr_eq(&held, &fresh));
    }
}
