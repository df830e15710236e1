//! Named breakers shared across the process

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::{BreakerConfig, CircuitBreaker};

/// Breaker guarding the wallet/PIN feature service
pub const FEATURE_SERVICE: &str = "feature-service";

static GLOBAL: Lazy<BreakerRegistry> = Lazy::new(BreakerRegistry::new);

#[derive(Debug, Default)]
pub struct BreakerRegistry {
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static BreakerRegistry {
        &GLOBAL
    }

    /// Return the breaker called `name`, creating it with `config` on first use.
    ///
    /// Later calls ignore `config`.
    pub fn get_or_create(&self, name: &str, config: BreakerConfig) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, config)))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.lock().get(name).cloned()
    }

    pub fn feature_service(&self) -> Arc<CircuitBreaker> {
        self.get_or_create(FEATURE_SERVICE, BreakerConfig::default())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_returns_same_instance() {
        let reg = BreakerRegistry::new();
        let a = reg.get_or_create(
            "svc",
            BreakerConfig {
                max_failures: 2,
                ..Default::default()
            },
        );
        let b = reg.get_or_create("svc", BreakerConfig::default());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.config().max_failures, 2);
        assert_eq!(reg.names(), vec!["svc".to_string()]);
    }

    #[test]
    fn test_feature_service_breaker() {
        let reg = BreakerRegistry::new();
        let b = reg.feature_service();
        assert_eq!(b.name(), FEATURE_SERVICE);
        assert!(reg.get(FEATURE_SERVICE).is_some());
        assert!(reg.get("other").is_none());
    }

    #[test]
    fn test_global_is_shared() {
        let a = BreakerRegistry::global().get_or_create("registry-test", BreakerConfig::default());
        let b = BreakerRegistry::global()
            .get("registry-test")
            .expect("registered above");
        assert!(Arc::ptr_eq(&a, &b));
    }
}
