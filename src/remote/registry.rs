// Tollgate — Per-organization client registry
//
// Hits take the shared read lock. A miss takes the upgradable lock, so at
// most one caller builds a client while readers keep going; it upgrades to
// the write lock only to insert.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockUpgradableReadGuard};

use crate::store::OrgConfig;

use super::{ClientFactory, RemoteError, TokenApi};

pub struct ClientRegistry {
    factory: Arc<dyn ClientFactory>,
    clients: RwLock<HashMap<String, Arc<dyn TokenApi>>>,
}

impl ClientRegistry {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached client for `config.org_id`, building it on a miss.
    pub fn client_for(&self, config: &OrgConfig) -> Result<Arc<dyn TokenApi>, RemoteError> {
        if let Some(client) = self.clients.read().get(&config.org_id) {
            return Ok(Arc::clone(client));
        }

        let clients = self.clients.upgradable_read();
        // Another caller may have built it while we waited.
        if let Some(client) = clients.get(&config.org_id) {
            return Ok(Arc::clone(client));
        }

        let client = self.factory.build(config)?;
        let mut clients = RwLockUpgradableReadGuard::upgrade(clients);
        clients.insert(config.org_id.clone(), Arc::clone(&client));

        tracing::debug!(org_id = %config.org_id, "Remote client built");
        Ok(client)
    }

    /// Drop the cached client for `org_id`. Returns true if one was cached.
    pub fn invalidate(&self, org_id: &str) -> bool {
        let removed = self.clients.write().remove(org_id).is_some();
        if removed {
            tracing::debug!(org_id = %org_id, "Remote client invalidated");
        }
        removed
    }

    #[cfg(test)]
    pub(crate) fn is_cached(&self, org_id: &str) -> bool {
        self.clients.read().contains_key(org_id)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::remote::IssuedToken;
    use crate::store::CallerMode;

    struct NullApi;

    impl TokenApi for NullApi {
        fn issue(&self, _role_id: &str) -> Result<IssuedToken, RemoteError> {
            Err(RemoteError::Transport("unused".to_string()))
        }

        fn delete(&self, _client_id: &str) -> Result<(), RemoteError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingFactory {
        builds: AtomicUsize,
    }

    impl ClientFactory for CountingFactory {
        fn build(&self, config: &OrgConfig) -> Result<Arc<dyn TokenApi>, RemoteError> {
            if config.url.is_empty() {
                return Err(RemoteError::InvalidConfig("client URL was not defined".to_string()));
            }
            self.builds.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(NullApi))
        }
    }

    fn config(org_id: &str, url: &str) -> OrgConfig {
        OrgConfig::new(
            org_id.to_string(),
            url.to_string(),
            "bearer".to_string(),
            "prod".to_string(),
            CallerMode::Standard,
            Duration::ZERO,
        )
    }

    #[test]
    fn test_client_is_built_once_per_org() {
        let factory = Arc::new(CountingFactory::default());
        let registry = ClientRegistry::new(factory.clone());

        registry.client_for(&config("o1", "http://a")).unwrap();
        registry.client_for(&config("o1", "http://a")).unwrap();
        registry.client_for(&config("o2", "http://b")).unwrap();

        assert_eq!(factory.builds.load(Ordering::SeqCst), 2);
        assert!(registry.is_cached("o1"));
        assert!(registry.is_cached("o2"));
    }

    #[test]
    fn test_invalidate_forces_rebuild() {
        let factory = Arc::new(CountingFactory::default());
        let registry = ClientRegistry::new(factory.clone());

        registry.client_for(&config("o1", "http://a")).unwrap();
        assert!(registry.invalidate("o1"));
        assert!(!registry.invalidate("o1"));
        assert!(!registry.is_cached("o1"));

        registry.client_for(&config("o1", "http://a")).unwrap();
        assert_eq!(factory.builds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_build_caches_nothing() {
        let registry = ClientRegistry::new(Arc::new(CountingFactory::default()));
        assert!(registry.client_for(&config("o1", "")).is_err());
        assert!(!registry.is_cached("o1"));
    }

    #[test]
    fn test_concurrent_misses_build_once() {
        let factory = Arc::new(CountingFactory::default());
        let registry = Arc::new(ClientRegistry::new(factory.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry.client_for(&config("o1", "http://a")).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
    }
}
