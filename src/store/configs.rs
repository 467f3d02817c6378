// Tollgate — Organization config store

use std::sync::Arc;

use super::kv::{read_json, write_json, Storage};
use super::models::OrgConfig;
use super::StoreError;

const CONFIG_PREFIX: &str = "config/";

/// Organization configs, keyed `config/{org_id}`.
#[derive(Clone)]
pub struct ConfigStore {
    storage: Arc<dyn Storage>,
}

impl ConfigStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    fn key(org_id: &str) -> String {
        format!("{}{}", CONFIG_PREFIX, org_id)
    }

    pub fn get(&self, org_id: &str) -> Result<Option<OrgConfig>, StoreError> {
        read_json(self.storage.as_ref(), &Self::key(org_id))
    }

    pub fn put(&self, config: &OrgConfig) -> Result<(), StoreError> {
        write_json(self.storage.as_ref(), &Self::key(&config.org_id), config)?;
        tracing::debug!(org_id = %config.org_id, "Organization config saved");
        Ok(())
    }

    pub fn delete(&self, org_id: &str) -> Result<bool, StoreError> {
        self.storage.delete(&Self::key(org_id))
    }

    /// Org ids of every stored config.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        self.storage.list(CONFIG_PREFIX)
    }

    /// Scan all configs for the first one carrying `logical_name`.
    pub fn find_by_logical_name(&self, logical_name: &str) -> Result<Option<OrgConfig>, StoreError> {
        for org_id in self.list()? {
            if let Some(config) = self.get(&org_id)? {
                if config.logical_name == logical_name {
                    return Ok(Some(config));
                }
            }
        }
        Ok(None)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::{CallerMode, MemoryStorage};

    fn config(org_id: &str, logical_name: &str) -> OrgConfig {
        OrgConfig::new(
            org_id.to_string(),
            "https://api.example.test".to_string(),
            "bearer".to_string(),
            logical_name.to_string(),
            CallerMode::Standard,
            Duration::ZERO,
        )
    }

    #[test]
    fn test_put_get_delete() {
        let store = ConfigStore::new(Arc::new(MemoryStorage::new()));
        store.put(&config("o1", "prod")).unwrap();

        let loaded = store.get("o1").unwrap().expect("config should exist");
        assert_eq!(loaded.url, "https://api.example.test");
        assert_eq!(loaded.auth_token(), "bearer");

        assert!(store.delete("o1").unwrap());
        assert!(store.get("o1").unwrap().is_none());
    }

    #[test]
    fn test_find_by_logical_name() {
        let store = ConfigStore::new(Arc::new(MemoryStorage::new()));
        store.put(&config("o1", "prod")).unwrap();
        store.put(&config("o2", "staging")).unwrap();

        let found = store.find_by_logical_name("staging").unwrap().unwrap();
        assert_eq!(found.org_id, "o2");
        assert!(store.find_by_logical_name("qa").unwrap().is_none());
        assert_eq!(store.list().unwrap(), vec!["o1", "o2"]);
    }
}
