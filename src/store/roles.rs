// Tollgate — Role policy store
//
// Normalization lives here rather than in the engine so that no write path
// can persist a policy with `ttl > max_ttl`.

use std::sync::Arc;

use super::kv::{read_json, write_json, Storage};
use super::models::RolePolicy;
use super::StoreError;

const ROLE_PREFIX: &str = "role/";
const ROLE_KEY_DELIMITER: char = ':';

/// Role policies, keyed `role/{org_id}:{role_name}`.
#[derive(Clone)]
pub struct RoleStore {
    storage: Arc<dyn Storage>,
}

impl RoleStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    fn key(org_id: &str, role_name: &str) -> String {
        format!("{}{}{}{}", ROLE_PREFIX, org_id, ROLE_KEY_DELIMITER, role_name)
    }

    pub fn get(&self, org_id: &str, role_name: &str) -> Result<Option<RolePolicy>, StoreError> {
        read_json(self.storage.as_ref(), &Self::key(org_id, role_name))
    }

    /// Normalize and persist `policy`. Returns the stored policy and any
    /// clamping warnings.
    pub fn put(&self, mut policy: RolePolicy) -> Result<(RolePolicy, Vec<String>), StoreError> {
        let warnings = policy.normalize();
        for warning in &warnings {
            tracing::warn!(
                org_id = %policy.org_id,
                role_name = %policy.role_name,
                "{}",
                warning
            );
        }

        write_json(
            self.storage.as_ref(),
            &Self::key(&policy.org_id, &policy.role_name),
            &policy,
        )?;
        tracing::debug!(
            org_id = %policy.org_id,
            role_name = %policy.role_name,
            ttl_secs = policy.ttl.as_secs(),
            max_ttl_secs = policy.max_ttl.as_secs(),
            "Role policy saved"
        );

        Ok((policy, warnings))
    }

    pub fn delete(&self, org_id: &str, role_name: &str) -> Result<bool, StoreError> {
        self.storage.delete(&Self::key(org_id, role_name))
    }

    /// All policies, optionally restricted to one organization.
    pub fn list(&self, org_id: Option<&str>) -> Result<Vec<RolePolicy>, StoreError> {
        let mut policies = Vec::new();
        for suffix in self.storage.list(ROLE_PREFIX)? {
            let Some((key_org, _)) = suffix.split_once(ROLE_KEY_DELIMITER) else {
                continue;
            };
            if org_id.is_some_and(|org| org != key_org) {
                continue;
            }
            let key = format!("{}{}", ROLE_PREFIX, suffix);
            if let Some(policy) = read_json::<RolePolicy>(self.storage.as_ref(), &key)? {
                policies.push(policy);
            }
        }
        Ok(policies)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::MemoryStorage;

    fn policy(org: &str, role: &str, ttl: u64, max_ttl: u64) -> RolePolicy {
        RolePolicy {
            org_id: org.to_string(),
            role_name: role.to_string(),
            role_id: format!("{}-remote", role),
            ttl: Duration::from_secs(ttl),
            max_ttl: Duration::from_secs(max_ttl),
        }
    }

    #[test]
    fn test_round_trip_preserves_fields() {
        let store = RoleStore::new(Arc::new(MemoryStorage::new()));
        let (saved, warnings) = store.put(policy("o1", "r1", 60, 3600)).unwrap();
        assert!(warnings.is_empty());

        let loaded = store.get("o1", "r1").unwrap().unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(loaded.role_id, "r1-remote");
        assert_eq!(loaded.ttl, Duration::from_secs(60));
        assert_eq!(loaded.max_ttl, Duration::from_secs(3600));
    }

    #[test]
    fn test_put_clamps_before_persisting() {
        let store = RoleStore::new(Arc::new(MemoryStorage::new()));
        let (_, warnings) = store.put(policy("o1", "r1", 600, 300)).unwrap();
        assert_eq!(warnings.len(), 1);

        let loaded = store.get("o1", "r1").unwrap().unwrap();
        assert_eq!(loaded.ttl, Duration::from_secs(300));
        assert_eq!(loaded.max_ttl, Duration::from_secs(300));
    }

    #[test]
    fn test_list_filters_by_org() {
        let store = RoleStore::new(Arc::new(MemoryStorage::new()));
        store.put(policy("o1", "r1", 0, 0)).unwrap();
        store.put(policy("o1", "r2", 0, 0)).unwrap();
        store.put(policy("o2", "r1", 0, 0)).unwrap();

        assert_eq!(store.list(None).unwrap().len(), 3);
        let o1: Vec<String> = store
            .list(Some("o1"))
            .unwrap()
            .into_iter()
            .map(|p| p.role_name)
            .collect();
        assert_eq!(o1, vec!["r1", "r2"]);
    }

    #[test]
    fn test_delete() {
        let store = RoleStore::new(Arc::new(MemoryStorage::new()));
        store.put(policy("o1", "r1", 0, 0)).unwrap();
        assert!(store.delete("o1", "r1").unwrap());
        assert!(store.get("o1", "r1").unwrap().is_none());
    }
}
