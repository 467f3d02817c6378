// Tollgate — Credential record store
//
// Records are keyed by identity key (`token/{key}`). The store does not
// know how keys are derived; it only offers direct access plus the slow
// client-id scan used when a caller only knows the issued id.

use std::sync::Arc;

use super::kv::{read_json, write_json, Storage};
use super::models::CredentialRecord;
use super::StoreError;

const TOKEN_PREFIX: &str = "token/";

/// Issued credential records.
#[derive(Clone)]
pub struct CredentialStore {
    storage: Arc<dyn Storage>,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    fn key(identity_key: &str) -> String {
        format!("{}{}", TOKEN_PREFIX, identity_key)
    }

    pub fn get(&self, identity_key: &str) -> Result<Option<CredentialRecord>, StoreError> {
        read_json(self.storage.as_ref(), &Self::key(identity_key))
    }

    pub fn put(&self, identity_key: &str, record: &CredentialRecord) -> Result<(), StoreError> {
        write_json(self.storage.as_ref(), &Self::key(identity_key), record)?;
        tracing::info!(
            client_id = %record.client_id,
            org_id = %record.org_id,
            role_name = %record.role_name,
            "Credential stored successfully"
        );
        Ok(())
    }

    /// Delete the record at `identity_key`. Returns true if it existed.
    pub fn delete(&self, identity_key: &str) -> Result<bool, StoreError> {
        let existed = self.storage.delete(&Self::key(identity_key))?;
        if existed {
            tracing::info!(identity_key = %identity_key, "Credential record deleted");
        }
        Ok(existed)
    }

    /// Identity keys of every stored record.
    pub fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.storage.list(TOKEN_PREFIX)
    }

    /// Linear scan for the record issued with `client_id`, optionally
    /// restricted to one organization. Returns the identity key with it.
    pub fn find_by_client_id(
        &self,
        org_id: Option<&str>,
        client_id: &str,
    ) -> Result<Option<(String, CredentialRecord)>, StoreError> {
        for identity_key in self.keys()? {
            let Some(record) = self.get(&identity_key)? else {
                continue;
            };
            if org_id.is_some_and(|org| org != record.org_id) {
                continue;
            }
            if record.client_id == client_id {
                return Ok(Some((identity_key, record)));
            }
        }
        Ok(None)
    }

    /// All records, optionally restricted to one organization.
    pub fn list(&self, org_id: Option<&str>) -> Result<Vec<CredentialRecord>, StoreError> {
        let mut records = Vec::new();
        for identity_key in self.keys()? {
            if let Some(record) = self.get(&identity_key)? {
                if org_id.map_or(true, |org| org == record.org_id) {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
