// Tollgate — Identity key scheme
//
// The identity key is the credential store key, and therefore exactly what
// decides reuse versus fresh issuance. Standard callers get a fingerprint
// of (org, role, logical name); sidecar callers are keyed by the client id
// the remote API assigned.

use std::borrow::Cow;

use sha2::{Digest, Sha256};

use crate::store::{CallerMode, CredentialRecord, CredentialStore};

use super::CredentialError;

/// Everything a caller may say about which credential it means.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialIdentity {
    pub org_id: String,
    pub role_name: String,
    pub logical_name: Option<String>,
    pub client_id: Option<String>,
}

impl CredentialIdentity {
    fn logical_name(&self) -> Option<&str> {
        self.logical_name.as_deref().filter(|s| !s.is_empty())
    }

    fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref().filter(|s| !s.is_empty())
    }

    fn matches(&self, record: &CredentialRecord) -> bool {
        record.org_id == self.org_id && record.role_name == self.role_name
    }
}

/// Outcome of the pre-issuance check.
#[derive(Debug)]
pub enum Admission {
    /// No usable record; call the remote API.
    Issue,
    /// A pinned record already exists; hand it back untouched.
    Reuse {
        identity_key: String,
        record: CredentialRecord,
    },
}

// ─── Key derivation ──────────────────────────────────────────────────────────

/// Escape `\` and `:` so that joining fields with `:` stays unambiguous.
fn escape(field: &str) -> Cow<'_, str> {
    if !field.contains(['\\', ':']) {
        return Cow::Borrowed(field);
    }
    let mut out = String::with_capacity(field.len() + 4);
    for c in field.chars() {
        if c == '\\' || c == ':' {
            out.push('\\');
        }
        out.push(c);
    }
    Cow::Owned(out)
}

/// SHA-256 hex of `org:role:logical_name` with each field escaped.
/// Fields free of `:` and `\` hash exactly like the plain colon join.
pub fn fingerprint(org_id: &str, role_name: &str, logical_name: &str) -> String {
    let encoded = format!(
        "{}:{}:{}",
        escape(org_id),
        escape(role_name),
        escape(logical_name)
    );
    let hash = Sha256::digest(encoded.as_bytes());
    hash.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Derive the identity key for `mode`.
pub fn derive_key(
    mode: CallerMode,
    org_id: &str,
    role_name: &str,
    logical_name: Option<&str>,
    client_id: Option<&str>,
) -> Result<String, CredentialError> {
    match mode {
        CallerMode::Standard => {
            let logical_name = logical_name.filter(|s| !s.is_empty()).ok_or_else(|| {
                CredentialError::InvalidArgument("logical_name not provided".to_string())
            })?;
            Ok(fingerprint(org_id, role_name, logical_name))
        }
        CallerMode::Sidecar => client_id
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| CredentialError::InvalidArgument("client_id not provided".to_string())),
    }
}

// ─── Strategies ──────────────────────────────────────────────────────────────

/// Mode-specific identification and reuse rules.
pub trait IdentityStrategy: Send + Sync {
    /// Key that concurrent issuances for the same identity must serialize on.
    /// `None` when the key is only known after the remote call.
    fn reservation_key(
        &self,
        identity: &CredentialIdentity,
    ) -> Result<Option<String>, CredentialError>;

    /// Decide, before any remote call, whether issuance may proceed.
    fn admit(
        &self,
        store: &CredentialStore,
        identity: &CredentialIdentity,
    ) -> Result<Admission, CredentialError>;

    /// Key under which a freshly issued record is stored.
    fn storage_key(
        &self,
        identity: &CredentialIdentity,
        issued_client_id: &str,
    ) -> Result<String, CredentialError>;

    /// Find an existing record. `NotFound` if absent.
    fn locate(
        &self,
        store: &CredentialStore,
        identity: &CredentialIdentity,
    ) -> Result<(String, CredentialRecord), CredentialError>;
}

pub struct StandardIdentity;

pub struct SidecarIdentity;

static STANDARD: StandardIdentity = StandardIdentity;
static SIDECAR: SidecarIdentity = SidecarIdentity;

/// The strategy for an organization's caller mode.
pub fn strategy_for(mode: CallerMode) -> &'static dyn IdentityStrategy {
    match mode {
        CallerMode::Standard => &STANDARD,
        CallerMode::Sidecar => &SIDECAR,
    }
}

impl IdentityStrategy for StandardIdentity {
    fn reservation_key(
        &self,
        identity: &CredentialIdentity,
    ) -> Result<Option<String>, CredentialError> {
        self.storage_key(identity, "").map(Some)
    }

    fn admit(
        &self,
        store: &CredentialStore,
        identity: &CredentialIdentity,
    ) -> Result<Admission, CredentialError> {
        let key = derive_key(
            CallerMode::Standard,
            &identity.org_id,
            &identity.role_name,
            identity.logical_name(),
            None,
        )?;
        if store.get(&key)?.is_some() {
            return Err(CredentialError::Conflict(format!(
                "token already exists for role {} with logical name {}",
                identity.role_name,
                identity.logical_name().unwrap_or_default()
            )));
        }
        Ok(Admission::Issue)
    }

    fn storage_key(
        &self,
        identity: &CredentialIdentity,
        _issued_client_id: &str,
    ) -> Result<String, CredentialError> {
        derive_key(
            CallerMode::Standard,
            &identity.org_id,
            &identity.role_name,
            identity.logical_name(),
            None,
        )
    }

    fn locate(
        &self,
        store: &CredentialStore,
        identity: &CredentialIdentity,
    ) -> Result<(String, CredentialRecord), CredentialError> {
        if let Some(logical_name) = identity.logical_name() {
            let key = fingerprint(&identity.org_id, &identity.role_name, logical_name);
            return match store.get(&key)? {
                Some(record)
                    if identity.matches(&record) && record.logical_name == logical_name =>
                {
                    Ok((key, record))
                }
                _ => Err(CredentialError::NotFound(format!(
                    "no token found for role {} with logical name {}",
                    identity.role_name, logical_name
                ))),
            };
        }

        // Slow path for operators who only know the issued id.
        if let Some(client_id) = identity.client_id() {
            return store
                .find_by_client_id(Some(&identity.org_id), client_id)?
                .ok_or_else(|| {
                    CredentialError::NotFound(format!("no token found with client id {}", client_id))
                });
        }

        Err(CredentialError::InvalidArgument(
            "logical_name or client_id must be provided".to_string(),
        ))
    }
}

impl IdentityStrategy for SidecarIdentity {
    fn reservation_key(
        &self,
        _identity: &CredentialIdentity,
    ) -> Result<Option<String>, CredentialError> {
        Ok(None)
    }

    fn admit(
        &self,
        store: &CredentialStore,
        identity: &CredentialIdentity,
    ) -> Result<Admission, CredentialError> {
        let Some(client_id) = identity.client_id() else {
            return Ok(Admission::Issue);
        };
        match store.get(client_id)? {
            Some(record) if identity.matches(&record) => Ok(Admission::Reuse {
                identity_key: client_id.to_string(),
                record,
            }),
            Some(_) => Err(CredentialError::InvalidArgument(format!(
                "client id {} belongs to a different organization or role",
                client_id
            ))),
            None => Ok(Admission::Issue),
        }
    }

    fn storage_key(
        &self,
        _identity: &CredentialIdentity,
        issued_client_id: &str,
    ) -> Result<String, CredentialError> {
        derive_key(CallerMode::Sidecar, "", "", None, Some(issued_client_id))
    }

    fn locate(
        &self,
        store: &CredentialStore,
        identity: &CredentialIdentity,
    ) -> Result<(String, CredentialRecord), CredentialError> {
        let key = derive_key(
            CallerMode::Sidecar,
            &identity.org_id,
            &identity.role_name,
            None,
            identity.client_id(),
        )?;
        match store.get(&key)? {
            Some(record) if record.org_id == identity.org_id => Ok((key, record)),
            _ => Err(CredentialError::NotFound(format!(
                "no token found with client id {}",
                key
            ))),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use super::*;
    use crate::store::MemoryStorage;

    fn sha256_hex(input: &str) -> String {
        Sha256::digest(input.as_bytes())
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    fn record(org: &str, role: &str, logical: &str, client_id: &str) -> CredentialRecord {
        CredentialRecord::new(
            client_id.to_string(),
            "secret".to_string(),
            org.to_string(),
            vec![],
            "token".to_string(),
            String::new(),
            role.to_string(),
            logical.to_string(),
            BTreeMap::new(),
        )
    }

    fn identity(logical: Option<&str>, client_id: Option<&str>) -> CredentialIdentity {
        CredentialIdentity {
            org_id: "o1".to_string(),
            role_name: "r1".to_string(),
            logical_name: logical.map(str::to_string),
            client_id: client_id.map(str::to_string),
        }
    }

    #[test]
    fn test_fingerprint_matches_plain_join_for_simple_fields() {
        assert_eq!(fingerprint("o1", "r1", "svc1"), sha256_hex("o1:r1:svc1"));
        assert_eq!(fingerprint("o1", "r1", "svc1").len(), 64);
    }

    #[test]
    fn test_fingerprint_is_unambiguous_with_separators_in_fields() {
        let a = fingerprint("a", "b:c", "d");
        let b = fingerprint("a:b", "c", "d");
        let c = fingerprint("a", "b", "c:d");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
        assert_ne!(fingerprint("a\\", "b", "c"), fingerprint("a", "\\b", "c"));
    }

    #[test]
    fn test_derive_key_standard_requires_logical_name() {
        let err = derive_key(CallerMode::Standard, "o1", "r1", None, Some("c1")).unwrap_err();
        assert!(matches!(err, CredentialError::InvalidArgument(_)));
        let err = derive_key(CallerMode::Standard, "o1", "r1", Some(""), None).unwrap_err();
        assert!(matches!(err, CredentialError::InvalidArgument(_)));
    }

    #[test]
    fn test_derive_key_sidecar_ignores_logical_name() {
        let key = derive_key(CallerMode::Sidecar, "o1", "r1", Some("svc1"), Some("c-42")).unwrap();
        assert_eq!(key, "c-42");
        assert!(derive_key(CallerMode::Sidecar, "o1", "r1", Some("svc1"), None).is_err());
    }

    #[test]
    fn test_standard_admit_conflicts_on_existing_key() {
        let store = CredentialStore::new(Arc::new(MemoryStorage::new()));
        let strategy = strategy_for(CallerMode::Standard);
        let id = identity(Some("svc1"), None);

        assert!(matches!(strategy.admit(&store, &id).unwrap(), Admission::Issue));

        store
            .put(&fingerprint("o1", "r1", "svc1"), &record("o1", "r1", "svc1", "c1"))
            .unwrap();
        let err = strategy.admit(&store, &id).unwrap_err();
        assert!(matches!(err, CredentialError::Conflict(_)));
    }

    #[test]
    fn test_standard_locate_by_logical_name_and_client_id() {
        let store = CredentialStore::new(Arc::new(MemoryStorage::new()));
        let strategy = strategy_for(CallerMode::Standard);
        let key = fingerprint("o1", "r1", "svc1");
        store.put(&key, &record("o1", "r1", "svc1", "c1")).unwrap();

        let (found_key, found) = strategy.locate(&store, &identity(Some("svc1"), None)).unwrap();
        assert_eq!(found_key, key);
        assert_eq!(found.client_id, "c1");

        let (found_key, _) = strategy.locate(&store, &identity(None, Some("c1"))).unwrap();
        assert_eq!(found_key, key);

        let err = strategy.locate(&store, &identity(Some("svc2"), None)).unwrap_err();
        assert!(matches!(err, CredentialError::NotFound(_)));

        let err = strategy.locate(&store, &identity(None, None)).unwrap_err();
        assert!(matches!(err, CredentialError::InvalidArgument(_)));
    }

    #[test]
    fn test_sidecar_admit_reuses_pinned_client_id() {
        let store = CredentialStore::new(Arc::new(MemoryStorage::new()));
        let strategy = strategy_for(CallerMode::Sidecar);
        store.put("c-7", &record("o1", "r1", "", "c-7")).unwrap();

        match strategy.admit(&store, &identity(None, Some("c-7"))).unwrap() {
            Admission::Reuse { identity_key, record } => {
                assert_eq!(identity_key, "c-7");
                assert_eq!(record.client_id, "c-7");
            }
            Admission::Issue => panic!("expected reuse"),
        }

        assert!(matches!(
            strategy.admit(&store, &identity(None, Some("c-8"))).unwrap(),
            Admission::Issue
        ));
        assert!(matches!(
            strategy.admit(&store, &identity(None, None)).unwrap(),
            Admission::Issue
        ));
    }

    #[test]
    fn test_sidecar_admit_refuses_foreign_record() {
        let store = CredentialStore::new(Arc::new(MemoryStorage::new()));
        store.put("c-7", &record("o2", "r1", "", "c-7")).unwrap();

        let err = strategy_for(CallerMode::Sidecar)
            .admit(&store, &identity(None, Some("c-7")))
            .unwrap_err();
        assert!(matches!(err, CredentialError::InvalidArgument(_)));
    }

    #[test]
    fn test_sidecar_storage_key_is_client_id() {
        let strategy = strategy_for(CallerMode::Sidecar);
        assert_eq!(strategy.storage_key(&identity(Some("svc1"), None), "c-9").unwrap(), "c-9");
        assert_eq!(strategy.reservation_key(&identity(None, Some("c-9"))).unwrap(), None);
    }

    #[test]
    fn test_standard_reservation_key_is_the_fingerprint() {
        let strategy = strategy_for(CallerMode::Standard);
        assert_eq!(
            strategy.reservation_key(&identity(Some("svc1"), None)).unwrap(),
            Some(fingerprint("o1", "r1", "svc1"))
        );
        assert!(strategy.reservation_key(&identity(None, None)).is_err());
    }
}
