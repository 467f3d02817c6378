// Tollgate — Credential lifecycle engine
//
// Orchestrates issuance, lookup, renewal and revocation over the config,
// role and credential stores and the per-organization client registry.
// Every call is synchronous; the engine owns no tasks and no timers.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use serde_json::{json, Value};

use crate::remote::{ClientFactory, ClientRegistry};
use crate::store::{
    CallerMode, ConfigStore, ConfigWrite, CredentialRecord, CredentialStore, CredentialSummary,
    OrgConfig, RolePolicy, RoleStore, RoleWrite, Storage,
};

use super::events::{EventSink, LifecycleEvent, TracingSink};
use super::identity::{strategy_for, Admission, CredentialIdentity};
use super::CredentialError;

// ─── Requests & Responses ────────────────────────────────────────────────────

/// Inbound issuance request.
#[derive(Debug, Clone, Default)]
pub struct IssueRequest {
    pub org_id: String,
    pub role_name: String,
    /// Required for standard callers, ignored by sidecar callers.
    pub logical_name: Option<String>,
    /// Sidecar pin: reuse this credential if it is already stored.
    pub client_id: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl IssueRequest {
    fn identity(&self) -> CredentialIdentity {
        CredentialIdentity {
            org_id: self.org_id.clone(),
            role_name: self.role_name.clone(),
            logical_name: self.logical_name.clone(),
            client_id: self.client_id.clone(),
        }
    }
}

/// Lease metadata handed back with issue and renew.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    pub ttl: Duration,
    pub max_ttl: Duration,
    pub renewable: bool,
}

impl Lease {
    pub fn new(ttl: Duration, max_ttl: Duration) -> Self {
        Self {
            ttl,
            max_ttl,
            renewable: true,
        }
    }

    pub fn to_response(&self) -> Value {
        json!({
            "ttl": self.ttl.as_secs(),
            "max_ttl": self.max_ttl.as_secs(),
            "renewable": self.renewable,
        })
    }
}

/// Result of a successful issuance.
#[derive(Debug, Clone)]
pub struct Issued {
    pub record: CredentialRecord,
    pub lease: Lease,
    /// True when a pinned sidecar credential was returned without a remote call.
    pub reused: bool,
}

/// Lease internals the host hands back on renewal.
#[derive(Debug, Clone, Default)]
pub struct RenewRequest {
    pub org_id: String,
    pub role_name: String,
    pub current_ttl: Duration,
}

/// A stored role policy plus any clamping warnings from the write.
#[derive(Debug, Clone)]
pub struct RoleWriteOutcome {
    pub policy: RolePolicy,
    pub warnings: Vec<String>,
}

// ─── Issue locks ─────────────────────────────────────────────────────────────

const ISSUE_LOCK_STRIPES: usize = 64;

/// Striped mutexes held from the existence check until the new record is
/// stored, so two issuances for one identity key never both reach the
/// remote API. Distinct keys may share a stripe.
struct IssueLocks {
    stripes: Vec<Mutex<()>>,
}

impl IssueLocks {
    fn new() -> Self {
        Self {
            stripes: (0..ISSUE_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let stripe = (hasher.finish() % self.stripes.len() as u64) as usize;
        self.stripes[stripe].lock()
    }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct Engine {
    configs: ConfigStore,
    roles: RoleStore,
    credentials: CredentialStore,
    registry: ClientRegistry,
    issue_locks: IssueLocks,
    events: Arc<dyn EventSink>,
}

impl Engine {
    pub fn new(storage: Arc<dyn Storage>, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            configs: ConfigStore::new(Arc::clone(&storage)),
            roles: RoleStore::new(Arc::clone(&storage)),
            credentials: CredentialStore::new(storage),
            registry: ClientRegistry::new(factory),
            issue_locks: IssueLocks::new(),
            events: Arc::new(TracingSink),
        }
    }

    /// Replace the default tracing sink.
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    fn invalidate_client(&self, org_id: &str) {
        if self.registry.invalidate(org_id) {
            self.events.emit(LifecycleEvent::ClientInvalidated {
                org_id: org_id.to_string(),
            });
        }
    }

    fn require_config(&self, org_id: &str) -> Result<OrgConfig, CredentialError> {
        self.configs.get(org_id)?.ok_or_else(|| {
            CredentialError::NotFound(format!("no configuration found for org {}", org_id))
        })
    }

    // ─── Organization config ─────────────────────────────────────────────

    /// Create or update an organization config.
    pub fn write_config(&self, write: ConfigWrite) -> Result<OrgConfig, CredentialError> {
        validate_segment("org_id", &write.org_id)?;

        let config = match self.configs.get(&write.org_id)? {
            Some(mut config) => {
                if let Some(url) = write.url {
                    config.url = url;
                }
                if let Some(auth_token) = write.auth_token {
                    config.set_auth_token(auth_token);
                }
                if let Some(logical_name) = write.logical_name {
                    config.logical_name = logical_name;
                }
                if let Some(caller_mode) = write.caller_mode {
                    config.caller_mode = caller_mode;
                }
                if let Some(renewal_time) = write.renewal_time {
                    config.renewal_time = renewal_time;
                }
                config
            }
            None => OrgConfig::new(
                write.org_id,
                required("url", write.url)?,
                required("auth_token", write.auth_token)?,
                required("logical_name", write.logical_name)?,
                write.caller_mode.unwrap_or_default(),
                write.renewal_time.unwrap_or_default(),
            ),
        };

        self.configs.put(&config)?;
        self.invalidate_client(&config.org_id);
        tracing::info!(
            org_id = %config.org_id,
            caller_mode = %config.caller_mode,
            "Organization config written"
        );
        Ok(config)
    }

    /// Read a config by org id, or by logical name when no org id is given.
    pub fn read_config(
        &self,
        org_id: Option<&str>,
        logical_name: Option<&str>,
    ) -> Result<OrgConfig, CredentialError> {
        let org_id = org_id.filter(|s| !s.is_empty());
        let logical_name = logical_name.filter(|s| !s.is_empty());

        match (org_id, logical_name) {
            (Some(org_id), _) => self.require_config(org_id),
            (None, Some(logical_name)) => self
                .configs
                .find_by_logical_name(logical_name)?
                .ok_or_else(|| {
                    CredentialError::NotFound(format!(
                        "no configuration found for logical name {}",
                        logical_name
                    ))
                }),
            (None, None) => Err(CredentialError::InvalidArgument(
                "org_id or logical_name must be provided".to_string(),
            )),
        }
    }

    pub fn delete_config(&self, org_id: &str) -> Result<bool, CredentialError> {
        let existed = self.configs.delete(org_id)?;
        self.invalidate_client(org_id);
        if existed {
            tracing::info!(org_id = %org_id, "Organization config deleted");
        }
        Ok(existed)
    }

    pub fn list_configs(&self) -> Result<Vec<OrgConfig>, CredentialError> {
        let mut configs = Vec::new();
        for org_id in self.configs.list()? {
            if let Some(config) = self.configs.get(&org_id)? {
                configs.push(config);
            }
        }
        Ok(configs)
    }

    // ─── Role policy ─────────────────────────────────────────────────────

    /// Create or update a role policy. The stored policy is always clamped.
    pub fn write_role(&self, write: RoleWrite) -> Result<RoleWriteOutcome, CredentialError> {
        validate_segment("org_id", &write.org_id)?;
        let role_name = normalize_role(&write.role_name)?;

        let policy = match self.roles.get(&write.org_id, &role_name)? {
            Some(mut policy) => {
                if let Some(role_id) = write.role_id {
                    policy.role_id = role_id;
                }
                if let Some(ttl) = write.ttl {
                    policy.ttl = ttl;
                }
                if let Some(max_ttl) = write.max_ttl {
                    policy.max_ttl = max_ttl;
                }
                policy
            }
            None => RolePolicy {
                org_id: write.org_id,
                role_name,
                role_id: required("role_id", write.role_id)?,
                ttl: write.ttl.unwrap_or_default(),
                max_ttl: write.max_ttl.unwrap_or_default(),
            },
        };

        let (policy, warnings) = self.roles.put(policy)?;
        Ok(RoleWriteOutcome { policy, warnings })
    }

    pub fn read_role(&self, org_id: &str, role_name: &str) -> Result<RolePolicy, CredentialError> {
        let role_name = normalize_role(role_name)?;
        self.roles.get(org_id, &role_name)?.ok_or_else(|| {
            CredentialError::NotFound(format!("role {} not found for org {}", role_name, org_id))
        })
    }

    pub fn delete_role(&self, org_id: &str, role_name: &str) -> Result<bool, CredentialError> {
        let role_name = normalize_role(role_name)?;
        let existed = self.roles.delete(org_id, &role_name)?;
        if existed {
            tracing::info!(org_id = %org_id, role_name = %role_name, "Role policy deleted");
        }
        Ok(existed)
    }

    pub fn list_roles(&self, org_id: Option<&str>) -> Result<Vec<RolePolicy>, CredentialError> {
        Ok(self.roles.list(org_id)?)
    }

    // ─── Issuance ────────────────────────────────────────────────────────

    /// Issue a credential, or hand back a pinned sidecar credential.
    ///
    /// Returns `Ok(None)` when the role has no remote role id yet; that is
    /// a partially provisioned role, not an error.
    pub fn issue(&self, request: &IssueRequest) -> Result<Option<Issued>, CredentialError> {
        let identity = normalize_identity(&request.identity())?;
        let role_name = identity.role_name.clone();

        let config = self.require_config(&request.org_id)?;
        let policy = self.roles.get(&request.org_id, &role_name)?.ok_or_else(|| {
            CredentialError::NotFound(format!(
                "role {} not found for org {}",
                role_name, request.org_id
            ))
        })?;
        let lease = Lease::new(policy.ttl, policy.max_ttl);

        if policy.role_id.is_empty() {
            self.events.emit(LifecycleEvent::IssueSkipped {
                org_id: request.org_id.clone(),
                role_name,
                reason: "role has no remote role id".to_string(),
            });
            return Ok(None);
        }

        let strategy = strategy_for(config.caller_mode);
        let _reservation = strategy
            .reservation_key(&identity)?
            .map(|key| self.issue_locks.lock(&key));

        match strategy.admit(&self.credentials, &identity) {
            Ok(Admission::Issue) => {}
            Ok(Admission::Reuse { record, .. }) => {
                self.events.emit(LifecycleEvent::Reused {
                    org_id: record.org_id.clone(),
                    role_name: record.role_name.clone(),
                    client_id: record.client_id.clone(),
                });
                return Ok(Some(Issued {
                    record,
                    lease,
                    reused: true,
                }));
            }
            Err(CredentialError::Conflict(message)) => {
                self.events.emit(LifecycleEvent::Conflict {
                    org_id: request.org_id.clone(),
                    role_name,
                });
                return Err(CredentialError::Conflict(message));
            }
            Err(e) => return Err(e),
        }

        let client = self.registry.client_for(&config)?;
        let issued = client.issue(&policy.role_id)?;

        let logical_name = match config.caller_mode {
            CallerMode::Standard => identity.logical_name.clone().unwrap_or_default(),
            CallerMode::Sidecar => identity
                .logical_name
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| config.logical_name.clone()),
        };
        let key = strategy.storage_key(&identity, &issued.client_id)?;
        let record = CredentialRecord::new(
            issued.client_id,
            issued.secret,
            request.org_id.clone(),
            issued.roles,
            issued.token,
            issued.generated_on,
            role_name,
            logical_name,
            request.metadata.clone(),
        );
        self.credentials.put(&key, &record)?;

        self.events.emit(LifecycleEvent::Issued {
            org_id: record.org_id.clone(),
            role_name: record.role_name.clone(),
            client_id: record.client_id.clone(),
        });
        Ok(Some(Issued {
            record,
            lease,
            reused: false,
        }))
    }

    // ─── Lookup ──────────────────────────────────────────────────────────

    pub fn read(&self, identity: &CredentialIdentity) -> Result<CredentialRecord, CredentialError> {
        let (_, _, record) = self.locate(identity)?;
        Ok(record)
    }

    fn locate(
        &self,
        identity: &CredentialIdentity,
    ) -> Result<(OrgConfig, String, CredentialRecord), CredentialError> {
        let identity = normalize_identity(identity)?;
        let config = self.require_config(&identity.org_id)?;
        let (key, record) = strategy_for(config.caller_mode).locate(&self.credentials, &identity)?;
        Ok((config, key, record))
    }

    pub fn list_credentials(
        &self,
        org_id: Option<&str>,
    ) -> Result<Vec<CredentialSummary>, CredentialError> {
        Ok(self
            .credentials
            .list(org_id)?
            .iter()
            .map(CredentialRecord::summary)
            .collect())
    }

    // ─── Renewal ─────────────────────────────────────────────────────────

    /// Compute the renewed lease from the role policy as it is now.
    ///
    /// A deleted role is `NotFound`; the host decides what lease to grant.
    pub fn renew(&self, request: &RenewRequest) -> Result<Lease, CredentialError> {
        validate_segment("org_id", &request.org_id)?;
        let role_name = normalize_role(&request.role_name)?;
        let policy = self.roles.get(&request.org_id, &role_name)?.ok_or_else(|| {
            CredentialError::NotFound(format!(
                "role {} not found for org {}",
                role_name, request.org_id
            ))
        })?;

        let renewal_time = self
            .configs
            .get(&request.org_id)?
            .map(|config| config.renewal_time)
            .unwrap_or_default();

        let candidate = if !renewal_time.is_zero() {
            renewal_time
        } else if !policy.ttl.is_zero() {
            policy.ttl
        } else {
            request.current_ttl
        };
        let ttl = candidate.min(policy.max_ttl);

        self.events.emit(LifecycleEvent::Renewed {
            org_id: request.org_id.clone(),
            role_name,
            ttl_secs: ttl.as_secs(),
        });
        Ok(Lease::new(ttl, policy.max_ttl))
    }

    /// Like `renew`, but a missing role degrades to `default_lease` so a
    /// secret never becomes un-renewable because policy bookkeeping lagged.
    /// The flag is true when the default was used.
    pub fn renew_or_default(
        &self,
        request: &RenewRequest,
        default_lease: Duration,
    ) -> Result<(Lease, bool), CredentialError> {
        match self.renew(request) {
            Ok(lease) => Ok((lease, false)),
            Err(CredentialError::NotFound(reason)) => {
                tracing::warn!(
                    org_id = %request.org_id,
                    role_name = %request.role_name,
                    reason = %reason,
                    "Role missing on renewal; granting default lease"
                );
                Ok((Lease::new(default_lease, default_lease), true))
            }
            Err(e) => Err(e),
        }
    }

    // ─── Revocation ──────────────────────────────────────────────────────

    /// Delete the credential remotely, then locally.
    ///
    /// If the remote delete fails the local record is kept, so the revoke
    /// can be retried.
    pub fn revoke(&self, identity: &CredentialIdentity) -> Result<CredentialRecord, CredentialError> {
        let (config, key, record) = self.locate(identity)?;

        let client = self.registry.client_for(&config)?;
        if let Err(e) = client.delete(&record.client_id) {
            self.events.emit(LifecycleEvent::RevokeFailed {
                org_id: record.org_id.clone(),
                client_id: record.client_id.clone(),
                status: e.status(),
            });
            return Err(e.into());
        }

        self.credentials.delete(&key)?;
        self.invalidate_client(&config.org_id);
        self.events.emit(LifecycleEvent::Revoked {
            org_id: record.org_id.clone(),
            client_id: record.client_id.clone(),
        });
        Ok(record)
    }
}

// ─── Validation ──────────────────────────────────────────────────────────────

/// Identifiers end up inside storage keys, so separators are refused.
fn validate_segment(field: &str, value: &str) -> Result<(), CredentialError> {
    if value.trim().is_empty() {
        return Err(CredentialError::InvalidArgument(format!("{} not provided", field)));
    }
    if value.contains([':', '/']) {
        return Err(CredentialError::InvalidArgument(format!(
            "{} must not contain ':' or '/'",
            field
        )));
    }
    Ok(())
}

fn normalize_role(role_name: &str) -> Result<String, CredentialError> {
    validate_segment("role_name", role_name)?;
    Ok(role_name.to_lowercase())
}

/// Role and logical names compare case-insensitively.
fn normalize_identity(
    identity: &CredentialIdentity,
) -> Result<CredentialIdentity, CredentialError> {
    validate_segment("org_id", &identity.org_id)?;
    Ok(CredentialIdentity {
        org_id: identity.org_id.clone(),
        role_name: normalize_role(&identity.role_name)?,
        logical_name: identity.logical_name.as_ref().map(|name| name.to_lowercase()),
        client_id: identity.client_id.clone(),
    })
}

fn required(field: &str, value: Option<String>) -> Result<String, CredentialError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| CredentialError::InvalidArgument(format!("{} not provided", field)))
}

// ─── Tests ───────────────────────────────────────────────────────────────────
