// Tollgate — Data models
//
// SECURITY: credential secrets, issued tokens, and organization bearer
// tokens are never included in Debug output, Display output, or listing
// summaries. Only the explicit issue/read responses carry the token.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Role max TTL applied when none (or zero) is configured.
pub const DEFAULT_MAX_TTL: Duration = Duration::from_secs(24 * 3600);

// ─── Caller mode ─────────────────────────────────────────────────────────────

/// Deployment topology of the callers of an organization.
///
/// `Standard` callers name their credential with a logical name and get at
/// most one per (org, role, name). `Sidecar` callers pin credentials by the
/// remote client id and may hold many per role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallerMode {
    #[default]
    Standard,
    Sidecar,
}

impl CallerMode {
    /// Parse a caller mode, ignoring case. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("standard") {
            Some(Self::Standard)
        } else if value.eq_ignore_ascii_case("sidecar") {
            Some(Self::Sidecar)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Sidecar => "sidecar",
        }
    }
}

impl fmt::Display for CallerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Organization config ─────────────────────────────────────────────────────

/// Connection settings for one tenant organization.
#[derive(Clone, Serialize, Deserialize)]
pub struct OrgConfig {
    pub org_id: String,
    pub url: String,
    /// Organization-level bearer credential. NEVER printed or returned.
    auth_token: String,
    pub logical_name: String,
    #[serde(default)]
    pub caller_mode: CallerMode,
    /// Default lease renew time; zero means unset.
    #[serde(default, with = "humantime_serde")]
    pub renewal_time: Duration,
}

impl OrgConfig {
    pub fn new(
        org_id: String,
        url: String,
        auth_token: String,
        logical_name: String,
        caller_mode: CallerMode,
        renewal_time: Duration,
    ) -> Self {
        Self {
            org_id,
            url,
            auth_token,
            logical_name,
            caller_mode,
            renewal_time,
        }
    }

    /// Access the bearer token used against the remote API.
    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    pub fn set_auth_token(&mut self, token: String) {
        self.auth_token = token;
    }

    /// Public view of the config, without the bearer token.
    pub fn to_response(&self) -> Value {
        json!({
            "org_id": self.org_id,
            "url": self.url,
            "logical_name": self.logical_name,
            "caller_mode": self.caller_mode.as_str(),
            "renewal_time": format_duration(self.renewal_time),
        })
    }
}

impl fmt::Debug for OrgConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrgConfig")
            .field("org_id", &self.org_id)
            .field("url", &self.url)
            .field("auth_token", &"[REDACTED]")
            .field("logical_name", &self.logical_name)
            .field("caller_mode", &self.caller_mode)
            .field("renewal_time", &self.renewal_time)
            .finish()
    }
}

/// Input for creating or updating an organization config.
/// `None` fields keep their stored value on update.
#[derive(Debug, Clone, Default)]
pub struct ConfigWrite {
    pub org_id: String,
    pub url: Option<String>,
    pub auth_token: Option<String>,
    pub logical_name: Option<String>,
    pub caller_mode: Option<CallerMode>,
    pub renewal_time: Option<Duration>,
}

// ─── Role policy ─────────────────────────────────────────────────────────────

/// Lease policy for one role of one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePolicy {
    pub org_id: String,
    pub role_name: String,
    /// Identifier of the role on the remote API. Empty means not provisioned.
    pub role_id: String,
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    #[serde(with = "humantime_serde")]
    pub max_ttl: Duration,
}

impl RolePolicy {
    /// Resolve defaults and clamp `ttl` to `max_ttl`.
    ///
    /// Returns a warning for every adjustment the caller should know about.
    pub fn normalize(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.max_ttl.is_zero() {
            self.max_ttl = DEFAULT_MAX_TTL;
        }
        if self.ttl.is_zero() {
            self.ttl = self.max_ttl;
        }
        if self.ttl > self.max_ttl {
            warnings.push(format!(
                "ttl of {} exceeds max_ttl of {}; ttl clamped to {}",
                format_duration(self.ttl),
                format_duration(self.max_ttl),
                format_duration(self.max_ttl),
            ));
            self.ttl = self.max_ttl;
        }

        warnings
    }

    pub fn to_response(&self) -> Value {
        json!({
            "org_id": self.org_id,
            "role_name": self.role_name,
            "role_id": self.role_id,
            "ttl": format_duration(self.ttl),
            "max_ttl": format_duration(self.max_ttl),
        })
    }
}

/// Input for creating or updating a role policy.
/// `None` fields keep their stored value on update.
#[derive(Debug, Clone, Default)]
pub struct RoleWrite {
    pub org_id: String,
    pub role_name: String,
    pub role_id: Option<String>,
    pub ttl: Option<Duration>,
    pub max_ttl: Option<Duration>,
}

// ─── Credential record ───────────────────────────────────────────────────────

/// An issued token as persisted locally.
/// `secret` and `token` are private; access only via the getters.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub client_id: String,
    secret: String,
    pub org_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
    token: String,
    #[serde(default)]
    pub generated_on: String,
    pub issued_at: DateTime<Utc>,
    pub role_name: String,
    #[serde(default)]
    pub logical_name: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl CredentialRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client_id: String,
        secret: String,
        org_id: String,
        roles: Vec<String>,
        token: String,
        generated_on: String,
        role_name: String,
        logical_name: String,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        let issued_at = DateTime::parse_from_rfc3339(&generated_on)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Self {
            client_id,
            secret,
            org_id,
            roles,
            token,
            generated_on,
            issued_at,
            role_name,
            logical_name,
            metadata,
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Response payload handed back to the caller that owns this credential.
    pub fn to_response(&self) -> Value {
        json!({
            "clientId": self.client_id,
            "orgId": self.org_id,
            "token": self.token,
            "generatedOn": self.generated_on,
            "roleName": self.role_name,
            "logicalName": self.logical_name,
            "metadata": self.metadata,
        })
    }

    pub fn summary(&self) -> CredentialSummary {
        CredentialSummary {
            client_id: self.client_id.clone(),
            org_id: self.org_id.clone(),
            role_name: self.role_name.clone(),
            logical_name: self.logical_name.clone(),
            generated_on: self.generated_on.clone(),
            issued_at: self.issued_at,
            metadata: self.metadata.clone(),
        }
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("client_id", &self.client_id)
            .field("secret", &"[REDACTED]")
            .field("org_id", &self.org_id)
            .field("roles", &self.roles)
            .field("token", &"[REDACTED]")
            .field("generated_on", &self.generated_on)
            .field("issued_at", &self.issued_at)
            .field("role_name", &self.role_name)
            .field("logical_name", &self.logical_name)
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl fmt::Display for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}/{} ({})",
            self.client_id, self.org_id, self.role_name, self.logical_name
        )
    }
}

/// A lightweight view of a credential, used for listing.
/// Never contains the secret or the token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialSummary {
    pub client_id: String,
    pub org_id: String,
    pub role_name: String,
    pub logical_name: String,
    pub generated_on: String,
    pub issued_at: DateTime<Utc>,
    pub metadata: BTreeMap<String, String>,
}

// ─── Durations ───────────────────────────────────────────────────────────────

/// Parse a lease duration such as `"90s"`, `"5m"`, `"1h30m"`, `"2d"` or `"500ms"`.
/// A bare number is read as seconds and an empty string as zero.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return Some(Duration::ZERO);
    }
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    humantime::parse_duration(value).ok()
}

/// Render a duration in the form `parse_duration` reads back, e.g. `"1h 30m"`.
pub fn format_duration(duration: Duration) -> String {
    humantime::format_duration(duration).to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(ttl: u64, max_ttl: u64) -> RolePolicy {
        RolePolicy {
            org_id: "o1".to_string(),
            role_name: "r1".to_string(),
            role_id: "remote-role".to_string(),
            ttl: Duration::from_secs(ttl),
            max_ttl: Duration::from_secs(max_ttl),
        }
    }

    fn record() -> CredentialRecord {
        CredentialRecord::new(
            "client-1".to_string(),
            "shh-secret".to_string(),
            "o1".to_string(),
            vec!["remote-role".to_string()],
            "AstraCS:super-token".to_string(),
            "2024-03-01T10:00:00Z".to_string(),
            "r1".to_string(),
            "svc1".to_string(),
            BTreeMap::new(),
        )
    }

    #[test]
    fn test_caller_mode_parse_ignores_case() {
        assert_eq!(CallerMode::parse("Standard"), Some(CallerMode::Standard));
        assert_eq!(CallerMode::parse("SIDECAR"), Some(CallerMode::Sidecar));
        assert_eq!(CallerMode::parse("bogus"), None);
        assert_eq!(CallerMode::default(), CallerMode::Standard);
    }

    #[test]
    fn test_normalize_clamps_ttl_to_max_ttl() {
        let mut p = policy(600, 300);
        let warnings = p.normalize();
        assert_eq!(p.ttl, Duration::from_secs(300));
        assert_eq!(p.max_ttl, Duration::from_secs(300));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("clamped"));
    }

    #[test]
    fn test_normalize_defaults() {
        let mut p = policy(0, 0);
        assert!(p.normalize().is_empty());
        assert_eq!(p.max_ttl, DEFAULT_MAX_TTL);
        assert_eq!(p.ttl, DEFAULT_MAX_TTL);

        let mut p = policy(0, 120);
        p.normalize();
        assert_eq!(p.ttl, Duration::from_secs(120));
    }

    #[test]
    fn test_parse_duration_forms() {
        assert_eq!(parse_duration(""), Some(Duration::ZERO));
        assert_eq!(parse_duration("0"), Some(Duration::ZERO));
        assert_eq!(parse_duration("45"), Some(Duration::from_secs(45)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h30m"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("2d"), Some(Duration::from_secs(172_800)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("1h 30m"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("5x"), None);
        assert_eq!(parse_duration("1h30"), None);
        assert_eq!(parse_duration("h"), None);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_secs(300)), "5m");
        assert_eq!(format_duration(Duration::from_secs(5430)), "1h 30m 30s");
        assert_eq!(format_duration(DEFAULT_MAX_TTL), "1day");
        for secs in [45, 300, 5430, 172_800] {
            let d = Duration::from_secs(secs);
            assert_eq!(parse_duration(&format_duration(d)), Some(d));
        }
    }

    #[test]
    fn test_record_debug_redacts_secret_and_token() {
        let debug_output = format!("{:?}", record());
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("shh-secret"));
        assert!(!debug_output.contains("super-token"));
    }

    #[test]
    fn test_record_issued_at_follows_generated_on() {
        let rec = record();
        assert_eq!(rec.issued_at.to_rfc3339(), "2024-03-01T10:00:00+00:00");
    }

    #[test]
    fn test_summary_json_has_no_secret_material() {
        let json = serde_json::to_string(&record().summary()).unwrap();
        assert!(!json.contains("shh-secret"));
        assert!(!json.contains("super-token"));
    }

    #[test]
    fn test_org_config_response_hides_auth_token() {
        let config = OrgConfig::new(
            "o1".to_string(),
            "https://api.example.test".to_string(),
            "AstraCS:org-bearer".to_string(),
            "prod".to_string(),
            CallerMode::Sidecar,
            Duration::from_secs(3600),
        );
        let resp = config.to_response().to_string();
        assert!(!resp.contains("org-bearer"));
        assert!(resp.contains("\"caller_mode\":\"sidecar\""));
        assert!(!format!("{:?}", config).contains("org-bearer"));
    }

    #[test]
    fn test_role_policy_json_stores_readable_durations() {
        let json = serde_json::to_value(policy(60, 5400)).unwrap();
        assert_eq!(json["ttl"], "1m");
        assert_eq!(json["max_ttl"], "1h 30m");

        let back: RolePolicy = serde_json::from_value(json).unwrap();
        assert_eq!(back, policy(60, 5400));
    }
}
