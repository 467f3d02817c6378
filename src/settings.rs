// Tollgate — Runtime settings
//
// Resolved once from the environment at startup:
//   TOLLGATE_DATA_DIR           database directory (default: <data dir>/tollgate)
//   TOLLGATE_SOCKET             gateway socket (default: $XDG_RUNTIME_DIR/tollgate/tollgate.sock)
//   TOLLGATE_HTTP_TIMEOUT_SECS  per-call bound on remote requests (default: 30)
//   TOLLGATE_DEFAULT_LEASE      lease granted when a renewal finds no role (default: 24h)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::TollgateError;
use crate::lifecycle::Engine;
use crate::remote::HttpClientFactory;
use crate::store::{parse_duration, Database, SqliteStorage, DEFAULT_MAX_TTL};

const DB_FILE: &str = "tollgate.db";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub socket_path: PathBuf,
    pub http_timeout: Duration,
    pub default_lease: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self, TollgateError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve settings through `lookup`, falling back to defaults for
    /// unset or empty variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, TollgateError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let data_dir = var("TOLLGATE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        let socket_path = var("TOLLGATE_SOCKET").map(PathBuf::from).unwrap_or_else(|| {
            var("XDG_RUNTIME_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join("tollgate")
                .join("tollgate.sock")
        });

        let http_timeout = match var("TOLLGATE_HTTP_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| {
                    TollgateError::Config(format!(
                        "TOLLGATE_HTTP_TIMEOUT_SECS must be a positive integer, got '{}'",
                        raw
                    ))
                })?,
            None => DEFAULT_HTTP_TIMEOUT,
        };

        let default_lease = match var("TOLLGATE_DEFAULT_LEASE") {
            Some(raw) => parse_duration(&raw)
                .filter(|d| !d.is_zero())
                .ok_or_else(|| {
                    TollgateError::Config(format!(
                        "TOLLGATE_DEFAULT_LEASE is not a valid duration: '{}'",
                        raw
                    ))
                })?,
            None => DEFAULT_MAX_TTL,
        };

        Ok(Self {
            data_dir,
            socket_path,
            http_timeout,
            default_lease,
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE)
    }

    /// Open the SQLite store (creating the data directory) and build an
    /// engine that talks to the real remote API.
    pub fn open_engine(&self) -> Result<Engine, TollgateError> {
        std::fs::create_dir_all(&self.data_dir)?;
        let db = Database::open(&self.db_path())?;

        Ok(Engine::new(
            Arc::new(SqliteStorage::new(db)),
            Arc::new(HttpClientFactory::new(self.http_timeout)),
        ))
    }
}

fn default_data_dir() -> PathBuf {
    dirs_next::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tollgate")
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::store::ConfigWrite;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&[("XDG_RUNTIME_DIR", "/run/user/1000")])).unwrap();
        assert_eq!(
            settings.socket_path,
            PathBuf::from("/run/user/1000/tollgate/tollgate.sock")
        );
        assert_eq!(settings.http_timeout, Duration::from_secs(30));
        assert_eq!(settings.default_lease, DEFAULT_MAX_TTL);
        assert!(settings.data_dir.ends_with("tollgate"));
        assert!(settings.db_path().ends_with("tollgate.db"));
    }

    #[test]
    fn test_socket_falls_back_to_tmp() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.socket_path, PathBuf::from("/tmp/tollgate/tollgate.sock"));
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("TOLLGATE_DATA_DIR", "/var/lib/tollgate"),
            ("TOLLGATE_SOCKET", "/run/tg.sock"),
            ("TOLLGATE_HTTP_TIMEOUT_SECS", "5"),
            ("TOLLGATE_DEFAULT_LEASE", "1h30m"),
        ]))
        .unwrap();
        assert_eq!(settings.data_dir, PathBuf::from("/var/lib/tollgate"));
        assert_eq!(settings.socket_path, PathBuf::from("/run/tg.sock"));
        assert_eq!(settings.http_timeout, Duration::from_secs(5));
        assert_eq!(settings.default_lease, Duration::from_secs(5400));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            Settings::from_lookup(lookup(&[("TOLLGATE_HTTP_TIMEOUT_SECS", "soon")])),
            Err(TollgateError::Config(_))
        ));
        assert!(matches!(
            Settings::from_lookup(lookup(&[("TOLLGATE_HTTP_TIMEOUT_SECS", "0")])),
            Err(TollgateError::Config(_))
        ));
        assert!(matches!(
            Settings::from_lookup(lookup(&[("TOLLGATE_DEFAULT_LEASE", "forever")])),
            Err(TollgateError::Config(_))
        ));
    }

    #[test]
    fn test_open_engine_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("nested").to_string_lossy().to_string();
        let settings = Settings::from_lookup(lookup(&[("TOLLGATE_DATA_DIR", data_dir.as_str())])).unwrap();

        settings
            .open_engine()
            .unwrap()
            .write_config(ConfigWrite {
                org_id: "o1".to_string(),
                url: Some("https://api.example.test".to_string()),
                auth_token: Some("bearer".to_string()),
                logical_name: Some("prod".to_string()),
                ..Default::default()
            })
            .unwrap();

        assert!(settings.db_path().exists());
        let reopened = settings.open_engine().unwrap();
        assert_eq!(reopened.list_configs().unwrap().len(), 1);
    }
}
