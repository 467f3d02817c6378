// Tollgate — CLI Module
//
// Command-line interface using clap derive macros.
// Subcommand groups: config, role, token, plus serve for the UDS gateway.

mod commands;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::store::{parse_duration, CallerMode};

pub use commands::execute;

/// Tollgate: lease-managed tokens for clientIdSecrets organizations.
#[derive(Parser, Debug)]
#[command(name = "tollgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Override the data directory (default: TOLLGATE_DATA_DIR or the platform data dir).
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage organization connection settings.
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Manage role lease policies.
    #[command(subcommand)]
    Role(RoleCommand),

    /// Issue, inspect, renew, and revoke tokens.
    #[command(subcommand)]
    Token(TokenCommand),

    /// Start the JSON-RPC gateway on a Unix domain socket.
    Serve {
        /// Socket path (default: TOLLGATE_SOCKET or $XDG_RUNTIME_DIR/tollgate/tollgate.sock).
        #[arg(long)]
        socket: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Create or update an organization config.
    Write {
        #[arg(long)]
        org_id: String,

        /// Base URL of the clientIdSecrets API.
        #[arg(long)]
        url: Option<String>,

        /// Organization bearer token.
        /// Prefer the TOLLGATE_AUTH_TOKEN variable to keep it out of shell history.
        #[arg(long, env = "TOLLGATE_AUTH_TOKEN", hide_env_values = true)]
        auth_token: Option<String>,

        #[arg(long)]
        logical_name: Option<String>,

        /// "standard" or "sidecar".
        #[arg(long, value_parser = parse_caller_mode)]
        caller_mode: Option<CallerMode>,

        /// Default renewal lease (e.g. "1h"); "0" clears it.
        #[arg(long, value_parser = parse_duration_arg)]
        renewal_time: Option<Duration>,
    },

    /// Show a config by org id or logical name.
    Read {
        #[arg(long, required_unless_present = "logical_name")]
        org_id: Option<String>,

        #[arg(long)]
        logical_name: Option<String>,
    },

    /// Delete an organization config.
    Delete {
        #[arg(long)]
        org_id: String,
    },

    /// List organization configs.
    List,
}

#[derive(Subcommand, Debug)]
pub enum RoleCommand {
    /// Create or update a role policy.
    Write {
        #[arg(long)]
        org_id: String,

        #[arg(long)]
        role_name: String,

        /// Role identifier on the remote API. Required on create.
        #[arg(long)]
        role_id: Option<String>,

        /// Lease TTL (e.g. "30m"). Clamped to max_ttl.
        #[arg(long, value_parser = parse_duration_arg)]
        ttl: Option<Duration>,

        /// Lease ceiling (e.g. "24h").
        #[arg(long, value_parser = parse_duration_arg)]
        max_ttl: Option<Duration>,
    },

    /// Show a role policy.
    Read {
        #[arg(long)]
        org_id: String,

        #[arg(long)]
        role_name: String,
    },

    /// Delete a role policy.
    Delete {
        #[arg(long)]
        org_id: String,

        #[arg(long)]
        role_name: String,
    },

    /// List role policies.
    List {
        #[arg(long)]
        org_id: Option<String>,
    },
}

/// How a caller names an existing or new credential.
#[derive(Args, Debug, Clone)]
pub struct TokenTarget {
    #[arg(long)]
    pub org_id: String,

    #[arg(long)]
    pub role_name: String,

    /// Logical name (standard callers).
    #[arg(long)]
    pub logical_name: Option<String>,

    /// Issued client id (sidecar callers, or standard lookup fallback).
    #[arg(long)]
    pub client_id: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum TokenCommand {
    /// Issue a token for a role.
    Issue {
        #[command(flatten)]
        target: TokenTarget,

        /// Metadata entries as key=value. Repeatable.
        #[arg(long = "meta", value_parser = parse_key_value)]
        metadata: Vec<(String, String)>,
    },

    /// Show a stored token.
    Read {
        #[command(flatten)]
        target: TokenTarget,
    },

    /// Compute a renewed lease from the current role policy.
    Renew {
        #[arg(long)]
        org_id: String,

        #[arg(long)]
        role_name: String,

        /// Current lease TTL.
        #[arg(long, value_parser = parse_duration_arg, default_value = "0")]
        ttl: Duration,
    },

    /// Revoke a token remotely, then forget it locally.
    Revoke {
        #[command(flatten)]
        target: TokenTarget,
    },

    /// List stored tokens (metadata only, no secrets).
    List {
        #[arg(long)]
        org_id: Option<String>,
    },
}

fn parse_duration_arg(value: &str) -> Result<Duration, String> {
    parse_duration(value).ok_or_else(|| format!("invalid duration '{}'", value))
}

fn parse_caller_mode(value: &str) -> Result<CallerMode, String> {
    CallerMode::parse(value)
        .ok_or_else(|| format!("caller mode must be 'standard' or 'sidecar', got '{}'", value))
}

fn parse_key_value(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, val)) if !key.is_empty() => Ok((key.to_string(), val.to_string())),
        _ => Err(format!("expected key=value, got '{}'", value)),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_token_issue_with_metadata() {
        let cli = Cli::try_parse_from([
            "tollgate", "token", "issue", "--org-id", "o1", "--role-name", "r1",
            "--logical-name", "svc1", "--meta", "team=core", "--meta", "env=prod",
        ])
        .unwrap();

        match cli.command {
            Commands::Token(TokenCommand::Issue { target, metadata }) => {
                assert_eq!(target.org_id, "o1");
                assert_eq!(target.logical_name.as_deref(), Some("svc1"));
                assert_eq!(metadata.len(), 2);
                assert_eq!(metadata[0], ("team".to_string(), "core".to_string()));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_role_write_durations() {
        let cli = Cli::try_parse_from([
            "tollgate", "role", "write", "--org-id", "o1", "--role-name", "r1",
            "--ttl", "10m", "--max-ttl", "5m",
        ])
        .unwrap();

        match cli.command {
            Commands::Role(RoleCommand::Write { ttl, max_ttl, role_id, .. }) => {
                assert_eq!(ttl, Some(Duration::from_secs(600)));
                assert_eq!(max_ttl, Some(Duration::from_secs(300)));
                assert!(role_id.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Cli::try_parse_from([
            "tollgate", "role", "write", "--org-id", "o1", "--role-name", "r1", "--ttl", "soon",
        ])
        .is_err());
        assert!(Cli::try_parse_from([
            "tollgate", "config", "write", "--org-id", "o1", "--caller-mode", "agent",
        ])
        .is_err());
        assert!(Cli::try_parse_from([
            "tollgate", "token", "issue", "--org-id", "o1", "--role-name", "r1", "--meta", "novalue",
        ])
        .is_err());
    }

    #[test]
    fn test_config_read_needs_a_key() {
        assert!(Cli::try_parse_from(["tollgate", "config", "read"]).is_err());
        assert!(Cli::try_parse_from(["tollgate", "config", "read", "--logical-name", "prod"]).is_ok());
    }
}
