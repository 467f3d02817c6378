// Tollgate — Store Module
//
// Durable key/value storage plus the typed stores layered on top of it:
// organization configs, role policies, and issued credential records.
// Every typed store speaks JSON into a `Storage` implementation, so the
// engine never cares whether it is backed by SQLite or memory.

mod configs;
mod credentials;
mod db;
mod error;
mod kv;
mod models;
mod roles;

pub use configs::ConfigStore;
pub use credentials::CredentialStore;
pub use db::Database;
pub use error::StoreError;
pub use kv::{MemoryStorage, SqliteStorage, Storage};
pub use models::{
    format_duration, parse_duration, CallerMode, ConfigWrite, CredentialRecord, CredentialSummary,
    OrgConfig, RolePolicy, RoleWrite, DEFAULT_MAX_TTL,
};
pub use roles::RoleStore;
