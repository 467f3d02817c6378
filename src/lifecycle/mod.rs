// Tollgate — Credential Lifecycle Module
//
// The rules for issuing, finding, renewing, and revoking credentials:
// identity keys per caller mode, lease computation against role policy,
// and the ordering that keeps local records consistent with the remote
// API under partial failure.

mod engine;
mod error;
mod events;
mod identity;

pub use engine::{Engine, IssueRequest, Issued, Lease, RenewRequest, RoleWriteOutcome};
pub use error::CredentialError;
pub use events::{EventSink, LifecycleEvent, TracingSink};
pub use identity::{derive_key, fingerprint, strategy_for, Admission, CredentialIdentity, IdentityStrategy};

#[cfg(test)]
pub(crate) use events::RecordingSink;
