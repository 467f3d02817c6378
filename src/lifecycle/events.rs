// Tollgate — Lifecycle events
//
// Observability side-channel. The engine reports what it did through an
// `EventSink`; the default sink turns events into tracing records. Events
// carry identifiers only, never secrets or tokens.

use std::fmt;

/// Something noteworthy the engine did or refused to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Issued {
        org_id: String,
        role_name: String,
        client_id: String,
    },
    Reused {
        org_id: String,
        role_name: String,
        client_id: String,
    },
    /// Issuance preconditions were not met; nothing was issued.
    IssueSkipped {
        org_id: String,
        role_name: String,
        reason: String,
    },
    Conflict {
        org_id: String,
        role_name: String,
    },
    Renewed {
        org_id: String,
        role_name: String,
        ttl_secs: u64,
    },
    Revoked {
        org_id: String,
        client_id: String,
    },
    RevokeFailed {
        org_id: String,
        client_id: String,
        status: Option<u16>,
    },
    ClientInvalidated {
        org_id: String,
    },
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Issued { .. } => "issued",
            Self::Reused { .. } => "reused",
            Self::IssueSkipped { .. } => "issue_skipped",
            Self::Conflict { .. } => "conflict",
            Self::Renewed { .. } => "renewed",
            Self::Revoked { .. } => "revoked",
            Self::RevokeFailed { .. } => "revoke_failed",
            Self::ClientInvalidated { .. } => "client_invalidated",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Receiver for lifecycle events. Must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: LifecycleEvent);
}

/// Default sink: one tracing record per event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: LifecycleEvent) {
        match &event {
            LifecycleEvent::Issued {
                org_id,
                role_name,
                client_id,
            } => tracing::info!(
                org_id = %org_id,
                role_name = %role_name,
                client_id = %client_id,
                "Credential issued"
            ),
            LifecycleEvent::Reused {
                org_id,
                role_name,
                client_id,
            } => tracing::info!(
                org_id = %org_id,
                role_name = %role_name,
                client_id = %client_id,
                "Pinned credential reused"
            ),
            LifecycleEvent::IssueSkipped {
                org_id,
                role_name,
                reason,
            } => tracing::warn!(
                org_id = %org_id,
                role_name = %role_name,
                reason = %reason,
                "Issuance skipped"
            ),
            LifecycleEvent::Conflict { org_id, role_name } => tracing::warn!(
                org_id = %org_id,
                role_name = %role_name,
                "Credential already exists for logical name"
            ),
            LifecycleEvent::Renewed {
                org_id,
                role_name,
                ttl_secs,
            } => tracing::debug!(
                org_id = %org_id,
                role_name = %role_name,
                ttl_secs = *ttl_secs,
                "Lease renewed"
            ),
            LifecycleEvent::Revoked { org_id, client_id } => tracing::info!(
                org_id = %org_id,
                client_id = %client_id,
                "Credential revoked"
            ),
            LifecycleEvent::RevokeFailed {
                org_id,
                client_id,
                status,
            } => tracing::error!(
                org_id = %org_id,
                client_id = %client_id,
                status = ?status,
                "Remote revocation failed; local record kept"
            ),
            LifecycleEvent::ClientInvalidated { org_id } => {
                tracing::debug!(org_id = %org_id, "Remote client invalidated")
            }
        }
    }
}

/// Collects events for assertions.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: parking_lot::Mutex<Vec<LifecycleEvent>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(LifecycleEvent::name).collect()
    }
}

#[cfg(test)]
impl EventSink for RecordingSink {
    fn emit(&self, event: LifecycleEvent) {
        self.events.lock().push(event);
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::default();
        sink.emit(LifecycleEvent::ClientInvalidated {
            org_id: "o1".to_string(),
        });
        sink.emit(LifecycleEvent::Revoked {
            org_id: "o1".to_string(),
            client_id: "c1".to_string(),
        });
        assert_eq!(sink.names(), vec!["client_invalidated", "revoked"]);
    }

    #[test]
    fn test_tracing_sink_accepts_every_event() {
        let sink = TracingSink;
        sink.emit(LifecycleEvent::RevokeFailed {
            org_id: "o1".to_string(),
            client_id: "c1".to_string(),
            status: Some(200),
        });
        sink.emit(LifecycleEvent::Renewed {
            org_id: "o1".to_string(),
            role_name: "r1".to_string(),
            ttl_secs: 300,
        });
    }
}
