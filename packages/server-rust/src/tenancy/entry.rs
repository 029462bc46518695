//! Cached connection entries with atomic readiness tracking.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use coursegate_core::messages::ActiveConnection;
use coursegate_core::{ReadinessState, TenantId};

use crate::traits::{ConnectionId, TenantConnection};

/// One tenant's live connection as held by the connection cache.
///
/// Entries are only published once ready. A degraded entry is never repaired;
/// the cache replaces it with a fresh entry on the next acquire. State changes
/// use compare-and-set so a stale observer cannot clobber a newer transition.
#[derive(Debug)]
pub struct ConnectionEntry {
    tenant_id: TenantId,
    handle: Arc<dyn TenantConnection>,
    state: AtomicU8,
    created_at: u64,
    last_used: AtomicU64,
}

impl ConnectionEntry {
    /// Wraps a handle whose handshake has completed.
    pub(crate) fn ready(tenant_id: TenantId, handle: Arc<dyn TenantConnection>, now: u64) -> Self {
        Self {
            tenant_id,
            handle,
            state: AtomicU8::new(ReadinessState::Ready.as_u8()),
            created_at: now,
            last_used: AtomicU64::new(now),
        }
    }

    #[must_use]
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    #[must_use]
    pub fn handle(&self) -> &Arc<dyn TenantConnection> {
        &self.handle
    }

    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.handle.id()
    }

    #[must_use]
    pub fn state(&self) -> ReadinessState {
        ReadinessState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == ReadinessState::Ready
    }

    #[must_use]
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    #[must_use]
    pub fn last_used(&self) -> u64 {
        self.last_used.load(Ordering::Relaxed)
    }

    /// Milliseconds since the entry was last handed out.
    #[must_use]
    pub fn idle_millis(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_used())
    }

    /// Records a use. Never moves the timestamp backwards.
    pub(crate) fn touch(&self, now: u64) {
        self.last_used.fetch_max(now, Ordering::Relaxed);
    }

    /// Moves `from` -> `to` only if the entry is still in `from`.
    pub(crate) fn transition(&self, from: ReadinessState, to: ReadinessState) -> bool {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn mark_closed(&self) {
        self.state
            .store(ReadinessState::Closed.as_u8(), Ordering::Release);
    }

    #[must_use]
    pub fn snapshot(&self) -> ActiveConnection {
        ActiveConnection {
            tenant_id: self.tenant_id.clone(),
            state: self.state(),
            last_used: self.last_used(),
            created_at: self.created_at,
            connection_id: Some(self.connection_id().0),
        }
    }
}
