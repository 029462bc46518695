//! Tenant registry: metadata for every tenant and where its data lives.
//!
//! Records are served from a `DashMap` so `lookup` never blocks or suspends,
//! which keeps the connection cache's fast path free of I/O. Writes are
//! serialized by an async mutex (uniqueness checks must see a stable view)
//! and are written through the [`TenantStore`] before they become visible.

use std::sync::Arc;

use coursegate_core::messages::{CreateTenantRequest, UpdateTenantRequest};
use coursegate_core::slug::{derive_storage_locator, normalize_identifier};
use coursegate_core::{ClockSource, TenantId, TenantRecord, TenantStatus};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::error::TenantError;
use crate::storage::validate_locator;
use crate::traits::TenantStore;

pub struct TenantRegistry {
    records: DashMap<TenantId, TenantRecord>,
    store: Arc<dyn TenantStore>,
    clock: Arc<dyn ClockSource>,
    locator_prefix: String,
    writes: Mutex<()>,
}

impl TenantRegistry {
    /// Hydrates the registry from `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn load(
        store: Arc<dyn TenantStore>,
        clock: Arc<dyn ClockSource>,
        locator_prefix: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let records = DashMap::new();
        for record in store.load_all().await? {
            records.insert(record.tenant_id.clone(), record);
        }
        info!(tenants = records.len(), "tenant registry loaded");
        Ok(Self {
            records,
            store,
            clock,
            locator_prefix: locator_prefix.into(),
            writes: Mutex::new(()),
        })
    }

    /// Returns the record for `tenant_id`.
    ///
    /// The identifier is normalized first, so `"NGO"` finds tenant `ngo`.
    ///
    /// # Errors
    ///
    /// Returns [`TenantError::NotFound`] for unknown identifiers.
    pub fn lookup(&self, tenant_id: &str) -> Result<TenantRecord, TenantError> {
        let found = self.records.get(tenant_id).map(|r| r.value().clone());
        if let Some(record) = found {
            return Ok(record);
        }
        normalize_identifier(tenant_id)
            .and_then(|id| self.records.get(id.as_str()).map(|r| r.value().clone()))
            .ok_or_else(|| TenantError::NotFound {
                tenant_id: tenant_id.to_string(),
            })
    }

    /// Returns the record for `tenant_id` if the tenant may be served.
    ///
    /// # Errors
    ///
    /// Returns [`TenantError::NotFound`] for unknown identifiers and
    /// [`TenantError::Inactive`] when the status is not `active`.
    pub fn lookup_active(&self, tenant_id: &str) -> Result<TenantRecord, TenantError> {
        let record = self.lookup(tenant_id)?;
        if record.status.is_active() {
            Ok(record)
        } else {
            Err(TenantError::Inactive {
                tenant_id: record.tenant_id,
                status: record.status,
            })
        }
    }

    /// All records, ordered by identifier.
    #[must_use]
    pub fn list(&self) -> Vec<TenantRecord> {
        let mut records: Vec<TenantRecord> =
            self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Creates a tenant in `active` status.
    ///
    /// The identifier is normalized from `tenant_id`, or from `display_name`
    /// when absent. The storage locator defaults to the configured prefix
    /// plus the identifier.
    ///
    /// # Errors
    ///
    /// - [`TenantError::InvalidIdentifier`] if no identifier can be derived,
    ///   the display name is blank, or the locator is unusable
    /// - [`TenantError::Duplicate`] if the identifier, display name, or
    ///   storage locator is already taken
    /// - [`TenantError::Storage`] if persisting the record fails
    pub async fn create(&self, request: CreateTenantRequest) -> Result<TenantRecord, TenantError> {
        let _guard = self.writes.lock().await;

        let display_name = request.display_name.trim().to_string();
        if display_name.is_empty() {
            return Err(TenantError::InvalidIdentifier {
                input: request.display_name,
            });
        }
        let source = request.tenant_id.as_deref().unwrap_or(&display_name);
        let tenant_id = normalize_identifier(source)
            .map(TenantId::new)
            .ok_or_else(|| TenantError::InvalidIdentifier {
                input: source.to_string(),
            })?;

        let storage_locator = request
            .storage_locator
            .unwrap_or_else(|| derive_storage_locator(&self.locator_prefix, tenant_id.as_str()));
        if validate_locator(&storage_locator).is_err() {
            return Err(TenantError::InvalidIdentifier {
                input: storage_locator,
            });
        }

        if self.records.contains_key(&tenant_id) {
            return Err(TenantError::Duplicate {
                tenant_id: tenant_id.to_string(),
            });
        }
        if let Some(existing) = self.find_conflict(&tenant_id, &display_name, &storage_locator) {
            return Err(TenantError::Duplicate {
                tenant_id: existing.to_string(),
            });
        }

        let now = self.clock.now();
        let record = TenantRecord {
            tenant_id: tenant_id.clone(),
            display_name,
            status: TenantStatus::Active,
            storage_locator,
            metadata: request.metadata,
            created_at_ms: now,
            updated_at_ms: now,
        };
        self.store.store(&record).await?;
        self.records.insert(tenant_id, record.clone());

        info!(
            tenant_id = %record.tenant_id,
            locator = %record.storage_locator,
            "tenant created"
        );
        Ok(record)
    }

    /// Applies an administrative update.
    ///
    /// `display_name`, `status`, and `metadata` apply directly. Attempts to
    /// change `tenant_id` or `storage_locator` are ignored.
    ///
    /// # Errors
    ///
    /// - [`TenantError::NotFound`] for unknown identifiers
    /// - [`TenantError::InvalidIdentifier`] for a blank display name
    /// - [`TenantError::Duplicate`] if the new display name is taken
    /// - [`TenantError::Storage`] if persisting the record fails
    pub async fn update(
        &self,
        tenant_id: &str,
        request: UpdateTenantRequest,
    ) -> Result<TenantRecord, TenantError> {
        let _guard = self.writes.lock().await;
        let mut record = self.lookup(tenant_id)?;

        if request.tenant_id.is_some() || request.storage_locator.is_some() {
            debug!(
                tenant_id = %record.tenant_id,
                "ignoring update to immutable tenant fields"
            );
        }

        if let Some(name) = request.display_name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(TenantError::InvalidIdentifier { input: name });
            }
            if let Some(existing) = self.find_conflict(&record.tenant_id, &name, "") {
                return Err(TenantError::Duplicate {
                    tenant_id: existing.to_string(),
                });
            }
            record.display_name = name;
        }
        if let Some(status) = request.status {
            record.status = status;
        }
        if let Some(metadata) = request.metadata {
            record.metadata = metadata;
        }
        record.updated_at_ms = self.clock.now();

        self.store.store(&record).await?;
        self.records.insert(record.tenant_id.clone(), record.clone());

        info!(tenant_id = %record.tenant_id, status = %record.status, "tenant updated");
        Ok(record)
    }

    /// Suspends, deactivates, or reactivates a tenant without touching its store.
    ///
    /// # Errors
    ///
    /// Same as [`update`](Self::update).
    pub async fn set_status(
        &self,
        tenant_id: &str,
        status: TenantStatus,
    ) -> Result<TenantRecord, TenantError> {
        self.update(
            tenant_id,
            UpdateTenantRequest {
                status: Some(status),
                ..UpdateTenantRequest::default()
            },
        )
        .await
    }

    /// Finds another tenant whose display name (case-insensitive) or storage
    /// locator collides. An empty `locator` skips the locator check.
    fn find_conflict(&self, own_id: &TenantId, display_name: &str, locator: &str) -> Option<TenantId> {
        let display_name = display_name.to_lowercase();
        self.records.iter().find_map(|entry| {
            let other = entry.value();
            let name_taken = other.display_name.to_lowercase() == display_name;
            let locator_taken = !locator.is_empty() && other.storage_locator == locator;
            (other.tenant_id != *own_id && (name_taken || locator_taken))
                .then(|| other.tenant_id.clone())
        })
    }
}
