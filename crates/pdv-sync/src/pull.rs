//! # Pull Reconciler
//!
//! Mirrors reference entities (payment methods, catalog items, customers)
//! from the backend into the LocalStore, one entity type per call.
//!
//! ## Pull Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      pull(kind)                                         │
//! │                                                                         │
//! │  1. cursor = ChangeCursor.read(local table, tenant)                     │
//! │  2. filter = empresa_id = tenant [+ ativo = true] [+ updated_at > cursor]│
//! │  3. rows   = gateway.select(remote table, filter)                       │
//! │              remote table resolved once per reconciler (see below)      │
//! │                                                                         │
//! │  4. rows empty ─┬─ local cache empty  → NoData (cursor untouched)       │
//! │                 └─ local cache filled → Synced{0,0,0}, advance cursor   │
//! │                                                                         │
//! │  5. one write transaction: decode + upsert every row                    │
//! │     undecodable rows are skipped and counted                            │
//! │  6. commit, then advance cursor to the backend's clock, held just       │
//! │     below the oldest skipped row so it is fetched again                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Remote Table Discovery
//! Payment methods lived under several table names across backend releases.
//! Candidates are probed in order with the real filter; the first one that
//! answers without error wins, even with zero rows, and is cached for the
//! life of the reconciler. A configured name skips probing. If every
//! candidate fails the error names all of them.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use pdv_core::Tenant;
use pdv_db::{LocalStore, ReferenceRepository, ReferenceTable};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use ts_rs::TS;

use crate::config::SyncConfig;
use crate::error::{GatewayError, SyncError, SyncResult};
use crate::gateway::{RemoteBatch, RemoteFilter, RemoteGateway, RemoteRow};
use crate::mapping;

// =============================================================================
// Entity Kind
// =============================================================================

/// Reference entity types pulled from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    PaymentMethods,
    CatalogItems,
    Customers,
}

impl EntityKind {
    /// Pull order used by the orchestrator.
    pub const ALL: [EntityKind; 3] = [
        EntityKind::PaymentMethods,
        EntityKind::CatalogItems,
        EntityKind::Customers,
    ];

    /// Key used in `[sync.remote_tables]`.
    pub fn key(&self) -> &'static str {
        match self {
            EntityKind::PaymentMethods => "payment_methods",
            EntityKind::CatalogItems => "catalog_items",
            EntityKind::Customers => "customers",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::PaymentMethods => "payment methods",
            EntityKind::CatalogItems => "catalog items",
            EntityKind::Customers => "customers",
        }
    }

    pub fn local_table(&self) -> ReferenceTable {
        match self {
            EntityKind::PaymentMethods => ReferenceTable::PaymentMethods,
            EntityKind::CatalogItems => ReferenceTable::CatalogItems,
            EntityKind::Customers => ReferenceTable::Customers,
        }
    }

    /// Remote table names to try, in order.
    pub fn remote_candidates(&self) -> &'static [&'static str] {
        match self {
            EntityKind::PaymentMethods => {
                &["formas_pagamento", "formas_pagamentos", "payment_methods"]
            }
            EntityKind::CatalogItems => &["produtos"],
            EntityKind::Customers => &["clientes"],
        }
    }

    /// Entity-specific predicate added to the tenant filter.
    fn predicate(&self) -> Option<(&'static str, Value)> {
        match self {
            EntityKind::CatalogItems => Some(("ativo", Value::Bool(true))),
            EntityKind::PaymentMethods | EntityKind::Customers => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// Result of one entity pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PullOutcome {
    /// The batch was applied and the cursor advanced (up to the oldest
    /// skipped row, if any).
    Synced {
        fetched: usize,
        upserted: usize,
        skipped: usize,
    },
    /// Nothing came back and nothing was ever mirrored for the tenant.
    ///
    /// Usually a tenant scoping or access-policy problem on the backend.
    NoData,
}

impl PullOutcome {
    pub fn is_no_data(&self) -> bool {
        matches!(self, PullOutcome::NoData)
    }
}

/// Counters of one applied batch, plus what the skipped rows need.
#[derive(Debug, Default)]
struct AppliedBatch {
    upserted: usize,
    skipped: usize,
    newest: Option<DateTime<Utc>>,
    oldest_skipped: Option<DateTime<Utc>>,
    undated_skipped: bool,
}

impl AppliedBatch {
    fn skip(&mut self, updated_at: Option<DateTime<Utc>>) {
        self.skipped += 1;
        match updated_at {
            Some(ts) => {
                self.oldest_skipped = Some(self.oldest_skipped.map_or(ts, |old| old.min(ts)));
            }
            None => self.undated_skipped = true,
        }
    }

    /// Where the cursor may move to. `None` keeps it where it is.
    ///
    /// The cursor filter is `updated_at > cursor`, so holding it one
    /// microsecond below the oldest skipped row fetches that row again. A
    /// skipped row without `updated_at` only comes back on a full fetch.
    fn cursor_limit(&self, server_time: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.undated_skipped {
            return None;
        }
        match self.oldest_skipped {
            Some(oldest) => Some(server_time.min(oldest - Duration::microseconds(1))),
            None => Some(server_time),
        }
    }
}

// =============================================================================
// Pull Reconciler
// =============================================================================

/// Pulls reference data for one tenant.
pub struct PullReconciler {
    store: LocalStore,
    gateway: Arc<dyn RemoteGateway>,
    tenant_id: String,
    /// Configured remote table names.
    overrides: HashMap<EntityKind, String>,
    /// Remote table names found by discovery.
    resolved: Mutex<HashMap<EntityKind, String>>,
}

impl PullReconciler {
    pub fn new(store: LocalStore, gateway: Arc<dyn RemoteGateway>, tenant_id: impl Into<String>) -> Self {
        PullReconciler {
            store,
            gateway,
            tenant_id: tenant_id.into(),
            overrides: HashMap::new(),
            resolved: Mutex::new(HashMap::new()),
        }
    }

    /// Builds a reconciler with the tenant and table overrides of `config`.
    pub fn from_config(store: LocalStore, gateway: Arc<dyn RemoteGateway>, config: &SyncConfig) -> Self {
        let mut reconciler = Self::new(store, gateway, config.tenant_id());
        for kind in EntityKind::ALL {
            if let Some(table) = config.remote_table(kind.key()) {
                reconciler = reconciler.with_remote_table(kind, table);
            }
        }
        reconciler
    }

    /// Pins the remote table of an entity, skipping discovery.
    pub fn with_remote_table(mut self, kind: EntityKind, table: impl Into<String>) -> Self {
        self.overrides.insert(kind, table.into());
        self
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// The remote table currently used for `kind`, if known.
    pub async fn remote_table(&self, kind: EntityKind) -> Option<String> {
        if let Some(table) = self.overrides.get(&kind) {
            return Some(table.clone());
        }
        self.resolved.lock().await.get(&kind).cloned()
    }

    // =========================================================================
    // Pull
    // =========================================================================

    /// Pulls one entity type. See the module docs for the protocol.
    ///
    /// Errors abort only this entity type; the caller decides what else runs.
    pub async fn pull(&self, kind: EntityKind) -> SyncResult<PullOutcome> {
        let local_table = kind.local_table();
        let cursor = self
            .store
            .cursors()
            .read(local_table.table_name(), &self.tenant_id)
            .await?;

        let mut filter = RemoteFilter::tenant(&self.tenant_id).updated_after(cursor);
        if let Some((column, value)) = kind.predicate() {
            filter = filter.eq(column, value);
        }

        debug!(entity = %kind, tenant = %self.tenant_id, ?cursor, "Pulling");
        let batch = self.fetch(kind, &filter).await?;
        let fetched = batch.rows.len();

        if batch.rows.is_empty() {
            let cached = self.store.reference().count(local_table, &self.tenant_id).await?;
            if cached == 0 {
                warn!(
                    entity = %kind,
                    tenant = %self.tenant_id,
                    "Backend returned no rows and nothing is cached; check tenant scoping"
                );
                return Ok(PullOutcome::NoData);
            }

            self.advance_cursor(kind, batch.server_time.unwrap_or_else(Utc::now)).await?;
            debug!(entity = %kind, cached, "Nothing new");
            return Ok(PullOutcome::Synced {
                fetched: 0,
                upserted: 0,
                skipped: 0,
            });
        }

        let fallback_time = batch.server_time.unwrap_or_else(Utc::now);
        let applied = self.apply(kind, &batch.rows, fallback_time).await?;

        let server_time = batch
            .server_time
            .or(applied.newest)
            .unwrap_or_else(Utc::now);
        match applied.cursor_limit(server_time) {
            Some(limit) => self.advance_cursor(kind, limit).await?,
            None => warn!(
                entity = %kind,
                skipped = applied.skipped,
                "Skipped row has no updated_at, cursor kept"
            ),
        }

        info!(
            entity = %kind,
            fetched,
            upserted = applied.upserted,
            skipped = applied.skipped,
            "Pull applied"
        );
        Ok(PullOutcome::Synced {
            fetched,
            upserted: applied.upserted,
            skipped: applied.skipped,
        })
    }

    /// Forgets the cursor of `kind` so the next pull fetches everything.
    pub async fn reset_cursor(&self, kind: EntityKind) -> SyncResult<()> {
        self.store
            .cursors()
            .reset(kind.local_table().table_name(), &self.tenant_id)
            .await?;
        Ok(())
    }

    /// Decodes and upserts a batch in one write transaction.
    async fn apply(
        &self,
        kind: EntityKind,
        rows: &[RemoteRow],
        fallback_time: DateTime<Utc>,
    ) -> SyncResult<AppliedBatch> {
        let tenant = self.tenant_id.as_str();
        let mut batch = AppliedBatch::default();

        let mut tx = self.store.begin_write().await?;
        for row in rows {
            let applied = match kind {
                EntityKind::CatalogItems => match mapping::catalog_item(row, tenant, fallback_time) {
                    Ok(item) => Some((
                        item.updated_at,
                        ReferenceRepository::upsert_catalog_item_in(tx.conn(), &item).await?,
                    )),
                    Err(reason) => {
                        warn!(entity = %kind, %reason, "Skipping remote row");
                        None
                    }
                },
                EntityKind::Customers => match mapping::customer(row, tenant, fallback_time) {
                    Ok(customer) => Some((
                        customer.updated_at,
                        ReferenceRepository::upsert_customer_in(tx.conn(), &customer).await?,
                    )),
                    Err(reason) => {
                        warn!(entity = %kind, %reason, "Skipping remote row");
                        None
                    }
                },
                EntityKind::PaymentMethods => match mapping::payment_method(row, tenant, fallback_time) {
                    Ok(method) => Some((
                        method.updated_at,
                        ReferenceRepository::upsert_payment_method_in(tx.conn(), &method).await?,
                    )),
                    Err(reason) => {
                        warn!(entity = %kind, %reason, "Skipping remote row");
                        None
                    }
                },
            };

            match applied {
                Some((updated_at, affected)) => {
                    // affected == 0: the local copy is newer (last write wins)
                    if affected > 0 {
                        batch.upserted += 1;
                    }
                    batch.newest = batch.newest.max(Some(updated_at));
                }
                None => batch.skip(mapping::row_updated_at(row)),
            }
        }
        tx.commit().await?;

        Ok(batch)
    }

    async fn advance_cursor(&self, kind: EntityKind, server_time: DateTime<Utc>) -> SyncResult<()> {
        self.store
            .cursors()
            .advance(kind.local_table().table_name(), &self.tenant_id, server_time)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Remote Table Resolution
    // =========================================================================

    /// Selects from the remote table of `kind`, discovering it if needed.
    async fn fetch(&self, kind: EntityKind, filter: &RemoteFilter) -> SyncResult<RemoteBatch> {
        if let Some(table) = self.remote_table(kind).await {
            return match self.gateway.select(&table, filter).await {
                Ok(batch) => Ok(batch),
                Err(err) => {
                    if matches!(err, GatewayError::TableNotFound { .. })
                        && !self.overrides.contains_key(&kind)
                    {
                        // Probe again next time
                        self.resolved.lock().await.remove(&kind);
                    }
                    Err(err.into())
                }
            };
        }

        let candidates = kind.remote_candidates();
        if let [only] = candidates {
            let batch = self.gateway.select(only, filter).await?;
            self.resolved.lock().await.insert(kind, only.to_string());
            return Ok(batch);
        }

        for candidate in candidates {
            match self.gateway.select(candidate, filter).await {
                Ok(batch) => {
                    info!(entity = %kind, table = %candidate, "Remote table resolved");
                    self.resolved.lock().await.insert(kind, candidate.to_string());
                    return Ok(batch);
                }
                Err(err) if err.is_fatal() => return Err(err.into()),
                Err(err) => {
                    debug!(entity = %kind, table = %candidate, error = %err, "Candidate table failed");
                }
            }
        }

        Err(SyncError::TableDiscoveryFailed {
            entity: kind.label().to_string(),
            tried: candidates.iter().map(|c| c.to_string()).collect(),
        })
    }

    // =========================================================================
    // Tenants
    // =========================================================================

    /// Mirrors the tenants visible to the credential into `empresas`.
    pub async fn refresh_tenants(&self) -> SyncResult<Vec<Tenant>> {
        let remote = self.gateway.accessible_tenants().await?;
        let now = Utc::now();
        let tenants: Vec<Tenant> = remote.iter().map(|t| mapping::tenant(t, now)).collect();

        self.store.tenants().upsert_all(&tenants).await?;
        debug!(count = tenants.len(), "Tenants mirrored");
        Ok(tenants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryGateway;
    use pdv_db::DbConfig;
    use serde_json::json;

    async fn setup() -> (LocalStore, Arc<InMemoryGateway>, PullReconciler) {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let gateway = Arc::new(InMemoryGateway::new());
        let pull = PullReconciler::new(store.clone(), gateway.clone(), "t1");
        (store, gateway, pull)
    }

    #[tokio::test]
    async fn test_catalog_pull_filters_inactive_and_other_tenants() {
        let (store, gateway, pull) = setup().await;
        gateway.put_rows(
            "produtos",
            vec![
                json!({"id": "p1", "empresa_id": "t1", "descricao": "Leite", "preco": 5.49, "ativo": true}),
                json!({"id": "p2", "empresa_id": "t1", "descricao": "Fora de linha", "preco": 1, "ativo": false}),
                json!({"id": "p3", "empresa_id": "t2", "descricao": "Outra loja", "preco": 1, "ativo": true}),
            ],
        );

        let outcome = pull.pull(EntityKind::CatalogItems).await.unwrap();
        assert_eq!(outcome, PullOutcome::Synced { fetched: 1, upserted: 1, skipped: 0 });

        let items = store.reference().catalog_items("t1").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].price_cents, 549);
    }

    #[tokio::test]
    async fn test_malformed_rows_are_skipped() {
        let (_store, gateway, pull) = setup().await;
        gateway.put_rows(
            "clientes",
            vec![
                json!({"id": "c1", "empresa_id": "t1", "nome": "Maria"}),
                json!({"id": "c2", "empresa_id": "t1"}),
            ],
        );

        let outcome = pull.pull(EntityKind::Customers).await.unwrap();
        assert_eq!(outcome, PullOutcome::Synced { fetched: 2, upserted: 1, skipped: 1 });
    }

    #[tokio::test]
    async fn test_undated_skipped_row_keeps_cursor() {
        let (store, gateway, pull) = setup().await;
        gateway.put_rows(
            "clientes",
            vec![
                json!({"id": "c1", "empresa_id": "t1", "nome": "Maria", "updated_at": "2026-03-01T10:00:00Z"}),
                json!({"id": "c2", "empresa_id": "t1"}),
            ],
        );

        pull.pull(EntityKind::Customers).await.unwrap();
        assert_eq!(store.cursors().read("clientes", "t1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_configured_table_skips_discovery() {
        let (_store, gateway, pull) = setup().await;
        let pull = pull.with_remote_table(EntityKind::PaymentMethods, "payment_methods");
        gateway.put_rows(
            "payment_methods",
            vec![json!({"id": "pix", "empresa_id": "t1", "descricao": "PIX"})],
        );

        pull.pull(EntityKind::PaymentMethods).await.unwrap();
        assert_eq!(gateway.select_count("formas_pagamento"), 0);
        assert_eq!(gateway.select_count("payment_methods"), 1);
    }

    #[tokio::test]
    async fn test_discovery_exhausted_names_all_candidates() {
        let (_store, _gateway, pull) = setup().await;

        let err = pull.pull(EntityKind::PaymentMethods).await.unwrap_err();
        match err {
            SyncError::TableDiscoveryFailed { tried, .. } => {
                assert_eq!(tried, vec!["formas_pagamento", "formas_pagamentos", "payment_methods"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_refresh_tenants_mirrors_locally() {
        let (store, gateway, pull) = setup().await;
        gateway.set_tenants(vec![crate::gateway::RemoteTenant {
            id: "t1".into(),
            name: "Mercadinho".into(),
            document: None,
            active: true,
            updated_at: None,
        }]);

        let tenants = pull.refresh_tenants().await.unwrap();
        assert_eq!(tenants.len(), 1);
        assert_eq!(store.tenants().get("t1").await.unwrap().unwrap().name, "Mercadinho");
    }
}
