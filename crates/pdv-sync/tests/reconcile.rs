//! Pull and push against the in-memory backend.

mod common;

use chrono::Duration;
use common::{at, closed_sale, gateway, product, store, TENANT};
use pdv_core::SyncState;
use pdv_db::ReferenceTable;
use pdv_sync::{EntityKind, GatewayError, PullOutcome, PullReconciler, PushReconciler, SyncError};
use serde_json::json;

// =============================================================================
// Pull
// =============================================================================

#[tokio::test]
async fn test_repeated_pull_is_idempotent_and_advances_cursor() {
    let store = store().await;
    let gateway = gateway();
    gateway.put_rows(
        "produtos",
        vec![
            product("p1", "Arroz Tipo 1 5kg", 27.99, "2026-03-01T10:00:00Z"),
            product("p2", "Feijão Carioca 1kg", 8.99, "2026-03-02T10:00:00Z"),
        ],
    );
    let pull = PullReconciler::new(store.clone(), gateway.clone(), TENANT);

    let first = pull.pull(EntityKind::CatalogItems).await.unwrap();
    assert_eq!(first, PullOutcome::Synced { fetched: 2, upserted: 2, skipped: 0 });
    let cursor = store.cursors().read("produtos", TENANT).await.unwrap();
    assert_eq!(cursor, Some(at(10, 12)));
    let before = store.reference().catalog_items(TENANT).await.unwrap();

    gateway.advance_clock(Duration::hours(1));
    let second = pull.pull(EntityKind::CatalogItems).await.unwrap();
    assert_eq!(second, PullOutcome::Synced { fetched: 0, upserted: 0, skipped: 0 });

    let after = store.reference().catalog_items(TENANT).await.unwrap();
    assert_eq!(before, after);
    let cursor = store.cursors().read("produtos", TENANT).await.unwrap();
    assert_eq!(cursor, Some(at(10, 13)));
}

#[tokio::test]
async fn test_incremental_pull_fetches_only_newer_rows() {
    let store = store().await;
    let gateway = gateway();
    gateway.put_rows("produtos", vec![product("p1", "Arroz", 27.99, "2026-03-01T10:00:00Z")]);
    let pull = PullReconciler::new(store.clone(), gateway.clone(), TENANT);
    pull.pull(EntityKind::CatalogItems).await.unwrap();

    // Price change on the backend after the last pull
    gateway.upsert_row("produtos", product("p1", "Arroz", 29.90, "2026-03-10T12:30:00Z"));
    gateway.advance_clock(Duration::hours(1));

    let outcome = pull.pull(EntityKind::CatalogItems).await.unwrap();
    assert_eq!(outcome, PullOutcome::Synced { fetched: 1, upserted: 1, skipped: 0 });
    let items = store.reference().catalog_items(TENANT).await.unwrap();
    assert_eq!(items[0].price_cents, 2_990);
}

#[tokio::test]
async fn test_undecodable_row_holds_cursor_until_it_decodes() {
    let store = store().await;
    let gateway = gateway();
    let mut broken = product("p2", "Feijão Carioca 1kg", 8.99, "2026-03-05T10:00:00Z");
    broken.as_object_mut().unwrap().remove("preco");
    gateway.put_rows(
        "produtos",
        vec![product("p1", "Arroz Tipo 1 5kg", 27.99, "2026-03-01T10:00:00Z"), broken],
    );
    let pull = PullReconciler::new(store.clone(), gateway.clone(), TENANT);

    let first = pull.pull(EntityKind::CatalogItems).await.unwrap();
    assert_eq!(first, PullOutcome::Synced { fetched: 2, upserted: 1, skipped: 1 });
    let held = at(5, 10) - Duration::microseconds(1);
    assert_eq!(store.cursors().read("produtos", TENANT).await.unwrap(), Some(held));

    // Unchanged on the backend, yet fetched again
    gateway.advance_clock(Duration::hours(1));
    let second = pull.pull(EntityKind::CatalogItems).await.unwrap();
    assert_eq!(second, PullOutcome::Synced { fetched: 1, upserted: 0, skipped: 1 });
    assert_eq!(store.cursors().read("produtos", TENANT).await.unwrap(), Some(held));

    // Fixed in place without touching updated_at
    gateway.upsert_row("produtos", product("p2", "Feijão Carioca 1kg", 8.99, "2026-03-05T10:00:00Z"));
    let third = pull.pull(EntityKind::CatalogItems).await.unwrap();
    assert_eq!(third, PullOutcome::Synced { fetched: 1, upserted: 1, skipped: 0 });
    assert_eq!(store.cursors().read("produtos", TENANT).await.unwrap(), Some(at(10, 13)));
    assert_eq!(store.reference().catalog_items(TENANT).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_empty_remote_and_empty_cache_is_no_data() {
    let store = store().await;
    let gateway = gateway();
    gateway.create_table("clientes");
    let pull = PullReconciler::new(store.clone(), gateway.clone(), TENANT);

    let outcome = pull.pull(EntityKind::Customers).await.unwrap();
    assert!(outcome.is_no_data());
    // The cursor stays put so the next pull fetches everything again
    assert_eq!(store.cursors().read("clientes", TENANT).await.unwrap(), None);
    assert_eq!(store.reference().count(ReferenceTable::Customers, TENANT).await.unwrap(), 0);
}

#[tokio::test]
async fn test_discovery_accepts_third_candidate_with_zero_rows() {
    let store = store().await;
    let gateway = gateway();
    gateway.fail_select(
        "formas_pagamento",
        GatewayError::Rejected { status: 400, message: "column ativo does not exist".into() },
    );
    gateway.fail_select("formas_pagamentos", GatewayError::TableNotFound { table: "formas_pagamentos".into() });
    gateway.create_table("payment_methods");
    let pull = PullReconciler::new(store.clone(), gateway.clone(), TENANT);

    let outcome = pull.pull(EntityKind::PaymentMethods).await.unwrap();
    assert_eq!(outcome, PullOutcome::NoData);
    assert_eq!(
        pull.remote_table(EntityKind::PaymentMethods).await.as_deref(),
        Some("payment_methods")
    );

    // Resolved once: the failing candidates are not probed again
    pull.pull(EntityKind::PaymentMethods).await.unwrap();
    assert_eq!(gateway.select_count("formas_pagamento"), 1);
    assert_eq!(gateway.select_count("formas_pagamentos"), 1);
    assert_eq!(gateway.select_count("payment_methods"), 2);
}

#[tokio::test]
async fn test_discovery_stops_on_refused_credential() {
    let store = store().await;
    let gateway = gateway();
    gateway.fail_select("formas_pagamento", GatewayError::Unauthorized("JWT expired".into()));
    gateway.create_table("payment_methods");
    let pull = PullReconciler::new(store, gateway.clone(), TENANT);

    let err = pull.pull(EntityKind::PaymentMethods).await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(gateway.select_count("formas_pagamentos"), 0);
    assert_eq!(gateway.select_count("payment_methods"), 0);
}

#[tokio::test]
async fn test_pull_failure_keeps_cursor() {
    let store = store().await;
    let gateway = gateway();
    gateway.fail_select("clientes", GatewayError::Unavailable("connection reset".into()));
    let pull = PullReconciler::new(store.clone(), gateway.clone(), TENANT);

    let err = pull.pull(EntityKind::Customers).await.unwrap_err();
    assert!(matches!(err, SyncError::Gateway(GatewayError::Unavailable(_))));
    assert_eq!(store.cursors().read("clientes", TENANT).await.unwrap(), None);
}

// =============================================================================
// Push
// =============================================================================

#[tokio::test]
async fn test_push_continues_past_invalid_sale() {
    let store = store().await;
    let gateway = gateway();
    let good = store.sales().create(closed_sale(2_799, 2_799)).await.unwrap();
    let bad = store.sales().create(closed_sale(899, 0)).await.unwrap();
    let push = PushReconciler::new(store.clone(), gateway.clone(), TENANT);

    let report = push.push_sales().await.unwrap();
    assert_eq!((report.succeeded, report.failed), (1, 1));
    assert_eq!(report.failed_keys, vec![bad.uuid.clone()]);

    let good = store.sales().get(good.id).await.unwrap().unwrap();
    assert!(good.synced);
    assert_eq!(good.sync_state, SyncState::Synced);
    assert!(good.remote_id.is_some());

    let bad = store.sales().get(bad.id).await.unwrap().unwrap();
    assert!(!bad.synced);
    assert_eq!(bad.sync_state, SyncState::Pending);
    assert_eq!(bad.sync_attempts, 1);
    assert!(bad.sync_error.is_some());
    // Nothing of the invalid sale reached the backend
    assert_eq!(gateway.rows("vendas").len(), 1);
}

#[tokio::test]
async fn test_synced_rows_are_never_pushed_again() {
    let store = store().await;
    let gateway = gateway();
    store.sales().create(closed_sale(2_799, 3_000)).await.unwrap();
    let push = PushReconciler::new(store.clone(), gateway.clone(), TENANT);

    push.push_sales().await.unwrap();
    let inserts = gateway.insert_count("vendas");

    let again = push.push_sales().await.unwrap();
    assert_eq!(again.attempted, 0);
    assert_eq!(gateway.insert_count("vendas"), inserts);
}

#[tokio::test]
async fn test_rejected_child_leaves_sale_partial_and_retry_sends_only_missing() {
    let store = store().await;
    let gateway = gateway();
    let sale = store.sales().create(closed_sale(2_799, 2_799)).await.unwrap();
    gateway.reject_inserts(
        "venda_pagamentos",
        |_| true,
        GatewayError::Rejected { status: 400, message: "forma_pagamento_id unknown".into() },
    );
    let push = PushReconciler::new(store.clone(), gateway.clone(), TENANT);

    let report = push.push_sales().await.unwrap();
    assert_eq!((report.succeeded, report.failed), (0, 1));
    let partial = store.sales().get(sale.id).await.unwrap().unwrap();
    assert_eq!(partial.sync_state, SyncState::Partial);
    assert!(partial.remote_id.is_some());
    assert!(!partial.synced);
    // The accepted line is flagged on its own row, the rejected one is not
    assert!(store.sales().items(sale.id).await.unwrap()[0].synced);
    assert!(!store.sales().payments(sale.id).await.unwrap()[0].synced);

    gateway.clear_failures();
    let report = push.push_sales().await.unwrap();
    assert_eq!(report.succeeded, 1);

    let synced = store.sales().get(sale.id).await.unwrap().unwrap();
    assert_eq!(synced.sync_state, SyncState::Synced);
    assert_eq!(synced.remote_id, partial.remote_id);
    assert!(store.sales().payments(sale.id).await.unwrap()[0].synced);
    // Header and item were not resent
    assert_eq!(gateway.insert_count("vendas"), 1);
    assert_eq!(gateway.insert_count("venda_itens"), 1);
    assert_eq!(gateway.rows("venda_pagamentos").len(), 1);
}

#[tokio::test]
async fn test_duplicate_key_resolves_existing_remote_row() {
    let store = store().await;
    let gateway = gateway();
    let sale = store.sales().create(closed_sale(2_799, 2_799)).await.unwrap();

    // The header landed earlier but the acknowledgement was lost
    gateway.put_rows("vendas", vec![json!({"id": "v-77", "uuid": sale.uuid, "empresa_id": TENANT})]);
    let push = PushReconciler::new(store.clone(), gateway.clone(), TENANT);

    let report = push.push_sales().await.unwrap();
    assert_eq!(report.succeeded, 1);
    let synced = store.sales().get(sale.id).await.unwrap().unwrap();
    assert_eq!(synced.remote_id.as_deref(), Some("v-77"));
    assert_eq!(gateway.rows("vendas").len(), 1);
}

#[tokio::test]
async fn test_unreachable_backend_aborts_batch() {
    let store = store().await;
    let gateway = gateway();
    let first = store.sales().create(closed_sale(2_799, 2_799)).await.unwrap();
    let second = store.sales().create(closed_sale(899, 899)).await.unwrap();
    gateway.reject_inserts("vendas", |_| true, GatewayError::Unavailable("connection refused".into()));
    let push = PushReconciler::new(store.clone(), gateway.clone(), TENANT);

    let err = push.push_sales().await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(gateway.insert_count("vendas"), 1);

    let first = store.sales().get(first.id).await.unwrap().unwrap();
    let second = store.sales().get(second.id).await.unwrap().unwrap();
    assert_eq!(first.sync_attempts, 1);
    assert_eq!(second.sync_attempts, 0);
}
