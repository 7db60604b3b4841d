//! File-backed LocalStore behavior: durability across reopen, migration
//! idempotence and snapshot export.

use pdv_core::{SaleStatus, SyncState};
use pdv_db::migrations::schema_snapshot;
use pdv_db::{DbConfig, DbError, LocalStore, NewSale, NewSaleItem, NewSalePayment};
use serde_json::json;

fn closed_sale(tenant: &str) -> NewSale {
    NewSale {
        tenant_id: tenant.to_string(),
        customer_id: None,
        status: SaleStatus::Closed,
        discount_cents: 0,
        items: vec![NewSaleItem {
            product_id: "p1".into(),
            description: "Arroz Tipo 1 5kg".into(),
            quantity: 1.0,
            unit_price_cents: 2_799,
        }],
        payments: vec![NewSalePayment {
            payment_method_id: "pix".into(),
            amount_cents: 2_799,
            change_cents: 0,
        }],
    }
}

#[tokio::test]
async fn test_writes_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pdv.db");

    let uuid = {
        let store = LocalStore::open(DbConfig::new(&path)).await.unwrap();
        let report = store.last_migration_report().unwrap().clone();
        assert_eq!(report.applied, vec![1, 2, 3, 4, 5]);

        let sale = store.sales().create(closed_sale("t1")).await.unwrap();
        store.close().await;
        sale.uuid
    };

    let store = LocalStore::open(DbConfig::new(&path)).await.unwrap();
    // Nothing left to apply on the second start
    assert!(store.last_migration_report().unwrap().applied.is_empty());

    let sale = store.sales().get_by_uuid(&uuid).await.unwrap().unwrap();
    assert_eq!(sale.sync_state, SyncState::Pending);
    assert_eq!(sale.total_cents, 2_799);
}

#[tokio::test]
async fn test_apply_migrations_twice_keeps_schema() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::open(DbConfig::new(dir.path().join("pdv.db")))
        .await
        .unwrap();

    let before = schema_snapshot(store.pool().unwrap()).await.unwrap();
    let report = store.apply_migrations().await.unwrap();
    let after = schema_snapshot(store.pool().unwrap()).await.unwrap();

    assert!(report.applied.is_empty());
    assert!(report.failed.is_empty());
    assert_eq!(before, after);

    let status = store.migration_status().await.unwrap();
    assert!(status.pending.is_empty());
}

#[tokio::test]
async fn test_export_writes_a_usable_copy() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::open(DbConfig::new(dir.path().join("pdv.db")))
        .await
        .unwrap();
    store.sales().create(closed_sale("t1")).await.unwrap();

    let target = dir.path().join("backup.db");
    store.export_to(&target).await.unwrap();
    assert!(store.export_to(&target).await.is_err());

    let copy = LocalStore::open(DbConfig::new(&target)).await.unwrap();
    let rows = copy
        .query("SELECT COUNT(*) AS n FROM vendas WHERE empresa_id = ?", &[json!("t1")])
        .await
        .unwrap();
    assert_eq!(rows[0]["n"], json!(1));
}

#[tokio::test]
async fn test_generic_surface_requires_initialize() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(DbConfig::new(dir.path().join("pdv.db")));

    assert!(matches!(
        store.sales().pending_push("t1").await,
        Err(DbError::NotInitialized)
    ));
    assert!(matches!(
        store.cursors().read("produtos", "t1").await,
        Err(DbError::NotInitialized)
    ));

    store.initialize().await.unwrap();
    let result = store
        .execute(
            "UPDATE vendas SET sincronizado = ? WHERE empresa_id = ?",
            &[json!(false), json!("t1")],
        )
        .await
        .unwrap();
    assert_eq!(result.rows_affected, 0);
}
