//! Cash drawer scenarios.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{gateway, store, TENANT};
use pdv_core::{CashMovementKind, CashStatus, CoreError, Money};
use pdv_sync::{CashSessionManager, PushReconciler, SyncError};

fn reais(value: i64) -> Money {
    Money::from_cents(value * 100)
}

#[tokio::test]
async fn test_open_entry_exit_close_balances() {
    let cash = CashSessionManager::new(store().await, TENANT, "pdv-01");

    let opened = cash.open(reais(100)).await.unwrap();
    assert_eq!(opened.session_number, 1);
    cash.record_entry(reais(50), Some("troco")).await.unwrap();
    cash.record_exit(reais(20), Some("sangria")).await.unwrap();

    match cash.status().await.unwrap() {
        CashStatus::Open(session) => {
            assert_eq!(session.opening, reais(100));
            assert_eq!(session.entries, reais(50));
            assert_eq!(session.exits, reais(20));
            assert_eq!(session.expected_balance, reais(130));
        }
        CashStatus::Closed => panic!("session should be open"),
    }

    let closing = cash.close(reais(130)).await.unwrap();
    assert_eq!(closing.expected_balance, reais(130));
    assert_eq!(closing.variance, Money::zero());

    let movements = cash.movements(1).await.unwrap();
    let kinds: Vec<_> = movements.iter().map(|m| m.kind).collect();
    assert_eq!(
        kinds,
        vec![
            CashMovementKind::Opening,
            CashMovementKind::Entry,
            CashMovementKind::Exit,
            CashMovementKind::Closing,
        ]
    );
    assert!(movements.iter().all(|m| !m.session_open));
    assert_eq!(movements[3].variance_cents, Some(0));
    assert_eq!(cash.status().await.unwrap(), CashStatus::Closed);
}

#[tokio::test]
async fn test_close_records_shortage() {
    let cash = CashSessionManager::new(store().await, TENANT, "pdv-01");
    cash.open(reais(100)).await.unwrap();
    cash.record_entry(reais(50), None).await.unwrap();

    let closing = cash.close(Money::from_cents(14_250)).await.unwrap();
    assert_eq!(closing.expected_balance, reais(150));
    assert_eq!(closing.variance, Money::from_cents(-750));
}

#[tokio::test]
async fn test_second_open_fails_and_keeps_first_session() {
    let cash = CashSessionManager::new(store().await, TENANT, "pdv-01");
    let first = cash.open(reais(100)).await.unwrap();

    let err = cash.open(reais(200)).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::Core(CoreError::AlreadyOpen { session_number: 1 })
    ));

    let status = cash.status().await.unwrap();
    assert_eq!(status, CashStatus::Open(first));
    assert_eq!(cash.movements(1).await.unwrap().len(), 1);
    assert!(cash.movements(2).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_status_is_read_only() {
    let store = store().await;
    let cash = CashSessionManager::new(store.clone(), TENANT, "pdv-01");
    cash.open(reais(10)).await.unwrap();

    let before = cash.movements(1).await.unwrap();
    for _ in 0..3 {
        cash.status().await.unwrap();
    }
    let after = cash.movements(1).await.unwrap();
    assert_eq!(after.len(), before.len());
    assert_eq!(after[0].uuid, before[0].uuid);
    assert!(after[0].session_open);
}

#[tokio::test]
async fn test_transitions_push_in_background() {
    let store = store().await;
    let gateway = gateway();
    let push = Arc::new(PushReconciler::new(store.clone(), gateway.clone(), TENANT));
    let cash = CashSessionManager::new(store.clone(), TENANT, "pdv-01").with_background_push(push);

    cash.open(reais(100)).await.unwrap();

    let mut delivered = 0;
    for _ in 0..100 {
        delivered = gateway.rows("movimentos_caixa").len();
        if delivered == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(delivered, 1);
    let row = &gateway.rows("movimentos_caixa")[0];
    assert_eq!(row["tipo"], "ABERTURA");
    assert_eq!(row["valor_centavos"], 10_000);
}

#[tokio::test]
async fn test_background_push_failure_does_not_fail_operation() {
    let store = store().await;
    let gateway = gateway();
    gateway.reject_inserts(
        "movimentos_caixa",
        |_| true,
        pdv_sync::GatewayError::Unavailable("offline".into()),
    );
    let push = Arc::new(PushReconciler::new(store.clone(), gateway.clone(), TENANT));
    let cash = CashSessionManager::new(store.clone(), TENANT, "pdv-01").with_background_push(push);

    cash.open(reais(100)).await.unwrap();
    cash.record_entry(reais(5), None).await.unwrap();
    assert!(cash.status().await.unwrap().is_open());
}
