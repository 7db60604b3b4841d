//! Fixtures shared by the pdv-sync integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use pdv_core::SaleStatus;
use pdv_db::{DbConfig, LocalStore, NewSale, NewSaleItem, NewSalePayment};
use pdv_sync::{InMemoryGateway, RemoteTenant};
use serde_json::{json, Value};

pub const TENANT: &str = "empresa-01";

pub async fn store() -> LocalStore {
    LocalStore::open(DbConfig::in_memory()).await.unwrap()
}

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
}

/// A gateway where TENANT is accessible and the clock is 2026-03-10 12:00.
pub fn gateway() -> Arc<InMemoryGateway> {
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.set_clock(at(10, 12));
    gateway.set_tenants(vec![RemoteTenant {
        id: TENANT.into(),
        name: "Mercadinho Boa Vista".into(),
        document: Some("12.345.678/0001-95".into()),
        active: true,
        updated_at: None,
    }]);
    gateway
}

pub fn product(id: &str, description: &str, preco: f64, updated_at: &str) -> Value {
    json!({
        "id": id,
        "empresa_id": TENANT,
        "descricao": description,
        "preco": preco,
        "ativo": true,
        "updated_at": updated_at,
    })
}

/// Seeds the three reference tables with one row each.
pub fn seed_reference(gateway: &InMemoryGateway) {
    gateway.put_rows(
        "formas_pagamento",
        vec![json!({"id": "pix", "empresa_id": TENANT, "descricao": "PIX", "tipo": "pix"})],
    );
    gateway.put_rows(
        "produtos",
        vec![product("p1", "Arroz Tipo 1 5kg", 27.99, "2026-03-01T10:00:00Z")],
    );
    gateway.put_rows(
        "clientes",
        vec![json!({"id": "c1", "empresa_id": TENANT, "nome": "Maria da Silva"})],
    );
}

/// A closed single-item sale paid with one payment of `paid_cents`.
pub fn closed_sale(unit_price_cents: i64, paid_cents: i64) -> NewSale {
    NewSale {
        tenant_id: TENANT.to_string(),
        customer_id: None,
        status: SaleStatus::Closed,
        discount_cents: 0,
        items: vec![NewSaleItem {
            product_id: "p1".into(),
            description: "Arroz Tipo 1 5kg".into(),
            quantity: 1.0,
            unit_price_cents,
        }],
        payments: vec![NewSalePayment {
            payment_method_id: "pix".into(),
            amount_cents: paid_cents,
            change_cents: 0,
        }],
    }
}
