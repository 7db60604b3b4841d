//! # Remote Row Mapping
//!
//! Translation between backend rows and domain types.
//!
//! Backend tables grew over many releases, so decoding is lenient: several
//! historical column names are accepted, numbers may arrive as text, and a
//! missing `ativo` means active. A row that lacks an identity or a required
//! field is rejected with a reason and skipped by the pull.
//!
//! Push payloads carry the idempotency key (`uuid`) of every row so the
//! backend's unique index can deduplicate retries.

use chrono::{DateTime, Utc};
use pdv_core::{
    timestamp, CashMovement, CatalogItem, Customer, PaymentMethod, Sale, SaleItem, SalePayment,
    Tenant,
};
use serde_json::{json, Value};

use crate::gateway::{remote_id_of, RemoteRow, RemoteTenant};

/// Why a remote row could not be decoded.
pub type DecodeResult<T> = Result<T, String>;

// =============================================================================
// Field Helpers
// =============================================================================

/// First non-null column among `names`, as text.
fn text(row: &RemoteRow, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match row.get(*name)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn required_text(row: &RemoteRow, names: &[&str]) -> DecodeResult<String> {
    text(row, names).ok_or_else(|| format!("missing {}", names.join("/")))
}

fn flag(row: &RemoteRow, name: &str) -> Option<bool> {
    match row.get(name)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "s" | "sim" => Some(true),
            "false" | "f" | "0" | "n" | "nao" | "não" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// `ativo`, defaulting to true when absent or unreadable.
fn active(row: &RemoteRow) -> bool {
    flag(row, "ativo").unwrap_or(true)
}

fn number(row: &RemoteRow, name: &str) -> Option<f64> {
    match row.get(name)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

/// The row's `updated_at`, if present and readable.
pub fn row_updated_at(row: &RemoteRow) -> Option<DateTime<Utc>> {
    row.get("updated_at")
        .and_then(Value::as_str)
        .and_then(timestamp::parse)
}

fn updated_at(row: &RemoteRow, fallback: DateTime<Utc>) -> DateTime<Utc> {
    row_updated_at(row).unwrap_or(fallback)
}

fn identity(row: &RemoteRow) -> DecodeResult<String> {
    remote_id_of(row).ok_or_else(|| "missing id".to_string())
}

/// Price in centavos from `preco_centavos`, or from `preco` in reais.
fn price_cents(row: &RemoteRow) -> DecodeResult<i64> {
    if let Some(cents) = number(row, "preco_centavos") {
        return Ok(cents.round() as i64);
    }
    ["preco", "preco_venda"]
        .iter()
        .find_map(|name| number(row, name))
        .map(|reais| (reais * 100.0).round() as i64)
        .ok_or_else(|| "missing preco".to_string())
}

fn object(value: Value) -> RemoteRow {
    match value {
        Value::Object(map) => map,
        _ => RemoteRow::new(),
    }
}

// =============================================================================
// Pull Decoding
// =============================================================================

pub fn catalog_item(
    row: &RemoteRow,
    tenant_id: &str,
    fallback_time: DateTime<Utc>,
) -> DecodeResult<CatalogItem> {
    let id = identity(row)?;
    let price_cents = price_cents(row)?;
    if price_cents < 0 {
        return Err(format!("negative price {}", price_cents));
    }

    Ok(CatalogItem {
        code: text(row, &["codigo", "codigo_interno"]).unwrap_or_else(|| id.clone()),
        id,
        tenant_id: tenant_id.to_string(),
        barcode: text(row, &["codigo_barras", "ean", "gtin"]),
        description: required_text(row, &["descricao", "nome"])?,
        unit: text(row, &["unidade", "un"]).unwrap_or_else(|| "UN".to_string()),
        price_cents,
        active: active(row),
        updated_at: updated_at(row, fallback_time),
        synced: true,
    })
}

pub fn customer(
    row: &RemoteRow,
    tenant_id: &str,
    fallback_time: DateTime<Utc>,
) -> DecodeResult<Customer> {
    Ok(Customer {
        id: identity(row)?,
        tenant_id: tenant_id.to_string(),
        name: required_text(row, &["nome", "razao_social", "name"])?,
        document: text(row, &["cpf_cnpj", "documento", "cpf", "cnpj"]),
        email: text(row, &["email"]),
        phone: text(row, &["telefone", "celular", "fone"]),
        active: active(row),
        updated_at: updated_at(row, fallback_time),
        synced: true,
    })
}

pub fn payment_method(
    row: &RemoteRow,
    tenant_id: &str,
    fallback_time: DateTime<Utc>,
) -> DecodeResult<PaymentMethod> {
    Ok(PaymentMethod {
        id: identity(row)?,
        tenant_id: tenant_id.to_string(),
        description: required_text(row, &["descricao", "nome", "description"])?,
        kind: text(row, &["tipo", "kind"]).unwrap_or_else(|| "outros".to_string()),
        active: active(row),
        updated_at: updated_at(row, fallback_time),
        synced: true,
    })
}

pub fn tenant(remote: &RemoteTenant, fallback_time: DateTime<Utc>) -> Tenant {
    Tenant {
        id: remote.id.clone(),
        name: if remote.name.is_empty() {
            remote.id.clone()
        } else {
            remote.name.clone()
        },
        document: remote.document.clone(),
        active: remote.active,
        updated_at: remote
            .updated_at
            .as_deref()
            .and_then(timestamp::parse)
            .unwrap_or(fallback_time),
    }
}

// =============================================================================
// Push Encoding
// =============================================================================

pub fn sale_row(sale: &Sale) -> RemoteRow {
    object(json!({
        "uuid": sale.uuid,
        "empresa_id": sale.tenant_id,
        "numero": sale.number,
        "cliente_id": sale.customer_id,
        "status": sale.status.as_str(),
        "subtotal_centavos": sale.subtotal_cents,
        "desconto_centavos": sale.discount_cents,
        "total_centavos": sale.total_cents,
        "created_at": timestamp::format(sale.created_at),
        "updated_at": timestamp::format(sale.updated_at),
    }))
}

pub fn sale_item_row(item: &SaleItem, remote_sale_id: &str) -> RemoteRow {
    object(json!({
        "uuid": item.uuid,
        "empresa_id": item.tenant_id,
        "venda_id": remote_sale_id,
        "produto_id": item.product_id,
        "descricao": item.description,
        "quantidade": item.quantity,
        "preco_unitario_centavos": item.unit_price_cents,
        "total_centavos": item.total_cents,
    }))
}

pub fn sale_payment_row(payment: &SalePayment, remote_sale_id: &str) -> RemoteRow {
    object(json!({
        "uuid": payment.uuid,
        "empresa_id": payment.tenant_id,
        "venda_id": remote_sale_id,
        "forma_pagamento_id": payment.payment_method_id,
        "valor_centavos": payment.amount_cents,
        "troco_centavos": payment.change_cents,
    }))
}

pub fn cash_movement_row(movement: &CashMovement) -> RemoteRow {
    object(json!({
        "uuid": movement.uuid,
        "empresa_id": movement.tenant_id,
        "terminal_id": movement.terminal_id,
        "tipo": movement.kind.as_str(),
        "valor_centavos": movement.amount_cents,
        "descricao": movement.description,
        "data_movimento": movement.business_day.format("%Y-%m-%d").to_string(),
        "caixa_numero": movement.session_number,
        "diferenca_centavos": movement.variance_cents,
        "created_at": timestamp::format(movement.created_at),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(value: Value) -> RemoteRow {
        object(value)
    }

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_catalog_item_defaults() {
        let item = catalog_item(
            &row(json!({"id": 7, "descricao": "Leite Integral 1L", "preco": "5,49"})),
            "t1",
            epoch(),
        )
        .unwrap();

        assert_eq!(item.id, "7");
        assert_eq!(item.code, "7");
        assert_eq!(item.price_cents, 549);
        assert_eq!(item.unit, "UN");
        // Missing ativo never deactivates
        assert!(item.active);
        assert_eq!(item.updated_at, epoch());
    }

    #[test]
    fn test_catalog_item_prefers_centavos_column() {
        let item = catalog_item(
            &row(json!({
                "id": "p1", "descricao": "Arroz", "preco": 1.0, "preco_centavos": 2799,
                "ativo": false, "updated_at": "2026-02-01 10:00:00+00"
            })),
            "t1",
            epoch(),
        )
        .unwrap();
        assert_eq!(item.price_cents, 2_799);
        assert!(!item.active);
        assert_eq!(item.updated_at, Utc.with_ymd_and_hms(2026, 2, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_rows_without_identity_or_required_fields_are_rejected() {
        assert!(catalog_item(&row(json!({"descricao": "x", "preco": 1})), "t1", epoch()).is_err());
        assert!(catalog_item(&row(json!({"id": 1, "preco": 1})), "t1", epoch()).is_err());
        assert!(customer(&row(json!({"id": 1})), "t1", epoch()).is_err());
        assert!(payment_method(&row(json!({"id": "pix", "nome": "PIX"})), "t1", epoch()).is_ok());
    }

    #[test]
    fn test_flag_variants() {
        let r = row(json!({"a": "t", "b": 0, "c": "sim", "d": null}));
        assert_eq!(flag(&r, "a"), Some(true));
        assert_eq!(flag(&r, "b"), Some(false));
        assert_eq!(flag(&r, "c"), Some(true));
        assert_eq!(flag(&r, "d"), None);
    }
}
