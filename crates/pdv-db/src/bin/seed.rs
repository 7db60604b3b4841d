//! # Seed Data Generator
//!
//! Populates a local store with demo data for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./pdv_dev.db with tenant "demo"
//! cargo run -p pdv-db --bin seed
//!
//! # Custom tenant and path
//! cargo run -p pdv-db --bin seed -- --tenant loja-01 --db ./data/pdv.db
//! ```
//!
//! ## Generated Data
//! - One tenant
//! - A small catalog, customers and payment methods (as if pulled)
//! - Two closed sales waiting for push
//! - One cash session opened and closed with zero variance

use chrono::{Local, Utc};
use pdv_core::{
    CashMovementKind, CatalogItem, Customer, PaymentMethod, SaleStatus, SessionLedger, Tenant,
};
use pdv_db::{
    CashMovementRepository, DbConfig, LocalStore, NewCashMovement, NewSale, NewSaleItem,
    NewSalePayment, ReferenceRepository, ReferenceTable,
};
use std::env;
use tracing_subscriber::EnvFilter;

/// (code, barcode, description, unit, price in centavos)
const CATALOG: &[(&str, &str, &str, &str, i64)] = &[
    ("001", "7891000100103", "Leite Integral 1L", "UN", 549),
    ("002", "7896005800010", "Arroz Tipo 1 5kg", "UN", 2_799),
    ("003", "7896102000012", "Feijão Carioca 1kg", "UN", 899),
    ("004", "7894900011517", "Refrigerante Cola 2L", "UN", 1_049),
    ("005", "7891910000197", "Açúcar Refinado 1kg", "UN", 479),
    ("006", "2000000000015", "Pão Francês", "KG", 1_598),
    ("007", "7891149103102", "Café Torrado 500g", "UN", 1_890),
    ("008", "7896036090244", "Óleo de Soja 900ml", "UN", 699),
];

const CUSTOMERS: &[(&str, &str)] = &[
    ("Maria da Silva", "123.456.789-09"),
    ("João Pereira", "987.654.321-00"),
    ("Mercearia Boa Vista Ltda", "12.345.678/0001-95"),
];

const PAYMENT_METHODS: &[(&str, &str, &str)] = &[
    ("dinheiro", "Dinheiro", "dinheiro"),
    ("pix", "PIX", "pix"),
    ("credito", "Cartão de Crédito", "cartao_credito"),
    ("debito", "Cartão de Débito", "cartao_debito"),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut tenant_id = String::from("demo");
    let mut db_path = String::from("./pdv_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--tenant" | "-t" => {
                if i + 1 < args.len() {
                    tenant_id = args[i + 1].clone();
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("PDV Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -t, --tenant <ID>  Tenant id (default: demo)");
                println!("  -d, --db <PATH>    Store file path (default: ./pdv_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 PDV Seed Data Generator");
    println!("==========================");
    println!("Store:  {}", db_path);
    println!("Tenant: {}", tenant_id);
    println!();

    let store = LocalStore::open(DbConfig::new(&db_path)).await?;
    println!("✓ Store initialized");

    let existing = store
        .reference()
        .count(ReferenceTable::CatalogItems, &tenant_id)
        .await?;
    if existing > 0 {
        println!("⚠ Tenant already has {} catalog items", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the store file to regenerate.");
        return Ok(());
    }

    seed_reference(&store, &tenant_id).await?;
    println!(
        "✓ {} catalog items, {} customers, {} payment methods",
        CATALOG.len(),
        CUSTOMERS.len(),
        PAYMENT_METHODS.len()
    );

    seed_sales(&store, &tenant_id).await?;
    println!("✓ 2 closed sales pending push");

    let variance = seed_cash_session(&store, &tenant_id).await?;
    println!("✓ Cash session closed (variance {})", variance);

    println!();
    println!("✓ Seed complete!");
    Ok(())
}

async fn seed_reference(store: &LocalStore, tenant_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let now = Utc::now();

    store
        .tenants()
        .upsert_all(&[Tenant {
            id: tenant_id.to_string(),
            name: "Mercadinho Demonstração".to_string(),
            document: Some("00.000.000/0001-91".to_string()),
            active: true,
            updated_at: now,
        }])
        .await?;

    let mut tx = store.begin_write().await?;

    for (index, (code, barcode, description, unit, price_cents)) in CATALOG.iter().enumerate() {
        let item = CatalogItem {
            id: format!("{tenant_id}-prod-{}", index + 1),
            tenant_id: tenant_id.to_string(),
            code: code.to_string(),
            barcode: Some(barcode.to_string()),
            description: description.to_string(),
            unit: unit.to_string(),
            price_cents: *price_cents,
            active: true,
            updated_at: now,
            synced: true,
        };
        ReferenceRepository::upsert_catalog_item_in(tx.conn(), &item).await?;
    }

    for (index, (name, document)) in CUSTOMERS.iter().enumerate() {
        let customer = Customer {
            id: format!("{tenant_id}-cli-{}", index + 1),
            tenant_id: tenant_id.to_string(),
            name: name.to_string(),
            document: Some(document.to_string()),
            email: None,
            phone: None,
            active: true,
            updated_at: now,
            synced: true,
        };
        ReferenceRepository::upsert_customer_in(tx.conn(), &customer).await?;
    }

    for (id, description, kind) in PAYMENT_METHODS {
        let method = PaymentMethod {
            id: id.to_string(),
            tenant_id: tenant_id.to_string(),
            description: description.to_string(),
            kind: kind.to_string(),
            active: true,
            updated_at: now,
            synced: true,
        };
        ReferenceRepository::upsert_payment_method_in(tx.conn(), &method).await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn seed_sales(store: &LocalStore, tenant_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let item = |index: usize, quantity: f64| {
        let (_, _, description, _, price_cents) = CATALOG[index];
        NewSaleItem {
            product_id: format!("{tenant_id}-prod-{}", index + 1),
            description: description.to_string(),
            quantity,
            unit_price_cents: price_cents,
        }
    };

    store
        .sales()
        .create(NewSale {
            tenant_id: tenant_id.to_string(),
            customer_id: None,
            status: SaleStatus::Closed,
            discount_cents: 0,
            items: vec![item(0, 2.0), item(3, 1.0)],
            payments: vec![NewSalePayment {
                payment_method_id: "dinheiro".to_string(),
                amount_cents: 2_500,
                change_cents: 2_500 - (2 * 549 + 1_049),
            }],
        })
        .await?;

    store
        .sales()
        .create(NewSale {
            tenant_id: tenant_id.to_string(),
            customer_id: Some(format!("{tenant_id}-cli-1")),
            status: SaleStatus::Invoiced,
            discount_cents: 100,
            items: vec![item(1, 1.0), item(5, 0.75)],
            payments: vec![
                NewSalePayment {
                    payment_method_id: "pix".to_string(),
                    amount_cents: 2_000,
                    change_cents: 0,
                },
                NewSalePayment {
                    payment_method_id: "debito".to_string(),
                    // 2799 + round(0.75 * 1598) - 100 discount
                    amount_cents: 2_799 + 1_199 - 100 - 2_000,
                    change_cents: 0,
                },
            ],
        })
        .await?;

    Ok(())
}

async fn seed_cash_session(
    store: &LocalStore,
    tenant_id: &str,
) -> Result<pdv_core::Money, Box<dyn std::error::Error>> {
    let day = Local::now().date_naive();
    let movement = |kind, amount_cents, session_number, description: Option<&str>| NewCashMovement {
        tenant_id: tenant_id.to_string(),
        terminal_id: "pdv-seed".to_string(),
        kind,
        amount_cents,
        description: description.map(str::to_string),
        business_day: day,
        session_number,
        variance_cents: None,
    };

    let mut tx = store.begin_write().await?;
    let conn = tx.conn();

    let number = CashMovementRepository::next_session_number_in(conn, tenant_id, day).await?;
    CashMovementRepository::insert_in(conn, &movement(CashMovementKind::Opening, 10_000, number, None)).await?;
    CashMovementRepository::insert_in(conn, &movement(CashMovementKind::Entry, 5_000, number, Some("Suprimento"))).await?;
    CashMovementRepository::insert_in(conn, &movement(CashMovementKind::Exit, 2_000, number, Some("Sangria"))).await?;

    let rows = CashMovementRepository::session_movements_in(conn, tenant_id, day, number).await?;
    let ledger = SessionLedger::from_movements(&rows)?;
    let counted = ledger.expected_balance();
    let variance = ledger.variance(counted);

    let mut closing = movement(CashMovementKind::Closing, counted.cents(), number, None);
    closing.variance_cents = Some(variance.cents());
    CashMovementRepository::insert_in(conn, &closing).await?;
    CashMovementRepository::close_session_in(conn, tenant_id, day, number).await?;

    tx.commit().await?;
    Ok(variance)
}
