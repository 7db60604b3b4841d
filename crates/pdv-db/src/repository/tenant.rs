//! # Tenant Repository
//!
//! Mirror of the tenants (`empresas`) the current credential can access.

use chrono::Utc;
use pdv_core::Tenant;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use crate::pool::LocalStore;

const SELECT_TENANT: &str = r#"
    SELECT id, nome AS name, cnpj AS document, ativo AS active, updated_at
    FROM empresas
"#;

/// Repository for tenant rows.
#[derive(Debug, Clone)]
pub struct TenantRepository {
    store: LocalStore,
}

impl TenantRepository {
    pub fn new(store: LocalStore) -> Self {
        TenantRepository { store }
    }

    /// Upserts every tenant in one transaction. Returns rows written.
    pub async fn upsert_all(&self, tenants: &[Tenant]) -> DbResult<u64> {
        let mut tx = self.store.begin_write().await?;
        let mut written = 0;
        for tenant in tenants {
            written += Self::upsert_in(tx.conn(), tenant).await?;
        }
        tx.commit().await?;

        debug!(count = tenants.len(), written, "Tenants mirrored");
        Ok(written)
    }

    /// Upserts one tenant on an existing connection.
    pub async fn upsert_in(conn: &mut SqliteConnection, tenant: &Tenant) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO empresas (id, nome, cnpj, ativo, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (id) DO UPDATE SET
                nome = excluded.nome,
                cnpj = excluded.cnpj,
                ativo = excluded.ativo,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&tenant.id)
        .bind(&tenant.name)
        .bind(&tenant.document)
        .bind(tenant.active)
        .bind(pdv_core::timestamp::format(tenant.updated_at))
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Tenant>> {
        let sql = format!("{SELECT_TENANT} WHERE id = ?1");
        let tenant = sqlx::query_as::<_, Tenant>(&sql)
            .bind(id)
            .fetch_optional(self.store.pool()?)
            .await?;
        Ok(tenant)
    }

    pub async fn list(&self) -> DbResult<Vec<Tenant>> {
        let sql = format!("{SELECT_TENANT} ORDER BY nome");
        let tenants = sqlx::query_as::<_, Tenant>(&sql)
            .fetch_all(self.store.pool()?)
            .await?;
        Ok(tenants)
    }

    /// Tenant stub used when the backend does not return a name.
    pub fn placeholder(id: &str) -> Tenant {
        Tenant {
            id: id.to_string(),
            name: id.to_string(),
            document: None,
            active: true,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;

    #[tokio::test]
    async fn test_upsert_overwrites_name() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let repo = store.tenants();

        let mut tenant = TenantRepository::placeholder("t1");
        repo.upsert_all(std::slice::from_ref(&tenant)).await.unwrap();

        tenant.name = "Padaria Pão Quente".to_string();
        repo.upsert_all(&[tenant]).await.unwrap();

        let stored = repo.get("t1").await.unwrap().unwrap();
        assert_eq!(stored.name, "Padaria Pão Quente");
        assert!(stored.active);
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }
}
