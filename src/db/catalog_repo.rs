// src/db/catalog_repo.rs

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::{db_utils::begin_scoped, error::AppError},
    db::traits::CatalogStore,
    middleware::tenancy::TenantContext,
    models::{
        catalog::{Customer, Product},
        tenancy::Location,
    },
};

// ---
// Catálogo (somente leitura): lojas, produtos e clientes
// ---
#[derive(Clone)]
pub struct CatalogRepository {
    pool: PgPool,
}

impl CatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for CatalogRepository {
    async fn find_location(&self, tenant: &TenantContext, location_id: Uuid) -> Result<Option<Location>, AppError> {
        let mut tx = begin_scoped(&self.pool, tenant).await?;

        let location = sqlx::query_as::<_, Location>(
            r#"
            SELECT id, tenant_id, name, tax_rate, pricing_multiplier, currency, is_active, created_at
            FROM locations
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
            .bind(tenant.tenant_id())
            .bind(location_id)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(location)
    }

    async fn find_product(&self, tenant: &TenantContext, product_id: Uuid) -> Result<Option<Product>, AppError> {
        let mut tx = begin_scoped(&self.pool, tenant).await?;

        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, tenant_id, sku, name, price, location_pricing, created_at
            FROM products
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
            .bind(tenant.tenant_id())
            .bind(product_id)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(product)
    }

    async fn find_customer(&self, tenant: &TenantContext, customer_id: Uuid) -> Result<Option<Customer>, AppError> {
        let mut tx = begin_scoped(&self.pool, tenant).await?;

        let customer = sqlx::query_as::<_, Customer>(
            "SELECT id, tenant_id, name, created_at FROM customers WHERE tenant_id = $1 AND id = $2",
        )
            .bind(tenant.tenant_id())
            .bind(customer_id)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(customer)
    }
}
