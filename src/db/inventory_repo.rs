// src/db/inventory_repo.rs

use async_trait::async_trait;
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::{
        db_utils::{begin_scoped, is_out_of_range},
        error::AppError,
    },
    db::traits::InventoryLedger,
    middleware::tenancy::TenantContext,
    models::inventory::{
        InventoryRecord, MovementNote, StockKey, StockLevels, StockMovement, StockMovementReason,
    },
};

const RECORD_COLUMNS: &str =
    "tenant_id, product_id, location_id, quantity, min_stock, reorder_point, updated_at";

#[derive(Clone)]
pub struct InventoryRepository {
    pool: PgPool,
}

impl InventoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Registra uma movimentação no livro-razão (auditoria), na mesma transação do saldo.
    async fn record_stock_movement<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        key: StockKey,
        quantity_changed: i32,
        note: MovementNote,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO stock_movements (tenant_id, product_id, location_id, quantity_changed, reason, order_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
            .bind(tenant_id)
            .bind(key.product_id)
            .bind(key.location_id)
            .bind(quantity_changed)
            .bind(note.reason)
            .bind(note.order_id)
            .execute(executor)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl InventoryLedger for InventoryRepository {
    async fn get_record(&self, tenant: &TenantContext, key: StockKey) -> Result<Option<InventoryRecord>, AppError> {
        let mut tx = begin_scoped(&self.pool, tenant).await?;

        let record = sqlx::query_as::<_, InventoryRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM inventory WHERE tenant_id = $1 AND product_id = $2 AND location_id = $3"
        ))
            .bind(tenant.tenant_id())
            .bind(key.product_id)
            .bind(key.location_id)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(record)
    }

    async fn reserve_and_decrement(
        &self,
        tenant: &TenantContext,
        key: StockKey,
        amount: i32,
        note: MovementNote,
    ) -> Result<i32, AppError> {
        let mut tx = begin_scoped(&self.pool, tenant).await?;

        // Check-and-set numa única instrução: o WHERE só casa se houver saldo,
        // e o lock de linha do UPDATE serializa baixas concorrentes na mesma chave.
        let remaining: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE inventory
            SET quantity = quantity - $4, updated_at = NOW()
            WHERE tenant_id = $1 AND product_id = $2 AND location_id = $3 AND quantity >= $4
            RETURNING quantity
            "#,
        )
            .bind(tenant.tenant_id())
            .bind(key.product_id)
            .bind(key.location_id)
            .bind(amount)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(remaining) = remaining else {
            let available: Option<i32> = sqlx::query_scalar(
                "SELECT quantity FROM inventory WHERE tenant_id = $1 AND product_id = $2 AND location_id = $3",
            )
                .bind(tenant.tenant_id())
                .bind(key.product_id)
                .bind(key.location_id)
                .fetch_optional(&mut *tx)
                .await?;

            // Nada foi alterado; o drop da transação faz o rollback.
            return Err(AppError::InsufficientStock {
                product_id: key.product_id,
                product_name: None,
                requested: amount,
                available: available.unwrap_or(0),
            });
        };

        self.record_stock_movement(&mut *tx, tenant.tenant_id(), key, -amount, note).await?;
        tx.commit().await?;

        Ok(remaining)
    }

    async fn increment(
        &self,
        tenant: &TenantContext,
        key: StockKey,
        amount: i32,
        note: MovementNote,
    ) -> Result<i32, AppError> {
        let mut tx = begin_scoped(&self.pool, tenant).await?;

        // UPSERT: cria o registro na primeira entrada de estoque.
        let quantity: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO inventory (tenant_id, product_id, location_id, quantity)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id, product_id, location_id)
            DO UPDATE SET
                quantity = inventory.quantity + EXCLUDED.quantity,
                updated_at = NOW()
            RETURNING quantity
            "#,
        )
            .bind(tenant.tenant_id())
            .bind(key.product_id)
            .bind(key.location_id)
            .bind(amount)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if is_out_of_range(&e) {
                    AppError::InvalidQuantity(amount)
                } else {
                    AppError::from(e)
                }
            })?;

        self.record_stock_movement(&mut *tx, tenant.tenant_id(), key, amount, note).await?;
        tx.commit().await?;

        Ok(quantity)
    }

    async fn upsert_levels(
        &self,
        tenant: &TenantContext,
        key: StockKey,
        levels: StockLevels,
    ) -> Result<InventoryRecord, AppError> {
        let mut tx = begin_scoped(&self.pool, tenant).await?;

        // Trava a linha (se existir) para calcular a diferença do ajuste.
        let previous: Option<i32> = sqlx::query_scalar(
            r#"
            SELECT quantity FROM inventory
            WHERE tenant_id = $1 AND product_id = $2 AND location_id = $3
            FOR UPDATE
            "#,
        )
            .bind(tenant.tenant_id())
            .bind(key.product_id)
            .bind(key.location_id)
            .fetch_optional(&mut *tx)
            .await?;

        let record = sqlx::query_as::<_, InventoryRecord>(&format!(
            r#"
            INSERT INTO inventory (tenant_id, product_id, location_id, quantity, min_stock, reorder_point)
            VALUES ($1, $2, $3, $4, COALESCE($5, 0), COALESCE($6, 0))
            ON CONFLICT (tenant_id, product_id, location_id)
            DO UPDATE SET
                quantity = EXCLUDED.quantity,
                -- Níveis omitidos mantêm o valor atual
                min_stock = COALESCE($5, inventory.min_stock),
                reorder_point = COALESCE($6, inventory.reorder_point),
                updated_at = NOW()
            RETURNING {RECORD_COLUMNS}
            "#
        ))
            .bind(tenant.tenant_id())
            .bind(key.product_id)
            .bind(key.location_id)
            .bind(levels.quantity)
            .bind(levels.min_stock)
            .bind(levels.reorder_point)
            .fetch_one(&mut *tx)
            .await?;

        let delta = levels.quantity - previous.unwrap_or(0);
        if delta != 0 {
            self.record_stock_movement(
                &mut *tx,
                tenant.tenant_id(),
                key,
                delta,
                MovementNote::new(StockMovementReason::Adjustment),
            )
                .await?;
        }

        tx.commit().await?;
        Ok(record)
    }

    async fn movements_for_order(&self, tenant: &TenantContext, order_id: Uuid) -> Result<Vec<StockMovement>, AppError> {
        let mut tx = begin_scoped(&self.pool, tenant).await?;

        let movements = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT id, tenant_id, product_id, location_id, quantity_changed, reason, order_id, created_at
            FROM stock_movements
            WHERE tenant_id = $1 AND order_id = $2
            ORDER BY created_at ASC, id ASC
            "#,
        )
            .bind(tenant.tenant_id())
            .bind(order_id)
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(movements)
    }
}
