// src/db/orders_repo.rs

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::{
        db_utils::{begin_scoped, is_unique_violation},
        error::AppError,
    },
    db::traits::OrderStore,
    middleware::tenancy::TenantContext,
    models::orders::{Order, OrderDraft, OrderLine, OrderWithLines, PaymentTransition, Settlement},
};

const ORDER_COLUMNS: &str = "id, tenant_id, location_id, customer_id, total_amount, discount_amount, \
    tax_amount, payment_method, status, payment_intent_id, charge_id, payment_status, created_at, updated_at";

const LINE_COLUMNS: &str = "id, tenant_id, order_id, product_id, quantity, unit_price, line_total";

// Índice único parcial (tenant_id, payment_intent_id)
const INTENT_UNIQUE_INDEX: &str = "ux_orders_payment_intent";

#[derive(Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    async fn insert_order(
        &self,
        tenant: &TenantContext,
        draft: &OrderDraft,
        settlement: &Settlement,
    ) -> Result<OrderWithLines, AppError> {
        let mut tx = begin_scoped(&self.pool, tenant).await?;

        // 1. Cabeçalho do pedido (o id já foi reservado pelo rascunho)
        let order = sqlx::query_as::<_, Order>(&format!(
            r#"
            INSERT INTO orders (
                id, tenant_id, location_id, customer_id, total_amount, discount_amount, tax_amount,
                payment_method, status, payment_intent_id, charge_id, payment_status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
            .bind(draft.order_id)
            .bind(tenant.tenant_id())
            .bind(draft.location_id)
            .bind(draft.customer_id)
            .bind(draft.total_amount)
            .bind(draft.discount_amount)
            .bind(draft.tax_amount)
            .bind(settlement.payment_method)
            .bind(settlement.status)
            .bind(settlement.payment_intent_id.as_deref())
            .bind(settlement.charge_id.as_deref())
            .bind(settlement.payment_status)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e, Some(INTENT_UNIQUE_INDEX)) {
                    return AppError::DuplicatePaymentIntent(
                        settlement.payment_intent_id.clone().unwrap_or_default(),
                    );
                }
                e.into()
            })?;

        // 2. Linhas
        let mut lines = Vec::with_capacity(draft.lines.len());
        for (position, line) in draft.lines.iter().enumerate() {
            let saved = sqlx::query_as::<_, OrderLine>(&format!(
                r#"
                INSERT INTO order_lines (tenant_id, order_id, line_number, product_id, quantity, unit_price, line_total)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING {LINE_COLUMNS}
                "#
            ))
                .bind(tenant.tenant_id())
                .bind(order.id)
                .bind(position as i32)
                .bind(line.product_id)
                .bind(line.quantity)
                .bind(line.unit_price)
                .bind(line.line_total)
                .fetch_one(&mut *tx)
                .await?;
            lines.push(saved);
        }

        // 3. Commit: pedido e linhas aparecem juntos
        tx.commit().await?;

        Ok(OrderWithLines { order, lines })
    }

    async fn find_order(&self, tenant: &TenantContext, order_id: Uuid) -> Result<Option<OrderWithLines>, AppError> {
        let mut tx = begin_scoped(&self.pool, tenant).await?;

        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE tenant_id = $1 AND id = $2"
        ))
            .bind(tenant.tenant_id())
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(order) = order else {
            tx.commit().await?;
            return Ok(None);
        };

        let lines = sqlx::query_as::<_, OrderLine>(&format!(
            "SELECT {LINE_COLUMNS} FROM order_lines WHERE tenant_id = $1 AND order_id = $2 ORDER BY line_number"
        ))
            .bind(tenant.tenant_id())
            .bind(order_id)
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(OrderWithLines { order, lines }))
    }

    async fn find_by_intent(&self, tenant: &TenantContext, intent_id: &str) -> Result<Option<Order>, AppError> {
        let mut tx = begin_scoped(&self.pool, tenant).await?;

        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE tenant_id = $1 AND payment_intent_id = $2"
        ))
            .bind(tenant.tenant_id())
            .bind(intent_id)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(order)
    }

    async fn transition_payment(
        &self,
        tenant: &TenantContext,
        order_id: Uuid,
        transition: &PaymentTransition,
    ) -> Result<Option<Order>, AppError> {
        let mut tx = begin_scoped(&self.pool, tenant).await?;

        // Compare-and-swap: 'IS NOT DISTINCT FROM' também casa NULL com NULL.
        let order = sqlx::query_as::<_, Order>(&format!(
            r#"
            UPDATE orders
            SET status = $4, payment_status = $5, charge_id = $6, updated_at = NOW()
            WHERE tenant_id = $1 AND id = $2 AND payment_status IS NOT DISTINCT FROM $3
            RETURNING {ORDER_COLUMNS}
            "#
        ))
            .bind(tenant.tenant_id())
            .bind(order_id)
            .bind(transition.expected)
            .bind(transition.status)
            .bind(transition.payment_status)
            .bind(transition.charge_id.as_deref())
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(order)
    }
}
