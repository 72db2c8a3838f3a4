// src/db/payments_repo.rs

use async_trait::async_trait;
use sqlx::PgPool;

use crate::{
    common::{db_utils::begin_scoped, error::AppError},
    db::traits::PaymentLogStore,
    middleware::tenancy::TenantContext,
    models::payments::{CaptureException, NewCaptureException},
};

const EXCEPTION_COLUMNS: &str =
    "id, tenant_id, payment_intent_id, amount, reason, detail, resolved_at, created_at";

#[derive(Clone)]
pub struct PaymentLogRepository {
    pool: PgPool,
}

impl PaymentLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentLogStore for PaymentLogRepository {
    async fn webhook_event_seen(&self, tenant: &TenantContext, event_id: &str) -> Result<bool, AppError> {
        let mut tx = begin_scoped(&self.pool, tenant).await?;

        let seen: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM payment_events WHERE tenant_id = $1 AND event_id = $2)",
        )
            .bind(tenant.tenant_id())
            .bind(event_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(seen)
    }

    async fn record_webhook_event(
        &self,
        tenant: &TenantContext,
        event_id: &str,
        event_type: &str,
        intent_id: Option<&str>,
    ) -> Result<bool, AppError> {
        let mut tx = begin_scoped(&self.pool, tenant).await?;

        let result = sqlx::query(
            r#"
            INSERT INTO payment_events (tenant_id, event_id, event_type, payment_intent_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id, event_id) DO NOTHING
            "#,
        )
            .bind(tenant.tenant_id())
            .bind(event_id)
            .bind(event_type)
            .bind(intent_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() == 1)
    }

    async fn record_capture_exception(
        &self,
        tenant: &TenantContext,
        exception: NewCaptureException,
    ) -> Result<CaptureException, AppError> {
        let mut tx = begin_scoped(&self.pool, tenant).await?;

        let saved = sqlx::query_as::<_, CaptureException>(&format!(
            r#"
            INSERT INTO capture_exceptions (tenant_id, payment_intent_id, amount, reason, detail)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {EXCEPTION_COLUMNS}
            "#
        ))
            .bind(tenant.tenant_id())
            .bind(&exception.payment_intent_id)
            .bind(exception.amount)
            .bind(exception.reason)
            .bind(&exception.detail)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(saved)
    }

    async fn resolve_capture_exceptions(&self, tenant: &TenantContext, intent_id: &str) -> Result<u64, AppError> {
        let mut tx = begin_scoped(&self.pool, tenant).await?;

        let result = sqlx::query(
            r#"
            UPDATE capture_exceptions SET resolved_at = NOW()
            WHERE tenant_id = $1 AND payment_intent_id = $2 AND resolved_at IS NULL
            "#,
        )
            .bind(tenant.tenant_id())
            .bind(intent_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn list_open_capture_exceptions(&self, tenant: &TenantContext) -> Result<Vec<CaptureException>, AppError> {
        let mut tx = begin_scoped(&self.pool, tenant).await?;

        let exceptions = sqlx::query_as::<_, CaptureException>(&format!(
            r#"
            SELECT {EXCEPTION_COLUMNS} FROM capture_exceptions
            WHERE tenant_id = $1 AND resolved_at IS NULL
            ORDER BY created_at ASC
            "#
        ))
            .bind(tenant.tenant_id())
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(exceptions)
    }
}
