// src/db/user_repo.rs

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::{db_utils::begin_scoped, error::AppError},
    db::traits::UserStore,
    middleware::tenancy::TenantContext,
    models::auth::{LocationAssignment, User},
};

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn find_user(&self, tenant: &TenantContext, user_id: Uuid) -> Result<Option<User>, AppError> {
        let mut tx = begin_scoped(&self.pool, tenant).await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, tenant_id, email, role, is_active, created_at
            FROM users
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
            .bind(tenant.tenant_id())
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(user)
    }

    async fn list_assignments(
        &self,
        tenant: &TenantContext,
        user_id: Uuid,
    ) -> Result<Vec<LocationAssignment>, AppError> {
        let mut tx = begin_scoped(&self.pool, tenant).await?;

        let assignments = sqlx::query_as::<_, LocationAssignment>(
            r#"
            SELECT user_id, location_id, role, is_primary
            FROM user_locations
            WHERE tenant_id = $1 AND user_id = $2
            ORDER BY is_primary DESC, location_id
            "#,
        )
            .bind(tenant.tenant_id())
            .bind(user_id)
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(assignments)
    }

    async fn assign_location(
        &self,
        tenant: &TenantContext,
        assignment: LocationAssignment,
    ) -> Result<Vec<LocationAssignment>, AppError> {
        let mut tx = begin_scoped(&self.pool, tenant).await?;

        // 1. Rebaixa o primário anterior antes de gravar o novo
        //    (o índice parcial 'ux_user_primary_location' garante no máximo um).
        if assignment.is_primary {
            sqlx::query(
                r#"
                UPDATE user_locations SET is_primary = FALSE
                WHERE tenant_id = $1 AND user_id = $2 AND location_id <> $3 AND is_primary
                "#,
            )
                .bind(tenant.tenant_id())
                .bind(assignment.user_id)
                .bind(assignment.location_id)
                .execute(&mut *tx)
                .await?;
        }

        // 2. UPSERT do vínculo
        sqlx::query(
            r#"
            INSERT INTO user_locations (tenant_id, user_id, location_id, role, is_primary)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, location_id)
            DO UPDATE SET role = EXCLUDED.role, is_primary = EXCLUDED.is_primary
            "#,
        )
            .bind(tenant.tenant_id())
            .bind(assignment.user_id)
            .bind(assignment.location_id)
            .bind(assignment.role)
            .bind(assignment.is_primary)
            .execute(&mut *tx)
            .await?;

        let assignments = sqlx::query_as::<_, LocationAssignment>(
            r#"
            SELECT user_id, location_id, role, is_primary
            FROM user_locations
            WHERE tenant_id = $1 AND user_id = $2
            ORDER BY is_primary DESC, location_id
            "#,
        )
            .bind(tenant.tenant_id())
            .bind(assignment.user_id)
            .fetch_all(&mut *tx)
            .await?;

        // 3. Commit: as duas escritas aparecem juntas ou nenhuma aparece
        tx.commit().await?;
        Ok(assignments)
    }
}
