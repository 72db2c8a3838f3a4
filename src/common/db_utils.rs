use sqlx::{PgPool, Postgres, Transaction};

use crate::common::error::AppError;
use crate::middleware::tenancy::TenantContext;

// ---
// Helper RLS: A "Chave" para o Banco de Dados
// ---
/// Abre uma transação e define `app.tenant_id` (a "chave" das políticas RLS).
/// Toda query do núcleo passa por aqui e ainda filtra `tenant_id` explicitamente.
pub(crate) async fn begin_scoped(
    pool: &PgPool,
    tenant: &TenantContext,
) -> Result<Transaction<'static, Postgres>, AppError> {
    // O operador '?' converte automaticamente sqlx::Error -> AppError::DatabaseError
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT set_config('app.tenant_id', $1, true)")
        .bind(tenant.tenant_id().to_string())
        .execute(&mut *tx)
        .await?;

    Ok(tx)
}

/// `numeric_value_out_of_range` (SQLSTATE 22003): o resultado não cabe na coluna.
pub(crate) fn is_out_of_range(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("22003"))
}

/// Violação de UNIQUE, opcionalmente de uma constraint específica.
pub(crate) fn is_unique_violation(err: &sqlx::Error, constraint: Option<&str>) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if db_err.is_unique_violation() {
            return match constraint {
                Some(name) => db_err.constraint() == Some(name),
                None => true,
            };
        }
    }
    false
}
