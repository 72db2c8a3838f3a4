// src/services/tenancy_service.rs

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::TenantStore,
    middleware::tenancy::TenantContext,
};

/// Converte o identificador bruto de uma requisição em um `TenantContext` verificado.
#[derive(Clone)]
pub struct TenantResolver {
    tenants: Arc<dyn TenantStore>,
}

impl TenantResolver {
    pub fn new(tenants: Arc<dyn TenantStore>) -> Self {
        Self { tenants }
    }

    pub async fn resolve(&self, identifier: Option<&str>) -> Result<TenantContext, AppError> {
        let raw = identifier
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(AppError::TenantIdentifierMissing)?;

        // Um identificador que nem é UUID não corresponde a nenhum tenant
        let tenant_id = Uuid::parse_str(raw).map_err(|_| AppError::TenantNotFound)?;
        self.resolve_id(tenant_id).await
    }

    /// Para quem já tem o UUID em mãos (ex.: metadata de um webhook).
    pub async fn resolve_id(&self, tenant_id: Uuid) -> Result<TenantContext, AppError> {
        let tenant = self
            .tenants
            .find_tenant(tenant_id)
            .await?
            .filter(|t| t.is_active)
            .ok_or(AppError::TenantNotFound)?;

        Ok(TenantContext::verified(&tenant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::MemoryStore, models::tenancy::Tenant};
    use chrono::Utc;

    fn resolver_with(tenant: Tenant) -> TenantResolver {
        let store = MemoryStore::new();
        store.insert_tenant(tenant);
        TenantResolver::new(Arc::new(store))
    }

    fn tenant(is_active: bool) -> Tenant {
        Tenant { id: Uuid::new_v4(), name: "Mercado".into(), is_active, created_at: Utc::now() }
    }

    #[tokio::test]
    async fn test_missing_identifier() {
        let resolver = resolver_with(tenant(true));
        assert!(matches!(resolver.resolve(None).await, Err(AppError::TenantIdentifierMissing)));
        assert!(matches!(resolver.resolve(Some("  ")).await, Err(AppError::TenantIdentifierMissing)));
    }

    #[tokio::test]
    async fn test_unknown_malformed_or_inactive_tenant() {
        let inactive = tenant(false);
        let resolver = resolver_with(inactive.clone());

        assert!(matches!(resolver.resolve(Some("nao-e-uuid")).await, Err(AppError::TenantNotFound)));
        let unknown = Uuid::new_v4().to_string();
        assert!(matches!(resolver.resolve(Some(&unknown)).await, Err(AppError::TenantNotFound)));
        let inactive_id = inactive.id.to_string();
        assert!(matches!(resolver.resolve(Some(&inactive_id)).await, Err(AppError::TenantNotFound)));
    }

    #[tokio::test]
    async fn test_resolves_active_tenant() {
        let active = tenant(true);
        let resolver = resolver_with(active.clone());
        let ctx = resolver.resolve(Some(&active.id.to_string())).await.unwrap();
        assert_eq!(ctx.tenant_id(), active.id);
    }
}
