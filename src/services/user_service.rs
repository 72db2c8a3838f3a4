// src/services/user_service.rs

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{CatalogStore, UserStore},
    middleware::tenancy::TenantContext,
    models::auth::{Actor, LocationAssignment, UserRole},
    services::access_gate::{AccessGate, Operation},
};

#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserStore>,
    catalog: Arc<dyn CatalogStore>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserStore>, catalog: Arc<dyn CatalogStore>) -> Self {
        Self { users, catalog }
    }

    /// Vincula um usuário a uma loja. Marcar como principal rebaixa o anterior.
    pub async fn assign_location(
        &self,
        tenant: &TenantContext,
        actor: &Actor,
        user_id: Uuid,
        location_id: Uuid,
        role: Option<UserRole>,
        is_primary: bool,
    ) -> Result<Vec<LocationAssignment>, AppError> {
        AccessGate::authorize(Some(actor), Operation::AssignLocations)?;

        self.users
            .find_user(tenant, user_id)
            .await?
            .ok_or(AppError::UserNotFound(user_id))?;
        self.catalog
            .find_location(tenant, location_id)
            .await?
            .ok_or(AppError::LocationNotFound(location_id))?;

        let assignments = self
            .users
            .assign_location(tenant, LocationAssignment { user_id, location_id, role, is_primary })
            .await?;

        tracing::info!(
            "👥 Usuário {} vinculado à loja {} por {} (principal: {})",
            user_id,
            location_id,
            actor.id(),
            is_primary
        );
        Ok(assignments)
    }
}
