// src/services/auth.rs

use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::UserStore,
    middleware::tenancy::TenantContext,
    models::auth::{Actor, Claims},
};

/// Valida o token emitido pelo provedor de identidade e carrega o ator do tenant.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    jwt_secret: String,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, jwt_secret: String) -> Self {
        Self { users, jwt_secret }
    }

    pub async fn authenticate(&self, tenant: &TenantContext, token: &str) -> Result<Actor, AppError> {
        let validation = Validation::default();
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_ref()),
            &validation,
        )
        .map_err(|_| AppError::Unauthenticated)?;
        let claims = token_data.claims;

        // Token de outro tenant: autenticado, mas sem acesso a este
        if !tenant.owns(claims.tenant_id) {
            tracing::warn!(
                "Token do tenant {} usado contra o tenant {}",
                claims.tenant_id,
                tenant.tenant_id()
            );
            return Err(AppError::Forbidden);
        }

        let user = self
            .users
            .find_user(tenant, claims.sub)
            .await?
            .filter(|u| u.is_active)
            .ok_or(AppError::Unauthenticated)?;

        let assignments = self.users.list_assignments(tenant, user.id).await?;

        Ok(Actor { user, assignments })
    }

    /// Emite um token de curta duração (ferramentas internas e testes).
    pub fn create_token(&self, user_id: Uuid, tenant_id: Uuid, ttl: chrono::Duration) -> Result<String, AppError> {
        let now = Utc::now();
        let expires_at = now + ttl;

        let claims = Claims {
            sub: user_id,
            tenant_id,
            exp: expires_at.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        // Usa '?' para um tratamento de erro mais limpo
        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_ref()),
        )?)
    }
}
