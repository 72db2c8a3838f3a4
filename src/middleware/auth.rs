// src/middleware/auth.rs

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, StatusCode},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    typed_header::TypedHeaderRejection,
    TypedHeader,
};

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::{
        i18n::Locale,
        tenancy::tenant_identifier,
    },
    models::auth::Actor,
};

// Extrator para obter o ator autenticado diretamente nos handlers
#[derive(Debug, Clone)]
pub struct AuthenticatedActor(pub Actor);

/// Guardião das rotas do núcleo:
/// 1. resolve o tenant (X-Tenant-ID ou ?tenantId=)
/// 2. valida o Bearer token contra esse tenant
/// 3. coloca `TenantContext` e `AuthenticatedActor` nos "extensions"
pub async fn tenant_guard(
    State(app_state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let locale = Locale::from_headers(request.headers());

    let identifier = tenant_identifier(request.headers(), request.uri());
    let tenant = app_state
        .tenant_resolver
        .resolve(identifier.as_deref())
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    let TypedHeader(Authorization(bearer)) =
        bearer.map_err(|_| AppError::Unauthenticated.to_api_error(&locale))?;

    let actor = app_state
        .auth_service
        .authenticate(&tenant, bearer.token())
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    tracing::debug!("Requisição do usuário {} no tenant {}", actor.id(), tenant.tenant_id());

    request.extensions_mut().insert(tenant);
    request.extensions_mut().insert(AuthenticatedActor(actor));

    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for AuthenticatedActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedActor>()
            .cloned()
            .ok_or(ApiError {
                status: StatusCode::UNAUTHORIZED,
                code: "UNAUTHENTICATED",
                error: "Access token is missing or invalid.".to_string(),
                details: None,
            })
    }
}
