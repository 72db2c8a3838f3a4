// src/handlers/users.rs

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    common::error::ApiError,
    config::AppState,
    middleware::{
        auth::AuthenticatedActor,
        i18n::Locale,
        rbac::{PermManageUsers, RequirePermission},
        tenancy::TenantContext,
    },
    models::auth::{LocationAssignment, UserRole},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignLocationPayload {
    // Papel específico da loja; ausente = usa o papel global
    pub role: Option<UserRole>,
    #[serde(default)]
    pub is_primary: bool,
}

#[utoipa::path(
    put,
    path = "/api/users/{user_id}/locations/{location_id}",
    tag = "Users",
    request_body = AssignLocationPayload,
    responses(
        (status = 200, description = "Vínculos atuais do usuário", body = Vec<LocationAssignment>),
        (status = 403, description = "Apenas administradores"),
        (status = 404, description = "Usuário ou loja não encontrados")
    ),
    params(
        ("user_id" = Uuid, Path, description = "ID do usuário"),
        ("location_id" = Uuid, Path, description = "ID da loja"),
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn assign_location(
    State(app_state): State<AppState>,
    tenant: TenantContext,
    AuthenticatedActor(actor): AuthenticatedActor,
    locale: Locale,
    _guard: RequirePermission<PermManageUsers>,
    Path((user_id, location_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<AssignLocationPayload>,
) -> Result<Json<Vec<LocationAssignment>>, ApiError> {
    let assignments = app_state
        .user_service
        .assign_location(&tenant, &actor, user_id, location_id, payload.role, payload.is_primary)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(Json(assignments))
}
