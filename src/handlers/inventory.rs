// src/handlers/inventory.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

// Importa os nossos extratores e erros
use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::{
        auth::AuthenticatedActor, // O ator autenticado
        i18n::Locale,             // O extrator de Idioma
        tenancy::TenantContext,   // O tenant resolvido pelo guardião
    },
    models::inventory::{InventoryRecord, StockKey, StockLevels, TransferResult},
};

// ---
// Payloads
// ---

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpsertLevelsPayload {
    #[validate(range(min = 0, max = 1_000_000, message = "A quantidade deve estar entre 0 e 1.000.000."))]
    #[schema(example = 10)]
    pub quantity: i32,

    // Ausentes = mantém os níveis atuais (0 em registros novos)
    #[validate(range(min = 0, max = 1_000_000, message = "O estoque mínimo deve estar entre 0 e 1.000.000."))]
    pub min_stock: Option<i32>,

    #[validate(range(min = 0, max = 1_000_000, message = "O ponto de reposição deve estar entre 0 e 1.000.000."))]
    pub reorder_point: Option<i32>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RestockPayload {
    pub product_id: Uuid,
    pub location_id: Uuid,
    #[validate(range(min = 1, max = 1_000_000, message = "A quantidade deve estar entre 1 e 1.000.000."))]
    #[schema(example = 5)]
    pub quantity: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RestockResponse {
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TransferPayload {
    pub product_id: Uuid,
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    #[validate(range(min = 1, max = 1_000_000, message = "A quantidade deve estar entre 1 e 1.000.000."))]
    #[schema(example = 3)]
    pub quantity: i32,
}

// ---
// Handler: Consulta de saldo
// ---
#[utoipa::path(
    get,
    path = "/api/inventory/{product_id}/{location_id}",
    tag = "Inventory",
    responses(
        (status = 200, description = "Saldo do produto na loja (0 se não houver registro)", body = InventoryRecord),
        (status = 403, description = "Sem acesso à loja"),
        (status = 404, description = "Produto ou loja não encontrados")
    ),
    params(
        ("product_id" = Uuid, Path, description = "ID do produto"),
        ("location_id" = Uuid, Path, description = "ID da loja"),
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_stock(
    State(app_state): State<AppState>,
    tenant: TenantContext,
    AuthenticatedActor(actor): AuthenticatedActor,
    locale: Locale,
    Path((product_id, location_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<InventoryRecord>, ApiError> {
    let record = app_state
        .inventory_service
        .get_record(&tenant, &actor, StockKey::new(product_id, location_id))
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(Json(record))
}

// ---
// Handler: Ajuste administrativo de níveis
// ---
#[utoipa::path(
    put,
    path = "/api/inventory/{product_id}/{location_id}",
    tag = "Inventory",
    request_body = UpsertLevelsPayload,
    responses(
        (status = 200, description = "Níveis gravados", body = InventoryRecord),
        (status = 400, description = "Valores negativos"),
        (status = 404, description = "Produto ou loja não encontrados")
    ),
    params(
        ("product_id" = Uuid, Path, description = "ID do produto"),
        ("location_id" = Uuid, Path, description = "ID da loja"),
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn upsert_levels(
    State(app_state): State<AppState>,
    tenant: TenantContext,
    AuthenticatedActor(actor): AuthenticatedActor,
    locale: Locale,
    Path((product_id, location_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpsertLevelsPayload>,
) -> Result<Json<InventoryRecord>, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let levels = StockLevels {
        quantity: payload.quantity,
        min_stock: payload.min_stock,
        reorder_point: payload.reorder_point,
    };

    let record = app_state
        .inventory_service
        .upsert_levels(&tenant, &actor, StockKey::new(product_id, location_id), levels)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(Json(record))
}

// ---
// Handler: Reposição (entrada explícita)
// ---
#[utoipa::path(
    post,
    path = "/api/inventory/restock",
    tag = "Inventory",
    request_body = RestockPayload,
    responses(
        (status = 201, description = "Estoque reposto", body = RestockResponse),
        (status = 400, description = "Quantidade inválida")
    ),
    params(("x-tenant-id" = Uuid, Header, description = "ID do Tenant")),
    security(("api_jwt" = []))
)]
pub async fn restock(
    State(app_state): State<AppState>,
    tenant: TenantContext,
    AuthenticatedActor(actor): AuthenticatedActor,
    locale: Locale,
    Json(payload): Json<RestockPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let quantity = app_state
        .inventory_service
        .restock(
            &tenant,
            &actor,
            StockKey::new(payload.product_id, payload.location_id),
            payload.quantity,
        )
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((
        StatusCode::CREATED,
        Json(RestockResponse {
            product_id: payload.product_id,
            location_id: payload.location_id,
            quantity,
        }),
    ))
}

// ---
// Handler: Transferência entre lojas
// ---
#[utoipa::path(
    post,
    path = "/api/inventory/transfers",
    tag = "Inventory",
    request_body = TransferPayload,
    responses(
        (status = 201, description = "Transferência concluída", body = TransferResult),
        (status = 403, description = "Sem acesso a uma das lojas"),
        (status = 409, description = "Estoque insuficiente na origem")
    ),
    params(("x-tenant-id" = Uuid, Header, description = "ID do Tenant")),
    security(("api_jwt" = []))
)]
pub async fn transfer_stock(
    State(app_state): State<AppState>,
    tenant: TenantContext,
    AuthenticatedActor(actor): AuthenticatedActor,
    locale: Locale,
    Json(payload): Json<TransferPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let result = app_state
        .inventory_service
        .transfer(
            &tenant,
            &actor,
            payload.product_id,
            payload.from_location_id,
            payload.to_location_id,
            payload.quantity,
        )
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::CREATED, Json(result)))
}
