// src/handlers/checkout.rs

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::{auth::AuthenticatedActor, i18n::Locale, tenancy::TenantContext},
    models::{
        orders::{CartItem, CartRequest, OrderWithLines, PaymentMethod},
        payments::IntentHandle,
    },
    services::checkout_service::CheckoutOutcome,
};

// ---
// Validação Customizada
// ---
pub(crate) fn validate_not_negative(val: &Decimal) -> Result<(), ValidationError> {
    if val.is_sign_negative() {
        let mut err = ValidationError::new("range");
        err.add_param("min".into(), &0.0);
        err.message = Some("O valor não pode ser negativo.".into());
        return Err(err);
    }
    Ok(())
}

const IDEMPOTENCY_HEADER: &str = "idempotency-key";
const MAX_IDEMPOTENCY_KEY_LEN: usize = 200;

/// Lê o cabeçalho `Idempotency-Key`; vazio conta como ausente.
pub(crate) fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>, AppError> {
    let Some(raw) = headers.get(IDEMPOTENCY_HEADER) else {
        return Ok(None);
    };
    match raw.to_str().ok().map(str::trim).filter(|k| k.len() <= MAX_IDEMPOTENCY_KEY_LEN) {
        Some("") => Ok(None),
        Some(key) => Ok(Some(key.to_string())),
        None => {
            let mut err = ValidationError::new("length");
            err.add_param("max".into(), &MAX_IDEMPOTENCY_KEY_LEN);
            err.message = Some("A chave de idempotência deve ter até 200 caracteres visíveis.".into());
            let mut errors = ValidationErrors::new();
            errors.add("idempotency_key", err);
            Err(AppError::ValidationError(errors))
        }
    }
}

// ---
// Payloads
// ---

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CheckoutPayload {
    pub location_id: Uuid,
    pub customer_id: Option<Uuid>,
    #[validate(length(min = 1, message = "O carrinho não pode estar vazio."))]
    pub items: Vec<CartItem>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    #[validate(custom(function = "validate_not_negative"))]
    #[schema(example = "2.00")]
    pub discount_amount: Option<Decimal>,
}

impl CheckoutPayload {
    pub fn cart(&self) -> CartRequest {
        CartRequest {
            location_id: self.location_id,
            customer_id: self.customer_id,
            items: self.items.clone(),
            discount_amount: self.discount_amount.unwrap_or(Decimal::ZERO),
        }
    }
}

// ---
// Handlers
// ---

#[utoipa::path(
    post,
    path = "/api/checkout",
    tag = "Checkout",
    request_body = CheckoutPayload,
    responses(
        (status = 201, description = "Venda concluída (dinheiro/carteira digital)", body = OrderWithLines),
        (status = 202, description = "Cartão: intent criado, aguardando pagamento", body = IntentHandle),
        (status = 400, description = "Entrada inválida"),
        (status = 403, description = "Sem permissão ou sem acesso à loja"),
        (status = 404, description = "Loja, cliente ou produto não encontrado"),
        (status = 409, description = "Estoque insuficiente ou loja inativa")
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant"),
        ("idempotency-key" = Option<String>, Header, description = "Repetições com a mesma chave reutilizam o intent do cartão")
    ),
    security(("api_jwt" = []))
)]
pub async fn checkout(
    State(app_state): State<AppState>,
    tenant: TenantContext,
    AuthenticatedActor(actor): AuthenticatedActor,
    locale: Locale,
    headers: HeaderMap,
    Json(payload): Json<CheckoutPayload>,
) -> Result<Response, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::from(e).to_api_error(&locale))?;
    let idempotency_key = idempotency_key(&headers).map_err(|e| e.to_api_error(&locale))?;

    let outcome = app_state
        .checkout_service
        .checkout_with_key(
            &tenant,
            &actor,
            &payload.cart(),
            payload.payment_method,
            idempotency_key.as_deref(),
        )
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(match outcome {
        CheckoutOutcome::Committed(order) => (StatusCode::CREATED, Json(order)).into_response(),
        CheckoutOutcome::PaymentRequired(handle) => (StatusCode::ACCEPTED, Json(handle)).into_response(),
    })
}

#[utoipa::path(
    get,
    path = "/api/orders/{order_id}",
    tag = "Checkout",
    responses(
        (status = 200, description = "Pedido com linhas", body = OrderWithLines),
        (status = 404, description = "Pedido não encontrado")
    ),
    params(
        ("order_id" = Uuid, Path, description = "ID do pedido"),
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_order(
    State(app_state): State<AppState>,
    tenant: TenantContext,
    AuthenticatedActor(actor): AuthenticatedActor,
    locale: Locale,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderWithLines>, ApiError> {
    let order = app_state
        .checkout_service
        .get_order(&tenant, &actor, order_id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(Json(order))
}
