// src/handlers/payments.rs

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::{
        auth::AuthenticatedActor,
        i18n::Locale,
        rbac::{PermAuditLogs, RequirePermission},
        tenancy::TenantContext,
    },
    models::{
        orders::{CartItem, CartRequest, OrderWithLines},
        payments::{CaptureException, IntentHandle, RefundReason, RefundResult, WebhookEvent},
    },
    handlers::checkout::validate_not_negative,
    services::payment_gateway::verify_webhook_signature,
};

// Cabeçalho de assinatura enviado pelo gateway
pub const PAYMENT_SIGNATURE_HEADER: &str = "stripe-signature";

fn validate_positive(val: &Decimal) -> Result<(), ValidationError> {
    if *val <= Decimal::ZERO {
        let mut err = ValidationError::new("range");
        err.message = Some("O valor deve ser maior que zero.".into());
        return Err(err);
    }
    Ok(())
}

// ---
// Payloads
// ---

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateIntentPayload {
    #[validate(custom(function = "validate_positive"))]
    #[schema(example = "20.00")]
    pub amount: Decimal,
    #[validate(length(equal = 3, message = "A moeda deve ter 3 letras (ISO 4217)."))]
    #[schema(example = "usd")]
    pub currency: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ConfirmPaymentPayload {
    #[serde(alias = "intent_id")]
    #[validate(length(min = 1, message = "O campo 'payment_intent_id' é obrigatório."))]
    pub payment_intent_id: String,
    pub location_id: Uuid,
    pub customer_id: Option<Uuid>,
    #[validate(length(min = 1, message = "O carrinho não pode estar vazio."))]
    pub items: Vec<CartItem>,
    #[serde(default)]
    #[validate(custom(function = "validate_not_negative"))]
    pub discount_amount: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct RefundPayload {
    #[validate(custom(function = "validate_positive"))]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub reason: RefundReason,
}

// ---
// Handlers
// ---

#[utoipa::path(
    post,
    path = "/api/checkout/intent",
    tag = "Payments",
    request_body = CreateIntentPayload,
    responses(
        (status = 201, description = "Intent criado", body = IntentHandle),
        (status = 400, description = "Valor ou moeda inválidos"),
        (status = 502, description = "Falha no gateway")
    ),
    params(("x-tenant-id" = Uuid, Header, description = "ID do Tenant")),
    security(("api_jwt" = []))
)]
pub async fn create_intent(
    State(app_state): State<AppState>,
    tenant: TenantContext,
    AuthenticatedActor(actor): AuthenticatedActor,
    locale: Locale,
    Json(payload): Json<CreateIntentPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::from(e).to_api_error(&locale))?;

    let handle = app_state
        .payment_coordinator
        .create_intent(&tenant, &actor, payload.amount, &payload.currency)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::CREATED, Json(handle)))
}

#[utoipa::path(
    post,
    path = "/api/checkout/confirm",
    tag = "Payments",
    request_body = ConfirmPaymentPayload,
    responses(
        (status = 201, description = "Pagamento confirmado e pedido gravado (idempotente)", body = OrderWithLines),
        (status = 400, description = "Pagamento não concluído"),
        (status = 404, description = "Intent não encontrado"),
        (status = 409, description = "Estoque insuficiente")
    ),
    params(("x-tenant-id" = Uuid, Header, description = "ID do Tenant")),
    security(("api_jwt" = []))
)]
pub async fn confirm_payment(
    State(app_state): State<AppState>,
    tenant: TenantContext,
    AuthenticatedActor(actor): AuthenticatedActor,
    locale: Locale,
    Json(payload): Json<ConfirmPaymentPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::from(e).to_api_error(&locale))?;

    let cart = CartRequest {
        location_id: payload.location_id,
        customer_id: payload.customer_id,
        items: payload.items,
        discount_amount: payload.discount_amount.unwrap_or(Decimal::ZERO),
    };

    let order = app_state
        .payment_coordinator
        .confirm_and_commit(&tenant, &actor, &payload.payment_intent_id, &cart)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::CREATED, Json(order)))
}

#[utoipa::path(
    post,
    path = "/api/checkout/refund/{order_id}",
    tag = "Payments",
    request_body = RefundPayload,
    responses(
        (status = 200, description = "Reembolso solicitado", body = RefundResult),
        (status = 400, description = "Pedido não reembolsável ou valor inválido"),
        (status = 404, description = "Pedido não encontrado")
    ),
    params(
        ("order_id" = Uuid, Path, description = "ID do pedido"),
        ("x-tenant-id" = Uuid, Header, description = "ID do Tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn refund_order(
    State(app_state): State<AppState>,
    tenant: TenantContext,
    AuthenticatedActor(actor): AuthenticatedActor,
    locale: Locale,
    Path(order_id): Path<Uuid>,
    payload: Option<Json<RefundPayload>>,
) -> Result<Json<RefundResult>, ApiError> {
    // Corpo opcional: sem corpo = reembolso total
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    payload
        .validate()
        .map_err(|e| AppError::from(e).to_api_error(&locale))?;

    let result = app_state
        .payment_coordinator
        .refund(&tenant, &actor, order_id, payload.amount, payload.reason)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(Json(result))
}

#[utoipa::path(
    get,
    path = "/api/payments/exceptions",
    tag = "Payments",
    responses(
        (status = 200, description = "Capturas sem pedido, aguardando conciliação", body = Vec<CaptureException>),
        (status = 403, description = "Sem permissão de auditoria")
    ),
    params(("x-tenant-id" = Uuid, Header, description = "ID do Tenant")),
    security(("api_jwt" = []))
)]
pub async fn list_capture_exceptions(
    State(app_state): State<AppState>,
    tenant: TenantContext,
    AuthenticatedActor(actor): AuthenticatedActor,
    locale: Locale,
    _guard: RequirePermission<PermAuditLogs>,
) -> Result<Json<Vec<CaptureException>>, ApiError> {
    let exceptions = app_state
        .payment_coordinator
        .open_capture_exceptions(&tenant, &actor)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(Json(exceptions))
}

/// Webhook do gateway. Fora do tenant_guard: a autenticação é a assinatura,
/// e o tenant vem do metadata do objeto.
#[utoipa::path(
    post,
    path = "/api/webhooks/payments",
    tag = "Payments",
    request_body(content = String, content_type = "application/json", description = "Evento do gateway, assinado byte a byte"),
    responses(
        (status = 200, description = "Evento recebido"),
        (status = 400, description = "Assinatura inválida")
    ),
    params(("stripe-signature" = String, Header, description = "Assinatura HMAC do evento"))
)]
pub async fn payment_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let locale = Locale::from_headers(&headers);

    // 1. Assinatura sobre o corpo cru
    let signature = headers
        .get(PAYMENT_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            AppError::InvalidWebhookSignature("missing signature header".into()).to_api_error(&locale)
        })?;

    verify_webhook_signature(
        &body,
        signature,
        &app_state.settings.stripe_webhook_secret,
        app_state.settings.webhook_tolerance_secs,
    )
    .map_err(|e| {
        tracing::warn!("Webhook rejeitado: {}", e);
        e.to_api_error(&locale)
    })?;

    // 2. A partir daqui sempre respondemos 200: o evento é autêntico, e
    //    reenvios do gateway não ajudam com erros nossos.
    let received = Json(json!({ "received": true }));

    let event = match WebhookEvent::from_payload(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("Webhook com corpo ilegível: {}", e);
            return Ok(received);
        }
    };

    let Some(tenant_id) = event.tenant_id() else {
        tracing::warn!("Evento {} sem tenant_id no metadata; ignorado", event.id);
        return Ok(received);
    };

    let tenant = match app_state.tenant_resolver.resolve_id(tenant_id).await {
        Ok(tenant) => tenant,
        Err(e) => {
            tracing::warn!("Evento {} para tenant desconhecido {}: {}", event.id, tenant_id, e);
            return Ok(received);
        }
    };

    match app_state.payment_coordinator.reconcile_webhook(&tenant, &event).await {
        Ok(outcome) => tracing::info!("📨 Evento {} processado: {:?}", event.id, outcome),
        Err(e) => tracing::error!("Falha ao processar o evento {}: {}", event.id, e),
    }

    Ok(received)
}
