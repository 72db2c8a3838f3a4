use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::{middleware::i18n::Locale, models::inventory::MAX_STOCK_QUANTITY};

// Nosso tipo de erro de domínio + infraestrutura.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    // --- Tenancy ---
    #[error("Identificador de tenant ausente")]
    TenantIdentifierMissing,

    #[error("Tenant não encontrado")]
    TenantNotFound,

    // --- Autorização ---
    #[error("Não autenticado")]
    Unauthenticated,

    #[error("Permissão insuficiente")]
    Forbidden,

    #[error("Acesso negado à loja {0}")]
    LocationAccessDenied(Uuid),

    // --- Validação de domínio ---
    #[error("Loja {0} não encontrada")]
    LocationNotFound(Uuid),

    #[error("Loja {0} inativa")]
    LocationInactive(Uuid),

    #[error("Cliente {0} não encontrado")]
    CustomerNotFound(Uuid),

    #[error("Produto {0} não encontrado")]
    ProductNotFound(Uuid),

    #[error("Pedido {0} não encontrado")]
    OrderNotFound(Uuid),

    #[error("Usuário {0} não encontrado")]
    UserNotFound(Uuid),

    #[error("Quantidade inválida: {0}")]
    InvalidQuantity(i32),

    #[error("Valor inválido: {0}")]
    InvalidAmount(String),

    #[error("Estoque insuficiente para o produto {product_id}: pedido {requested}, disponível {available}")]
    InsufficientStock {
        product_id: Uuid,
        product_name: Option<String>,
        requested: i32,
        available: i32,
    },

    // --- Ciclo de vida do pagamento ---
    #[error("Pagamento não concluído (status do intent: {status})")]
    PaymentNotCompleted { status: String },

    #[error("Intent de pagamento {0} não encontrado")]
    PaymentIntentNotFound(String),

    #[error("Pedido não reembolsável: {0}")]
    NotRefundable(String),

    #[error("Erro no gateway de pagamento: {0}")]
    GatewayError(String),

    #[error("Assinatura de webhook inválida: {0}")]
    InvalidWebhookSignature(String),

    // Interno: outro confirm já gravou o pedido deste intent
    #[error("Já existe um pedido para o intent {0}")]
    DuplicatePaymentIntent(String),

    #[error("Pagamento {intent_id} capturado sem pedido correspondente")]
    IrreconcilableCapture { intent_id: String },

    #[error("Falha ao compensar o estoque: {0}")]
    CompensationFailed(String),

    // --- Infraestrutura ---
    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),

    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

// O corpo de erro que sai na API
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub error: String,
    pub details: Option<Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "code": self.code,
            "error": self.error,
        });
        if let Some(details) = self.details {
            body["details"] = details;
        }
        (self.status, Json(body)).into_response()
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_)
            | AppError::TenantIdentifierMissing
            | AppError::InvalidQuantity(_)
            | AppError::InvalidAmount(_)
            | AppError::PaymentNotCompleted { .. }
            | AppError::NotRefundable(_)
            | AppError::InvalidWebhookSignature(_) => StatusCode::BAD_REQUEST,

            AppError::Unauthenticated | AppError::JwtError(_) => StatusCode::UNAUTHORIZED,

            AppError::Forbidden | AppError::LocationAccessDenied(_) => StatusCode::FORBIDDEN,

            AppError::TenantNotFound
            | AppError::LocationNotFound(_)
            | AppError::CustomerNotFound(_)
            | AppError::ProductNotFound(_)
            | AppError::OrderNotFound(_)
            | AppError::UserNotFound(_)
            | AppError::PaymentIntentNotFound(_) => StatusCode::NOT_FOUND,

            AppError::LocationInactive(_)
            | AppError::InsufficientStock { .. }
            | AppError::DuplicatePaymentIntent(_) => StatusCode::CONFLICT,

            AppError::GatewayError(_) => StatusCode::BAD_GATEWAY,

            AppError::IrreconcilableCapture { .. }
            | AppError::CompensationFailed(_)
            | AppError::DatabaseError(_)
            | AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::TenantIdentifierMissing => "TENANT_IDENTIFIER_MISSING",
            AppError::TenantNotFound => "TENANT_NOT_FOUND",
            AppError::Unauthenticated | AppError::JwtError(_) => "UNAUTHENTICATED",
            AppError::Forbidden => "FORBIDDEN",
            AppError::LocationAccessDenied(_) => "LOCATION_ACCESS_DENIED",
            AppError::LocationNotFound(_) => "LOCATION_NOT_FOUND",
            AppError::LocationInactive(_) => "LOCATION_INACTIVE",
            AppError::CustomerNotFound(_) => "CUSTOMER_NOT_FOUND",
            AppError::ProductNotFound(_) => "PRODUCT_NOT_FOUND",
            AppError::OrderNotFound(_) => "ORDER_NOT_FOUND",
            AppError::UserNotFound(_) => "USER_NOT_FOUND",
            AppError::InvalidQuantity(_) => "INVALID_QUANTITY",
            AppError::InvalidAmount(_) => "INVALID_AMOUNT",
            AppError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            AppError::PaymentNotCompleted { .. } => "PAYMENT_NOT_COMPLETED",
            AppError::PaymentIntentNotFound(_) => "PAYMENT_INTENT_NOT_FOUND",
            AppError::NotRefundable(_) => "NOT_REFUNDABLE",
            AppError::GatewayError(_) => "GATEWAY_ERROR",
            AppError::InvalidWebhookSignature(_) => "INVALID_WEBHOOK_SIGNATURE",
            AppError::DuplicatePaymentIntent(_) => "DUPLICATE_PAYMENT_INTENT",
            AppError::IrreconcilableCapture { .. } => "IRRECONCILABLE_CAPTURE",
            AppError::CompensationFailed(_)
            | AppError::DatabaseError(_)
            | AppError::InternalServerError(_) => "INTERNAL_ERROR",
        }
    }

    fn localized_message(&self, locale: &Locale) -> String {
        let pt = locale.is_portuguese();
        let text = |pt_text: String, en_text: String| if pt { pt_text } else { en_text };

        match self {
            AppError::ValidationError(_) => text(
                "Um ou mais campos são inválidos.".into(),
                "One or more fields are invalid.".into(),
            ),
            AppError::TenantIdentifierMissing => text(
                "O cabeçalho X-Tenant-ID é obrigatório.".into(),
                "Tenant identifier is required.".into(),
            ),
            AppError::TenantNotFound => text("Tenant não encontrado.".into(), "Tenant not found.".into()),
            AppError::Unauthenticated | AppError::JwtError(_) => text(
                "Token de autenticação inválido ou ausente.".into(),
                "Access token is missing or invalid.".into(),
            ),
            AppError::Forbidden => text("Permissão insuficiente.".into(), "Insufficient permissions.".into()),
            AppError::LocationAccessDenied(id) => text(
                format!("Acesso negado à loja {}.", id),
                format!("Access denied to location {}.", id),
            ),
            AppError::LocationNotFound(id) => text(
                format!("Loja {} não encontrada.", id),
                format!("Location {} not found.", id),
            ),
            AppError::LocationInactive(id) => text(
                format!("A loja {} está inativa.", id),
                format!("Location {} is inactive.", id),
            ),
            AppError::CustomerNotFound(id) => text(
                format!("Cliente {} não encontrado.", id),
                format!("Customer {} not found.", id),
            ),
            AppError::ProductNotFound(id) => text(
                format!("Produto {} não encontrado.", id),
                format!("Product {} not found.", id),
            ),
            AppError::OrderNotFound(id) => text(
                format!("Pedido {} não encontrado.", id),
                format!("Order {} not found.", id),
            ),
            AppError::UserNotFound(id) => text(
                format!("Usuário {} não encontrado.", id),
                format!("User {} not found.", id),
            ),
            AppError::InvalidQuantity(q) => text(
                format!("Quantidade inválida: {}. Deve estar entre 1 e {}.", q, MAX_STOCK_QUANTITY),
                format!("Invalid quantity: {}. Must be between 1 and {}.", q, MAX_STOCK_QUANTITY),
            ),
            AppError::InvalidAmount(reason) => text(
                format!("Valor inválido: {}.", reason),
                format!("Invalid amount: {}.", reason),
            ),
            AppError::InsufficientStock { product_id, product_name, requested, available } => {
                let name = product_name.clone().unwrap_or_else(|| product_id.to_string());
                text(
                    format!("Estoque insuficiente para {}: pedido {}, disponível {}.", name, requested, available),
                    format!("Insufficient inventory for {}: requested {}, available {}.", name, requested, available),
                )
            }
            AppError::PaymentNotCompleted { .. } => text(
                "Pagamento não concluído.".into(),
                "Payment not completed.".into(),
            ),
            AppError::PaymentIntentNotFound(_) => text(
                "Intent de pagamento não encontrado.".into(),
                "Payment intent not found.".into(),
            ),
            AppError::NotRefundable(_) => text(
                "O pedido não está em um estado reembolsável.".into(),
                "Transaction is not in a refundable state.".into(),
            ),
            AppError::GatewayError(_) => text(
                "Falha ao processar o pagamento. Tente novamente.".into(),
                "Failed to process payment. Please retry.".into(),
            ),
            AppError::InvalidWebhookSignature(_) => text(
                "Assinatura do webhook inválida.".into(),
                "Webhook signature verification failed.".into(),
            ),
            AppError::DuplicatePaymentIntent(_) => text(
                "Este pagamento já foi registrado.".into(),
                "This payment has already been recorded.".into(),
            ),
            AppError::IrreconcilableCapture { .. }
            | AppError::CompensationFailed(_)
            | AppError::DatabaseError(_)
            | AppError::InternalServerError(_) => text(
                "Ocorreu um erro inesperado.".into(),
                "Internal server error.".into(),
            ),
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            AppError::ValidationError(errors) => {
                let mut details = serde_json::Map::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .map(|e| {
                            e.message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| e.code.to_string())
                        })
                        .collect();
                    details.insert(field.to_string(), json!(messages));
                }
                Some(Value::Object(details))
            }
            AppError::InsufficientStock { product_id, requested, available, .. } => Some(json!({
                "product_id": product_id,
                "requested": requested,
                "available": available,
            })),
            AppError::PaymentNotCompleted { status } => Some(json!({ "intent_status": status })),
            _ => None,
        }
    }

    /// Converte o erro no corpo da API, no idioma do cliente.
    /// Erros internos são logados aqui e nunca vazam detalhes do provedor.
    pub fn to_api_error(&self, locale: &Locale) -> ApiError {
        let status = self.status();
        if status.is_server_error() || status == StatusCode::BAD_GATEWAY {
            tracing::error!("Erro Interno do Servidor: {}", self);
        }

        ApiError {
            status,
            code: self.code(),
            error: self.localized_message(locale),
            details: self.details(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.to_api_error(&Locale::default()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_stock_is_conflict_with_details() {
        let product_id = Uuid::new_v4();
        let err = AppError::InsufficientStock {
            product_id,
            product_name: Some("Café".into()),
            requested: 3,
            available: 2,
        };
        let api = err.to_api_error(&Locale::default());
        assert_eq!(api.status, StatusCode::CONFLICT);
        assert_eq!(api.code, "INSUFFICIENT_STOCK");
        assert!(api.error.contains("requested 3"));
        assert_eq!(api.details.unwrap()["available"], 2);
    }

    #[test]
    fn test_gateway_errors_do_not_leak_provider_message() {
        let err = AppError::GatewayError("stripe said: card_declined sk_live_...".into());
        let api = err.to_api_error(&Locale("pt".into()));
        assert_eq!(api.status, StatusCode::BAD_GATEWAY);
        assert!(!api.error.contains("sk_live"));
        assert!(api.error.starts_with("Falha"));
    }
}
