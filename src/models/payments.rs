// src/models/payments.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::orders::{OrderStatus, PaymentStatus, PaymentTransition};

// --- Intent (visão do gateway) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::RequiresPaymentMethod => "requires_payment_method",
            IntentStatus::RequiresConfirmation => "requires_confirmation",
            IntentStatus::RequiresAction => "requires_action",
            IntentStatus::Processing => "processing",
            IntentStatus::RequiresCapture => "requires_capture",
            IntentStatus::Canceled => "canceled",
            IntentStatus::Succeeded => "succeeded",
            IntentStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub status: IntentStatus,
    // Valor em centavos (menor unidade da moeda)
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub latest_charge: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PaymentIntent {
    pub fn tenant_id(&self) -> Option<Uuid> {
        self.metadata.get("tenant_id").and_then(|v| Uuid::parse_str(v).ok())
    }
}

/// O que devolvemos ao cliente para ele concluir o pagamento no terminal/SDK.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IntentHandle {
    #[schema(example = "pi_3PZ...")]
    pub intent_id: String,
    pub client_secret: String,
    #[schema(example = "20.00")]
    pub amount: Decimal,
    #[schema(example = "usd")]
    pub currency: String,
}

// --- Reembolso ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RefundReason {
    Duplicate,
    Fraudulent,
    #[default]
    RequestedByCustomer,
}

impl RefundReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundReason::Duplicate => "duplicate",
            RefundReason::Fraudulent => "fraudulent",
            RefundReason::RequestedByCustomer => "requested_by_customer",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayRefund {
    pub id: String,
    pub amount: i64,
    pub status: String,
}

impl GatewayRefund {
    pub fn succeeded(&self) -> bool {
        self.status == "succeeded"
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RefundResult {
    pub order_id: Uuid,
    pub refund_id: String,
    #[schema(example = "13.00")]
    pub amount: Decimal,
    #[schema(example = "succeeded")]
    pub gateway_status: String,
    pub order_status: OrderStatus,
}

// --- Webhooks ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEventKind {
    PaymentSucceeded,
    PaymentFailed,
    ChargeRefunded,
    DisputeCreated,
    Other(String),
}

impl WebhookEventKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "payment_intent.succeeded" => WebhookEventKind::PaymentSucceeded,
            "payment_intent.payment_failed" => WebhookEventKind::PaymentFailed,
            "charge.refunded" => WebhookEventKind::ChargeRefunded,
            "charge.dispute.created" => WebhookEventKind::DisputeCreated,
            other => WebhookEventKind::Other(other.to_string()),
        }
    }
}

/// O `data.object` de um evento. Para eventos de intent, `id` é o intent;
/// para eventos de charge, o intent vem em `payment_intent`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayObject {
    pub id: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub latest_charge: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawEventData {
    object: GatewayObject,
}

#[derive(Debug, Clone, Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    data: RawEventData,
}

#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub id: String,
    pub kind: WebhookEventKind,
    pub object: GatewayObject,
}

impl WebhookEvent {
    pub fn from_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: RawEvent = serde_json::from_slice(payload)?;
        Ok(Self {
            id: raw.id,
            kind: WebhookEventKind::parse(&raw.kind),
            object: raw.data.object,
        })
    }

    pub fn intent_id(&self) -> Option<&str> {
        match self.kind {
            WebhookEventKind::PaymentSucceeded | WebhookEventKind::PaymentFailed => {
                Some(self.object.id.as_str())
            }
            _ => self.object.payment_intent.as_deref(),
        }
    }

    pub fn tenant_id(&self) -> Option<Uuid> {
        self.object
            .metadata
            .get("tenant_id")
            .and_then(|v| Uuid::parse_str(v).ok())
    }

    /// Para eventos de charge o `id` do objeto é o próprio charge.
    pub fn charge_id(&self) -> Option<String> {
        match self.kind {
            WebhookEventKind::ChargeRefunded | WebhookEventKind::DisputeCreated => {
                Some(self.object.id.clone())
            }
            _ => self.object.latest_charge.clone(),
        }
    }
}

// ---
// Máquina de estados do pagamento
// ---

/// Um sinal vindo do gateway (webhook) ou do próprio reembolso.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentSignal {
    Succeeded { charge_id: Option<String> },
    Failed,
    RefundPending,
    Refunded,
}

impl PaymentSignal {
    fn target(&self) -> (OrderStatus, PaymentStatus) {
        match self {
            PaymentSignal::Succeeded { .. } => (OrderStatus::Completed, PaymentStatus::Succeeded),
            PaymentSignal::Failed => (OrderStatus::Failed, PaymentStatus::Failed),
            PaymentSignal::RefundPending => (OrderStatus::RefundPending, PaymentStatus::RefundPending),
            PaymentSignal::Refunded => (OrderStatus::Refunded, PaymentStatus::Refunded),
        }
    }
}

/// Calcula a transição a aplicar, ou `None` se o sinal não avança o estado atual
/// (re-entrega, evento fora de ordem, ou estado terminal).
pub fn plan_transition(
    current: Option<PaymentStatus>,
    current_charge: Option<&str>,
    signal: &PaymentSignal,
) -> Option<PaymentTransition> {
    let (status, payment_status) = signal.target();

    if let Some(cur) = current {
        if cur >= payment_status {
            return None;
        }
    }

    let charge_id = match signal {
        PaymentSignal::Succeeded { charge_id: Some(c) } => Some(c.clone()),
        _ => current_charge.map(str::to_string),
    };

    Some(PaymentTransition {
        expected: current,
        status,
        payment_status,
        charge_id,
    })
}

// --- Exceções de captura (dinheiro capturado sem pedido local) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "capture_exception_reason", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CaptureExceptionReason {
    // O commit local falhou depois da captura
    CommitFailed,
    // Valor capturado diferente do total do pedido
    AmountMismatch,
    // Webhook de sucesso chegou e não existe pedido para o intent
    UnmatchedWebhook,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct CaptureException {
    pub id: Uuid,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    pub payment_intent_id: String,
    pub amount: Option<Decimal>,
    pub reason: CaptureExceptionReason,
    pub detail: String,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCaptureException {
    pub payment_intent_id: String,
    pub amount: Option<Decimal>,
    pub reason: CaptureExceptionReason,
    pub detail: String,
}
