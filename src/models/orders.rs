// src/models/orders.rs

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use sqlx::FromRow;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use utoipa::ToSchema;

// --- Enums ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
    RefundPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    // Carteiras digitais NÃO passam pelo gateway: liquidam como dinheiro.
    Digital,
}

impl PaymentMethod {
    pub fn settles_immediately(self) -> bool {
        match self {
            PaymentMethod::Cash | PaymentMethod::Digital => true,
            PaymentMethod::Card => false,
        }
    }
}

/// Estado do pagamento externo. A ordem das variantes é a ordem do ciclo de vida:
/// uma transição só é aplicada se avançar nessa ordem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Failed,
    Succeeded,
    RefundPending,
    Refunded,
}

// --- Structs persistidas ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Order {
    pub id: Uuid,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    pub location_id: Uuid,
    pub customer_id: Option<Uuid>,
    #[schema(example = "13.00")]
    pub total_amount: Decimal,
    #[schema(example = "2.00")]
    pub discount_amount: Decimal,
    #[schema(example = "0.00")]
    pub tax_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    #[schema(example = "pi_3PZ...")]
    pub payment_intent_id: Option<String>,
    pub charge_id: Option<String>,
    pub payment_status: Option<PaymentStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct OrderLine {
    pub id: Uuid,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    #[schema(example = 3)]
    pub quantity: i32,
    #[schema(example = "5.00")]
    pub unit_price: Decimal,
    #[schema(example = "15.00")]
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderWithLines {
    #[serde(flatten)]
    pub order: Order,
    pub lines: Vec<OrderLine>,
}

// --- Rascunho (saída do OrderAssembler, nunca persistido como está) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CartItem {
    pub product_id: Uuid,
    #[schema(example = 3)]
    pub quantity: i32,
}

/// O pedido de venda como chegou do cliente, antes de precificar.
#[derive(Debug, Clone)]
pub struct CartRequest {
    pub location_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub items: Vec<CartItem>,
    pub discount_amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct DraftLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderDraft {
    // O id é reservado aqui para o histórico de estoque já apontar para o pedido.
    pub order_id: Uuid,
    pub location_id: Uuid,
    pub currency: String,
    pub customer_id: Option<Uuid>,
    pub lines: Vec<DraftLine>,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
}

/// Como o pedido foi liquidado no momento do commit.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub payment_status: Option<PaymentStatus>,
    pub payment_intent_id: Option<String>,
    pub charge_id: Option<String>,
}

impl Settlement {
    /// Dinheiro ou carteira digital: concluído na hora, sem gateway.
    pub fn immediate(payment_method: PaymentMethod) -> Self {
        Self {
            payment_method,
            status: OrderStatus::Completed,
            payment_status: None,
            payment_intent_id: None,
            charge_id: None,
        }
    }

    /// Cartão já capturado pelo gateway.
    pub fn captured_card(intent_id: &str, charge_id: Option<String>) -> Self {
        Self {
            payment_method: PaymentMethod::Card,
            status: OrderStatus::Completed,
            payment_status: Some(PaymentStatus::Succeeded),
            payment_intent_id: Some(intent_id.to_string()),
            charge_id,
        }
    }
}

/// Transição de pagamento pedida ao repositório (compare-and-swap sobre `expected`).
#[derive(Debug, Clone)]
pub struct PaymentTransition {
    pub expected: Option<PaymentStatus>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub charge_id: Option<String>,
}
