// src/models/inventory.rs

use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Maior quantidade aceita num único movimento ou ajuste de estoque.
pub const MAX_STOCK_QUANTITY: i32 = 1_000_000;

// --- 1. Chave do Livro-Razão ---
// (tenant, produto, loja). O tenant vem sempre do TenantContext, nunca daqui.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct StockKey {
    pub product_id: Uuid,
    pub location_id: Uuid,
}

impl StockKey {
    pub fn new(product_id: Uuid, location_id: Uuid) -> Self {
        Self { product_id, location_id }
    }
}

// --- 2. Saldo de Estoque (tabela 'inventory') ---
// quantity >= 0 é invariante. A linha nunca é apagada; zerar é a "desativação".
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct InventoryRecord {
    #[schema(ignore)]
    pub tenant_id: Uuid,
    pub product_id: Uuid,
    pub location_id: Uuid,
    #[schema(example = 10)]
    pub quantity: i32,
    #[schema(example = 2)]
    pub min_stock: i32,
    #[schema(example = 5)]
    pub reorder_point: i32,
    pub updated_at: DateTime<Utc>,
}

impl InventoryRecord {
    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.location_id)
    }

    pub fn needs_reorder(&self) -> bool {
        self.quantity <= self.reorder_point
    }
}

// --- 3. Movimentações de Estoque ---
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "stock_movement_reason", rename_all = "SCREAMING_SNAKE_CASE")] // Banco
#[serde(rename_all = "SCREAMING_SNAKE_CASE")] // JSON
pub enum StockMovementReason {
    Sale,         // Vira "SALE"
    Compensation, // Devolução de uma baixa de checkout que falhou
    Restock,
    Adjustment,   // Ajuste administrativo (upsert de níveis)
    TransferOut,  // Vira "TRANSFER_OUT"
    TransferIn,   // Vira "TRANSFER_IN"
}

// --- STOCK MOVEMENT (Histórico) ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct StockMovement {
    pub id: Uuid,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub quantity_changed: i32,
    pub reason: StockMovementReason,
    pub order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// O que acompanha uma alteração de saldo para o histórico.
#[derive(Debug, Clone, Copy)]
pub struct MovementNote {
    pub reason: StockMovementReason,
    pub order_id: Option<Uuid>,
}

impl MovementNote {
    pub fn new(reason: StockMovementReason) -> Self {
        Self { reason, order_id: None }
    }

    pub fn for_order(reason: StockMovementReason, order_id: Uuid) -> Self {
        Self { reason, order_id: Some(order_id) }
    }
}

// Níveis administrativos (upsertLevels)
#[derive(Debug, Clone, Copy)]
pub struct StockLevels {
    pub quantity: i32,
    pub min_stock: Option<i32>,
    pub reorder_point: Option<i32>,
}

// Resultado de uma transferência entre lojas
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransferResult {
    pub product_id: Uuid,
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    #[schema(example = 3)]
    pub quantity: i32,
    pub from_quantity: i32,
    pub to_quantity: i32,
}
