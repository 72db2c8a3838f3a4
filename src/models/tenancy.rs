// src/models/tenancy.rs

use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// ---
// 1. Tenant (A "Organização")
// ---
// A fronteira de isolamento. Nunca é fundida nem dividida.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Tenant {
    pub id: Uuid,
    #[schema(example = "Mercado Central")]
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

// ---
// 2. Location (O "Ponto de Venda")
// ---
// Carrega a taxa de imposto, o multiplicador de preço e a moeda da loja.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Location {
    pub id: Uuid,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    #[schema(example = "Loja Centro")]
    pub name: String,
    #[schema(example = "0.00")]
    pub tax_rate: Decimal,
    #[schema(example = "1.00")]
    pub pricing_multiplier: Decimal,
    #[schema(example = "USD")]
    pub currency: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
