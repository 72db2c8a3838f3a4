// src/models/catalog.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use utoipa::ToSchema;
use uuid::Uuid;

// --- Produto (Catálogo) ---
// O núcleo só lê produtos; o CRUD do catálogo fica fora daqui.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Product {
    pub id: Uuid,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    #[schema(example = "CAFE-500G")]
    pub sku: String,
    #[schema(example = "Café Torrado 500g")]
    pub name: String,
    #[schema(example = "5.00")]
    pub price: Decimal,
    // Preços por loja: { location_id: preço }
    #[schema(value_type = Object)]
    pub location_pricing: Json<HashMap<Uuid, Decimal>>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn price_override_for(&self, location_id: Uuid) -> Option<Decimal> {
        self.location_pricing.0.get(&location_id).copied()
    }
}

// --- Cliente ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Customer {
    pub id: Uuid,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}
