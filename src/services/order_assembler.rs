// src/services/order_assembler.rs

use std::sync::Arc;

use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::CatalogStore,
    middleware::tenancy::TenantContext,
    models::{
        catalog::Product,
        inventory::{StockKey, MAX_STOCK_QUANTITY},
        orders::{CartItem, CartRequest, DraftLine, OrderDraft},
        tenancy::Location,
    },
    services::inventory_service::InventoryService,
};

/// Preço unitário efetivo numa loja: o preço específico da loja, se houver;
/// senão o preço base vezes o multiplicador da loja, arredondado a centavos.
pub fn effective_unit_price(product: &Product, location: &Location) -> Decimal {
    match product.price_override_for(location.id) {
        Some(price) => price,
        None => (product.price * location.pricing_multiplier)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
    }
}

/// Junta linhas repetidas do mesmo produto, mantendo a ordem da primeira aparição.
/// A soma de cada produto também respeita o teto de quantidade.
fn merge_items(items: &[CartItem]) -> Result<Vec<CartItem>, AppError> {
    let mut merged: Vec<CartItem> = Vec::with_capacity(items.len());
    for item in items {
        match merged.iter_mut().find(|m| m.product_id == item.product_id) {
            Some(existing) => {
                existing.quantity = existing
                    .quantity
                    .checked_add(item.quantity)
                    .filter(|q| *q <= MAX_STOCK_QUANTITY)
                    .ok_or(AppError::InvalidQuantity(item.quantity))?;
            }
            None => merged.push(*item),
        }
    }
    Ok(merged)
}

/// Monta o rascunho do pedido. Só lê: nenhuma escrita acontece aqui.
///
/// A checagem de estoque é uma pré-validação para devolver um erro amigável;
/// a garantia real vem da baixa atômica no commit.
#[derive(Clone)]
pub struct OrderAssembler {
    catalog: Arc<dyn CatalogStore>,
    inventory: InventoryService,
}

impl OrderAssembler {
    pub fn new(catalog: Arc<dyn CatalogStore>, inventory: InventoryService) -> Self {
        Self { catalog, inventory }
    }

    pub async fn assemble(&self, tenant: &TenantContext, request: &CartRequest) -> Result<OrderDraft, AppError> {
        // 1. Validação de entrada
        if request.items.is_empty() {
            return Err(AppError::InvalidQuantity(0));
        }
        if let Some(bad) = request
            .items
            .iter()
            .find(|i| !(1..=MAX_STOCK_QUANTITY).contains(&i.quantity))
        {
            return Err(AppError::InvalidQuantity(bad.quantity));
        }
        if request.discount_amount < Decimal::ZERO {
            return Err(AppError::InvalidAmount("discount cannot be negative".into()));
        }

        // 2. Loja e cliente
        let location = self
            .catalog
            .find_location(tenant, request.location_id)
            .await?
            .ok_or(AppError::LocationNotFound(request.location_id))?;
        if !location.is_active {
            return Err(AppError::LocationInactive(location.id));
        }

        if let Some(customer_id) = request.customer_id {
            self.catalog
                .find_customer(tenant, customer_id)
                .await?
                .ok_or(AppError::CustomerNotFound(customer_id))?;
        }

        // 3. Linhas precificadas
        let mut lines = Vec::with_capacity(request.items.len());
        for item in merge_items(&request.items)? {
            let product = self
                .catalog
                .find_product(tenant, item.product_id)
                .await?
                .ok_or(AppError::ProductNotFound(item.product_id))?;

            let available = self
                .inventory
                .get_quantity(tenant, StockKey::new(product.id, location.id))
                .await?;
            if available < item.quantity {
                return Err(AppError::InsufficientStock {
                    product_id: product.id,
                    product_name: Some(product.name.clone()),
                    requested: item.quantity,
                    available,
                });
            }

            let unit_price = effective_unit_price(&product, &location);
            lines.push(DraftLine {
                product_id: product.id,
                product_name: product.name,
                quantity: item.quantity,
                unit_price,
                line_total: unit_price * Decimal::from(item.quantity),
            });
        }

        // 4. Totais
        let subtotal: Decimal = lines.iter().map(|l| l.line_total).sum();
        // TODO: aplicar location.tax_rate quando o cálculo fiscal sair do placeholder
        let tax_amount = Decimal::ZERO;
        let total_amount = (subtotal - request.discount_amount).max(Decimal::ZERO);

        Ok(OrderDraft {
            order_id: Uuid::new_v4(),
            location_id: location.id,
            currency: location.currency.to_lowercase(),
            customer_id: request.customer_id,
            lines,
            subtotal,
            discount_amount: request.discount_amount,
            tax_amount,
            total_amount,
        })
    }
}
