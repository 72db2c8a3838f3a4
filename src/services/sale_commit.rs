// src/services/sale_commit.rs

use std::sync::Arc;

use crate::{
    common::error::AppError,
    db::OrderStore,
    middleware::tenancy::TenantContext,
    models::{
        inventory::{MovementNote, StockKey, StockMovementReason},
        orders::{DraftLine, OrderDraft, OrderWithLines, Settlement},
    },
    services::inventory_service::InventoryService,
};

/// Transforma um rascunho num pedido gravado: baixa cada linha de forma atômica
/// e grava o pedido. Qualquer falha devolve as baixas já feitas, em ordem inversa.
///
/// Usado tanto pelo checkout imediato (dinheiro, carteira digital) quanto pela
/// confirmação de cartão.
#[derive(Clone)]
pub struct SaleCommitter {
    inventory: InventoryService,
    orders: Arc<dyn OrderStore>,
}

impl SaleCommitter {
    pub fn new(inventory: InventoryService, orders: Arc<dyn OrderStore>) -> Self {
        Self { inventory, orders }
    }

    #[tracing::instrument(skip_all, fields(tenant_id = %tenant.tenant_id(), order_id = %draft.order_id))]
    pub async fn commit(
        &self,
        tenant: &TenantContext,
        draft: &OrderDraft,
        settlement: Settlement,
    ) -> Result<OrderWithLines, AppError> {
        let mut applied: Vec<(StockKey, i32)> = Vec::with_capacity(draft.lines.len());

        // 1. Baixas, linha a linha
        for line in &draft.lines {
            let key = StockKey::new(line.product_id, draft.location_id);
            let note = MovementNote::for_order(StockMovementReason::Sale, draft.order_id);

            match self.inventory.reserve_and_decrement(tenant, key, line.quantity, note).await {
                Ok(_) => applied.push((key, line.quantity)),
                Err(e) => {
                    self.compensate(tenant, draft, &applied).await?;
                    return Err(with_product_name(e, line));
                }
            }
        }

        // 2. Pedido + linhas
        match self.orders.insert_order(tenant, draft, &settlement).await {
            Ok(order) => {
                tracing::info!(
                    "🧾 Pedido {} gravado (loja {}, total {}, {:?})",
                    order.order.id,
                    order.order.location_id,
                    order.order.total_amount,
                    order.order.payment_method
                );
                Ok(order)
            }
            Err(e) => {
                self.compensate(tenant, draft, &applied).await?;
                Err(e)
            }
        }
    }

    /// Devolve as baixas aplicadas, da última para a primeira.
    async fn compensate(
        &self,
        tenant: &TenantContext,
        draft: &OrderDraft,
        applied: &[(StockKey, i32)],
    ) -> Result<(), AppError> {
        let mut failures = Vec::new();

        for (key, quantity) in applied.iter().rev() {
            let note = MovementNote::for_order(StockMovementReason::Compensation, draft.order_id);
            if let Err(e) = self.inventory.increment(tenant, *key, *quantity, note).await {
                // Estoque ficou menor do que deveria: precisa de intervenção manual
                tracing::error!(
                    "🔥 FATAL: compensação falhou (pedido {}, produto {}, loja {}, {} un.): {}",
                    draft.order_id,
                    key.product_id,
                    key.location_id,
                    quantity,
                    e
                );
                failures.push(format!("{}@{}x{}", key.product_id, key.location_id, quantity));
            }
        }

        if failures.is_empty() {
            if !applied.is_empty() {
                tracing::warn!(
                    "↩️ Pedido {}: {} baixa(s) devolvida(s)",
                    draft.order_id,
                    applied.len()
                );
            }
            Ok(())
        } else {
            Err(AppError::CompensationFailed(failures.join(", ")))
        }
    }
}

fn with_product_name(err: AppError, line: &DraftLine) -> AppError {
    match err {
        AppError::InsufficientStock { product_id, product_name: None, requested, available } => {
            AppError::InsufficientStock {
                product_id,
                product_name: Some(line.product_name.clone()),
                requested,
                available,
            }
        }
        other => other,
    }
}
