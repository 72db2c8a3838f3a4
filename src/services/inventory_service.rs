// src/services/inventory_service.rs

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{CatalogStore, InventoryLedger},
    middleware::tenancy::TenantContext,
    models::{
        auth::Actor,
        inventory::{
            InventoryRecord, MovementNote, StockKey, StockLevels, StockMovement, StockMovementReason,
            TransferResult, MAX_STOCK_QUANTITY,
        },
    },
    services::access_gate::{AccessGate, Operation},
};

/// Fachada do livro-razão: valida entradas e registra logs; a atomicidade
/// por chave fica no `InventoryLedger`.
#[derive(Clone)]
pub struct InventoryService {
    ledger: Arc<dyn InventoryLedger>,
    catalog: Arc<dyn CatalogStore>,
}

impl InventoryService {
    pub fn new(ledger: Arc<dyn InventoryLedger>, catalog: Arc<dyn CatalogStore>) -> Self {
        Self { ledger, catalog }
    }

    // ---
    // Primitivas do livro-razão
    // ---

    /// Saldo atual; chave sem registro vale 0.
    pub async fn get_quantity(&self, tenant: &TenantContext, key: StockKey) -> Result<i32, AppError> {
        Ok(self
            .ledger
            .get_record(tenant, key)
            .await?
            .map(|r| r.quantity)
            .unwrap_or(0))
    }

    pub async fn reserve_and_decrement(
        &self,
        tenant: &TenantContext,
        key: StockKey,
        amount: i32,
        note: MovementNote,
    ) -> Result<i32, AppError> {
        if !(1..=MAX_STOCK_QUANTITY).contains(&amount) {
            return Err(AppError::InvalidQuantity(amount));
        }

        let remaining = self.ledger.reserve_and_decrement(tenant, key, amount, note).await?;
        tracing::debug!(
            "📉 Baixa de {} un. (produto {}, loja {}): restam {}",
            amount,
            key.product_id,
            key.location_id,
            remaining
        );
        Ok(remaining)
    }

    pub async fn increment(
        &self,
        tenant: &TenantContext,
        key: StockKey,
        amount: i32,
        note: MovementNote,
    ) -> Result<i32, AppError> {
        if !(1..=MAX_STOCK_QUANTITY).contains(&amount) {
            return Err(AppError::InvalidQuantity(amount));
        }

        let quantity = self.ledger.increment(tenant, key, amount, note).await?;
        tracing::debug!(
            "📈 Entrada de {} un. (produto {}, loja {}, motivo {:?}): saldo {}",
            amount,
            key.product_id,
            key.location_id,
            note.reason,
            quantity
        );
        Ok(quantity)
    }

    pub async fn movements_for_order(
        &self,
        tenant: &TenantContext,
        order_id: Uuid,
    ) -> Result<Vec<StockMovement>, AppError> {
        self.ledger.movements_for_order(tenant, order_id).await
    }

    // ---
    // Operações administrativas (com ator)
    // ---

    pub async fn get_record(
        &self,
        tenant: &TenantContext,
        actor: &Actor,
        key: StockKey,
    ) -> Result<InventoryRecord, AppError> {
        AccessGate::authorize_at(Some(actor), Operation::ViewInventory, key.location_id)?;
        self.ensure_key_exists(tenant, key).await?;

        let record = self.ledger.get_record(tenant, key).await?;
        // Sem registro: saldo zero, com os níveis padrão
        Ok(record.unwrap_or_else(|| InventoryRecord {
            tenant_id: tenant.tenant_id(),
            product_id: key.product_id,
            location_id: key.location_id,
            quantity: 0,
            min_stock: 0,
            reorder_point: 0,
            updated_at: chrono::Utc::now(),
        }))
    }

    pub async fn upsert_levels(
        &self,
        tenant: &TenantContext,
        actor: &Actor,
        key: StockKey,
        levels: StockLevels,
    ) -> Result<InventoryRecord, AppError> {
        AccessGate::authorize_at(Some(actor), Operation::AdjustInventory, key.location_id)?;

        if !(0..=MAX_STOCK_QUANTITY).contains(&levels.quantity) {
            return Err(AppError::InvalidQuantity(levels.quantity));
        }
        for level in [levels.min_stock, levels.reorder_point].into_iter().flatten() {
            if !(0..=MAX_STOCK_QUANTITY).contains(&level) {
                return Err(AppError::InvalidQuantity(level));
            }
        }
        self.ensure_key_exists(tenant, key).await?;

        let record = self.ledger.upsert_levels(tenant, key, levels).await?;
        tracing::info!(
            "🛠️ Níveis ajustados por {} (produto {}, loja {}): saldo {}",
            actor.id(),
            key.product_id,
            key.location_id,
            record.quantity
        );
        if record.needs_reorder() {
            tracing::warn!(
                "⚠️ Produto {} abaixo do ponto de reposição na loja {}",
                key.product_id,
                key.location_id
            );
        }
        Ok(record)
    }

    pub async fn restock(
        &self,
        tenant: &TenantContext,
        actor: &Actor,
        key: StockKey,
        amount: i32,
    ) -> Result<i32, AppError> {
        AccessGate::authorize_at(Some(actor), Operation::AdjustInventory, key.location_id)?;
        self.ensure_key_exists(tenant, key).await?;

        self.increment(tenant, key, amount, MovementNote::new(StockMovementReason::Restock))
            .await
    }

    /// Move estoque entre duas lojas do mesmo tenant. A saída é checada como
    /// uma baixa de venda; se a entrada falhar, a saída é devolvida.
    pub async fn transfer(
        &self,
        tenant: &TenantContext,
        actor: &Actor,
        product_id: Uuid,
        from_location_id: Uuid,
        to_location_id: Uuid,
        quantity: i32,
    ) -> Result<TransferResult, AppError> {
        AccessGate::authorize_at(Some(actor), Operation::TransferStock, from_location_id)?;
        AccessGate::authorize_at(Some(actor), Operation::TransferStock, to_location_id)?;

        if from_location_id == to_location_id {
            return Err(AppError::InvalidAmount(
                "source and destination locations must differ".into(),
            ));
        }

        let from = StockKey::new(product_id, from_location_id);
        let to = StockKey::new(product_id, to_location_id);
        self.ensure_key_exists(tenant, from).await?;
        self.ensure_key_exists(tenant, to).await?;

        let from_quantity = self
            .reserve_and_decrement(tenant, from, quantity, MovementNote::new(StockMovementReason::TransferOut))
            .await?;

        let to_quantity = match self
            .increment(tenant, to, quantity, MovementNote::new(StockMovementReason::TransferIn))
            .await
        {
            Ok(q) => q,
            Err(e) => {
                tracing::error!("Falha na entrada da transferência, devolvendo a saída: {}", e);
                if let Err(undo) = self
                    .increment(tenant, from, quantity, MovementNote::new(StockMovementReason::Compensation))
                    .await
                {
                    tracing::error!(
                        "🔥 FATAL: transferência de {} un. do produto {} ficou sem estorno: {}",
                        quantity,
                        product_id,
                        undo
                    );
                    return Err(AppError::CompensationFailed(undo.to_string()));
                }
                return Err(e);
            }
        };

        tracing::info!(
            "🔁 Transferência de {} un. do produto {}: {} -> {}",
            quantity,
            product_id,
            from_location_id,
            to_location_id
        );

        Ok(TransferResult {
            product_id,
            from_location_id,
            to_location_id,
            quantity,
            from_quantity,
            to_quantity,
        })
    }

    /// Produto e loja precisam existir no tenant antes de criar um registro.
    async fn ensure_key_exists(&self, tenant: &TenantContext, key: StockKey) -> Result<(), AppError> {
        self.catalog
            .find_product(tenant, key.product_id)
            .await?
            .ok_or(AppError::ProductNotFound(key.product_id))?;
        self.catalog
            .find_location(tenant, key.location_id)
            .await?
            .ok_or(AppError::LocationNotFound(key.location_id))?;
        Ok(())
    }
}
