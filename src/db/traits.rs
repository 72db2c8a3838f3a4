// src/db/traits.rs

//! Contratos de armazenamento do núcleo.
//!
//! Com exceção de `TenantStore::find_tenant` (que é justamente quem produz o
//! `TenantContext`), todo método recebe o tenant verificado como primeiro
//! argumento. As implementações filtram por ele em toda leitura e escrita.

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    middleware::tenancy::TenantContext,
    models::{
        auth::{LocationAssignment, User},
        catalog::{Customer, Product},
        inventory::{InventoryRecord, MovementNote, StockKey, StockLevels, StockMovement},
        orders::{Order, OrderDraft, OrderWithLines, PaymentTransition, Settlement},
        payments::{CaptureException, NewCaptureException},
        tenancy::{Location, Tenant},
    },
};

#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn find_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, AppError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, tenant: &TenantContext, user_id: Uuid) -> Result<Option<User>, AppError>;

    async fn list_assignments(
        &self,
        tenant: &TenantContext,
        user_id: Uuid,
    ) -> Result<Vec<LocationAssignment>, AppError>;

    /// Cria ou atualiza o vínculo. Se `is_primary`, rebaixa o primário anterior
    /// na mesma operação atômica (no máximo um primário por usuário).
    async fn assign_location(
        &self,
        tenant: &TenantContext,
        assignment: LocationAssignment,
    ) -> Result<Vec<LocationAssignment>, AppError>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_location(&self, tenant: &TenantContext, location_id: Uuid) -> Result<Option<Location>, AppError>;
    async fn find_product(&self, tenant: &TenantContext, product_id: Uuid) -> Result<Option<Product>, AppError>;
    async fn find_customer(&self, tenant: &TenantContext, customer_id: Uuid) -> Result<Option<Customer>, AppError>;
}

/// O livro-razão de estoque: único escritor de `quantity`.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    async fn get_record(&self, tenant: &TenantContext, key: StockKey) -> Result<Option<InventoryRecord>, AppError>;

    /// Verifica `quantity >= amount` e subtrai, de forma indivisível em relação a
    /// outras baixas na mesma chave. Retorna o novo saldo ou `InsufficientStock`.
    async fn reserve_and_decrement(
        &self,
        tenant: &TenantContext,
        key: StockKey,
        amount: i32,
        note: MovementNote,
    ) -> Result<i32, AppError>;

    /// Soma ao saldo, criando o registro se não existir. Não tem pré-condições.
    async fn increment(
        &self,
        tenant: &TenantContext,
        key: StockKey,
        amount: i32,
        note: MovementNote,
    ) -> Result<i32, AppError>;

    async fn upsert_levels(
        &self,
        tenant: &TenantContext,
        key: StockKey,
        levels: StockLevels,
    ) -> Result<InventoryRecord, AppError>;

    async fn movements_for_order(&self, tenant: &TenantContext, order_id: Uuid) -> Result<Vec<StockMovement>, AppError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Grava o pedido e suas linhas juntos. Um intent já usado por outro pedido
    /// do tenant resulta em `DuplicatePaymentIntent`.
    async fn insert_order(
        &self,
        tenant: &TenantContext,
        draft: &OrderDraft,
        settlement: &Settlement,
    ) -> Result<OrderWithLines, AppError>;

    async fn find_order(&self, tenant: &TenantContext, order_id: Uuid) -> Result<Option<OrderWithLines>, AppError>;

    async fn find_by_intent(&self, tenant: &TenantContext, intent_id: &str) -> Result<Option<Order>, AppError>;

    /// Compare-and-swap: só grava se `payment_status` ainda for `transition.expected`.
    /// `None` quando outro escritor chegou antes.
    async fn transition_payment(
        &self,
        tenant: &TenantContext,
        order_id: Uuid,
        transition: &PaymentTransition,
    ) -> Result<Option<Order>, AppError>;
}

/// Registro de eventos de webhook já processados e das exceções de captura.
#[async_trait]
pub trait PaymentLogStore: Send + Sync {
    async fn webhook_event_seen(&self, tenant: &TenantContext, event_id: &str) -> Result<bool, AppError>;

    /// `true` se o evento foi registrado agora, `false` se já existia.
    async fn record_webhook_event(
        &self,
        tenant: &TenantContext,
        event_id: &str,
        event_type: &str,
        intent_id: Option<&str>,
    ) -> Result<bool, AppError>;

    async fn record_capture_exception(
        &self,
        tenant: &TenantContext,
        exception: NewCaptureException,
    ) -> Result<CaptureException, AppError>;

    async fn resolve_capture_exceptions(&self, tenant: &TenantContext, intent_id: &str) -> Result<u64, AppError>;

    async fn list_open_capture_exceptions(&self, tenant: &TenantContext) -> Result<Vec<CaptureException>, AppError>;
}
