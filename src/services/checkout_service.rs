// src/services/checkout_service.rs

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::OrderStore,
    middleware::tenancy::TenantContext,
    models::{
        auth::Actor,
        orders::{CartRequest, OrderWithLines, PaymentMethod, Settlement},
        payments::IntentHandle,
    },
    services::{
        access_gate::{AccessGate, Operation},
        order_assembler::OrderAssembler,
        payment_coordinator::PaymentCoordinator,
        sale_commit::SaleCommitter,
    },
};

/// Resultado do checkout: venda concluída, ou cartão aguardando pagamento.
#[derive(Debug, Clone)]
pub enum CheckoutOutcome {
    Committed(OrderWithLines),
    PaymentRequired(IntentHandle),
}

#[derive(Clone)]
pub struct CheckoutService {
    assembler: OrderAssembler,
    committer: SaleCommitter,
    payments: PaymentCoordinator,
    orders: Arc<dyn OrderStore>,
}

impl CheckoutService {
    pub fn new(
        assembler: OrderAssembler,
        committer: SaleCommitter,
        payments: PaymentCoordinator,
        orders: Arc<dyn OrderStore>,
    ) -> Self {
        Self { assembler, committer, payments, orders }
    }

    pub async fn checkout(
        &self,
        tenant: &TenantContext,
        actor: &Actor,
        cart: &CartRequest,
        payment_method: PaymentMethod,
    ) -> Result<CheckoutOutcome, AppError> {
        self.checkout_with_key(tenant, actor, cart, payment_method, None).await
    }

    /// `idempotency_key` vem do cliente (cabeçalho `Idempotency-Key`): repetir
    /// o checkout de cartão com a mesma chave devolve o mesmo intent.
    #[tracing::instrument(skip_all, fields(tenant_id = %tenant.tenant_id(), location_id = %cart.location_id, method = ?payment_method))]
    pub async fn checkout_with_key(
        &self,
        tenant: &TenantContext,
        actor: &Actor,
        cart: &CartRequest,
        payment_method: PaymentMethod,
        idempotency_key: Option<&str>,
    ) -> Result<CheckoutOutcome, AppError> {
        AccessGate::authorize_at(Some(actor), Operation::Checkout, cart.location_id)?;

        let draft = self.assembler.assemble(tenant, cart).await?;

        if payment_method.settles_immediately() {
            let order = self
                .committer
                .commit(tenant, &draft, Settlement::immediate(payment_method))
                .await?;
            return Ok(CheckoutOutcome::Committed(order));
        }

        // Cartão: nada é baixado até a confirmação do intent
        let handle = self
            .payments
            .open_intent(
                tenant,
                draft.total_amount,
                &draft.currency,
                // A chave do cliente vale só dentro do tenant
                idempotency_key.map(|key| format!("checkout-{}-{}", tenant.tenant_id(), key)),
            )
            .await?;
        Ok(CheckoutOutcome::PaymentRequired(handle))
    }

    pub async fn get_order(
        &self,
        tenant: &TenantContext,
        actor: &Actor,
        order_id: Uuid,
    ) -> Result<OrderWithLines, AppError> {
        let order = self
            .orders
            .find_order(tenant, order_id)
            .await?
            .ok_or(AppError::OrderNotFound(order_id))?;

        AccessGate::authorize_at(Some(actor), Operation::ViewOrder, order.order.location_id)?;
        Ok(order)
    }
}
