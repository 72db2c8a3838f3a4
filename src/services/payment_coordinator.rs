// src/services/payment_coordinator.rs

use std::sync::Arc;

use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{OrderStore, PaymentLogStore},
    middleware::tenancy::TenantContext,
    models::{
        auth::Actor,
        orders::{CartRequest, Order, OrderWithLines, PaymentStatus, Settlement},
        payments::{
            plan_transition, CaptureException, CaptureExceptionReason, IntentHandle, IntentStatus,
            NewCaptureException, PaymentIntent, PaymentSignal, RefundReason, RefundResult, WebhookEvent,
            WebhookEventKind,
        },
    },
    services::{
        access_gate::{AccessGate, Operation},
        order_assembler::OrderAssembler,
        payment_gateway::{from_minor_units, to_minor_units, IntentRequest, PaymentGateway, RefundRequest},
        sale_commit::SaleCommitter,
    },
};

// Tentativas do compare-and-swap antes de desistir
const MAX_TRANSITION_ATTEMPTS: usize = 5;

/// O que aconteceu com um evento de webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// O pedido avançou de estado
    Applied,
    /// O pedido já estava nesse estado ou além (re-entrega, fora de ordem)
    AlreadyApplied,
    /// Evento com o mesmo id já processado
    Duplicate,
    /// Captura sem pedido local: virou exceção de captura
    Unmatched,
    /// Evento sem efeito no núcleo
    Ignored,
}

/// Ciclo de vida do pagamento com cartão: intent, confirmação + commit,
/// reconciliação por webhook e reembolso.
#[derive(Clone)]
pub struct PaymentCoordinator {
    gateway: Arc<dyn PaymentGateway>,
    assembler: OrderAssembler,
    committer: SaleCommitter,
    orders: Arc<dyn OrderStore>,
    payment_log: Arc<dyn PaymentLogStore>,
    // (tenant, intent) -> trava das confirmações em andamento neste processo
    confirm_locks: Arc<DashMap<(Uuid, String), Arc<Mutex<()>>>>,
}

impl PaymentCoordinator {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        assembler: OrderAssembler,
        committer: SaleCommitter,
        orders: Arc<dyn OrderStore>,
        payment_log: Arc<dyn PaymentLogStore>,
    ) -> Self {
        Self {
            gateway,
            assembler,
            committer,
            orders,
            payment_log,
            confirm_locks: Arc::new(DashMap::new()),
        }
    }

    // ---
    // 1. Intent
    // ---

    pub async fn create_intent(
        &self,
        tenant: &TenantContext,
        actor: &Actor,
        amount: Decimal,
        currency: &str,
    ) -> Result<IntentHandle, AppError> {
        AccessGate::authorize(Some(actor), Operation::CreatePaymentIntent)?;
        self.open_intent(tenant, amount, currency, None).await
    }

    /// Abre o intent sem checar permissão (o chamador já checou).
    pub(crate) async fn open_intent(
        &self,
        tenant: &TenantContext,
        amount: Decimal,
        currency: &str,
        idempotency_key: Option<String>,
    ) -> Result<IntentHandle, AppError> {
        if amount <= Decimal::ZERO {
            return Err(AppError::InvalidAmount("amount must be greater than zero".into()));
        }
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(AppError::InvalidAmount("currency must be a 3-letter ISO code".into()));
        }

        let request = IntentRequest {
            amount_cents: to_minor_units(amount)?,
            currency: currency.to_lowercase(),
            tenant_id: tenant.tenant_id(),
            idempotency_key,
        };
        let intent = self.gateway.create_intent(&request).await?;
        let client_secret = intent
            .client_secret
            .clone()
            .ok_or_else(|| AppError::GatewayError(format!("intent {} without client secret", intent.id)))?;

        tracing::info!("💳 Intent {} criado ({} {})", intent.id, amount, request.currency);

        Ok(IntentHandle {
            intent_id: intent.id,
            client_secret,
            amount: from_minor_units(intent.amount),
            currency: intent.currency,
        })
    }

    // ---
    // 2. Confirmação + commit
    // ---

    /// Idempotente por intent: repetir a chamada devolve o mesmo pedido e
    /// nunca baixa estoque duas vezes.
    #[tracing::instrument(skip_all, fields(tenant_id = %tenant.tenant_id(), intent_id = %intent_id))]
    pub async fn confirm_and_commit(
        &self,
        tenant: &TenantContext,
        actor: &Actor,
        intent_id: &str,
        cart: &CartRequest,
    ) -> Result<OrderWithLines, AppError> {
        AccessGate::authorize_at(Some(actor), Operation::ConfirmPayment, cart.location_id)?;

        // Confirmações do mesmo intent neste processo rodam uma por vez; entre
        // processos, o índice único de intent continua sendo a garantia.
        let lock_key = (tenant.tenant_id(), intent_id.to_string());
        let lock = self.confirm_locks.entry(lock_key.clone()).or_default().clone();
        let guard = lock.lock_owned().await;

        let result = self.confirm_serialized(tenant, intent_id, cart).await;

        drop(guard);
        self.confirm_locks.remove_if(&lock_key, |_, m| Arc::strong_count(m) == 1);
        result
    }

    async fn confirm_serialized(
        &self,
        tenant: &TenantContext,
        intent_id: &str,
        cart: &CartRequest,
    ) -> Result<OrderWithLines, AppError> {
        // 1. Já confirmado antes?
        if let Some(existing) = self.existing_order_for(tenant, intent_id).await? {
            tracing::info!("Intent {} já confirmado no pedido {}", intent_id, existing.order.id);
            return Ok(existing);
        }

        // 2. O gateway é a fonte da verdade sobre a captura
        let intent = self.gateway.retrieve_intent(intent_id).await?;
        if intent.tenant_id() != Some(tenant.tenant_id()) {
            tracing::warn!("Intent {} não pertence ao tenant {}", intent_id, tenant.tenant_id());
            return Err(AppError::PaymentIntentNotFound(intent_id.to_string()));
        }
        if intent.status != IntentStatus::Succeeded {
            return Err(AppError::PaymentNotCompleted { status: intent.status.as_str().to_string() });
        }

        // 3. Rascunho (o dinheiro já foi capturado a partir daqui)
        let draft = match self.assembler.assemble(tenant, cart).await {
            Ok(draft) => draft,
            Err(e) => {
                return self
                    .settle_capture_failure(tenant, &intent, CaptureExceptionReason::CommitFailed, e, None)
                    .await;
            }
        };

        if to_minor_units(draft.total_amount)? != intent.amount {
            let mismatch = AppError::InvalidAmount(format!(
                "captured {} but order total is {}",
                from_minor_units(intent.amount),
                draft.total_amount
            ));
            let irreconcilable = AppError::IrreconcilableCapture { intent_id: intent.id.clone() };
            return self
                .settle_capture_failure(
                    tenant,
                    &intent,
                    CaptureExceptionReason::AmountMismatch,
                    mismatch,
                    Some(irreconcilable),
                )
                .await;
        }

        // 4. Commit
        let settlement = Settlement::captured_card(&intent.id, intent.latest_charge.clone());
        match self.committer.commit(tenant, &draft, settlement).await {
            Ok(order) => {
                let resolved = self.payment_log.resolve_capture_exceptions(tenant, &intent.id).await?;
                if resolved > 0 {
                    tracing::info!("✅ {} exceção(ões) de captura do intent {} resolvida(s)", resolved, intent.id);
                }
                Ok(order)
            }
            // Outra confirmação concorrente venceu: as baixas desta já foram devolvidas
            Err(AppError::DuplicatePaymentIntent(_)) => self
                .existing_order_for(tenant, &intent.id)
                .await?
                .ok_or_else(|| AppError::PaymentIntentNotFound(intent.id.clone())),
            Err(e) => {
                self.settle_capture_failure(tenant, &intent, CaptureExceptionReason::CommitFailed, e, None)
                    .await
            }
        }
    }

    /// Falha depois da captura. Se outra confirmação do mesmo intent já gravou
    /// o pedido, ele é a resposta; senão a captura vira exceção. A segunda
    /// leitura cobre o vencedor que grava entre a primeira e o registro.
    async fn settle_capture_failure(
        &self,
        tenant: &TenantContext,
        intent: &PaymentIntent,
        reason: CaptureExceptionReason,
        cause: AppError,
        reported: Option<AppError>,
    ) -> Result<OrderWithLines, AppError> {
        if let Some(existing) = self.existing_order_for(tenant, &intent.id).await? {
            tracing::info!(
                "Intent {} já virou o pedido {}; descartando a falha local: {}",
                intent.id,
                existing.order.id,
                cause
            );
            return Ok(existing);
        }

        self.record_capture_exception(tenant, intent, reason, &cause).await;

        if let Some(existing) = self.existing_order_for(tenant, &intent.id).await? {
            self.payment_log.resolve_capture_exceptions(tenant, &intent.id).await?;
            tracing::info!("Intent {} gravado em paralelo no pedido {}", intent.id, existing.order.id);
            return Ok(existing);
        }

        Err(reported.unwrap_or(cause))
    }

    async fn existing_order_for(
        &self,
        tenant: &TenantContext,
        intent_id: &str,
    ) -> Result<Option<OrderWithLines>, AppError> {
        match self.orders.find_by_intent(tenant, intent_id).await? {
            Some(order) => self.orders.find_order(tenant, order.id).await,
            None => Ok(None),
        }
    }

    /// Dinheiro capturado sem pedido: registra para conciliação manual.
    /// Falhar ao registrar não pode esconder o erro original.
    async fn record_capture_exception(
        &self,
        tenant: &TenantContext,
        intent: &PaymentIntent,
        reason: CaptureExceptionReason,
        cause: &AppError,
    ) {
        tracing::error!(
            "🚨 Pagamento {} capturado ({} {}) sem pedido: {:?} ({})",
            intent.id,
            from_minor_units(intent.amount),
            intent.currency,
            reason,
            cause
        );

        let exception = NewCaptureException {
            payment_intent_id: intent.id.clone(),
            amount: Some(from_minor_units(intent.amount)),
            reason,
            detail: cause.to_string(),
        };
        if let Err(e) = self.payment_log.record_capture_exception(tenant, exception).await {
            tracing::error!("🔥 FATAL: não foi possível registrar a exceção do intent {}: {}", intent.id, e);
        }
    }

    // ---
    // 3. Webhooks
    // ---

    /// Aplica um evento já verificado. Re-entregas e eventos fora de ordem não
    /// alteram nada: o estado do pagamento só avança.
    #[tracing::instrument(skip_all, fields(tenant_id = %tenant.tenant_id(), event_id = %event.id))]
    pub async fn reconcile_webhook(
        &self,
        tenant: &TenantContext,
        event: &WebhookEvent,
    ) -> Result<ReconcileOutcome, AppError> {
        if self.payment_log.webhook_event_seen(tenant, &event.id).await? {
            tracing::debug!("Evento {} já processado", event.id);
            return Ok(ReconcileOutcome::Duplicate);
        }

        let outcome = match &event.kind {
            WebhookEventKind::PaymentSucceeded => {
                let signal = PaymentSignal::Succeeded { charge_id: event.charge_id() };
                self.apply_event_signal(tenant, event, signal, true).await?
            }
            WebhookEventKind::PaymentFailed => {
                self.apply_event_signal(tenant, event, PaymentSignal::Failed, false).await?
            }
            WebhookEventKind::ChargeRefunded => {
                self.apply_event_signal(tenant, event, PaymentSignal::Refunded, false).await?
            }
            WebhookEventKind::DisputeCreated => {
                tracing::warn!(
                    "⚠️ Disputa aberta para o charge {} (intent {:?})",
                    event.object.id,
                    event.intent_id()
                );
                ReconcileOutcome::Ignored
            }
            WebhookEventKind::Other(kind) => {
                tracing::debug!("Evento {} do tipo {} ignorado", event.id, kind);
                ReconcileOutcome::Ignored
            }
        };

        let event_type = match &event.kind {
            WebhookEventKind::PaymentSucceeded => "payment_intent.succeeded",
            WebhookEventKind::PaymentFailed => "payment_intent.payment_failed",
            WebhookEventKind::ChargeRefunded => "charge.refunded",
            WebhookEventKind::DisputeCreated => "charge.dispute.created",
            WebhookEventKind::Other(kind) => kind.as_str(),
        };
        self.payment_log
            .record_webhook_event(tenant, &event.id, event_type, event.intent_id())
            .await?;

        Ok(outcome)
    }

    async fn apply_event_signal(
        &self,
        tenant: &TenantContext,
        event: &WebhookEvent,
        signal: PaymentSignal,
        capture: bool,
    ) -> Result<ReconcileOutcome, AppError> {
        let Some(intent_id) = event.intent_id() else {
            return Ok(ReconcileOutcome::Ignored);
        };

        let Some(order) = self.orders.find_by_intent(tenant, intent_id).await? else {
            if !capture {
                return Ok(ReconcileOutcome::Ignored);
            }
            // Pode ser só a corrida com o confirm; o commit resolve a exceção depois
            tracing::warn!("Webhook de captura do intent {} sem pedido local", intent_id);
            self.payment_log
                .record_capture_exception(
                    tenant,
                    NewCaptureException {
                        payment_intent_id: intent_id.to_string(),
                        amount: event.object.amount.map(from_minor_units),
                        reason: CaptureExceptionReason::UnmatchedWebhook,
                        detail: format!("event {}", event.id),
                    },
                )
                .await?;
            return Ok(ReconcileOutcome::Unmatched);
        };

        match self.apply_signal(tenant, order, &signal).await? {
            Some(updated) => {
                tracing::info!(
                    "🔄 Pedido {} -> {:?} ({:?}) via evento {}",
                    updated.id,
                    updated.status,
                    updated.payment_status,
                    event.id
                );
                Ok(ReconcileOutcome::Applied)
            }
            None => Ok(ReconcileOutcome::AlreadyApplied),
        }
    }

    /// Compare-and-swap com releitura. `None` se o sinal não avança o estado.
    async fn apply_signal(
        &self,
        tenant: &TenantContext,
        order: Order,
        signal: &PaymentSignal,
    ) -> Result<Option<Order>, AppError> {
        let order_id = order.id;
        let mut current = order;

        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let Some(transition) = plan_transition(current.payment_status, current.charge_id.as_deref(), signal)
            else {
                return Ok(None);
            };

            if let Some(updated) = self.orders.transition_payment(tenant, order_id, &transition).await? {
                return Ok(Some(updated));
            }

            // Outro escritor chegou antes: relê e recalcula
            current = self
                .orders
                .find_order(tenant, order_id)
                .await?
                .ok_or(AppError::OrderNotFound(order_id))?
                .order;
        }

        Err(AppError::InternalServerError(anyhow::anyhow!(
            "payment state of order {} kept changing",
            order_id
        )))
    }

    // ---
    // 4. Reembolso
    // ---

    #[tracing::instrument(skip_all, fields(tenant_id = %tenant.tenant_id(), order_id = %order_id))]
    pub async fn refund(
        &self,
        tenant: &TenantContext,
        actor: &Actor,
        order_id: Uuid,
        amount: Option<Decimal>,
        reason: RefundReason,
    ) -> Result<RefundResult, AppError> {
        let order = self
            .orders
            .find_order(tenant, order_id)
            .await?
            .ok_or(AppError::OrderNotFound(order_id))?
            .order;

        AccessGate::authorize_at(Some(actor), Operation::Refund, order.location_id)?;

        if order.payment_status != Some(PaymentStatus::Succeeded) {
            return Err(AppError::NotRefundable(format!("payment status is {:?}", order.payment_status)));
        }
        let charge_id = order
            .charge_id
            .clone()
            .ok_or_else(|| AppError::NotRefundable("order has no captured charge".into()))?;

        let amount_cents = match amount {
            Some(a) if a <= Decimal::ZERO => {
                return Err(AppError::InvalidAmount("refund amount must be greater than zero".into()));
            }
            Some(a) if a > order.total_amount => {
                return Err(AppError::InvalidAmount(format!(
                    "refund amount {} exceeds order total {}",
                    a, order.total_amount
                )));
            }
            Some(a) => Some(to_minor_units(a)?),
            None => None,
        };

        let refund = self
            .gateway
            .refund(&RefundRequest {
                charge_id,
                amount_cents,
                reason,
                tenant_id: tenant.tenant_id(),
                order_id,
                // Um reembolso por pedido: repetir a chamada não duplica
                idempotency_key: format!("refund-{order_id}"),
            })
            .await?;

        let signal = if refund.succeeded() {
            PaymentSignal::Refunded
        } else {
            PaymentSignal::RefundPending
        };

        let updated = match self.apply_signal(tenant, order, &signal).await? {
            Some(updated) => updated,
            // O webhook chegou antes e já avançou o pedido
            None => self
                .orders
                .find_order(tenant, order_id)
                .await?
                .ok_or(AppError::OrderNotFound(order_id))?
                .order,
        };

        tracing::info!(
            "💸 Reembolso {} do pedido {} ({}): pedido agora {:?}",
            refund.id,
            order_id,
            refund.status,
            updated.status
        );

        Ok(RefundResult {
            order_id,
            refund_id: refund.id,
            amount: from_minor_units(refund.amount),
            gateway_status: refund.status,
            order_status: updated.status,
        })
    }

    // ---
    // 5. Auditoria
    // ---

    pub async fn open_capture_exceptions(
        &self,
        tenant: &TenantContext,
        actor: &Actor,
    ) -> Result<Vec<CaptureException>, AppError> {
        AccessGate::authorize(Some(actor), Operation::ReviewPaymentExceptions)?;
        self.payment_log.list_open_capture_exceptions(tenant).await
    }
}
