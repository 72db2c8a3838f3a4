// tests/support/mod.rs
//
// Mundo de teste: armazenamento em memória, gateway falso e dados semeados.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use sqlx::types::Json;
use uuid::Uuid;

use checkout_engine::{
    common::error::AppError,
    config::{AppState, Settings, StorageBackend},
    db::{InventoryLedger, MemoryStore, OrderStore, Stores, UserStore},
    middleware::tenancy::TenantContext,
    models::{
        auth::{Actor, LocationAssignment, User, UserRole},
        catalog::{Customer, Product},
        inventory::{InventoryRecord, MovementNote, StockKey, StockLevels, StockMovement, StockMovementReason},
        orders::{Order, OrderDraft, OrderWithLines, PaymentTransition, Settlement},
        payments::{GatewayRefund, IntentStatus, PaymentIntent},
        tenancy::{Location, Tenant},
    },
    services::payment_gateway::{IntentRequest, PaymentGateway, RefundRequest},
};

pub const JWT_SECRET: &str = "segredo-de-teste";
pub const WEBHOOK_SECRET: &str = "whsec_teste";

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

pub fn test_settings() -> Settings {
    Settings {
        storage_backend: StorageBackend::Memory,
        database_url: None,
        database_max_connections: 1,
        jwt_secret: JWT_SECRET.into(),
        stripe_secret_key: "sk_test".into(),
        stripe_webhook_secret: WEBHOOK_SECRET.into(),
        stripe_api_base: "http://localhost:0".into(),
        payment_gateway_timeout: Duration::from_secs(1),
        webhook_tolerance_secs: 300,
        bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
    }
}

// ---
// Gateway falso
// ---

#[derive(Default)]
pub struct FakeGateway {
    intents: DashMap<String, PaymentIntent>,
    // chave de idempotência -> intent
    intent_keys: DashMap<String, String>,
    // chave de idempotência -> reembolso
    refunds: DashMap<String, GatewayRefund>,
    seq: AtomicU64,
    refund_calls: AtomicU64,
    refunds_pending: AtomicBool,
    unavailable: AtomicBool,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simula o cliente concluindo o pagamento no terminal.
    pub fn complete(&self, intent_id: &str) {
        if let Some(mut intent) = self.intents.get_mut(intent_id) {
            intent.status = IntentStatus::Succeeded;
            intent.latest_charge = Some(format!("ch_{}", &intent_id[3..]));
        }
    }

    pub fn set_status(&self, intent_id: &str, status: IntentStatus) {
        if let Some(mut intent) = self.intents.get_mut(intent_id) {
            intent.status = status;
        }
    }

    /// Cria direto no gateway um intent já capturado (ex.: outro canal).
    pub fn captured_intent(&self, tenant_id: Uuid, amount_cents: i64) -> PaymentIntent {
        let n = self.seq.fetch_add(1, Ordering::SeqCst);
        let id = format!("pi_ext{n}");
        let intent = PaymentIntent {
            id: id.clone(),
            client_secret: Some(format!("{id}_secret")),
            status: IntentStatus::Succeeded,
            amount: amount_cents,
            currency: "usd".into(),
            latest_charge: Some(format!("ch_ext{n}")),
            metadata: HashMap::from([("tenant_id".to_string(), tenant_id.to_string())]),
        };
        self.intents.insert(id, intent.clone());
        intent
    }

    pub fn intent(&self, intent_id: &str) -> Option<PaymentIntent> {
        self.intents.get(intent_id).map(|i| i.clone())
    }

    pub fn refund_calls(&self) -> u64 {
        self.refund_calls.load(Ordering::SeqCst)
    }

    pub fn refunds_settle_later(&self) {
        self.refunds_pending.store(true, Ordering::SeqCst);
    }

    pub fn go_down(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    fn ensure_up(&self) -> Result<(), AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::GatewayError("gateway timeout".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent, AppError> {
        self.ensure_up()?;
        let replay = request
            .idempotency_key
            .as_ref()
            .and_then(|key| self.intent_keys.get(key).map(|id| id.clone()));
        if let Some(existing) = replay {
            return self.retrieve_intent(&existing).await;
        }

        let n = self.seq.fetch_add(1, Ordering::SeqCst);
        let id = format!("pi_{n}");
        let intent = PaymentIntent {
            id: id.clone(),
            client_secret: Some(format!("{id}_secret")),
            status: IntentStatus::RequiresPaymentMethod,
            amount: request.amount_cents,
            currency: request.currency.clone(),
            latest_charge: None,
            metadata: HashMap::from([("tenant_id".to_string(), request.tenant_id.to_string())]),
        };
        self.intents.insert(id.clone(), intent.clone());
        if let Some(key) = &request.idempotency_key {
            self.intent_keys.insert(key.clone(), id);
        }
        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, AppError> {
        self.ensure_up()?;
        self.intent(intent_id)
            .ok_or_else(|| AppError::PaymentIntentNotFound(intent_id.to_string()))
    }

    async fn refund(&self, request: &RefundRequest) -> Result<GatewayRefund, AppError> {
        self.ensure_up()?;
        if let Some(existing) = self.refunds.get(&request.idempotency_key) {
            return Ok(existing.clone());
        }
        self.refund_calls.fetch_add(1, Ordering::SeqCst);

        let captured = self
            .intents
            .iter()
            .find(|i| i.latest_charge.as_deref() == Some(request.charge_id.as_str()))
            .map(|i| i.amount)
            .ok_or_else(|| AppError::GatewayError(format!("no such charge: {}", request.charge_id)))?;

        let status = if self.refunds_pending.load(Ordering::SeqCst) { "pending" } else { "succeeded" };
        let refund = GatewayRefund {
            id: format!("re_{}", self.seq.fetch_add(1, Ordering::SeqCst)),
            amount: request.amount_cents.unwrap_or(captured),
            status: status.into(),
        };
        self.refunds.insert(request.idempotency_key.clone(), refund.clone());
        Ok(refund)
    }
}

// ---
// Armazenamentos que falham sob demanda
// ---

/// Delega ao `MemoryStore`, mas recusa gravar pedidos.
pub struct FailingOrders {
    pub inner: Arc<MemoryStore>,
}

#[async_trait]
impl OrderStore for FailingOrders {
    async fn insert_order(
        &self,
        _tenant: &TenantContext,
        _draft: &OrderDraft,
        _settlement: &Settlement,
    ) -> Result<OrderWithLines, AppError> {
        Err(AppError::InternalServerError(anyhow::anyhow!("orders table unavailable")))
    }

    async fn find_order(&self, tenant: &TenantContext, order_id: Uuid) -> Result<Option<OrderWithLines>, AppError> {
        self.inner.find_order(tenant, order_id).await
    }

    async fn find_by_intent(&self, tenant: &TenantContext, intent_id: &str) -> Result<Option<Order>, AppError> {
        self.inner.find_by_intent(tenant, intent_id).await
    }

    async fn transition_payment(
        &self,
        tenant: &TenantContext,
        order_id: Uuid,
        transition: &PaymentTransition,
    ) -> Result<Option<Order>, AppError> {
        self.inner.transition_payment(tenant, order_id, transition).await
    }
}

/// Delega ao `MemoryStore`, mas as próximas `n` buscas por intent respondem
/// "nenhum pedido", como uma leitura feita antes de outro confirm gravar.
pub struct StaleIntentLookup {
    inner: Arc<MemoryStore>,
    blind: AtomicU64,
}

impl StaleIntentLookup {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self { inner, blind: AtomicU64::new(0) }
    }

    pub fn miss_next(&self, n: u64) {
        self.blind.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl OrderStore for StaleIntentLookup {
    async fn insert_order(
        &self,
        tenant: &TenantContext,
        draft: &OrderDraft,
        settlement: &Settlement,
    ) -> Result<OrderWithLines, AppError> {
        self.inner.insert_order(tenant, draft, settlement).await
    }

    async fn find_order(&self, tenant: &TenantContext, order_id: Uuid) -> Result<Option<OrderWithLines>, AppError> {
        self.inner.find_order(tenant, order_id).await
    }

    async fn find_by_intent(&self, tenant: &TenantContext, intent_id: &str) -> Result<Option<Order>, AppError> {
        let missed = self
            .blind
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if missed {
            return Ok(None);
        }
        self.inner.find_by_intent(tenant, intent_id).await
    }

    async fn transition_payment(
        &self,
        tenant: &TenantContext,
        order_id: Uuid,
        transition: &PaymentTransition,
    ) -> Result<Option<Order>, AppError> {
        self.inner.transition_payment(tenant, order_id, transition).await
    }
}

/// Delega ao `MemoryStore`, mas a baixa de um produto específico falha como
/// se outro caixa tivesse levado a última unidade entre a validação e o commit.
pub struct RacingLedger {
    inner: Arc<MemoryStore>,
    contested: Mutex<Option<Uuid>>,
    // Quando ligado, devolver estoque também falha
    refuse_increments: AtomicBool,
}

impl RacingLedger {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self { inner, contested: Mutex::new(None), refuse_increments: AtomicBool::new(false) }
    }

    pub fn contest(&self, product_id: Uuid) {
        *self.contested.lock().unwrap() = Some(product_id);
    }

    pub fn refuse_increments(&self) {
        self.refuse_increments.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl InventoryLedger for RacingLedger {
    async fn get_record(&self, tenant: &TenantContext, key: StockKey) -> Result<Option<InventoryRecord>, AppError> {
        self.inner.get_record(tenant, key).await
    }

    async fn reserve_and_decrement(
        &self,
        tenant: &TenantContext,
        key: StockKey,
        amount: i32,
        note: MovementNote,
    ) -> Result<i32, AppError> {
        let contested = *self.contested.lock().unwrap();
        if contested == Some(key.product_id) {
            return Err(AppError::InsufficientStock {
                product_id: key.product_id,
                product_name: None,
                requested: amount,
                available: 0,
            });
        }
        self.inner.reserve_and_decrement(tenant, key, amount, note).await
    }

    async fn increment(
        &self,
        tenant: &TenantContext,
        key: StockKey,
        amount: i32,
        note: MovementNote,
    ) -> Result<i32, AppError> {
        if self.refuse_increments.load(Ordering::SeqCst) {
            return Err(AppError::InternalServerError(anyhow::anyhow!("ledger offline")));
        }
        self.inner.increment(tenant, key, amount, note).await
    }

    async fn upsert_levels(
        &self,
        tenant: &TenantContext,
        key: StockKey,
        levels: StockLevels,
    ) -> Result<InventoryRecord, AppError> {
        self.inner.upsert_levels(tenant, key, levels).await
    }

    async fn movements_for_order(&self, tenant: &TenantContext, order_id: Uuid) -> Result<Vec<StockMovement>, AppError> {
        self.inner.movements_for_order(tenant, order_id).await
    }
}

// ---
// Mundo semeado
// ---

/// Um tenant com uma loja, um produto (5.00) e três usuários:
/// admin (todas as lojas), caixa vinculado à loja e caixa sem loja.
pub struct World {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<FakeGateway>,
    pub state: AppState,
    pub tenant_id: Uuid,
    pub location_id: Uuid,
    pub product_id: Uuid,
    pub admin_id: Uuid,
    pub cashier_id: Uuid,
    pub outsider_id: Uuid,
}

pub fn seed_tenant(store: &MemoryStore, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    store.insert_tenant(Tenant { id, name: name.into(), is_active: true, created_at: Utc::now() });
    id
}

pub fn seed_location(store: &MemoryStore, tenant_id: Uuid) -> Uuid {
    let id = Uuid::new_v4();
    store.insert_location(Location {
        id,
        tenant_id,
        name: "Loja Centro".into(),
        tax_rate: Decimal::ZERO,
        pricing_multiplier: Decimal::ONE,
        currency: "USD".into(),
        is_active: true,
        created_at: Utc::now(),
    });
    id
}

pub fn seed_product(store: &MemoryStore, tenant_id: Uuid, name: &str, price: &str) -> Uuid {
    let id = Uuid::new_v4();
    store.insert_product(Product {
        id,
        tenant_id,
        sku: format!("SKU-{}", &id.simple().to_string()[..8]),
        name: name.into(),
        price: dec(price),
        location_pricing: Json(HashMap::new()),
        created_at: Utc::now(),
    });
    id
}

pub fn seed_customer(store: &MemoryStore, tenant_id: Uuid) -> Uuid {
    let id = Uuid::new_v4();
    store.insert_customer(Customer { id, tenant_id, name: "Maria".into(), created_at: Utc::now() });
    id
}

pub fn seed_user(store: &MemoryStore, tenant_id: Uuid, role: UserRole) -> Uuid {
    let id = Uuid::new_v4();
    store.insert_user(User {
        id,
        tenant_id,
        email: format!("{}@loja.com", &id.simple().to_string()[..8]),
        role,
        is_active: true,
        created_at: Utc::now(),
    });
    id
}

impl World {
    pub async fn new() -> Self {
        Self::build(|_, _| {}).await
    }

    /// Permite trocar repositórios (ex.: os que falham) antes de montar o estado.
    pub async fn build(customize: impl FnOnce(&Arc<MemoryStore>, &mut Stores)) -> Self {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::new());

        let tenant_id = seed_tenant(&store, "Mercado Central");
        let location_id = seed_location(&store, tenant_id);
        let product_id = seed_product(&store, tenant_id, "Café Torrado 500g", "5.00");
        let admin_id = seed_user(&store, tenant_id, UserRole::Admin);
        let cashier_id = seed_user(&store, tenant_id, UserRole::Cashier);
        let outsider_id = seed_user(&store, tenant_id, UserRole::Cashier);

        let mut stores = Stores::in_memory(store.clone());
        customize(&store, &mut stores);

        let state = AppState::from_parts(test_settings(), stores, gateway.clone(), None);

        let world = Self {
            store,
            gateway,
            state,
            tenant_id,
            location_id,
            product_id,
            admin_id,
            cashier_id,
            outsider_id,
        };

        let tenant = world.tenant().await;
        world
            .store
            .assign_location(
                &tenant,
                LocationAssignment { user_id: cashier_id, location_id, role: None, is_primary: true },
            )
            .await
            .unwrap();
        world
    }

    pub async fn tenant(&self) -> TenantContext {
        self.state.tenant_resolver.resolve_id(self.tenant_id).await.unwrap()
    }

    pub fn token(&self, user_id: Uuid) -> String {
        self.state
            .auth_service
            .create_token(user_id, self.tenant_id, chrono::Duration::minutes(5))
            .unwrap()
    }

    pub async fn actor(&self, user_id: Uuid) -> Actor {
        let tenant = self.tenant().await;
        self.state.auth_service.authenticate(&tenant, &self.token(user_id)).await.unwrap()
    }

    pub async fn set_stock(&self, product_id: Uuid, quantity: i32) {
        let tenant = self.tenant().await;
        self.store
            .increment(
                &tenant,
                StockKey::new(product_id, self.location_id),
                quantity,
                MovementNote::new(StockMovementReason::Restock),
            )
            .await
            .unwrap();
    }

    pub async fn stock(&self, product_id: Uuid) -> i32 {
        let tenant = self.tenant().await;
        self.state
            .inventory_service
            .get_quantity(&tenant, StockKey::new(product_id, self.location_id))
            .await
            .unwrap()
    }
}
