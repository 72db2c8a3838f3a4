// src/db/memory.rs

//! Backend em memória (DashMap). Usado pelos testes e pelo modo
//! `STORAGE_BACKEND=memory`; implementa os mesmos contratos do Postgres.
//!
//! Atomicidade por chave vem do lock de shard do DashMap: `get_mut`/`entry`
//! seguram a entrada com exclusividade enquanto o check-and-set acontece.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::traits::{CatalogStore, InventoryLedger, OrderStore, PaymentLogStore, TenantStore, UserStore},
    middleware::tenancy::TenantContext,
    models::{
        auth::{LocationAssignment, User},
        catalog::{Customer, Product},
        inventory::{
            InventoryRecord, MovementNote, StockKey, StockLevels, StockMovement, StockMovementReason,
        },
        orders::{Order, OrderDraft, OrderLine, OrderWithLines, PaymentTransition, Settlement},
        payments::{CaptureException, NewCaptureException},
        tenancy::{Location, Tenant},
    },
};

type LedgerKey = (Uuid, Uuid, Uuid);

#[derive(Default)]
pub struct MemoryStore {
    tenants: DashMap<Uuid, Tenant>,
    locations: DashMap<Uuid, Location>,
    products: DashMap<Uuid, Product>,
    customers: DashMap<Uuid, Customer>,
    users: DashMap<Uuid, User>,
    // user_id -> vínculos (a entrada inteira é travada ao trocar o primário)
    assignments: DashMap<Uuid, Vec<LocationAssignment>>,
    inventory: DashMap<LedgerKey, InventoryRecord>,
    // Sequência só para manter a ordem de inserção do histórico
    movements: DashMap<u64, StockMovement>,
    movement_seq: AtomicU64,
    orders: DashMap<Uuid, OrderWithLines>,
    intent_index: DashMap<(Uuid, String), Uuid>,
    webhook_events: DashMap<(Uuid, String), String>,
    capture_exceptions: DashMap<Uuid, CaptureException>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---
    // Carga de dados (seeding). O catálogo é gerido fora do núcleo.
    // ---

    pub fn insert_tenant(&self, tenant: Tenant) {
        self.tenants.insert(tenant.id, tenant);
    }

    pub fn insert_location(&self, location: Location) {
        self.locations.insert(location.id, location);
    }

    pub fn insert_product(&self, product: Product) {
        self.products.insert(product.id, product);
    }

    pub fn insert_customer(&self, customer: Customer) {
        self.customers.insert(customer.id, customer);
    }

    pub fn insert_user(&self, user: User) {
        self.users.insert(user.id, user);
    }

    fn ledger_key(tenant: &TenantContext, key: StockKey) -> LedgerKey {
        (tenant.tenant_id(), key.product_id, key.location_id)
    }

    fn push_movement(&self, tenant: &TenantContext, key: StockKey, quantity_changed: i32, note: MovementNote) {
        let seq = self.movement_seq.fetch_add(1, Ordering::SeqCst);
        self.movements.insert(
            seq,
            StockMovement {
                id: Uuid::new_v4(),
                tenant_id: tenant.tenant_id(),
                product_id: key.product_id,
                location_id: key.location_id,
                quantity_changed,
                reason: note.reason,
                order_id: note.order_id,
                created_at: Utc::now(),
            },
        );
    }

    fn empty_record(tenant: &TenantContext, key: StockKey) -> InventoryRecord {
        InventoryRecord {
            tenant_id: tenant.tenant_id(),
            product_id: key.product_id,
            location_id: key.location_id,
            quantity: 0,
            min_stock: 0,
            reorder_point: 0,
            updated_at: Utc::now(),
        }
    }
}

#[async_trait]
impl TenantStore for MemoryStore {
    async fn find_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, AppError> {
        Ok(self.tenants.get(&tenant_id).map(|t| t.clone()))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user(&self, tenant: &TenantContext, user_id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .get(&user_id)
            .filter(|u| tenant.owns(u.tenant_id))
            .map(|u| u.clone()))
    }

    async fn list_assignments(
        &self,
        tenant: &TenantContext,
        user_id: Uuid,
    ) -> Result<Vec<LocationAssignment>, AppError> {
        if self.find_user(tenant, user_id).await?.is_none() {
            return Ok(Vec::new());
        }
        Ok(self.assignments.get(&user_id).map(|a| a.clone()).unwrap_or_default())
    }

    async fn assign_location(
        &self,
        tenant: &TenantContext,
        assignment: LocationAssignment,
    ) -> Result<Vec<LocationAssignment>, AppError> {
        if self.find_user(tenant, assignment.user_id).await?.is_none() {
            return Err(AppError::UserNotFound(assignment.user_id));
        }

        let mut entry = self.assignments.entry(assignment.user_id).or_default();
        let list = entry.value_mut();

        if assignment.is_primary {
            for existing in list.iter_mut() {
                existing.is_primary = false;
            }
        }

        match list.iter_mut().find(|a| a.location_id == assignment.location_id) {
            Some(existing) => {
                existing.role = assignment.role;
                existing.is_primary = assignment.is_primary;
            }
            None => list.push(assignment),
        }

        Ok(list.clone())
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn find_location(&self, tenant: &TenantContext, location_id: Uuid) -> Result<Option<Location>, AppError> {
        Ok(self
            .locations
            .get(&location_id)
            .filter(|l| tenant.owns(l.tenant_id))
            .map(|l| l.clone()))
    }

    async fn find_product(&self, tenant: &TenantContext, product_id: Uuid) -> Result<Option<Product>, AppError> {
        Ok(self
            .products
            .get(&product_id)
            .filter(|p| tenant.owns(p.tenant_id))
            .map(|p| p.clone()))
    }

    async fn find_customer(&self, tenant: &TenantContext, customer_id: Uuid) -> Result<Option<Customer>, AppError> {
        Ok(self
            .customers
            .get(&customer_id)
            .filter(|c| tenant.owns(c.tenant_id))
            .map(|c| c.clone()))
    }
}

#[async_trait]
impl InventoryLedger for MemoryStore {
    async fn get_record(&self, tenant: &TenantContext, key: StockKey) -> Result<Option<InventoryRecord>, AppError> {
        Ok(self.inventory.get(&Self::ledger_key(tenant, key)).map(|r| r.clone()))
    }

    async fn reserve_and_decrement(
        &self,
        tenant: &TenantContext,
        key: StockKey,
        amount: i32,
        note: MovementNote,
    ) -> Result<i32, AppError> {
        let insufficient = |available: i32| AppError::InsufficientStock {
            product_id: key.product_id,
            product_name: None,
            requested: amount,
            available,
        };

        let remaining = {
            let Some(mut record) = self.inventory.get_mut(&Self::ledger_key(tenant, key)) else {
                return Err(insufficient(0));
            };
            if record.quantity < amount {
                return Err(insufficient(record.quantity));
            }
            record.quantity -= amount;
            record.updated_at = Utc::now();
            record.quantity
        };

        self.push_movement(tenant, key, -amount, note);
        Ok(remaining)
    }

    async fn increment(
        &self,
        tenant: &TenantContext,
        key: StockKey,
        amount: i32,
        note: MovementNote,
    ) -> Result<i32, AppError> {
        let quantity = {
            let mut record = self
                .inventory
                .entry(Self::ledger_key(tenant, key))
                .or_insert_with(|| Self::empty_record(tenant, key));
            // Saldo que não cabe em i32 não é gravado
            record.quantity = record
                .quantity
                .checked_add(amount)
                .ok_or(AppError::InvalidQuantity(amount))?;
            record.updated_at = Utc::now();
            record.quantity
        };

        self.push_movement(tenant, key, amount, note);
        Ok(quantity)
    }

    async fn upsert_levels(
        &self,
        tenant: &TenantContext,
        key: StockKey,
        levels: StockLevels,
    ) -> Result<InventoryRecord, AppError> {
        let (record, delta) = {
            let mut record = self
                .inventory
                .entry(Self::ledger_key(tenant, key))
                .or_insert_with(|| Self::empty_record(tenant, key));
            let delta = levels.quantity - record.quantity;
            record.quantity = levels.quantity;
            if let Some(min_stock) = levels.min_stock {
                record.min_stock = min_stock;
            }
            if let Some(reorder_point) = levels.reorder_point {
                record.reorder_point = reorder_point;
            }
            record.updated_at = Utc::now();
            (record.clone(), delta)
        };

        if delta != 0 {
            self.push_movement(tenant, key, delta, MovementNote::new(StockMovementReason::Adjustment));
        }
        Ok(record)
    }

    async fn movements_for_order(&self, tenant: &TenantContext, order_id: Uuid) -> Result<Vec<StockMovement>, AppError> {
        let mut movements: Vec<(u64, StockMovement)> = self
            .movements
            .iter()
            .filter(|m| tenant.owns(m.tenant_id) && m.order_id == Some(order_id))
            .map(|m| (*m.key(), m.value().clone()))
            .collect();
        movements.sort_by_key(|(seq, _)| *seq);
        Ok(movements.into_iter().map(|(_, m)| m).collect())
    }
}

fn build_order(tenant: &TenantContext, draft: &OrderDraft, settlement: &Settlement) -> OrderWithLines {
    let now = Utc::now();
    let order = Order {
        id: draft.order_id,
        tenant_id: tenant.tenant_id(),
        location_id: draft.location_id,
        customer_id: draft.customer_id,
        total_amount: draft.total_amount,
        discount_amount: draft.discount_amount,
        tax_amount: draft.tax_amount,
        payment_method: settlement.payment_method,
        status: settlement.status,
        payment_intent_id: settlement.payment_intent_id.clone(),
        charge_id: settlement.charge_id.clone(),
        payment_status: settlement.payment_status,
        created_at: now,
        updated_at: now,
    };
    let lines = draft
        .lines
        .iter()
        .map(|line| OrderLine {
            id: Uuid::new_v4(),
            tenant_id: tenant.tenant_id(),
            order_id: draft.order_id,
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
            line_total: line.line_total,
        })
        .collect();
    OrderWithLines { order, lines }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(
        &self,
        tenant: &TenantContext,
        draft: &OrderDraft,
        settlement: &Settlement,
    ) -> Result<OrderWithLines, AppError> {
        let built = build_order(tenant, draft, settlement);

        // O índice de intent é a "constraint única": só um pedido vence.
        if let Some(intent_id) = &settlement.payment_intent_id {
            match self.intent_index.entry((tenant.tenant_id(), intent_id.clone())) {
                Entry::Occupied(_) => return Err(AppError::DuplicatePaymentIntent(intent_id.clone())),
                Entry::Vacant(slot) => {
                    // Pedido gravado antes de liberar o índice: quem achar o intent acha o pedido.
                    self.orders.insert(built.order.id, built.clone());
                    slot.insert(built.order.id);
                    return Ok(built);
                }
            }
        }

        self.orders.insert(built.order.id, built.clone());
        Ok(built)
    }

    async fn find_order(&self, tenant: &TenantContext, order_id: Uuid) -> Result<Option<OrderWithLines>, AppError> {
        Ok(self
            .orders
            .get(&order_id)
            .filter(|o| tenant.owns(o.order.tenant_id))
            .map(|o| o.clone()))
    }

    async fn find_by_intent(&self, tenant: &TenantContext, intent_id: &str) -> Result<Option<Order>, AppError> {
        let order_id = match self.intent_index.get(&(tenant.tenant_id(), intent_id.to_string())) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self
            .find_order(tenant, order_id)
            .await?
            .map(|o| o.order))
    }

    async fn transition_payment(
        &self,
        tenant: &TenantContext,
        order_id: Uuid,
        transition: &PaymentTransition,
    ) -> Result<Option<Order>, AppError> {
        let Some(mut entry) = self.orders.get_mut(&order_id) else {
            return Ok(None);
        };
        let order = &mut entry.order;
        if !tenant.owns(order.tenant_id) || order.payment_status != transition.expected {
            return Ok(None);
        }

        order.status = transition.status;
        order.payment_status = Some(transition.payment_status);
        order.charge_id = transition.charge_id.clone();
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }
}

#[async_trait]
impl PaymentLogStore for MemoryStore {
    async fn webhook_event_seen(&self, tenant: &TenantContext, event_id: &str) -> Result<bool, AppError> {
        Ok(self
            .webhook_events
            .contains_key(&(tenant.tenant_id(), event_id.to_string())))
    }

    async fn record_webhook_event(
        &self,
        tenant: &TenantContext,
        event_id: &str,
        event_type: &str,
        _intent_id: Option<&str>,
    ) -> Result<bool, AppError> {
        match self.webhook_events.entry((tenant.tenant_id(), event_id.to_string())) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(event_type.to_string());
                Ok(true)
            }
        }
    }

    async fn record_capture_exception(
        &self,
        tenant: &TenantContext,
        exception: NewCaptureException,
    ) -> Result<CaptureException, AppError> {
        let saved = CaptureException {
            id: Uuid::new_v4(),
            tenant_id: tenant.tenant_id(),
            payment_intent_id: exception.payment_intent_id,
            amount: exception.amount,
            reason: exception.reason,
            detail: exception.detail,
            resolved_at: None,
            created_at: Utc::now(),
        };
        self.capture_exceptions.insert(saved.id, saved.clone());
        Ok(saved)
    }

    async fn resolve_capture_exceptions(&self, tenant: &TenantContext, intent_id: &str) -> Result<u64, AppError> {
        let mut resolved = 0;
        for mut exception in self.capture_exceptions.iter_mut() {
            if tenant.owns(exception.tenant_id)
                && exception.payment_intent_id == intent_id
                && exception.resolved_at.is_none()
            {
                exception.resolved_at = Some(Utc::now());
                resolved += 1;
            }
        }
        Ok(resolved)
    }

    async fn list_open_capture_exceptions(&self, tenant: &TenantContext) -> Result<Vec<CaptureException>, AppError> {
        let mut open: Vec<CaptureException> = self
            .capture_exceptions
            .iter()
            .filter(|e| tenant.owns(e.tenant_id) && e.resolved_at.is_none())
            .map(|e| e.clone())
            .collect();
        open.sort_by_key(|e| e.created_at);
        Ok(open)
    }
}
