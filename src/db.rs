pub mod traits;
pub use traits::{CatalogStore, InventoryLedger, OrderStore, PaymentLogStore, TenantStore, UserStore};

pub mod memory;
pub use memory::MemoryStore;

pub mod user_repo;
pub use user_repo::UserRepository;
pub mod inventory_repo;
pub use inventory_repo::InventoryRepository;
pub mod tenancy_repo;
pub use tenancy_repo::TenantRepository;
pub mod catalog_repo;
pub use catalog_repo::CatalogRepository;
pub mod orders_repo;
pub use orders_repo::OrderRepository;
pub mod payments_repo;
pub use payments_repo::PaymentLogRepository;

use std::sync::Arc;

use sqlx::PgPool;

/// Todos os repositórios do núcleo, já como objetos de trait.
#[derive(Clone)]
pub struct Stores {
    pub tenants: Arc<dyn TenantStore>,
    pub users: Arc<dyn UserStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub ledger: Arc<dyn InventoryLedger>,
    pub orders: Arc<dyn OrderStore>,
    pub payment_log: Arc<dyn PaymentLogStore>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            tenants: Arc::new(TenantRepository::new(pool.clone())),
            users: Arc::new(UserRepository::new(pool.clone())),
            catalog: Arc::new(CatalogRepository::new(pool.clone())),
            ledger: Arc::new(InventoryRepository::new(pool.clone())),
            orders: Arc::new(OrderRepository::new(pool.clone())),
            payment_log: Arc::new(PaymentLogRepository::new(pool)),
        }
    }

    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            tenants: store.clone(),
            users: store.clone(),
            catalog: store.clone(),
            ledger: store.clone(),
            orders: store.clone(),
            payment_log: store,
        }
    }
}
