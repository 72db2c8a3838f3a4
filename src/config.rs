// src/config.rs

use std::{env, net::SocketAddr, str::FromStr, sync::Arc, time::Duration};

use anyhow::{anyhow, Context};
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    db::{MemoryStore, Stores},
    services::{
        auth::AuthService,
        checkout_service::CheckoutService,
        inventory_service::InventoryService,
        order_assembler::OrderAssembler,
        payment_coordinator::PaymentCoordinator,
        payment_gateway::{PaymentGateway, StripeGateway},
        sale_commit::SaleCommitter,
        tenancy_service::TenantResolver,
        user_service::UserService,
    },
};

// ---
// Configuração (variáveis de ambiente)
// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(anyhow!("STORAGE_BACKEND inválido: '{other}' (use postgres ou memory)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_api_base: String,
    pub payment_gateway_timeout: Duration,
    pub webhook_tolerance_secs: i64,
    pub bind_addr: SocketAddr,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T>(name: &str, default: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = var_or(name, default);
    raw.parse::<T>()
        .map_err(|e| anyhow!("{name} inválido ('{raw}'): {e}"))
}

impl Settings {
    /// Lê `.env` (se existir) e as variáveis de ambiente.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let storage_backend: StorageBackend = parse_var("STORAGE_BACKEND", "postgres")?;

        let database_url = env::var("DATABASE_URL").ok();
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(anyhow!("DATABASE_URL deve ser definida quando STORAGE_BACKEND=postgres"));
        }

        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET deve ser definido")?;

        Ok(Self {
            storage_backend,
            database_url,
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", "5")?,
            jwt_secret,
            stripe_secret_key: var_or("STRIPE_SECRET_KEY", ""),
            stripe_webhook_secret: var_or("STRIPE_WEBHOOK_SECRET", ""),
            stripe_api_base: var_or("STRIPE_API_BASE", "https://api.stripe.com"),
            payment_gateway_timeout: Duration::from_secs(parse_var("PAYMENT_GATEWAY_TIMEOUT_SECS", "10")?),
            webhook_tolerance_secs: parse_var("WEBHOOK_TOLERANCE_SECS", "300")?,
            bind_addr: parse_var("BIND_ADDR", "0.0.0.0:3000")?,
        })
    }
}

// ---
// Estado compartilhado da aplicação
// ---

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    // Presente apenas no backend Postgres (migrações no main)
    pub db_pool: Option<PgPool>,
    pub tenant_resolver: TenantResolver,
    pub auth_service: AuthService,
    pub inventory_service: InventoryService,
    pub checkout_service: CheckoutService,
    pub payment_coordinator: PaymentCoordinator,
    pub user_service: UserService,
}

impl AppState {
    /// Conecta no backend configurado e monta o gráfico de dependências.
    pub async fn new(settings: Settings) -> anyhow::Result<Self> {
        let (stores, db_pool) = match settings.storage_backend {
            StorageBackend::Postgres => {
                let database_url = settings
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL deve ser definida")?;

                // Conecta ao banco de dados, usando '?' para propagar erros
                let pool = PgPoolOptions::new()
                    .max_connections(settings.database_max_connections)
                    .acquire_timeout(Duration::from_secs(3))
                    .connect(database_url)
                    .await
                    .context("Falha ao conectar no banco de dados")?;

                tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");
                (Stores::postgres(pool.clone()), Some(pool))
            }
            StorageBackend::Memory => {
                tracing::warn!("⚠️ Usando armazenamento em memória: os dados somem ao reiniciar");
                (Stores::in_memory(Arc::new(MemoryStore::new())), None)
            }
        };

        let gateway = StripeGateway::new(
            &settings.stripe_api_base,
            settings.stripe_secret_key.clone(),
            settings.payment_gateway_timeout,
        )
        .map_err(|e| anyhow!("Falha ao criar o cliente do gateway: {e}"))?;

        Ok(Self::from_parts(settings, stores, Arc::new(gateway), db_pool))
    }

    /// Monta os serviços sobre repositórios e gateway já prontos.
    pub fn from_parts(
        settings: Settings,
        stores: Stores,
        gateway: Arc<dyn PaymentGateway>,
        db_pool: Option<PgPool>,
    ) -> Self {
        let inventory_service = InventoryService::new(stores.ledger.clone(), stores.catalog.clone());
        let assembler = OrderAssembler::new(stores.catalog.clone(), inventory_service.clone());
        let committer = SaleCommitter::new(inventory_service.clone(), stores.orders.clone());

        let payment_coordinator = PaymentCoordinator::new(
            gateway,
            assembler.clone(),
            committer.clone(),
            stores.orders.clone(),
            stores.payment_log.clone(),
        );
        let checkout_service = CheckoutService::new(
            assembler,
            committer,
            payment_coordinator.clone(),
            stores.orders.clone(),
        );

        Self {
            tenant_resolver: TenantResolver::new(stores.tenants.clone()),
            auth_service: AuthService::new(stores.users.clone(), settings.jwt_secret.clone()),
            user_service: UserService::new(stores.users.clone(), stores.catalog.clone()),
            inventory_service,
            checkout_service,
            payment_coordinator,
            settings: Arc::new(settings),
            db_pool,
        }
    }
}
