pub mod access_gate;
pub mod auth;
pub mod checkout_service;
pub mod inventory_service;
pub mod order_assembler;
pub mod payment_coordinator;
pub mod payment_gateway;
pub mod sale_commit;
pub mod tenancy_service;
pub mod user_service;
