// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Checkout ---
        handlers::checkout::checkout,
        handlers::checkout::get_order,

        // --- Payments ---
        handlers::payments::create_intent,
        handlers::payments::confirm_payment,
        handlers::payments::refund_order,
        handlers::payments::list_capture_exceptions,
        handlers::payments::payment_webhook,

        // --- INVENTORY ---
        handlers::inventory::get_stock,
        handlers::inventory::upsert_levels,
        handlers::inventory::restock,
        handlers::inventory::transfer_stock,

        // --- Users ---
        handlers::users::assign_location,
    ),
    components(
        schemas(
            // --- Orders ---
            models::orders::OrderStatus,
            models::orders::PaymentMethod,
            models::orders::PaymentStatus,
            models::orders::Order,
            models::orders::OrderLine,
            models::orders::OrderWithLines,
            models::orders::CartItem,

            // --- Payments ---
            models::payments::IntentHandle,
            models::payments::RefundReason,
            models::payments::RefundResult,
            models::payments::CaptureExceptionReason,
            models::payments::CaptureException,

            // --- Inventory ---
            models::inventory::InventoryRecord,
            models::inventory::StockMovementReason,
            models::inventory::StockMovement,
            models::inventory::TransferResult,

            // --- Auth ---
            models::auth::UserRole,
            models::auth::LocationAssignment,

            // --- Payloads ---
            handlers::checkout::CheckoutPayload,
            handlers::payments::CreateIntentPayload,
            handlers::payments::ConfirmPaymentPayload,
            handlers::payments::RefundPayload,
            handlers::inventory::UpsertLevelsPayload,
            handlers::inventory::RestockPayload,
            handlers::inventory::RestockResponse,
            handlers::inventory::TransferPayload,
            handlers::users::AssignLocationPayload,
        )
    ),
    tags(
        (name = "Checkout", description = "Vendas e Pedidos"),
        (name = "Payments", description = "Intents, Confirmação, Reembolsos e Webhooks"),
        (name = "Inventory", description = "Saldos, Reposição e Transferências"),
        (name = "Users", description = "Vínculo de Usuários a Lojas")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(
                Http::new(HttpAuthScheme::Bearer)
            ),
        );
    }
}
