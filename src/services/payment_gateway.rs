// src/services/payment_gateway.rs

//! Gateway de pagamento externo (Stripe via REST, sem SDK) e verificação de webhooks.

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::Deserialize;
use sha2::Sha256;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::payments::{GatewayRefund, PaymentIntent, RefundReason},
};

// ---
// Conversão de valores (menor unidade da moeda)
// ---

pub fn to_minor_units(amount: Decimal) -> Result<i64, AppError> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| AppError::InvalidAmount(format!("{} is out of range", amount)))
}

pub fn from_minor_units(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

// ---
// O contrato
// ---

#[derive(Debug, Clone)]
pub struct IntentRequest {
    pub amount_cents: i64,
    pub currency: String,
    pub tenant_id: Uuid,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RefundRequest {
    pub charge_id: String,
    pub amount_cents: Option<i64>,
    pub reason: RefundReason,
    pub tenant_id: Uuid,
    pub order_id: Uuid,
    pub idempotency_key: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent, AppError>;
    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, AppError>;
    async fn refund(&self, request: &RefundRequest) -> Result<GatewayRefund, AppError>;
}

// ---
// Implementação Stripe
// ---

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl StripeGateway {
    pub fn new(api_base: &str, secret_key: String, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::GatewayError(format!("http client: {e}")))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.api_base, path)
    }

    async fn read<T: for<'de> Deserialize<'de>>(
        &self,
        response: Result<reqwest::Response, reqwest::Error>,
        what: &str,
    ) -> Result<T, AppError> {
        let response = response.map_err(|e| {
            if e.is_timeout() {
                AppError::GatewayError(format!("{what}: timeout"))
            } else {
                AppError::GatewayError(format!("{what}: {e}"))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| AppError::GatewayError(format!("{what}: invalid response: {e}")));
        }

        let body = response.json::<StripeErrorBody>().await.ok();
        let (message, code) = body
            .map(|b| (b.error.message.unwrap_or_default(), b.error.code.unwrap_or_default()))
            .unwrap_or_default();
        Err(AppError::GatewayError(format!("{what}: {status} {code} {message}")))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent, AppError> {
        let amount = request.amount_cents.to_string();
        let tenant_id = request.tenant_id.to_string();

        let mut builder = self
            .client
            .post(self.url("payment_intents"))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&[
                ("amount", amount.as_str()),
                ("currency", request.currency.as_str()),
                ("payment_method_types[]", "card"),
                ("metadata[tenant_id]", tenant_id.as_str()),
            ]);
        if let Some(key) = &request.idempotency_key {
            builder = builder.header("Idempotency-Key", key);
        }

        self.read(builder.send().await, "create_intent").await
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, AppError> {
        let response = self
            .client
            .get(self.url(&format!("payment_intents/{intent_id}")))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await;

        if let Ok(resp) = &response {
            if resp.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(AppError::PaymentIntentNotFound(intent_id.to_string()));
            }
        }

        self.read(response, "retrieve_intent").await
    }

    async fn refund(&self, request: &RefundRequest) -> Result<GatewayRefund, AppError> {
        let tenant_id = request.tenant_id.to_string();
        let order_id = request.order_id.to_string();
        let amount = request.amount_cents.map(|a| a.to_string());

        let mut form: Vec<(&str, &str)> = vec![
            ("charge", request.charge_id.as_str()),
            ("reason", request.reason.as_str()),
            ("metadata[tenant_id]", tenant_id.as_str()),
            ("metadata[order_id]", order_id.as_str()),
        ];
        if let Some(amount) = &amount {
            form.push(("amount", amount.as_str()));
        }

        let response = self
            .client
            .post(self.url("refunds"))
            .basic_auth(&self.secret_key, None::<&str>)
            .header("Idempotency-Key", &request.idempotency_key)
            .form(&form)
            .send()
            .await;

        self.read(response, "refund").await
    }
}

// ---
// Webhooks
// ---

/// Verifica o cabeçalho `t=...,v1=...` (HMAC-SHA256 de "{t}.{payload}")
/// e rejeita eventos fora da janela de tolerância (replay).
pub fn verify_webhook_signature(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
    tolerance_secs: i64,
) -> Result<(), AppError> {
    verify_webhook_signature_at(payload, sig_header, secret, tolerance_secs, chrono::Utc::now().timestamp())
}

pub fn verify_webhook_signature_at(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), AppError> {
    let invalid = |reason: &str| AppError::InvalidWebhookSignature(reason.to_string());

    let mut timestamp = "";
    let mut signatures = Vec::new();
    for part in sig_header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = t;
        } else if let Some(v) = part.strip_prefix("v1=") {
            signatures.push(v);
        }
    }
    if timestamp.is_empty() || signatures.is_empty() {
        return Err(invalid("malformed signature header"));
    }

    let mut signed_payload = Vec::with_capacity(timestamp.len() + 1 + payload.len());
    signed_payload.extend_from_slice(timestamp.as_bytes());
    signed_payload.push(b'.');
    signed_payload.extend_from_slice(payload);

    // Durante a rotação de segredo podem vir várias assinaturas v1
    let matched = signatures.iter().any(|sig| {
        let Ok(sig_bytes) = hex::decode(sig) else {
            return false;
        };
        let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(&signed_payload);
        // Comparação em tempo constante
        mac.verify_slice(&sig_bytes).is_ok()
    });
    if !matched {
        return Err(invalid("signature mismatch"));
    }

    let ts: i64 = timestamp.parse().map_err(|_| invalid("invalid timestamp"))?;
    if (now - ts).abs() > tolerance_secs {
        return Err(invalid("timestamp outside tolerance"));
    }

    Ok(())
}

/// Monta um cabeçalho de assinatura válido (ferramentas de teste e reenvio).
pub fn sign_webhook_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, AppError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::InternalServerError(anyhow::anyhow!("HMAC key error: {e}")))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let signature = hex::encode(mac.finalize().into_bytes());
    Ok(format!("t={timestamp},v1={signature}"))
}
