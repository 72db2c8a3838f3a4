// src/middleware/tenancy.rs

use axum::{
    extract::{FromRequestParts, Query},
    http::{request::Parts, HeaderMap, StatusCode, Uri},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::common::error::ApiError;
use crate::models::tenancy::Tenant;

// O nome do nosso cabeçalho HTTP customizado
pub const TENANT_ID_HEADER: &str = "x-tenant-id";

// Alternativa aceita na query string (?tenantId=...)
#[derive(Debug, Deserialize)]
struct TenantQuery {
    #[serde(rename = "tenantId")]
    tenant_id: Option<String>,
}

/// O tenant já resolvido e validado de uma requisição.
///
/// Só o `TenantResolver` cria este valor, e todo método de repositório o exige:
/// não existe caminho para ler ou gravar dados sem passar por um tenant verificado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: Uuid,
}

impl TenantContext {
    pub(crate) fn verified(tenant: &Tenant) -> Self {
        Self { tenant_id: tenant.id }
    }

    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    /// Verdadeiro se o registro pertence a este tenant.
    pub fn owns(&self, tenant_id: Uuid) -> bool {
        self.tenant_id == tenant_id
    }
}

/// Lê o identificador bruto: cabeçalho X-Tenant-ID, ou `tenantId` na query
/// (já decodificado de percent-encoding).
pub fn tenant_identifier(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    if let Some(value) = headers.get(TENANT_ID_HEADER) {
        return value.to_str().ok().map(|v| v.trim().to_string());
    }

    // Query malformada conta como sem identificador
    Query::<TenantQuery>::try_from_uri(uri)
        .ok()
        .and_then(|Query(query)| query.tenant_id)
}

// O contexto é inserido nos "extensions" pelo tenant_guard.
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TenantContext>()
            .cloned()
            .ok_or(ApiError {
                status: StatusCode::BAD_REQUEST,
                code: "TENANT_IDENTIFIER_MISSING",
                error: "Tenant identifier is required.".to_string(),
                details: None,
            })
    }
}
