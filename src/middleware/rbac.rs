// src/middleware/rbac.rs

use axum::{
    extract::FromRequestParts,
    http::request::Parts,
};
use std::marker::PhantomData;

use crate::{
    common::error::{ApiError, AppError},
    middleware::{auth::AuthenticatedActor, i18n::Locale},
    services::access_gate::{role_grants, Permission},
};

/// 1. O Trait que define o que é uma Permissão
pub trait PermissionDef: Send + Sync + 'static {
    fn permission() -> Permission;
}

/// 2. O Extractor (Guardião)
///
/// Checagem grossa pelo papel global, antes de ler o corpo. A checagem por
/// loja (papel do vínculo, acesso à loja) continua no `AccessGate` do serviço.
pub struct RequirePermission<T>(pub PhantomData<T>);

// 3. Implementação do FromRequestParts
impl<T, S> FromRequestParts<S> for RequirePermission<T>
where
    T: PermissionDef,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let locale = Locale::from_headers(&parts.headers);

        // A. Extrai o ator
        let actor = parts
            .extensions
            .get::<AuthenticatedActor>()
            .ok_or_else(|| AppError::Unauthenticated.to_api_error(&locale))?;

        // B. Verifica o papel
        let required = T::permission();
        if !role_grants(actor.0.role(), required) {
            tracing::debug!("Usuário {} sem a permissão '{}'", actor.0.id(), required.slug());
            return Err(AppError::Forbidden.to_api_error(&locale));
        }

        Ok(RequirePermission(PhantomData))
    }
}

// ---
// DEFINIÇÃO DAS PERMISSÕES (TIPOS)
// ---

pub struct PermManageUsers;
impl PermissionDef for PermManageUsers {
    fn permission() -> Permission { Permission::ManageUsers }
}

pub struct PermAuditLogs;
impl PermissionDef for PermAuditLogs {
    fn permission() -> Permission { Permission::ViewAuditLogs }
}
