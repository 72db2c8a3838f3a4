// src/models/auth.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// Os três papéis fixos do sistema. O mapa papel -> permissões vive no AccessGate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Manager,
    Cashier,
}

// Representa um usuário (ator) vindo do banco de dados
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct User {
    pub id: Uuid,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

// Vínculo usuário <-> loja, com papel específico da loja e a flag de loja principal.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct LocationAssignment {
    pub user_id: Uuid,
    pub location_id: Uuid,
    pub role: Option<UserRole>,
    pub is_primary: bool,
}

/// O ator autenticado de uma requisição: o usuário e as lojas a que está vinculado.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user: User,
    pub assignments: Vec<LocationAssignment>,
}

impl Actor {
    pub fn id(&self) -> Uuid {
        self.user.id
    }

    pub fn role(&self) -> UserRole {
        self.user.role
    }

    pub fn assignment_for(&self, location_id: Uuid) -> Option<&LocationAssignment> {
        self.assignments.iter().find(|a| a.location_id == location_id)
    }

    pub fn primary_location(&self) -> Option<Uuid> {
        self.assignments.iter().find(|a| a.is_primary).map(|a| a.location_id)
    }
}

// Estrutura de dados ("claims") dentro do JWT emitido pelo provedor de identidade
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,        // Subject (ID do usuário)
    pub tenant_id: Uuid,  // Tenant para o qual o token foi emitido
    pub exp: usize,       // Expiration time
    pub iat: usize,       // Issued At
}
