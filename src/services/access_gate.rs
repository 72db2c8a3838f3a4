// src/services/access_gate.rs

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::auth::{Actor, UserRole},
};

// ---
// Permissões: conjunto fechado
// ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ManageUsers,
    ManageInventory,
    ViewInventory,
    ManageCustomers,
    ViewCustomers,
    ManageReports,
    ManageTransactions,
    ViewAuditLogs,
    ManageLocations,
    AccessAllLocations,
    AccessAssignedLocations,
}

impl Permission {
    pub fn slug(self) -> &'static str {
        match self {
            Permission::ManageUsers => "manage_users",
            Permission::ManageInventory => "manage_inventory",
            Permission::ViewInventory => "view_inventory",
            Permission::ManageCustomers => "manage_customers",
            Permission::ViewCustomers => "view_customers",
            Permission::ManageReports => "manage_reports",
            Permission::ManageTransactions => "manage_transactions",
            Permission::ViewAuditLogs => "view_audit_logs",
            Permission::ManageLocations => "manage_locations",
            Permission::AccessAllLocations => "access_all_locations",
            Permission::AccessAssignedLocations => "access_assigned_locations",
        }
    }
}

/// As permissões declaradas de cada papel. O `match` é exaustivo: um papel novo
/// não compila sem entrar aqui.
pub fn role_permissions(role: UserRole) -> &'static [Permission] {
    use Permission::*;

    match role {
        UserRole::Admin => &[
            ManageUsers,
            ManageInventory,
            ManageCustomers,
            ManageReports,
            ManageTransactions,
            ViewAuditLogs,
            ManageLocations,
            AccessAllLocations,
        ],
        UserRole::Manager => &[
            ManageInventory,
            ManageCustomers,
            ManageReports,
            ManageTransactions,
            AccessAssignedLocations,
        ],
        UserRole::Cashier => &[
            ViewInventory,
            ManageTransactions,
            ViewCustomers,
            AccessAssignedLocations,
        ],
    }
}

/// Permissão efetiva: "gerir" implica "ver".
pub fn role_grants(role: UserRole, permission: Permission) -> bool {
    let declared = role_permissions(role);
    if declared.contains(&permission) {
        return true;
    }
    match permission {
        Permission::ViewInventory => declared.contains(&Permission::ManageInventory),
        Permission::ViewCustomers => declared.contains(&Permission::ManageCustomers),
        _ => false,
    }
}

// ---
// Operações protegidas
// ---
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Checkout,
    CreatePaymentIntent,
    ConfirmPayment,
    Refund,
    ViewOrder,
    ViewInventory,
    AdjustInventory,
    TransferStock,
    AssignLocations,
    ReviewPaymentExceptions,
}

impl Operation {
    pub fn required_permission(self) -> Permission {
        match self {
            Operation::Checkout
            | Operation::CreatePaymentIntent
            | Operation::ConfirmPayment
            | Operation::Refund
            | Operation::ViewOrder => Permission::ManageTransactions,
            Operation::ViewInventory => Permission::ViewInventory,
            Operation::AdjustInventory | Operation::TransferStock => Permission::ManageInventory,
            Operation::AssignLocations => Permission::ManageUsers,
            Operation::ReviewPaymentExceptions => Permission::ViewAuditLogs,
        }
    }

    /// Operações que atuam numa loja específica exigem acesso àquela loja.
    pub fn is_location_scoped(self) -> bool {
        !matches!(
            self,
            Operation::CreatePaymentIntent | Operation::AssignLocations | Operation::ReviewPaymentExceptions
        )
    }
}

/// Decide se um ator pode executar uma operação. Sem estado; nunca toca no banco.
pub struct AccessGate;

impl AccessGate {
    /// Operações sem loja (ex.: criar intent avulso, atribuir lojas).
    pub fn authorize(actor: Option<&Actor>, operation: Operation) -> Result<(), AppError> {
        let actor = actor.ok_or(AppError::Unauthenticated)?;

        if operation.is_location_scoped() {
            // Operação de loja chamada sem loja: nega
            return Err(AppError::Forbidden);
        }
        if !role_grants(actor.role(), operation.required_permission()) {
            return Err(AppError::Forbidden);
        }
        Ok(())
    }

    /// Operações numa loja: papel global OU papel do vínculo com a loja concede
    /// a permissão, e o ator precisa ter acesso à loja.
    pub fn authorize_at(actor: Option<&Actor>, operation: Operation, location_id: Uuid) -> Result<(), AppError> {
        let actor = actor.ok_or(AppError::Unauthenticated)?;
        let permission = operation.required_permission();
        let assignment = actor.assignment_for(location_id);

        let granted = role_grants(actor.role(), permission)
            || assignment
                .and_then(|a| a.role)
                .is_some_and(|role| role_grants(role, permission));
        if !granted {
            return Err(AppError::Forbidden);
        }

        if operation.is_location_scoped() {
            let all_locations = role_grants(actor.role(), Permission::AccessAllLocations);
            if !all_locations && assignment.is_none() {
                return Err(AppError::LocationAccessDenied(location_id));
            }
        }

        Ok(())
    }
}
