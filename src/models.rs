pub mod auth;
pub mod catalog;
pub mod inventory;
pub mod orders;
pub mod payments;
pub mod tenancy;
