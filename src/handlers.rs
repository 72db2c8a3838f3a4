pub mod checkout;
pub mod inventory;
pub mod payments;
pub mod users;
