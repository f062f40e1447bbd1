#[cfg(test)]
pub mod memory;
mod tokens;
mod users;

pub use tokens::{DynTokenRepo, TokenPersistenceError, TokenRepo};
pub use users::{DynUserRepo, UserPersistenceError, UserRepo};
