//! User accounts and the emailed tokens used to activate them and reset their
//! passwords.
pub mod domain;
pub mod http;
pub mod models;
pub mod notifications;
pub mod services;
