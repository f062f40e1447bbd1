pub mod accounts;
pub mod cli;
mod client_ip;
pub mod database;
pub mod email;
mod http_err;
pub mod passwords;
pub mod rate_limit;
pub mod repos;
pub mod server;
