pub mod email;
pub mod tokens;
pub mod uid;
pub mod users;
