pub mod accounts;
pub mod config;
pub mod migrate;
pub mod scheduler;
pub mod tokens;
