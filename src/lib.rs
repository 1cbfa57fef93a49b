pub mod api;
pub mod config;
pub mod core;
pub mod kroger;
pub mod mealie;
pub mod oauth;
pub mod session;
mod utils;
