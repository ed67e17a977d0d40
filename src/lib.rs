pub mod api_client;
pub mod auth;
pub mod catalog;
pub mod configuration;
pub mod foundation;
pub mod notice;
pub mod notifications;
pub mod startup;

pub use configuration::*;
pub use foundation::session_store::open_token_store;
