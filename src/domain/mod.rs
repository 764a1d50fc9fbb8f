pub mod auth;
pub mod cache;
pub mod clock;
pub mod command;
pub mod engine;
pub mod keyboard;
pub mod models;
pub mod session;
pub mod validate;
