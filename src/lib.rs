pub mod anchor;
pub mod app;
pub mod config;
pub mod crypto;
pub mod error;
pub mod factom;
pub mod logging;
pub mod server;
