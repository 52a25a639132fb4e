pub mod api;
pub mod config;
pub mod display;
pub mod error;
pub mod logger;
pub mod mail;
pub mod server;
pub mod session;
pub mod store;
pub mod subscriber;
pub mod time;
pub mod tracker;
pub mod vcard;
