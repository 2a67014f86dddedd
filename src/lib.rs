//! WaveOrder Domains - Custom domain verification and provisioning service
//!
//! Tenants attach a vanity domain to their storefront, prove ownership via
//! a DNS TXT token, point routing at the platform edge, and the service
//! provisions certificate and routing exactly once on activation.

pub mod api;
pub mod config;
pub mod dns;
pub mod domain;
pub mod error;
pub mod migration;
pub mod provisioning;
pub mod repository;
pub mod server;
pub mod service;
pub mod state;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
