//! Spawngate ports - port mapping reconciliation for PaaS applications
//!
//! This library keeps an app's proxy port mappings consistent:
//! - Parses and stores `scheme:host_port:container_port` mappings
//! - Resolves persisted mappings over detected ones
//! - Migrates http:80 mappings to https:443 when a certificate is added or removed
//! - Copies or destroys mappings when apps are cloned, renamed or deleted
//! - Migrates legacy `DOKKU_PROXY_PORT_MAP` config into properties

pub mod config;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod portmap;
pub mod ports;
pub mod reconcile;
pub mod resolver;
pub mod store;
pub mod triggers;
