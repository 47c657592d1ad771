//! Ports plugin handle
//!
//! `Ports` bundles the collaborators every trigger needs. The trigger
//! implementations live in `resolver`, `reconcile`, `lifecycle` and
//! `triggers`, each adding methods to this type.

use crate::config::PortSettings;
use crate::db::Database;
use crate::store::{AppPlatform, ConfigStore, PropertyStore};

/// Property namespace owned by this plugin
pub const PLUGIN: &str = "ports";

/// Persisted, user-configured mappings
pub const MAP_PROPERTY: &str = "map";
/// Mappings inferred from the deployed app
pub const DETECTED_MAP_PROPERTY: &str = "map-detected";
pub const PROXY_PORT_PROPERTY: &str = "proxy-port";
pub const PROXY_SSL_PORT_PROPERTY: &str = "proxy-ssl-port";

pub const PROXY_PORT_CONFIG: &str = "DOKKU_PROXY_PORT";
pub const PROXY_SSL_PORT_CONFIG: &str = "DOKKU_PROXY_SSL_PORT";
/// Pre-property storage of the port map, removed by `install`
pub const LEGACY_PORT_MAP_CONFIG: &str = "DOKKU_PROXY_PORT_MAP";

/// Ports plugin bound to its property store, app config and app directory
///
/// Invocations are assumed to be serialized per app by the caller; nothing
/// here takes a lock across store calls.
pub struct Ports<'a> {
    pub(crate) store: &'a dyn PropertyStore,
    pub(crate) config: &'a dyn ConfigStore,
    pub(crate) platform: &'a dyn AppPlatform,
    pub(crate) settings: PortSettings,
}

impl<'a> Ports<'a> {
    pub fn new(
        store: &'a dyn PropertyStore,
        config: &'a dyn ConfigStore,
        platform: &'a dyn AppPlatform,
    ) -> Self {
        Self {
            store,
            config,
            platform,
            settings: PortSettings::default(),
        }
    }

    /// Use one database for every collaborator
    pub fn from_database(db: &'a Database) -> Self {
        Self::new(db, db, db)
    }

    pub fn with_settings(mut self, settings: PortSettings) -> Self {
        self.settings = settings;
        self
    }
}
