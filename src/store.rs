//! Collaborator interfaces consumed by the ports engine
//!
//! The engine never talks to storage directly. Properties, app config and the
//! platform's app directory are reached through these traits; `db::Database`
//! provides the SQLite implementation used by the trigger binary.

use crate::error::StoreError;

/// Scope used for platform-wide properties
pub const GLOBAL_SCOPE: &str = "--global";

/// Per-(plugin, scope) key/value storage with ordered list values
pub trait PropertyStore {
    /// Scalar value, empty when unset
    fn get(&self, plugin: &str, scope: &str, key: &str) -> Result<String, StoreError>;

    fn get_default(
        &self,
        plugin: &str,
        scope: &str,
        key: &str,
        default: &str,
    ) -> Result<String, StoreError> {
        let value = self.get(plugin, scope, key)?;
        if value.is_empty() {
            Ok(default.to_string())
        } else {
            Ok(value)
        }
    }

    /// True when the key holds either a scalar or a list
    fn exists(&self, plugin: &str, scope: &str, key: &str) -> Result<bool, StoreError>;

    fn write(&self, plugin: &str, scope: &str, key: &str, value: &str) -> Result<(), StoreError>;

    fn delete(&self, plugin: &str, scope: &str, key: &str) -> Result<(), StoreError>;

    /// Ordered list value, empty when unset
    fn read_list(&self, plugin: &str, scope: &str, key: &str) -> Result<Vec<String>, StoreError>;

    /// Replace a list value in one step
    fn write_list(
        &self,
        plugin: &str,
        scope: &str,
        key: &str,
        values: &[String],
    ) -> Result<(), StoreError>;

    /// Copy every key of `from_scope` to `to_scope`
    fn clone_namespace(&self, plugin: &str, from_scope: &str, to_scope: &str)
        -> Result<(), StoreError>;

    /// Remove every key of `scope`
    fn destroy(&self, plugin: &str, scope: &str) -> Result<(), StoreError>;
}

/// Application environment config
pub trait ConfigStore {
    fn get_with_default(&self, app: &str, key: &str, default: &str) -> Result<String, StoreError>;

    fn unset_many(&self, app: &str, keys: &[&str], restart: bool) -> Result<(), StoreError>;
}

/// What the platform knows about its apps
pub trait AppPlatform {
    fn list_apps(&self) -> Result<Vec<String>, StoreError>;

    fn is_vhost_enabled(&self, app: &str) -> Result<bool, StoreError>;

    fn has_certificate(&self, app: &str) -> Result<bool, StoreError>;
}
