//! App lifecycle hooks and install-time migration
//!
//! Clone and rename copy the `ports` property namespace verbatim. Delete is
//! best-effort: app teardown must proceed even if cleanup fails.

use crate::error::{CleanupOutcome, PortsError, PortsResult};
use crate::portmap::parse_port_map_string;
use crate::ports::{Ports, LEGACY_PORT_MAP_CONFIG, MAP_PROPERTY, PLUGIN};
use tracing::{info, warn};

/// Outcome of migrating legacy port map config for a batch of apps
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Apps whose legacy config was moved into the `map` property
    pub migrated: Vec<String>,
    /// Apps that already had a `map` property or no legacy config
    pub skipped: Vec<String>,
    /// Apps that failed, in the order they were attempted
    pub failures: Vec<(String, PortsError)>,
}

impl MigrationReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

impl Ports<'_> {
    /// Copy ports properties to a newly cloned app
    pub fn post_app_clone_setup(&self, old_app: &str, new_app: &str) -> PortsResult<()> {
        self.store.clone_namespace(PLUGIN, old_app, new_app)?;
        info!(old_app, new_app, "Cloned ports properties");
        Ok(())
    }

    /// Move ports properties to the app's new name
    pub fn post_app_rename_setup(&self, old_app: &str, new_app: &str) -> PortsResult<()> {
        self.store.clone_namespace(PLUGIN, old_app, new_app)?;
        self.store.destroy(PLUGIN, old_app)?;
        info!(old_app, new_app, "Renamed ports properties");
        Ok(())
    }

    /// Remove ports properties for a deleted app
    pub fn post_delete(&self, app: &str) -> CleanupOutcome {
        match self.store.destroy(PLUGIN, app) {
            Ok(()) => CleanupOutcome::Completed,
            Err(e) => {
                warn!(app, error = %e, "Unable to remove ports properties");
                CleanupOutcome::Warning(e.into())
            }
        }
    }

    /// Migrate every app known to the platform
    pub fn install(&self) -> PortsResult<MigrationReport> {
        let apps = self.platform.list_apps()?;
        Ok(self.migrate_legacy_port_maps(&apps))
    }

    /// Move `DOKKU_PROXY_PORT_MAP` config into the `map` property
    ///
    /// Apps that already have a `map` property are left alone, so running
    /// this again is a no-op. A failing app is recorded and the batch
    /// continues.
    pub fn migrate_legacy_port_maps(&self, apps: &[String]) -> MigrationReport {
        let mut report = MigrationReport::default();

        for app in apps {
            match self.migrate_app(app) {
                Ok(true) => report.migrated.push(app.clone()),
                Ok(false) => report.skipped.push(app.clone()),
                Err(e) => {
                    warn!(app = %app, error = %e, "Unable to migrate port map config");
                    report.failures.push((app.clone(), e));
                }
            }
        }

        report
    }

    fn migrate_app(&self, app: &str) -> PortsResult<bool> {
        if self.store.exists(PLUGIN, app, MAP_PROPERTY)? {
            return Ok(false);
        }

        let legacy = self
            .config
            .get_with_default(app, LEGACY_PORT_MAP_CONFIG, "")?;
        if legacy.trim().is_empty() {
            return Ok(false);
        }

        let port_maps = parse_port_map_string(&legacy)?;
        info!("Setting {} ports property 'map' to {}", app, legacy.trim());
        self.set_port_maps(app, &port_maps)?;

        self.config
            .unset_many(app, &[LEGACY_PORT_MAP_CONFIG], false)?;
        Ok(true)
    }
}
