//! Persisted mapping mutation and certificate-driven reconciliation
//!
//! Every write goes through `set_port_maps`, which deduplicates, drops
//! internal reservations and sorts before a single `write_list`, so a stored
//! `map` never holds duplicates even if a later step fails.
//!
//! Reconciliation is not transactional across store calls. Each step is
//! idempotent, so a failed trigger is recovered by running it again.

use crate::error::PortsResult;
use crate::portmap::{
    filter_port_maps, to_persisted_values, unique_port_maps, Port, PortMap, Scheme,
    DEFAULT_HTTPS_PORT, DEFAULT_HTTP_PORT,
};
use crate::ports::{
    Ports, DETECTED_MAP_PROPERTY, MAP_PROPERTY, PLUGIN, PROXY_PORT_CONFIG, PROXY_SSL_PORT_CONFIG,
};
use std::collections::HashSet;
use tracing::{debug, info};

impl Ports<'_> {
    /// Replace the persisted mappings for an app
    pub fn set_port_maps(&self, app: &str, port_maps: &[PortMap]) -> PortsResult<()> {
        let values = to_persisted_values(port_maps);
        debug!(app, maps = ?values, "Writing port maps");
        self.store.write_list(PLUGIN, app, MAP_PROPERTY, &values)?;
        Ok(())
    }

    /// Append mappings to the persisted set
    pub fn add_port_maps(&self, app: &str, port_maps: &[PortMap]) -> PortsResult<()> {
        let mut all = self.get_port_maps(app)?;
        all.extend_from_slice(port_maps);
        self.set_port_maps(app, &all)
    }

    /// Drop mappings from the persisted set
    ///
    /// An internal reservation removes every mapping on its host port. When
    /// nothing is left the `map` property is deleted so the detected mappings
    /// take over again.
    pub fn remove_port_maps(&self, app: &str, port_maps: &[PortMap]) -> PortsResult<()> {
        let remaining = remove_matching(&self.get_port_maps(app)?, port_maps);

        if remaining.is_empty() {
            debug!(app, "No port maps left, deleting property");
            self.store.delete(PLUGIN, app, MAP_PROPERTY)?;
            return Ok(());
        }

        self.set_port_maps(app, &remaining)
    }

    /// Migrate http:80 mappings to https:443 once a certificate is installed
    pub fn post_certs_update(&self, app: &str) -> PortsResult<()> {
        let port = self.config.get_with_default(app, PROXY_PORT_CONFIG, "")?;
        let ssl_port = self.config.get_with_default(app, PROXY_SSL_PORT_CONFIG, "")?;

        // Default ports become implicit once expressed as port maps
        let mut to_unset = Vec::new();
        if port == DEFAULT_HTTP_PORT.to_string() {
            to_unset.push(PROXY_PORT_CONFIG);
        }
        if ssl_port == DEFAULT_HTTPS_PORT.to_string() {
            to_unset.push(PROXY_SSL_PORT_CONFIG);
        }
        if !to_unset.is_empty() {
            self.config.unset_many(app, &to_unset, false)?;
        }

        let port_maps = self.get_port_maps(app)?;
        let http_port_maps = unique_port_maps(&filter_port_maps(
            &port_maps,
            &Scheme::Http,
            DEFAULT_HTTP_PORT,
        ));

        if http_port_maps.is_empty() {
            debug!(app, "No http:80 port maps, skipping https migration");
            return Ok(());
        }

        let stale_https = filter_port_maps(&port_maps, &Scheme::Https, DEFAULT_HTTPS_PORT);
        self.remove_port_maps(app, &stale_https)?;

        let https_port_maps: Vec<PortMap> = http_port_maps
            .iter()
            .map(|pm| PortMap::new(Scheme::Https, Port::HTTPS, pm.container_port))
            .collect();

        info!(
            app,
            count = https_port_maps.len(),
            "Adding https:443 port maps for installed certificate"
        );
        self.add_port_maps(app, &https_port_maps)
    }

    /// Drop https:443 mappings once the certificate is gone
    pub fn post_certs_remove(&self, app: &str) -> PortsResult<()> {
        self.config
            .unset_many(app, &[PROXY_SSL_PORT_CONFIG], false)?;

        let https_port_maps =
            self.filter_app_port_maps(app, &Scheme::Https, DEFAULT_HTTPS_PORT)?;
        if !https_port_maps.is_empty() {
            info!(
                app,
                count = https_port_maps.len(),
                "Removing https:443 port maps for removed certificate"
            );
        }
        self.remove_port_maps(app, &https_port_maps)?;

        // Persisted maps may now be empty, in which case detection is reported
        let detected = self.get_detected_port_maps(app)?;
        let stale_detected = filter_port_maps(&detected, &Scheme::Https, DEFAULT_HTTPS_PORT);
        if !stale_detected.is_empty() {
            let remaining = remove_matching(&detected, &stale_detected);
            self.store.write_list(
                PLUGIN,
                app,
                DETECTED_MAP_PROPERTY,
                &to_persisted_values(&remaining),
            )?;
        }

        Ok(())
    }
}

/// `existing` without anything named in `to_remove`
fn remove_matching(existing: &[PortMap], to_remove: &[PortMap]) -> Vec<PortMap> {
    let mut exact = HashSet::new();
    let mut by_host_port = HashSet::new();
    for pm in to_remove {
        if pm.allows_persistence() {
            by_host_port.insert(pm.host_port);
        } else {
            exact.insert(pm);
        }
    }

    existing
        .iter()
        .filter(|pm| !exact.contains(pm) && !by_host_port.contains(&pm.host_port))
        .cloned()
        .collect()
}
