//! Effective port mappings for an app
//!
//! Persisted mappings win outright; the detected list is only consulted when
//! nothing has been persisted.

use crate::error::PortsResult;
use crate::portmap::{filter_port_maps, parse_port_map_list, unique_port_maps, PortMap, Scheme};
use crate::ports::{Ports, DETECTED_MAP_PROPERTY, MAP_PROPERTY, PLUGIN};

impl Ports<'_> {
    /// Persisted mappings in stored order
    pub fn get_port_maps(&self, app: &str) -> PortsResult<Vec<PortMap>> {
        self.read_port_maps(app, MAP_PROPERTY)
    }

    /// Detected mappings in stored order
    pub fn get_detected_port_maps(&self, app: &str) -> PortsResult<Vec<PortMap>> {
        self.read_port_maps(app, DETECTED_MAP_PROPERTY)
    }

    pub(crate) fn read_port_maps(&self, app: &str, key: &str) -> PortsResult<Vec<PortMap>> {
        let values = self.store.read_list(PLUGIN, app, key)?;
        Ok(parse_port_map_list(&values)?)
    }

    /// Mappings reported for an app: persisted, else detected, minus internal
    /// reservations and duplicates
    pub fn resolve(&self, app: &str) -> PortsResult<Vec<PortMap>> {
        let mut port_maps = self.get_port_maps(app)?;
        if port_maps.is_empty() {
            port_maps = self.get_detected_port_maps(app)?;
        }

        let reportable: Vec<PortMap> = port_maps
            .into_iter()
            .filter(|pm| !pm.allows_persistence())
            .collect();

        Ok(unique_port_maps(&reportable))
    }

    /// Persisted mappings for one scheme and host port
    pub fn filter_app_port_maps(
        &self,
        app: &str,
        scheme: &Scheme,
        host_port: u16,
    ) -> PortsResult<Vec<PortMap>> {
        Ok(filter_port_maps(&self.get_port_maps(app)?, scheme, host_port))
    }
}
