//! Remaining ports triggers: reporting, properties and proxy port setup
//!
//! Triggers that print return their stdout as a `String`; the binary decides
//! how to write it. Nothing is returned once an error has been detected.

use crate::config::PortSettings;
use crate::error::{PortsError, PortsResult};
use crate::portmap::{
    parse_port_map_string, to_persisted_values, DEFAULT_HTTPS_PORT, DEFAULT_HTTP_PORT,
};
use crate::ports::{
    Ports, DETECTED_MAP_PROPERTY, MAP_PROPERTY, PLUGIN, PROXY_PORT_PROPERTY,
    PROXY_SSL_PORT_PROPERTY,
};
use crate::store::GLOBAL_SCOPE;
use std::net::TcpListener;
use std::str::FromStr;
use tracing::{debug, info};

/// Output mode for `ports-get`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    /// One canonical port map per line
    #[default]
    Stdout,
    /// JSON array of `{container_port, host_port, scheme}` records
    Json,
}

impl FromStr for ReportFormat {
    type Err = PortsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "stdout" => Ok(ReportFormat::Stdout),
            "json" => Ok(ReportFormat::Json),
            other => Err(PortsError::InvalidFormat(other.to_string())),
        }
    }
}

impl Ports<'_> {
    /// Resolved mappings for an app in the requested format
    pub fn ports_get(&self, app: &str, format: &str) -> PortsResult<String> {
        let format: ReportFormat = format.parse()?;
        let port_maps = self.resolve(app)?;

        match format {
            ReportFormat::Json => Ok(serde_json::to_string(&port_maps)?),
            ReportFormat::Stdout => Ok(port_maps
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n")),
        }
    }

    /// An unused port at or above the configured minimum
    pub fn ports_get_available(&self) -> Option<u16> {
        available_port(&self.settings)
    }

    /// Value of a ports property
    ///
    /// `proxy-port` and `proxy-ssl-port` report the computed value, falling
    /// back to the global setting and then the scheme default.
    pub fn ports_get_property(&self, app: &str, key: &str) -> PortsResult<String> {
        match key {
            PROXY_PORT_PROPERTY => Ok(self.computed_proxy_port(app)?.to_string()),
            PROXY_SSL_PORT_PROPERTY => Ok(self.computed_proxy_ssl_port(app)?.to_string()),
            MAP_PROPERTY | DETECTED_MAP_PROPERTY => {
                Ok(self.store.read_list(PLUGIN, app, key)?.join(" "))
            }
            other => Err(PortsError::UnknownProperty(other.to_string())),
        }
    }

    /// Record the mappings detected for the deployed app
    pub fn ports_set_detected(&self, app: &str, port_map_string: &str) -> PortsResult<()> {
        let port_maps = parse_port_map_string(port_map_string)?;
        let values = to_persisted_values(&port_maps);
        debug!(app, maps = ?values, "Setting detected port maps");
        self.store
            .write_list(PLUGIN, app, DETECTED_MAP_PROPERTY, &values)?;
        Ok(())
    }

    /// Forget the persisted mappings for an app
    pub fn ports_clear(&self, app: &str) -> PortsResult<()> {
        self.store.delete(PLUGIN, app, MAP_PROPERTY)?;
        info!(app, "Cleared port maps");
        Ok(())
    }

    /// Make sure the app has proxy ports assigned
    pub fn ports_configure(&self, app: &str) -> PortsResult<()> {
        self.initialize_proxy_port(app)?;
        self.initialize_proxy_ssl_port(app)
    }

    /// Proxy port for an app: app setting, then global, then 80
    pub fn computed_proxy_port(&self, app: &str) -> PortsResult<u16> {
        self.computed_port(app, PROXY_PORT_PROPERTY, DEFAULT_HTTP_PORT)
    }

    /// SSL proxy port for an app: app setting, then global, then 443
    pub fn computed_proxy_ssl_port(&self, app: &str) -> PortsResult<u16> {
        self.computed_port(app, PROXY_SSL_PORT_PROPERTY, DEFAULT_HTTPS_PORT)
    }

    fn computed_port(&self, app: &str, key: &str, default: u16) -> PortsResult<u16> {
        if let Some(port) = self.port_property(app, key)? {
            return Ok(port);
        }
        Ok(self.port_property(GLOBAL_SCOPE, key)?.unwrap_or(default))
    }

    /// A stored port property; unset and `0` both mean "not configured"
    fn port_property(&self, scope: &str, key: &str) -> PortsResult<Option<u16>> {
        let value = self.store.get(PLUGIN, scope, key)?;
        let value = value.trim();
        if value.is_empty() {
            return Ok(None);
        }

        let port: u16 = value.parse().map_err(|_| PortsError::InvalidPropertyValue {
            key: key.to_string(),
            value: value.to_string(),
        })?;
        Ok(Some(port).filter(|p| *p != 0))
    }

    fn initialize_proxy_port(&self, app: &str) -> PortsResult<()> {
        if self.port_property(app, PROXY_PORT_PROPERTY)?.is_some() {
            return Ok(());
        }

        let port = if self.platform.is_vhost_enabled(app)? {
            self.port_property(GLOBAL_SCOPE, PROXY_PORT_PROPERTY)?
                .unwrap_or(DEFAULT_HTTP_PORT)
        } else {
            info!(app, "No port set, setting to random open high port");
            self.require_available_port()?
        };

        info!(app, port, "Setting proxy port");
        self.store
            .write(PLUGIN, app, PROXY_PORT_PROPERTY, &port.to_string())?;
        Ok(())
    }

    fn initialize_proxy_ssl_port(&self, app: &str) -> PortsResult<()> {
        if self.port_property(app, PROXY_SSL_PORT_PROPERTY)?.is_some() {
            return Ok(());
        }

        if !self.platform.has_certificate(app)? {
            return Ok(());
        }

        let port = if self.platform.is_vhost_enabled(app)? {
            self.port_property(GLOBAL_SCOPE, PROXY_SSL_PORT_PROPERTY)?
                .unwrap_or(DEFAULT_HTTPS_PORT)
        } else {
            self.require_available_port()?
        };

        info!(app, port, "Setting proxy ssl port");
        self.store
            .write(PLUGIN, app, PROXY_SSL_PORT_PROPERTY, &port.to_string())?;
        Ok(())
    }

    fn require_available_port(&self) -> PortsResult<u16> {
        self.ports_get_available()
            .ok_or(PortsError::NoAvailablePort(self.settings.available_port_min))
    }
}

/// Ask the OS for an ephemeral port until one lands at or above the minimum
pub fn available_port(settings: &PortSettings) -> Option<u16> {
    for _ in 0..settings.available_port_attempts {
        let listener = match TcpListener::bind(("0.0.0.0", 0)) {
            Ok(listener) => listener,
            Err(e) => {
                debug!(error = %e, "Unable to bind ephemeral port");
                continue;
            }
        };

        if let Ok(addr) = listener.local_addr() {
            if addr.port() >= settings.available_port_min {
                return Some(addr.port());
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::store::PropertyStore;

    fn seed(db: &Database, app: &str, key: &str, values: &[&str]) {
        let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        db.write_list("ports", app, key, &values).unwrap();
    }

    #[test]
    fn test_report_format_parse() {
        assert_eq!("".parse::<ReportFormat>().unwrap(), ReportFormat::Stdout);
        assert_eq!("stdout".parse::<ReportFormat>().unwrap(), ReportFormat::Stdout);
        assert_eq!("json".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert!(matches!(
            "yaml".parse::<ReportFormat>(),
            Err(PortsError::InvalidFormat(f)) if f == "yaml"
        ));
    }

    #[test]
    fn test_ports_get_stdout() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, "myapp", "map", &["http:80:5000", "https:443:5000"]);
        let ports = Ports::from_database(&db);

        assert_eq!(
            ports.ports_get("myapp", "stdout").unwrap(),
            "http:80:5000\nhttps:443:5000"
        );
        assert_eq!(ports.ports_get("empty", "").unwrap(), "");
    }

    #[test]
    fn test_ports_get_json() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, "myapp", "map", &["http:80:5000"]);
        let ports = Ports::from_database(&db);

        assert_eq!(
            ports.ports_get("myapp", "json").unwrap(),
            r#"[{"container_port":5000,"host_port":80,"scheme":"http"}]"#
        );
        assert_eq!(ports.ports_get("empty", "json").unwrap(), "[]");
    }

    #[test]
    fn test_ports_get_invalid_format_reads_nothing() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, "myapp", "map", &["not-a-port-map"]);
        let ports = Ports::from_database(&db);

        assert!(matches!(
            ports.ports_get("myapp", "xml"),
            Err(PortsError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_ports_set_detected() {
        let db = Database::open_in_memory().unwrap();
        let ports = Ports::from_database(&db);

        ports
            .ports_set_detected("myapp", "https:443:5000 5000 http:80:5000 http:80:5000")
            .unwrap();

        assert_eq!(
            db.read_list("ports", "myapp", "map-detected").unwrap(),
            vec!["http:80:5000", "https:443:5000"]
        );
    }

    #[test]
    fn test_ports_set_detected_rejects_bad_input() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, "myapp", "map-detected", &["http:80:5000"]);
        let ports = Ports::from_database(&db);

        assert!(matches!(
            ports.ports_set_detected("myapp", "http:80:5000 http:eighty:5000"),
            Err(PortsError::Parse(_))
        ));
        assert_eq!(
            db.read_list("ports", "myapp", "map-detected").unwrap(),
            vec!["http:80:5000"]
        );
    }

    #[test]
    fn test_ports_clear() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, "myapp", "map", &["http:8080:5000"]);
        seed(&db, "myapp", "map-detected", &["http:80:5000"]);
        let ports = Ports::from_database(&db);

        ports.ports_clear("myapp").unwrap();

        assert_eq!(ports.ports_get("myapp", "").unwrap(), "http:80:5000");
    }

    #[test]
    fn test_get_property_computed_ports() {
        let db = Database::open_in_memory().unwrap();
        let ports = Ports::from_database(&db);

        assert_eq!(ports.ports_get_property("myapp", "proxy-port").unwrap(), "80");
        assert_eq!(ports.ports_get_property("myapp", "proxy-ssl-port").unwrap(), "443");

        db.write("ports", "--global", "proxy-port", "8000").unwrap();
        assert_eq!(ports.ports_get_property("myapp", "proxy-port").unwrap(), "8000");

        db.write("ports", "myapp", "proxy-port", "9000").unwrap();
        assert_eq!(ports.ports_get_property("myapp", "proxy-port").unwrap(), "9000");
    }

    #[test]
    fn test_get_property_lists_and_unknown_keys() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, "myapp", "map", &["http:80:5000", "https:443:5000"]);
        let ports = Ports::from_database(&db);

        assert_eq!(
            ports.ports_get_property("myapp", "map").unwrap(),
            "http:80:5000 https:443:5000"
        );
        assert_eq!(ports.ports_get_property("myapp", "map-detected").unwrap(), "");
        assert!(matches!(
            ports.ports_get_property("myapp", "bogus"),
            Err(PortsError::UnknownProperty(_))
        ));
    }

    #[test]
    fn test_get_property_invalid_stored_port() {
        let db = Database::open_in_memory().unwrap();
        db.write("ports", "myapp", "proxy-port", "eighty").unwrap();
        let ports = Ports::from_database(&db);

        assert!(matches!(
            ports.ports_get_property("myapp", "proxy-port"),
            Err(PortsError::InvalidPropertyValue { .. })
        ));
    }

    #[test]
    fn test_configure_vhost_app() {
        let db = Database::open_in_memory().unwrap();
        db.create_app("myapp").unwrap();
        let ports = Ports::from_database(&db);

        ports.ports_configure("myapp").unwrap();

        assert_eq!(db.get("ports", "myapp", "proxy-port").unwrap(), "80");
        assert!(!db.exists("ports", "myapp", "proxy-ssl-port").unwrap());
    }

    #[test]
    fn test_configure_vhost_app_with_certificate() {
        let db = Database::open_in_memory().unwrap();
        db.create_app("myapp").unwrap();
        db.set_certificate("myapp", true).unwrap();
        db.write("ports", "--global", "proxy-ssl-port", "8443").unwrap();
        let ports = Ports::from_database(&db);

        ports.ports_configure("myapp").unwrap();

        assert_eq!(db.get("ports", "myapp", "proxy-port").unwrap(), "80");
        assert_eq!(db.get("ports", "myapp", "proxy-ssl-port").unwrap(), "8443");
    }

    #[test]
    fn test_configure_keeps_existing_ports() {
        let db = Database::open_in_memory().unwrap();
        db.create_app("myapp").unwrap();
        db.write("ports", "myapp", "proxy-port", "8080").unwrap();
        let ports = Ports::from_database(&db);

        ports.ports_configure("myapp").unwrap();

        assert_eq!(db.get("ports", "myapp", "proxy-port").unwrap(), "8080");
    }

    #[test]
    fn test_configure_non_vhost_app_gets_high_port() {
        let db = Database::open_in_memory().unwrap();
        db.create_app("myapp").unwrap();
        db.set_config("myapp", "NO_VHOST", "1").unwrap();
        let ports = Ports::from_database(&db);

        ports.ports_configure("myapp").unwrap();

        let port: u16 = db.get("ports", "myapp", "proxy-port").unwrap().parse().unwrap();
        assert!(port >= 1025);
    }

    #[test]
    fn test_available_port_respects_minimum() {
        let settings = PortSettings {
            available_port_min: 1025,
            available_port_attempts: 20,
        };
        let port = available_port(&settings).unwrap();
        assert!(port >= 1025);

        let impossible = PortSettings {
            available_port_min: u16::MAX,
            available_port_attempts: 1,
        };
        assert!(available_port(&impossible).is_none());
    }
}
