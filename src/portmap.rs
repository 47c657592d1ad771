//! Port map value types
//!
//! A port map ties an externally reachable proxy port to the port an app
//! process listens on inside its container. The canonical text form is
//! `scheme:host_port:container_port`, which is also what gets persisted.

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Default proxy port for plain HTTP
pub const DEFAULT_HTTP_PORT: u16 = 80;
/// Default proxy port for HTTPS
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// Protocol served on the host side of a mapping
///
/// Proxies may support schemes beyond the well-known ones (`grpc`, `grpcs`),
/// so any non-empty token is accepted and carried through as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Scheme {
    Http,
    Https,
    Tcp,
    Udp,
    /// Bare port reservation with no user-facing route
    Internal,
    Other(String),
}

impl Scheme {
    pub fn as_str(&self) -> &str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
            Scheme::Tcp => "tcp",
            Scheme::Udp => "udp",
            Scheme::Internal => "__internal__",
            Scheme::Other(name) => name.as_str(),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Err(ParseError::new(s, "empty scheme")),
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            "tcp" => Ok(Scheme::Tcp),
            "udp" => Ok(Scheme::Udp),
            "__internal__" => Ok(Scheme::Internal),
            other if other.chars().any(char::is_whitespace) => {
                Err(ParseError::new(other, "scheme contains whitespace"))
            }
            other => Ok(Scheme::Other(other.to_string())),
        }
    }
}

impl TryFrom<String> for Scheme {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Scheme> for String {
    fn from(scheme: Scheme) -> String {
        match scheme {
            Scheme::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

/// A TCP/UDP port in the range 1-65535
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Port(u16);

impl Port {
    pub const HTTP: Port = Port(DEFAULT_HTTP_PORT);
    pub const HTTPS: Port = Port(DEFAULT_HTTPS_PORT);

    pub fn new(port: u16) -> Result<Self, ParseError> {
        if port == 0 {
            return Err(ParseError::new("0", "port must be between 1 and 65535"));
        }
        Ok(Self(port))
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for Port {
    type Error = ParseError;

    fn try_from(port: u16) -> Result<Self, Self::Error> {
        Port::new(port)
    }
}

impl From<Port> for u16 {
    fn from(port: Port) -> u16 {
        port.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Port {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Only the canonical spelling, so display gives back the input
        if s.starts_with('+') || (s.len() > 1 && s.starts_with('0')) {
            return Err(ParseError::new(s, "invalid port: not in canonical form"));
        }
        let port: u16 = s
            .parse()
            .map_err(|e| ParseError::new(s, format!("invalid port: {}", e)))?;
        Port::new(port).map_err(|e| ParseError::new(s, e.reason))
    }
}

/// One `scheme:host_port:container_port` mapping
///
/// Field order matches the JSON emitted by `ports-get --format json`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortMap {
    pub container_port: Port,
    pub host_port: Port,
    pub scheme: Scheme,
}

impl PortMap {
    pub fn new(scheme: Scheme, host_port: Port, container_port: Port) -> Self {
        Self {
            container_port,
            host_port,
            scheme,
        }
    }

    /// Reservation for a bare host port, as produced by `"5000"` in a list string
    pub fn internal(port: Port) -> Self {
        Self::new(Scheme::Internal, port, port)
    }

    /// True for environment scaffolding that must never be reported or persisted
    pub fn allows_persistence(&self) -> bool {
        self.scheme == Scheme::Internal
    }

    pub fn matches(&self, scheme: &Scheme, host_port: u16) -> bool {
        self.scheme == *scheme && self.host_port.get() == host_port
    }
}

impl fmt::Display for PortMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.scheme, self.host_port, self.container_port)
    }
}

impl FromStr for PortMap {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 {
            return Err(ParseError::new(
                s,
                format!("expected 3 fields, found {}", parts.len()),
            ));
        }

        let scheme: Scheme = parts[0]
            .parse()
            .map_err(|e: ParseError| ParseError::new(s, e.reason))?;
        let host_port: Port = parts[1]
            .parse()
            .map_err(|e: ParseError| ParseError::new(s, format!("host port: {}", e.reason)))?;
        let container_port: Port = parts[2]
            .parse()
            .map_err(|e: ParseError| ParseError::new(s, format!("container port: {}", e.reason)))?;

        Ok(PortMap::new(scheme, host_port, container_port))
    }
}

/// Parse a whitespace separated list such as `"http:80:5000 https:443:5000"`
///
/// A bare number becomes an internal reservation. One bad entry rejects the
/// whole string.
pub fn parse_port_map_string(value: &str) -> Result<Vec<PortMap>, ParseError> {
    value
        .split_whitespace()
        .map(|entry| {
            if entry.contains(':') {
                entry.parse()
            } else {
                entry.parse::<Port>().map(PortMap::internal)
            }
        })
        .collect()
}

/// Parse stored list entries, one port map per element
pub fn parse_port_map_list<S: AsRef<str>>(values: &[S]) -> Result<Vec<PortMap>, ParseError> {
    values
        .iter()
        .map(|v| v.as_ref().trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.parse::<PortMap>())
        .collect()
}

/// Keep the first occurrence of each distinct mapping, preserving order
pub fn unique_port_maps(port_maps: &[PortMap]) -> Vec<PortMap> {
    let mut seen = HashSet::new();
    port_maps
        .iter()
        .filter(|pm| seen.insert(*pm))
        .cloned()
        .collect()
}

/// Mappings for a given scheme and host port
pub fn filter_port_maps(port_maps: &[PortMap], scheme: &Scheme, host_port: u16) -> Vec<PortMap> {
    port_maps
        .iter()
        .filter(|pm| pm.matches(scheme, host_port))
        .cloned()
        .collect()
}

/// Canonical strings for the mappings that may be stored, deduplicated and sorted
pub fn to_persisted_values(port_maps: &[PortMap]) -> Vec<String> {
    let mut values: Vec<String> = unique_port_maps(port_maps)
        .iter()
        .filter(|pm| !pm.allows_persistence())
        .map(PortMap::to_string)
        .collect();
    values.sort();
    values
}
