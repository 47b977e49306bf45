// Antenna ports - labels, indices, and resolution of user references
//
// Ports are addressed internally by index into the configured label list.
// Requests and configuration may name a port either way.

use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default labels: Opera Cake ports A1-A4, B1-B4
pub static OPERA_CAKE_PORTS: Lazy<Vec<String>> = Lazy::new(|| {
    ["A1", "A2", "A3", "A4", "B1", "B2", "B3", "B4"]
        .iter()
        .map(|s| s.to_string())
        .collect()
});

/// Index of an antenna port in the configured port set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortId(pub usize);

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A port named by label (`"A2"`) or by index (`1`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortRef {
    Index(usize),
    Label(String),
}

impl From<usize> for PortRef {
    fn from(index: usize) -> Self {
        PortRef::Index(index)
    }
}

impl From<&str> for PortRef {
    fn from(label: &str) -> Self {
        PortRef::Label(label.to_string())
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortRef::Index(i) => write!(f, "#{}", i),
            PortRef::Label(label) => f.write_str(label),
        }
    }
}

/// The ordered set of switch ports
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortSet {
    labels: Vec<String>,
}

impl Default for PortSet {
    fn default() -> Self {
        Self {
            labels: OPERA_CAKE_PORTS.clone(),
        }
    }
}

impl PortSet {
    /// Build a port set from labels (non-empty, unique, case-insensitive)
    pub fn new(labels: Vec<String>) -> Result<Self, ConfigError> {
        if labels.is_empty() {
            return Err(ConfigError::invalid("switching.ports", "no ports configured"));
        }
        for (i, label) in labels.iter().enumerate() {
            if label.trim().is_empty() {
                return Err(ConfigError::invalid(
                    "switching.ports",
                    format!("port {} has an empty label", i),
                ));
            }
            if labels[..i].iter().any(|l| l.eq_ignore_ascii_case(label)) {
                return Err(ConfigError::invalid(
                    "switching.ports",
                    format!("duplicate label '{}'", label),
                ));
            }
        }
        Ok(Self { labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Label for `port`; unknown indices render as `#n`
    pub fn label(&self, port: PortId) -> String {
        self.labels
            .get(port.0)
            .cloned()
            .unwrap_or_else(|| port.to_string())
    }

    /// Reject indices outside the set
    pub fn check(&self, port: PortId) -> Result<PortId, ConfigError> {
        if port.0 < self.labels.len() {
            Ok(port)
        } else {
            Err(ConfigError::PortOutOfRange {
                index: port.0,
                count: self.labels.len(),
            })
        }
    }

    /// Resolve a label or index to a valid `PortId`
    pub fn resolve(&self, port: &PortRef) -> Result<PortId, ConfigError> {
        match port {
            PortRef::Index(i) => self.check(PortId(*i)),
            PortRef::Label(label) => self
                .labels
                .iter()
                .position(|l| l.eq_ignore_ascii_case(label.trim()))
                .map(PortId)
                .ok_or_else(|| ConfigError::UnknownPort {
                    label: label.clone(),
                }),
        }
    }

    pub fn resolve_all(&self, ports: &[PortRef]) -> Result<Vec<PortId>, ConfigError> {
        ports.iter().map(|p| self.resolve(p)).collect()
    }

    pub fn ids(&self) -> impl Iterator<Item = PortId> {
        (0..self.labels.len()).map(PortId)
    }
}
