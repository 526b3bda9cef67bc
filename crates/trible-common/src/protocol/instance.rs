use std::fmt;

use serde::{Deserialize, Serialize};

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_group() -> String {
    "default".to_string()
}

/// A provider instance of a logical service, as reported by discovery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstance {
    pub service_name: String,
    pub host: String,
    pub port: u16,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_group")]
    pub group: String,
}

impl ServiceInstance {
    /// Creates an instance with the default version and group.
    pub fn new(service_name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            service_name: service_name.into(),
            host: host.into(),
            port,
            version: default_version(),
            group: default_group(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// `host:port`, suitable for connecting.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `service:version`
    pub fn service_key(&self) -> String {
        format!("{}:{}", self.service_name, self.version)
    }

    /// `service:version/host:port`, unique per registered node.
    pub fn node_key(&self) -> String {
        format!("{}/{}", self.service_key(), self.address())
    }
}

impl fmt::Display for ServiceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.service_name, self.address())
    }
}
