/// Network layer: directory discovery, node transport, latency ranking.
///
/// Every call carries an explicit timeout (directory 10 s, ping 5 s,
/// store/retrieve 30 s). Failures here are soft at the replica level;
/// the pipelines decide when they become fatal.
pub mod directory;
pub mod selection;
pub mod transport;

use serde::{Deserialize, Serialize};

/// A storage node as reported by the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: String,
    /// Host name or IP, without scheme or port.
    pub address: String,
    pub port: u16,
    /// Raw reliability as the directory reports it; either a [0,1]
    /// fraction or a [0,100] percentage. Normalized in `selection`.
    #[serde(default = "default_reliability")]
    pub reliability: f64,
}

fn default_reliability() -> f64 {
    1.0
}

impl NodeDescriptor {
    /// "host:port", the form recorded in manifests.
    pub fn location(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// Base URL for HTTP calls against this node.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }
}

/// Turn a manifest "host:port" location back into a base URL.
pub fn base_url_for(location: &str) -> String {
    if location.starts_with("http://") || location.starts_with("https://") {
        location.to_string()
    } else {
        format!("http://{location}")
    }
}
