/// Configuration values threaded explicitly through constructors.
///
/// There are no process-wide singletons: the CLI builds one of these per
/// invocation and hands it to the pipelines / node service. The directory
/// URL can be overridden per invocation (`--server`).
use std::path::PathBuf;
use std::time::Duration;

/// Default directory service endpoint.
pub const DEFAULT_DIRECTORY_URL: &str = "http://localhost:4000";

/// Client-side configuration shared by the upload and download pipelines.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Directory service base URL.
    pub directory_url: String,
    /// Timeout for directory queries.
    pub directory_timeout: Duration,
    /// Timeout for a node latency probe.
    pub ping_timeout: Duration,
    /// Timeout for fragment store/retrieve calls.
    pub transfer_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            directory_url: DEFAULT_DIRECTORY_URL.to_string(),
            directory_timeout: Duration::from_secs(10),
            ping_timeout: Duration::from_secs(5),
            transfer_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Config pointing at a specific directory server.
    pub fn with_directory(url: impl Into<String>) -> Self {
        Self {
            directory_url: url.into(),
            ..Self::default()
        }
    }
}

/// Tunable parameters for one upload.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Number of data shards D.
    pub partitions: usize,
    /// Fragment replicas per shard R.
    pub redundancy: usize,
    /// DEFLATE the master ciphertext before partitioning.
    pub compression: bool,
    /// Add Reed-Solomon parity shards (P = ceil(D * 0.4)).
    pub reed_solomon: bool,
    /// Bind the manifest to a password instead of embedding the master key.
    pub master_password: Option<String>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            partitions: 10,
            redundancy: 3,
            compression: true,
            reed_solomon: true,
            master_password: None,
        }
    }
}

/// Storage-node service configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Directory where fragments and the identity file live.
    pub storage_dir: PathBuf,
    /// Listen port for the fragment service.
    pub port: u16,
    /// Address peers should use to reach this node.
    pub advertise_address: String,
    /// Directory service base URL.
    pub directory_url: String,
    /// Total bytes this node offers to the network.
    pub capacity: u64,
    /// Timeout for directory calls made by the node.
    pub directory_timeout: Duration,
    /// Heartbeat interval.
    pub heartbeat_interval: Duration,
    /// Full integrity sweep interval.
    pub sweep_interval: Duration,
    /// Free-space log interval.
    pub space_log_interval: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("./myst-storage"),
            port: 5001,
            advertise_address: "127.0.0.1".to_string(),
            directory_url: DEFAULT_DIRECTORY_URL.to_string(),
            capacity: 10 * 1024 * 1024 * 1024, // 10 GiB
            directory_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(3600),
            space_log_interval: Duration::from_secs(300),
        }
    }
}
