use serde::{Serialize, Deserialize};
use std::path::Path;
use std::fs;
use std::io;
use crate::error::{SyncResult, SyncError};
use crate::retry::RetryPolicy;

/// Blog client configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogConfig {
    /// Full node and contract configuration
    #[serde(default)]
    pub node: NodeConfig,
    /// Sync configuration
    #[serde(default)]
    pub sync: SyncConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Full node and contract configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// REST endpoint of the full node
    #[serde(default = "default_node_url")]
    pub url: String,
    /// Account the blog module is published under
    #[serde(default = "default_module_address")]
    pub module_address: String,
    /// Move module name
    #[serde(default = "default_module_name")]
    pub module_name: String,
    /// Contract namespace inside the module
    #[serde(default = "default_contract")]
    pub contract: String,
    /// Resource struct holding an account's posts
    #[serde(default = "default_resource_struct")]
    pub resource_struct: String,
    /// Entry function that publishes a post
    #[serde(default = "default_create_function")]
    pub create_function: String,
    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Wait for submitted transactions to commit before re-fetching
    #[serde(default = "default_true")]
    pub confirm_transactions: bool,
    /// Delay between confirmation polls
    #[serde(default = "default_confirm_poll_interval")]
    pub confirm_poll_interval_ms: u64,
    /// Confirmation polls before giving up
    #[serde(default = "default_confirm_max_polls")]
    pub confirm_max_polls: u32,
}

/// Sync configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Retry policy for remote fetches
    #[serde(default)]
    pub retry: RetryPolicy,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or `tracing` filter directive
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default functions for NodeConfig
fn default_node_url() -> String {
    "https://fullnode.testnet.aptoslabs.com".to_string()
}

fn default_module_address() -> String {
    "0x97e0d12d7e0e95eff08fd352b024c5f997da91cd6e9cbe7986471adaf29b510d".to_string()
}

fn default_module_name() -> String {
    "MyModule".to_string()
}

fn default_contract() -> String {
    "DecentralizedBlog".to_string()
}

fn default_resource_struct() -> String {
    "BlogPost".to_string()
}

fn default_create_function() -> String {
    "create_post".to_string()
}

fn default_request_timeout() -> u64 {
    30 // 30 seconds
}

fn default_confirm_poll_interval() -> u64 {
    500
}

fn default_confirm_max_polls() -> u32 {
    20
}

// Default functions for LoggingConfig
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            url: default_node_url(),
            module_address: default_module_address(),
            module_name: default_module_name(),
            contract: default_contract(),
            resource_struct: default_resource_struct(),
            create_function: default_create_function(),
            request_timeout_seconds: default_request_timeout(),
            confirm_transactions: default_true(),
            confirm_poll_interval_ms: default_confirm_poll_interval(),
            confirm_max_polls: default_confirm_max_polls(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl NodeConfig {
    /// Fully qualified type of the posts resource
    pub fn resource_type(&self) -> String {
        format!(
            "{}::{}::{}::{}",
            self.module_address, self.module_name, self.contract, self.resource_struct
        )
    }

    /// Fully qualified create entry function
    pub fn create_function_id(&self) -> String {
        format!(
            "{}::{}::{}::{}",
            self.module_address, self.module_name, self.contract, self.create_function
        )
    }
}

impl BlogConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> SyncResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    return SyncError::ConfigNotFound(path.display().to_string());
                }
                SyncError::Configuration(format!("Failed to read config file: {}", e))
            })?;

        let config: BlogConfig = toml::from_str(&content)
            .map_err(|e| SyncError::Configuration(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> SyncResult<()> {
        let content = self.to_toml()?;

        // Ensure the directory exists
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| {
                        SyncError::Configuration(format!("Failed to create config directory: {}", e))
                    })?;
            }
        }

        fs::write(path, content)
            .map_err(|e| SyncError::Configuration(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> SyncResult<Self> {
        match Self::load(&path) {
            Ok(config) => Ok(config),
            Err(SyncError::ConfigNotFound(_)) => {
                // Create default config and save it
                let config = Self::default();
                config.save(&path)?;
                Ok(config)
            },
            Err(e) => Err(e),
        }
    }

    /// Render as pretty TOML
    pub fn to_toml(&self) -> SyncResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| SyncError::Configuration(format!("Failed to serialize config: {}", e)))
    }
}
