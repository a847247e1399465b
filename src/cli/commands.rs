//! CLI command implementations
//!
//! `init` registers nothing in the plane; it assigns the node id and makes
//! sure the shared store layout exists. Only `start` publishes records.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::ha::{
    infer_failed_nodes, AlphabeticMasterChooser, Clock, HaConfig, HaCoordinator,
    HighAvailabilityMode, ManagementNodeState, MasterChooser, PriorityMasterChooser, SystemClock,
};
use crate::http::{HttpServer, HttpServerConfig};
use crate::observability::{Logger, Severity};
use crate::persist::{FilePersister, SyncRecordPersister};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::write_response;

/// Change log entries shown by `status`
const STATUS_HISTORY: usize = 10;

/// Node configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Stable node id; assigned by `init` when absent
    #[serde(default)]
    pub node_id: Option<String>,

    /// Shared store directory (required)
    pub store_dir: String,

    /// Mode passed to `start` (default: "auto")
    #[serde(default = "default_start_mode")]
    pub start_mode: String,

    /// Poll period in ms; null disables scheduled polling (default: 5000)
    #[serde(default = "default_poll_period_ms")]
    pub poll_period_ms: Option<u64>,

    /// Heartbeat timeout in ms (default: 30000)
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,

    /// Standby mode a demoted master returns to (default: "standby")
    #[serde(default = "default_standby")]
    pub default_standby: String,

    /// "alphabetic" or "priority" (default: "alphabetic")
    #[serde(default = "default_chooser")]
    pub chooser: String,

    #[serde(default)]
    pub priority: Option<i64>,

    /// Management endpoint published with this node's record
    #[serde(default)]
    pub node_uri: Option<String>,

    /// Status server host; the server runs only when `http_port` is set
    #[serde(default)]
    pub http_host: Option<String>,

    #[serde(default)]
    pub http_port: Option<u16>,

    /// Allowed CORS origins for the status server; empty allows any
    #[serde(default)]
    pub http_cors_origins: Vec<String>,

    /// Minimum log severity (default: "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_start_mode() -> String {
    "auto".to_string()
}
fn default_poll_period_ms() -> Option<u64> {
    Some(5_000)
}
fn default_heartbeat_timeout_ms() -> u64 {
    30_000
}
fn default_standby() -> String {
    "standby".to_string()
}
fn default_chooser() -> String {
    "alphabetic".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl NodeConfig {
    /// Load and validate configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;

        let config: NodeConfig = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Write the configuration back, pretty-printed.
    pub fn save(&self, path: &Path) -> CliResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .map_err(|e| CliError::config_error(format!("Failed to write config: {}", e)))
    }

    fn validate(&self) -> CliResult<()> {
        if self.store_dir.trim().is_empty() {
            return Err(CliError::config_error("store_dir must not be empty"));
        }
        if let Some(node_id) = &self.node_id {
            if node_id.trim().is_empty() {
                return Err(CliError::config_error("node_id must not be empty"));
            }
        }

        let mode = self.start_mode()?;
        if mode == HighAvailabilityMode::HotStandby {
            return Err(CliError::config_error(
                "start_mode 'hot_standby' needs an embedded rebind engine; the CLI has none",
            ));
        }
        if self.default_standby()? == ManagementNodeState::HotStandby {
            return Err(CliError::config_error(
                "default_standby 'hot_standby' needs an embedded rebind engine; the CLI has none",
            ));
        }

        self.chooser()?;
        self.log_level()?;
        self.ha_config()?.validate()?;
        Ok(())
    }

    pub fn store_path(&self) -> PathBuf {
        PathBuf::from(&self.store_dir)
    }

    pub fn start_mode(&self) -> CliResult<HighAvailabilityMode> {
        Ok(HighAvailabilityMode::from_str(&self.start_mode)?)
    }

    pub fn default_standby(&self) -> CliResult<ManagementNodeState> {
        HighAvailabilityMode::from_str(&self.default_standby)?
            .standby_state()
            .ok_or_else(|| {
                CliError::config_error(format!(
                    "Invalid default_standby: '{}'. Must be a standby mode.",
                    self.default_standby
                ))
            })
    }

    pub fn chooser(&self) -> CliResult<Arc<dyn MasterChooser>> {
        match self.chooser.to_ascii_lowercase().as_str() {
            "alphabetic" => Ok(Arc::new(AlphabeticMasterChooser)),
            "priority" => Ok(Arc::new(PriorityMasterChooser)),
            other => Err(CliError::config_error(format!(
                "Invalid chooser: '{}'. Must be 'alphabetic' or 'priority'.",
                other
            ))),
        }
    }

    pub fn log_level(&self) -> CliResult<Severity> {
        Severity::from_str(&self.log_level).map_err(CliError::config_error)
    }

    pub fn ha_config(&self) -> CliResult<HaConfig> {
        Ok(HaConfig::new()
            .with_poll_period(self.poll_period_ms.map(Duration::from_millis))
            .with_heartbeat_timeout(Duration::from_millis(self.heartbeat_timeout_ms))
            .with_default_standby(self.default_standby()?))
    }

    /// Status server config, when a port is configured.
    pub fn http_config(&self) -> Option<HttpServerConfig> {
        let port = self.http_port?;
        let mut config = HttpServerConfig::default();
        config.port = port;
        if let Some(host) = &self.http_host {
            config.host = host.clone();
        }
        config.cors_origins = self.http_cors_origins.clone();
        Some(config)
    }

    fn require_node_id(&self) -> CliResult<&str> {
        self.node_id.as_deref().ok_or_else(CliError::not_initialized)
    }
}

/// Main CLI entry point
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Init { config } => init(&config),
        Command::Start { config, mode } => start(&config, mode.as_deref()),
        Command::Status { config } => status(&config),
    }
}

/// Assign a node id and create the store layout.
///
/// Fails when this node already has a record in the store.
pub fn init(config_path: &Path) -> CliResult<()> {
    let mut config = NodeConfig::load(config_path)?;

    let persister = FilePersister::open(&config.store_path())?;

    let node_id = match config.node_id.clone() {
        Some(node_id) => {
            let snapshot = persister.load_sync_record()?;
            if snapshot.node(&node_id).is_some() {
                return Err(CliError::already_initialized(&node_id));
            }
            node_id
        }
        None => {
            let node_id = Uuid::new_v4().to_string();
            config.node_id = Some(node_id.clone());
            config.save(config_path)?;
            node_id
        }
    };

    write_response(json!({
        "initialized": true,
        "node_id": node_id,
        "plane_dir": persister.plane_dir().display().to_string(),
    }))
}

/// Run the coordinator until Ctrl-C.
pub fn start(config_path: &Path, mode_override: Option<&str>) -> CliResult<()> {
    let config = NodeConfig::load(config_path)?;
    Logger::set_min_severity(config.log_level()?);

    let node_id = config.require_node_id()?.to_string();
    let mode = match mode_override {
        Some(mode) => HighAvailabilityMode::from_str(mode)?,
        None => config.start_mode()?,
    };
    if mode == HighAvailabilityMode::HotStandby {
        return Err(CliError::config_error(
            "mode 'hot_standby' needs an embedded rebind engine; the CLI has none",
        ));
    }

    let persister = Arc::new(FilePersister::open(&config.store_path())?);
    let mut coordinator = HaCoordinator::new(node_id.clone())
        .with_config(config.ha_config()?)
        .with_persister(persister.clone())
        .with_chooser(config.chooser()?);
    if let Some(priority) = config.priority {
        coordinator = coordinator.with_priority(priority);
    }
    if let Some(uri) = &config.node_uri {
        coordinator = coordinator.with_uri(uri.clone());
    }
    let coordinator = Arc::new(coordinator);

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to start runtime: {}", e)))?;

    {
        let _guard = runtime.enter();
        coordinator.start(mode)?;
    }

    write_response(json!({
        "started": true,
        "node_id": node_id,
        "mode": mode.mode_name(),
        "status": coordinator.get_node_state().state_name(),
    }))?;

    let http = config
        .http_config()
        .map(|http_config| HttpServer::new(http_config, Arc::clone(&coordinator)));

    let served = runtime.block_on(async move {
        let shutdown = async {
            let _ = tokio::signal::ctrl_c().await;
        };
        match http {
            Some(server) => server.serve(shutdown).await,
            None => {
                shutdown.await;
                Ok(())
            }
        }
    });

    coordinator.stop();
    persister.stop();

    served.map_err(|e| CliError::io_error(format!("Status server failed: {}", e)))?;
    write_response(json!({"stopped": true, "node_id": node_id}))
}

/// Print the plane read straight from the store, with lapsed nodes
/// shown as FAILED.
pub fn status(config_path: &Path) -> CliResult<()> {
    let config = NodeConfig::load(config_path)?;
    let persister = FilePersister::open(&config.store_path())?;

    let snapshot = persister.load_sync_record()?;
    let timeout = Duration::from_millis(config.heartbeat_timeout_ms);
    let view = infer_failed_nodes(&snapshot, timeout, SystemClock.now_millis());

    let history = persister.change_log_entries()?;
    let recent: Vec<_> = history
        .iter()
        .skip(history.len().saturating_sub(STATUS_HISTORY))
        .collect();

    write_response(json!({
        "node_id": config.node_id,
        "plane": view,
        "recent_changes": recent,
    }))
}
