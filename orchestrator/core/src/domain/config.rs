// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Coordinator Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) for a taskmesh
// coordinator process:
// - Orchestration bounds (parallelism, retries, backoff base)
// - Agent lease and heartbeat timings
// - Deadlock chain depth and blocked-task timeouts
// - Conflict resolution retry budget
// - Resilient persistence retry/circuit-breaker policy
// - Logging

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "taskmesh.dev/v1";
pub const KIND: &str = "CoordinatorConfig";

/// Top-level configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfigManifest {
    /// API version (must be "taskmesh.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "CoordinatorConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: CoordinatorConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable coordinator name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinatorConfigSpec {
    #[serde(default)]
    pub orchestration: OrchestrationConfig,

    #[serde(default)]
    pub coordination: CoordinationConfig,

    #[serde(default)]
    pub deadlock: DeadlockConfig,

    #[serde(default)]
    pub conflict: ConflictConfig,

    #[serde(default)]
    pub resilience: ResilienceConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Upper bound on concurrently executing tasks
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Executor retries per task before it is marked BLOCKED
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base unit for `2^attempt` backoff between executor retries
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    /// Assignee used when no agent coordinator is wired in
    #[serde(default = "default_executor_id")]
    pub executor_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationConfig {
    #[serde(default = "default_lease_duration")]
    pub lease_duration_secs: u64,

    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlockConfig {
    #[serde(default = "default_max_chain_depth")]
    pub max_chain_depth: usize,

    /// Blocked longer than this is a timeout violation
    #[serde(default = "default_max_block_duration")]
    pub max_block_duration_secs: u64,

    /// Blocked longer than this is flagged for escalation
    #[serde(default = "default_escalation_threshold")]
    pub escalation_threshold_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictConfig {
    #[serde(default = "default_conflict_retries")]
    pub max_retries: u32,

    #[serde(default = "default_conflict_backoff")]
    pub base_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Consecutive failures before the persistence breaker opens
    #[serde(default = "default_breaker_threshold")]
    pub breaker_failure_threshold: u32,

    #[serde(default = "default_breaker_reset")]
    pub breaker_reset_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_max_parallel() -> usize {
    4
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay() -> u64 {
    1000
}

fn default_executor_id() -> String {
    "orchestrator".to_string()
}

fn default_lease_duration() -> u64 {
    3600
}

fn default_heartbeat_timeout() -> u64 {
    300
}

fn default_max_chain_depth() -> usize {
    10
}

fn default_max_block_duration() -> u64 {
    3600
}

fn default_escalation_threshold() -> u64 {
    1800
}

fn default_conflict_retries() -> u32 {
    3
}

fn default_conflict_backoff() -> u64 {
    100
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> u64 {
    100
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay() -> u64 {
    5000
}

fn default_breaker_threshold() -> u32 {
    5
}

fn default_breaker_reset() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay(),
            executor_id: default_executor_id(),
        }
    }
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            lease_duration_secs: default_lease_duration(),
            heartbeat_timeout_secs: default_heartbeat_timeout(),
        }
    }
}

impl Default for DeadlockConfig {
    fn default() -> Self {
        Self {
            max_chain_depth: default_max_chain_depth(),
            max_block_duration_secs: default_max_block_duration(),
            escalation_threshold_secs: default_escalation_threshold(),
        }
    }
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            max_retries: default_conflict_retries(),
            base_backoff_ms: default_conflict_backoff(),
        }
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay(),
            breaker_failure_threshold: default_breaker_threshold(),
            breaker_reset_timeout_secs: default_breaker_reset(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for CoordinatorConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "default".to_string(),
                labels: None,
            },
            spec: CoordinatorConfigSpec::default(),
        }
    }
}

impl OrchestrationConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

impl CoordinationConfig {
    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

impl DeadlockConfig {
    pub fn max_block_duration(&self) -> Duration {
        Duration::from_secs(self.max_block_duration_secs)
    }

    pub fn escalation_threshold(&self) -> Duration {
        Duration::from_secs(self.escalation_threshold_secs)
    }
}

impl ConflictConfig {
    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }
}

impl CoordinatorConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. TASKMESH_CONFIG_PATH environment variable
    /// 2. ./taskmesh-config.yaml (working directory)
    /// 3. ~/.taskmesh/config.yaml (user home)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("TASKMESH_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./taskmesh-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".taskmesh").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        None
    }

    /// Load from an explicit path (failing if it is unreadable), otherwise
    /// from the discovered path, otherwise defaults. Env overrides apply last.
    pub fn load_or_default(explicit_path: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = explicit_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("TASKMESH_MAX_PARALLEL") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => {
                    tracing::info!("Environment override: TASKMESH_MAX_PARALLEL={}", n);
                    self.spec.orchestration.max_parallel = n;
                }
                _ => tracing::warn!(
                    "Invalid value for TASKMESH_MAX_PARALLEL: '{}'. Expected a positive integer. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("TASKMESH_MAX_RETRIES") {
            match val.parse::<u32>() {
                Ok(n) => {
                    tracing::info!("Environment override: TASKMESH_MAX_RETRIES={}", n);
                    self.spec.orchestration.max_retries = n;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for TASKMESH_MAX_RETRIES: '{}'. Expected an integer. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("TASKMESH_LOG_LEVEL") {
            match val.to_lowercase().as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => {
                    self.spec.logging.level = val.to_lowercase();
                }
                _ => tracing::warn!("Invalid value for TASKMESH_LOG_LEVEL: '{}'. Ignoring.", val),
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let spec = &self.spec;
        if spec.orchestration.max_parallel == 0 {
            anyhow::bail!("spec.orchestration.max_parallel must be at least 1");
        }

        if spec.orchestration.executor_id.trim().is_empty() {
            anyhow::bail!("spec.orchestration.executor_id cannot be empty");
        }

        if spec.deadlock.escalation_threshold_secs > spec.deadlock.max_block_duration_secs {
            anyhow::bail!(
                "spec.deadlock.escalation_threshold_secs ({}) exceeds max_block_duration_secs ({})",
                spec.deadlock.escalation_threshold_secs,
                spec.deadlock.max_block_duration_secs
            );
        }

        if spec.resilience.max_attempts == 0 {
            anyhow::bail!("spec.resilience.max_attempts must be at least 1");
        }

        if spec.resilience.multiplier < 1.0 {
            anyhow::bail!("spec.resilience.multiplier must be >= 1.0");
        }

        if !matches!(spec.logging.format.as_str(), "json" | "text") {
            anyhow::bail!("spec.logging.format must be 'json' or 'text'");
        }

        Ok(())
    }
}
