//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Shared primitives and utilities for the maintenance agent."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;
use crate::types::ArCause;

fn default_hostname() -> String {
    "controller-0".to_owned()
}

fn default_tmp_dir() -> PathBuf {
    PathBuf::from("target/mtce-run")
}

fn default_max_hosts() -> usize {
    512
}

fn default_max_queued_actions() -> usize {
    2
}

fn default_dispatch_tick() -> Duration {
    Duration::from_millis(100)
}

fn default_storage_monitor_quorum() -> usize {
    2
}

fn default_pulse_period() -> Duration {
    Duration::from_millis(100)
}

fn default_minor_threshold() -> u32 {
    4
}

fn default_degrade_threshold() -> u32 {
    6
}

fn default_failure_threshold() -> u32 {
    10
}

fn default_pulses_required_for_recovery() -> u32 {
    10
}

fn default_pmond_missing_threshold() -> u32 {
    30
}

fn default_throttle_first() -> u32 {
    3
}

fn default_throttle_every() -> u32 {
    500
}

fn default_mnfa_threshold_number() -> usize {
    2
}

fn default_mnfa_threshold_percent() -> u32 {
    10
}

fn default_ar_threshold() -> u32 {
    2
}

fn default_ar_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_ar_heartbeat_interval() -> Duration {
    Duration::from_secs(600)
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9899))
}

/// Primary configuration object for the maintenance agent.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MtceConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub mnfa: MnfaConfig,
    #[serde(default)]
    pub auto_recovery: AutoRecoveryConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`MtceConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedMtceConfig {
    pub config: MtceConfig,
    pub source: PathBuf,
}

impl MtceConfig {
    pub const ENV_CONFIG_PATH: &str = "MTCE_CONFIG";

    /// Load configuration from disk, respecting the `MTCE_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedMtceConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedMtceConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedMtceConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<MtceConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.agent.hostname.trim().is_empty() {
            return Err(anyhow!("agent.hostname must not be empty"));
        }
        if self.agent.max_queued_actions == 0 {
            return Err(anyhow!("agent.max_queued_actions must be at least 1"));
        }
        if self.agent.max_hosts == 0 {
            return Err(anyhow!("agent.max_hosts must be at least 1"));
        }
        self.heartbeat.validate()?;
        self.mnfa.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for MtceConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: MtceConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Deployment shape of the cluster.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SystemType {
    /// Dedicated controller, worker, and storage hosts.
    #[default]
    Standard,
    /// Controllers also carry the worker subfunction.
    AllInOne,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hostname of the controller this agent runs on.
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default)]
    pub system_type: SystemType,
    /// Directory holding small state files that must survive a restart.
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,
    #[serde(default = "default_max_hosts")]
    pub max_hosts: usize,
    #[serde(default = "default_max_queued_actions")]
    pub max_queued_actions: usize,
    #[serde(default = "default_dispatch_tick")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub dispatch_tick: Duration,
    /// Minimum number of enabled storage monitors that must remain after a lock.
    #[serde(default = "default_storage_monitor_quorum")]
    pub storage_monitor_quorum: usize,
    /// Start in dead-office-recovery mode.
    #[serde(default)]
    pub dor_mode: bool,
    /// Optional customer log journal.
    #[serde(default)]
    pub journal: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            system_type: SystemType::default(),
            tmp_dir: default_tmp_dir(),
            max_hosts: default_max_hosts(),
            max_queued_actions: default_max_queued_actions(),
            dispatch_tick: default_dispatch_tick(),
            storage_monitor_quorum: default_storage_monitor_quorum(),
            dor_mode: false,
            journal: None,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "default_pulse_period")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub period: Duration,
    #[serde(default = "default_minor_threshold")]
    pub minor_threshold: u32,
    #[serde(default = "default_degrade_threshold")]
    pub degrade_threshold: u32,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Back-to-back pulses needed before a declared failure clears.
    #[serde(default = "default_pulses_required_for_recovery")]
    pub pulses_required_for_recovery: u32,
    /// Consecutive periods without the pmond flag before degrading.
    #[serde(default = "default_pmond_missing_threshold")]
    pub pmond_missing_threshold: u32,
    /// Debug option: never fail a host for cluster-host network loss.
    #[serde(default)]
    pub clstr_degrade_only: bool,
    #[serde(default)]
    pub monitor_pxeboot: bool,
    #[serde(default = "default_throttle_first")]
    pub warn_throttle_first: u32,
    #[serde(default = "default_throttle_every")]
    pub warn_throttle_every: u32,
}

impl HeartbeatConfig {
    pub fn validate(&self) -> Result<()> {
        if self.period.is_zero() {
            return Err(anyhow!("heartbeat.period must be non-zero"));
        }
        if self.minor_threshold == 0 {
            return Err(anyhow!("heartbeat.minor_threshold must be non-zero"));
        }
        if self.minor_threshold >= self.degrade_threshold {
            return Err(anyhow!(
                "heartbeat.minor_threshold ({}) must be below degrade_threshold ({})",
                self.minor_threshold,
                self.degrade_threshold
            ));
        }
        if self.degrade_threshold > self.failure_threshold {
            return Err(anyhow!(
                "heartbeat.degrade_threshold ({}) must not exceed failure_threshold ({})",
                self.degrade_threshold,
                self.failure_threshold
            ));
        }
        if self.pulses_required_for_recovery == 0 {
            return Err(anyhow!(
                "heartbeat.pulses_required_for_recovery must be non-zero"
            ));
        }
        Ok(())
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            period: default_pulse_period(),
            minor_threshold: default_minor_threshold(),
            degrade_threshold: default_degrade_threshold(),
            failure_threshold: default_failure_threshold(),
            pulses_required_for_recovery: default_pulses_required_for_recovery(),
            pmond_missing_threshold: default_pmond_missing_threshold(),
            clstr_degrade_only: false,
            monitor_pxeboot: false,
            warn_throttle_first: default_throttle_first(),
            warn_throttle_every: default_throttle_every(),
        }
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MnfaThresholdType {
    #[default]
    Number,
    Percent,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MnfaConfig {
    #[serde(default)]
    pub threshold_type: MnfaThresholdType,
    #[serde(default = "default_mnfa_threshold_number")]
    pub threshold_number: usize,
    #[serde(default = "default_mnfa_threshold_percent")]
    pub threshold_percent: u32,
    /// Zero disables the timeout.
    #[serde(default)]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
}

impl MnfaConfig {
    pub fn validate(&self) -> Result<()> {
        if self.threshold_number < 2 {
            return Err(anyhow!("mnfa.threshold_number must be at least 2"));
        }
        if self.threshold_percent == 0 || self.threshold_percent > 100 {
            return Err(anyhow!("mnfa.threshold_percent must be within 1..=100"));
        }
        Ok(())
    }

    /// Entry threshold for the current number of enabled hosts.
    pub fn threshold(&self, enabled_hosts: usize) -> usize {
        match self.threshold_type {
            MnfaThresholdType::Number => self.threshold_number,
            MnfaThresholdType::Percent => {
                let computed = enabled_hosts * self.threshold_percent as usize / 100;
                computed.max(2)
            }
        }
    }
}

impl Default for MnfaConfig {
    fn default() -> Self {
        Self {
            threshold_type: MnfaThresholdType::Number,
            threshold_number: default_mnfa_threshold_number(),
            threshold_percent: default_mnfa_threshold_percent(),
            timeout: Duration::ZERO,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ArCauseConfig {
    #[serde(default = "default_ar_threshold")]
    pub threshold: u32,
    #[serde(default = "default_ar_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub interval: Duration,
}

impl Default for ArCauseConfig {
    fn default() -> Self {
        Self {
            threshold: default_ar_threshold(),
            interval: default_ar_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoRecoveryConfig {
    #[serde(default)]
    pub config: ArCauseConfig,
    #[serde(default)]
    pub goenable: ArCauseConfig,
    #[serde(default)]
    pub host_services: ArCauseConfig,
    #[serde(default = "heartbeat_cause_default")]
    pub heartbeat: ArCauseConfig,
}

fn heartbeat_cause_default() -> ArCauseConfig {
    ArCauseConfig {
        threshold: default_ar_threshold(),
        interval: default_ar_heartbeat_interval(),
    }
}

impl AutoRecoveryConfig {
    pub fn cause(&self, cause: ArCause) -> &ArCauseConfig {
        match cause {
            ArCause::Config => &self.config,
            ArCause::GoEnable => &self.goenable,
            ArCause::HostServices => &self.host_services,
            ArCause::Heartbeat => &self.heartbeat,
        }
    }

    /// Task text shown once retries for `cause` are exhausted.
    pub fn banner(&self, cause: ArCause) -> &'static str {
        match cause {
            ArCause::Config => "Configuration failure, threshold reached, Lock/Unlock to retry",
            ArCause::GoEnable => "In-Test failure, threshold reached, Lock/Unlock to retry",
            ArCause::HostServices => "Service failure, threshold reached, Lock/Unlock to retry",
            ArCause::Heartbeat => "Heartbeat loss, threshold reached, Lock/Unlock to retry",
        }
    }
}

impl Default for AutoRecoveryConfig {
    fn default() -> Self {
        Self {
            config: ArCauseConfig::default(),
            goenable: ArCauseConfig::default(),
            host_services: ArCauseConfig::default(),
            heartbeat: heartbeat_cause_default(),
        }
    }
}

/// Handler timeouts and audit periods.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    #[serde_as(as = "DurationSeconds<u64>")]
    pub mtcalive: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub goenabled: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub host_services: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub heartbeat_soak: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub disable_services: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub command_ack: Duration,
    pub reboot_retries: u32,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub swact: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub reinstall: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub reinstall_msg_display: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub power_action: Duration,
    pub power_retries: u32,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub bmc_action: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub powercycle_cooloff: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub powercycle_holdoff: Duration,
    pub powercycle_max_attempts: u32,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub recovery_retry: Duration,
    /// Uptime below which a host is considered to have rebooted during recovery.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub recovery_uptime_threshold: Duration,
    pub recovery_retries: u32,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub offline_period: Duration,
    pub offline_threshold: u32,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub online_audit: Duration,
    pub online_threshold: u32,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub insv_test: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub oos_test: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub config: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub delete_wait: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub dor_mode: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub dor_extension: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub audit: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            mtcalive: Duration::from_secs(600),
            goenabled: Duration::from_secs(300),
            host_services: Duration::from_secs(120),
            heartbeat_soak: Duration::from_secs(11),
            disable_services: Duration::from_secs(60),
            command_ack: Duration::from_secs(10),
            reboot_retries: 3,
            swact: Duration::from_secs(120),
            reinstall: Duration::from_secs(2400),
            reinstall_msg_display: Duration::from_secs(5),
            power_action: Duration::from_secs(60),
            power_retries: 3,
            bmc_action: Duration::from_secs(30),
            powercycle_cooloff: Duration::from_secs(60),
            powercycle_holdoff: Duration::from_secs(300),
            powercycle_max_attempts: 3,
            recovery_retry: Duration::from_secs(10),
            recovery_uptime_threshold: Duration::from_secs(600),
            recovery_retries: 3,
            offline_period: Duration::from_millis(100),
            offline_threshold: 46,
            online_audit: Duration::from_secs(1),
            online_threshold: 3,
            insv_test: Duration::from_secs(10),
            oos_test: Duration::from_secs(30),
            config: Duration::from_secs(120),
            delete_wait: Duration::from_secs(5),
            dor_mode: Duration::from_secs(1200),
            dor_extension: Duration::from_secs(600),
            audit: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen: default_metrics_listen(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: MtceConfig = "".parse().unwrap();
        assert_eq!(config.heartbeat.minor_threshold, 4);
        assert_eq!(config.heartbeat.degrade_threshold, 6);
        assert_eq!(config.heartbeat.failure_threshold, 10);
        assert_eq!(config.mnfa.threshold_number, 2);
        assert_eq!(config.agent.max_queued_actions, 2);
        assert_eq!(config.auto_recovery.heartbeat.interval, Duration::from_secs(600));
    }

    #[test]
    fn misordered_thresholds_are_rejected() {
        let err = r#"
            [heartbeat]
            minor_threshold = 8
            degrade_threshold = 6
        "#
        .parse::<MtceConfig>()
        .unwrap_err();
        assert!(err.to_string().contains("minor_threshold"));
    }

    #[test]
    fn percent_threshold_never_drops_below_two() {
        let mnfa = MnfaConfig {
            threshold_type: MnfaThresholdType::Percent,
            threshold_percent: 10,
            ..MnfaConfig::default()
        };
        assert_eq!(mnfa.threshold(5), 2);
        assert_eq!(mnfa.threshold(100), 10);
    }

    #[test]
    fn overrides_are_parsed() {
        let config: MtceConfig = r#"
            [agent]
            hostname = "controller-1"
            system_type = "all-in-one"

            [heartbeat]
            period = 250
            failure_threshold = 12

            [mnfa]
            threshold_type = "percent"
            timeout = 30

            [auto_recovery.goenable]
            threshold = 5
        "#
        .parse()
        .unwrap();
        assert_eq!(config.agent.hostname, "controller-1");
        assert_eq!(config.agent.system_type, SystemType::AllInOne);
        assert_eq!(config.heartbeat.period, Duration::from_millis(250));
        assert_eq!(config.heartbeat.failure_threshold, 12);
        assert_eq!(config.mnfa.timeout, Duration::from_secs(30));
        assert_eq!(config.auto_recovery.cause(ArCause::GoEnable).threshold, 5);
    }
}
