//! Controller options
//!
//! Options come from an environment map, falling back to an optional YAML
//! options file and then to built-in defaults. Taking the map as a value
//! keeps parsing pure; `from_env` is the thin wrapper over the process
//! environment.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cluster::DEFAULT_ROUTER_NAME;
use crate::controller::RunnerConfig;
use crate::provisioner::ProvisionerConfig;

use super::OptionsError;

pub const ENV_ADDRESS_SPACE: &str = "ADDRESS_SPACE";
pub const ENV_ADDRESS_SPACE_PLAN: &str = "ADDRESS_SPACE_PLAN";
pub const ENV_RESYNC_INTERVAL: &str = "RESYNC_INTERVAL";
pub const ENV_CHECK_INTERVAL: &str = "CHECK_INTERVAL";
pub const ENV_ROUTER_NAME: &str = "ROUTER_NAME";
pub const ENV_MAX_SUBSCRIPTIONS_PER_BROKER: &str = "MAX_SUBSCRIPTIONS_PER_BROKER";
pub const ENV_POOLED_BROKER_CAPACITY: &str = "POOLED_BROKER_CAPACITY";
pub const ENV_ROUTER_CAPACITY: &str = "ROUTER_CAPACITY";

const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;
const DEFAULT_CHECK_INTERVAL_SECS: u64 = 30;

/// Default options file location: ~/.addrctl/config.yaml
pub fn default_options_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".addrctl")
        .join("config.yaml")
}

/// Expand a leading `~` in a user supplied path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

/// Contents of the YAML options file; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_space: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_space_plan: Option<String>,

    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resync_interval: Option<u64>,

    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_interval: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_subscriptions_per_broker: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pooled_broker_capacity: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_capacity: Option<f64>,
}

impl OptionsFile {
    pub fn from_yaml(content: &str) -> Result<Self, OptionsError> {
        serde_yaml::from_str(content).map_err(|e| OptionsError::Parse(e.to_string()))
    }
}

/// Load an options file; a missing file yields empty options
pub fn load_options_file(path: &Path) -> Result<OptionsFile, OptionsError> {
    if !path.exists() {
        return Ok(OptionsFile::default());
    }
    let content = std::fs::read_to_string(path)?;
    OptionsFile::from_yaml(&content)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerOptions {
    pub address_space: String,
    pub address_space_plan: String,
    pub resync_interval: Duration,
    pub check_interval: Duration,
    pub router_name: String,
    pub max_subscriptions_per_broker: u32,
    pub pooled_broker_capacity: f64,
    pub router_capacity: f64,
}

impl ControllerOptions {
    /// Build options from an environment map, falling back to `file`
    pub fn from_map(env: &HashMap<String, String>, file: &OptionsFile) -> Result<Self, OptionsError> {
        let address_space = required(env, ENV_ADDRESS_SPACE, file.address_space.as_ref())?;
        let address_space_plan =
            required(env, ENV_ADDRESS_SPACE_PLAN, file.address_space_plan.as_ref())?;

        let resync = parsed(env, ENV_RESYNC_INTERVAL, file.resync_interval)?
            .unwrap_or(DEFAULT_RESYNC_INTERVAL_SECS);
        let check = parsed(env, ENV_CHECK_INTERVAL, file.check_interval)?
            .unwrap_or(DEFAULT_CHECK_INTERVAL_SECS);
        positive(ENV_RESYNC_INTERVAL, resync as f64)?;
        positive(ENV_CHECK_INTERVAL, check as f64)?;

        let router_name = env
            .get(ENV_ROUTER_NAME)
            .cloned()
            .or_else(|| file.router_name.clone())
            .unwrap_or_else(|| DEFAULT_ROUTER_NAME.to_string());

        let defaults = ProvisionerConfig::default();
        let max_subscriptions_per_broker = parsed(
            env,
            ENV_MAX_SUBSCRIPTIONS_PER_BROKER,
            file.max_subscriptions_per_broker,
        )?
        .unwrap_or(defaults.max_subscriptions_per_broker);
        let pooled_broker_capacity =
            parsed(env, ENV_POOLED_BROKER_CAPACITY, file.pooled_broker_capacity)?
                .unwrap_or(defaults.pooled_broker_capacity);
        let router_capacity = parsed(env, ENV_ROUTER_CAPACITY, file.router_capacity)?
            .unwrap_or(defaults.router_capacity);
        positive(ENV_POOLED_BROKER_CAPACITY, pooled_broker_capacity)?;
        positive(ENV_ROUTER_CAPACITY, router_capacity)?;

        Ok(Self {
            address_space,
            address_space_plan,
            resync_interval: Duration::from_secs(resync),
            check_interval: Duration::from_secs(check),
            router_name,
            max_subscriptions_per_broker,
            pooled_broker_capacity,
            router_capacity,
        })
    }

    /// Build options from the process environment
    pub fn from_env(file: &OptionsFile) -> Result<Self, OptionsError> {
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::from_map(&env, file)
    }

    pub fn provisioner_config(&self) -> ProvisionerConfig {
        ProvisionerConfig {
            max_subscriptions_per_broker: self.max_subscriptions_per_broker,
            pooled_broker_capacity: self.pooled_broker_capacity,
            router_capacity: self.router_capacity,
            router_name: self.router_name.clone(),
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            check_interval_secs: self.check_interval.as_secs(),
            resync_interval_secs: self.resync_interval.as_secs(),
        }
    }
}

fn required(
    env: &HashMap<String, String>,
    key: &str,
    fallback: Option<&String>,
) -> Result<String, OptionsError> {
    env.get(key)
        .or(fallback)
        .filter(|v| !v.trim().is_empty())
        .cloned()
        .ok_or_else(|| OptionsError::Missing(key.to_string()))
}

fn parsed<T>(
    env: &HashMap<String, String>,
    key: &str,
    fallback: Option<T>,
) -> Result<Option<T>, OptionsError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env.get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| OptionsError::Invalid {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
        None => Ok(fallback),
    }
}

fn positive(key: &str, value: f64) -> Result<(), OptionsError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(OptionsError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            reason: "must be positive".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let options = ControllerOptions::from_map(
            &env(&[(ENV_ADDRESS_SPACE, "myspace"), (ENV_ADDRESS_SPACE_PLAN, "small")]),
            &OptionsFile::default(),
        )
        .unwrap();

        assert_eq!(options.resync_interval, Duration::from_secs(300));
        assert_eq!(options.check_interval, Duration::from_secs(30));
        assert_eq!(options.router_name, "qdrouterd");
        assert_eq!(options.max_subscriptions_per_broker, 10);
        assert_eq!(options.provisioner_config(), ProvisionerConfig::default());
    }

    #[test]
    fn test_missing_required() {
        let result = ControllerOptions::from_map(
            &env(&[(ENV_ADDRESS_SPACE, "myspace")]),
            &OptionsFile::default(),
        );
        assert!(matches!(result, Err(OptionsError::Missing(key)) if key == ENV_ADDRESS_SPACE_PLAN));
    }

    #[test]
    fn test_invalid_number() {
        let result = ControllerOptions::from_map(
            &env(&[
                (ENV_ADDRESS_SPACE, "myspace"),
                (ENV_ADDRESS_SPACE_PLAN, "small"),
                (ENV_CHECK_INTERVAL, "soon"),
            ]),
            &OptionsFile::default(),
        );
        assert!(matches!(result, Err(OptionsError::Invalid { .. })));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = ControllerOptions::from_map(
            &env(&[
                (ENV_ADDRESS_SPACE, "myspace"),
                (ENV_ADDRESS_SPACE_PLAN, "small"),
                (ENV_POOLED_BROKER_CAPACITY, "0"),
            ]),
            &OptionsFile::default(),
        );
        assert!(matches!(result, Err(OptionsError::Invalid { .. })));
    }

    #[test]
    fn test_env_wins_over_file() {
        let file = OptionsFile::from_yaml(
            r#"
addressSpace: fromfile
addressSpacePlan: unlimited
maxSubscriptionsPerBroker: 3
checkInterval: 5
"#,
        )
        .unwrap();
        let options = ControllerOptions::from_map(
            &env(&[(ENV_ADDRESS_SPACE, "fromenv"), (ENV_CHECK_INTERVAL, "7")]),
            &file,
        )
        .unwrap();

        assert_eq!(options.address_space, "fromenv");
        assert_eq!(options.address_space_plan, "unlimited");
        assert_eq!(options.max_subscriptions_per_broker, 3);
        assert_eq!(options.check_interval, Duration::from_secs(7));
    }

    #[test]
    fn test_load_options_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"routerName: my-router\nrouterCapacity: 2.5\n").unwrap();

        let loaded = load_options_file(file.path()).unwrap();
        assert_eq!(loaded.router_name.as_deref(), Some("my-router"));
        assert_eq!(loaded.router_capacity, Some(2.5));
    }

    #[test]
    fn test_missing_options_file_is_empty() {
        let loaded = load_options_file(Path::new("/nonexistent/addrctl.yaml")).unwrap();
        assert_eq!(loaded, OptionsFile::default());
    }

    #[test]
    fn test_expand_path() {
        let expanded = expand_path("~/x.yaml");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert_eq!(expand_path("/abs/x.yaml"), PathBuf::from("/abs/x.yaml"));
    }
}
