// Engine configuration
// Fixed per process: nothing here can be overridden by a request

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_SETUP_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_MEMORY_MB: u64 = 256;
pub const DEFAULT_CPUS: f64 = 1.0;
pub const DEFAULT_PIDS_LIMIT: i64 = 128;
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Parent directory of every job workspace
    pub workspace_root: PathBuf,
    /// Wall-clock deadline for one sandboxed invocation
    pub timeout: Duration,
    /// Deadline for image pull, container creation and start
    pub setup_timeout: Duration,
    pub memory_mb: u64,
    pub cpus: f64,
    pub pids_limit: i64,
    /// Capture ceiling for each of stdout and stderr
    pub max_output_bytes: usize,
    /// Pull a language image when it is missing locally
    pub pull_images: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workspace_root: std::env::temp_dir().join("wecode-jobs"),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            setup_timeout: Duration::from_millis(DEFAULT_SETUP_TIMEOUT_MS),
            memory_mb: DEFAULT_MEMORY_MB,
            cpus: DEFAULT_CPUS,
            pids_limit: DEFAULT_PIDS_LIMIT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            pull_images: true,
        }
    }
}

impl EngineConfig {
    /// Load from `WECODE_*` environment variables, defaulting anything unset
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup (the environment in production)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let workspace_root = lookup("WECODE_WORKSPACE_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.workspace_root);
        let timeout_ms = parse_var(&lookup, "WECODE_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)?;
        let setup_timeout_ms =
            parse_var(&lookup, "WECODE_SETUP_TIMEOUT_MS", DEFAULT_SETUP_TIMEOUT_MS)?;
        let memory_mb = parse_var(&lookup, "WECODE_MEMORY_MB", DEFAULT_MEMORY_MB)?;
        let cpus = parse_var(&lookup, "WECODE_CPUS", DEFAULT_CPUS)?;
        let pids_limit = parse_var(&lookup, "WECODE_PIDS_LIMIT", DEFAULT_PIDS_LIMIT)?;
        let max_output_bytes =
            parse_var(&lookup, "WECODE_MAX_OUTPUT_BYTES", DEFAULT_MAX_OUTPUT_BYTES)?;
        let pull_images = parse_var(&lookup, "WECODE_PULL_IMAGES", true)?;

        if timeout_ms == 0 {
            anyhow::bail!("WECODE_TIMEOUT_MS must be greater than zero");
        }
        if setup_timeout_ms == 0 {
            anyhow::bail!("WECODE_SETUP_TIMEOUT_MS must be greater than zero");
        }
        if memory_mb == 0 {
            anyhow::bail!("WECODE_MEMORY_MB must be greater than zero");
        }
        if cpus.is_nan() || cpus <= 0.0 {
            anyhow::bail!("WECODE_CPUS must be greater than zero");
        }

        Ok(Self {
            workspace_root,
            timeout: Duration::from_millis(timeout_ms),
            setup_timeout: Duration::from_millis(setup_timeout_ms),
            memory_mb,
            cpus,
            pids_limit,
            max_output_bytes,
            pull_images,
        })
    }

    pub fn memory_bytes(&self) -> i64 {
        (self.memory_mb as i64) * 1024 * 1024
    }

    pub fn nano_cpus(&self) -> i64 {
        (self.cpus * 1_000_000_000.0) as i64
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = EngineConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.timeout, Duration::from_millis(DEFAULT_TIMEOUT_MS));
        assert_eq!(config.setup_timeout, Duration::from_millis(DEFAULT_SETUP_TIMEOUT_MS));
        assert_eq!(config.memory_mb, 256);
        assert_eq!(config.memory_bytes(), 256 * 1024 * 1024);
        assert_eq!(config.nano_cpus(), 1_000_000_000);
        assert!(config.pull_images);
    }

    #[test]
    fn test_overrides_from_lookup() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("WECODE_WORKSPACE_ROOT", "/srv/jobs"),
            ("WECODE_TIMEOUT_MS", "2500"),
            ("WECODE_SETUP_TIMEOUT_MS", "30000"),
            ("WECODE_CPUS", "0.5"),
            ("WECODE_PULL_IMAGES", "false"),
        ]))
        .unwrap();
        assert_eq!(config.workspace_root, PathBuf::from("/srv/jobs"));
        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert_eq!(config.setup_timeout, Duration::from_secs(30));
        assert_eq!(config.nano_cpus(), 500_000_000);
        assert!(!config.pull_images);
    }

    #[test]
    fn test_invalid_value_names_variable() {
        let err = EngineConfig::from_lookup(lookup_from(&[("WECODE_MEMORY_MB", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("WECODE_MEMORY_MB"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(EngineConfig::from_lookup(lookup_from(&[("WECODE_TIMEOUT_MS", "0")])).is_err());
        assert!(
            EngineConfig::from_lookup(lookup_from(&[("WECODE_SETUP_TIMEOUT_MS", "0")])).is_err()
        );
    }
}
