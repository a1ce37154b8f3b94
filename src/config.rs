use crate::collectors::smart_cache::{DEFAULT_STORE_CAPACITY, DEFAULT_TTL_SECONDS};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub alerts: AlertConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Access methods to try, in order: "ioctl", "smartctl".
    pub methods: Vec<String>,
    /// smartctl binary, looked up on PATH when not absolute.
    pub smartctl_path: String,
    /// Upper bound on a single device command; expiry is reported as an I/O error.
    pub command_timeout_sec: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_seconds: u64,
    /// Number of devices kept in the persisted store.
    pub capacity: usize,
    /// Keep cached reads between invocations.
    pub persist: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Spare percentage to alert against instead of the drive's own threshold.
    pub spare_threshold_override: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// tracing filter directive, e.g. "warn" or "smartprobe=debug". None = warn.
    pub level: Option<String>,
    /// Append log output to this file instead of stderr.
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// "txt", "json" or "csv".
    pub default_format: String,
}

// ── Defaults ─────────────────────────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            methods:             vec!["ioctl".into(), "smartctl".into()],
            smartctl_path:       "smartctl".into(),
            command_timeout_sec: 10,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled:     true,
            ttl_seconds: DEFAULT_TTL_SECONDS,
            capacity:    DEFAULT_STORE_CAPACITY,
            persist:     true,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { default_format: "txt".into() }
    }
}

// ── Load / Save ───────────────────────────────────────────────────────

impl Config {
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None       => Config::default(),
        }
    }

    /// Load `path`, falling back to defaults. A missing file gets the
    /// defaults written to it (best-effort); a broken one is left alone.
    pub fn load_from(path: &Path) -> Self {
        match try_load(path) {
            Ok(c) => c,
            Err(e) => {
                if path.exists() {
                    tracing::warn!(path = %path.display(), error = %e, "config unreadable, using defaults");
                } else if let Err(e) = try_write_defaults(path) {
                    tracing::debug!(path = %path.display(), error = %e, "could not write default config");
                }
                Config::default()
            }
        }
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("smartprobe").join("smartprobe.toml"))
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn try_load(path: &Path) -> Result<Config> {
    let text = fs::read_to_string(path)?;
    let cfg: Config = toml::from_str(&text)?;
    Ok(cfg)
}

fn try_write_defaults(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let text = Config::default().to_toml()?;
    fs::write(path, format!("# smartprobe configuration\n# Generated on first run, edit freely\n\n{}", text))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_other_defaults() {
        let cfg: Config = toml::from_str(
            "[cache]\nttl_seconds = 60\n\n[alerts]\nspare_threshold_override = 20\n",
        ).unwrap();
        assert_eq!(cfg.cache.ttl_seconds, 60);
        assert!(cfg.cache.enabled);
        assert_eq!(cfg.cache.capacity, DEFAULT_STORE_CAPACITY);
        assert_eq!(cfg.alerts.spare_threshold_override, Some(20));
        assert_eq!(cfg.general.methods, vec!["ioctl", "smartctl"]);
    }

    #[test]
    fn defaults_round_trip_through_toml() {
        let text = Config::default().to_toml().unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back, Config::default());
    }

    #[test]
    fn missing_file_writes_defaults() {
        let dir = std::env::temp_dir().join(format!("smartprobe-cfg-{}", std::process::id()));
        let path = dir.join("smartprobe.toml");
        let _ = fs::remove_dir_all(&dir);

        assert_eq!(Config::load_from(&path), Config::default());
        assert!(path.exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn broken_file_is_not_overwritten() {
        let dir = std::env::temp_dir().join(format!("smartprobe-cfg-bad-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("smartprobe.toml");
        fs::write(&path, "[cache\nttl").unwrap();

        assert_eq!(Config::load_from(&path), Config::default());
        assert_eq!(fs::read_to_string(&path).unwrap(), "[cache\nttl");
        let _ = fs::remove_dir_all(&dir);
    }
}
