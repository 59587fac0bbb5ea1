//! Process configuration (§A.3): a TOML file loaded with `serde` + `toml`,
//! mirroring the teacher's `ConfigFile::from_file`/`write_to_path` shape,
//! with a handful of settings overridable by environment variable.

use serde::{Deserialize, Serialize};
use std::{net::Ipv4Addr, path::Path};

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "kebab-case")]
pub struct ConfigFile {
    /// Address the HTTP/WebSocket listener binds to.
    pub listen_addr: String,

    /// Path to the SQLite database file.
    pub database_path: String,

    /// Resolvers handed to the synthesizer for jump-peer DNS payloads (§4.4).
    #[serde(default)]
    pub upstream_resolvers: Vec<Ipv4Addr>,

    /// Per-network detector thresholds default (§4.7); left unset, the core's
    /// `DetectorThresholds::default()` applies.
    #[serde(default)]
    pub detector_thresholds: Option<DetectorThresholdsConfig>,
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "kebab-case")]
pub struct DetectorThresholdsConfig {
    pub shared_config_window_secs: u64,
    pub session_conflict_threshold_secs: u64,
    pub max_endpoint_changes_per_day: u32,
}

impl ConfigFile {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config file {}: {e}", path.display()))?;
        let mut config: Self = toml::from_str(&text)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn write_to_path<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("MESH_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        if let Ok(path) = std::env::var("MESH_DATABASE_PATH") {
            self.database_path = path;
        }
    }
}
