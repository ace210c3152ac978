use std::path::Path;

use {
    anyhow::{Context, Result},
    serde::Deserialize,
};

/// Gateway configuration, loaded from a TOML file with per-field defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CharlaConfig {
    /// Address the HTTP server binds to.
    pub bind: String,
    /// Port the HTTP server listens on.
    pub port: u16,
    /// Path to the sqlite session database.
    pub database_path: String,
    /// WebSocket endpoint of the transport bridge sidecar.
    pub bridge_url: String,
    /// Quiet period before a buffered conversation is dispatched, in seconds.
    pub quiet_period_secs: u64,
}

impl Default for CharlaConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8321,
            database_path: "charla.db".into(),
            bridge_url: "ws://127.0.0.1:8766".into(),
            quiet_period_secs: 7,
        }
    }
}

impl CharlaConfig {
    /// Load from `path`. A missing file yields the defaults; a malformed
    /// file is an error rather than a silent fallback.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config at {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parse config at {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = CharlaConfig::load(Path::new("/nonexistent/charla.toml")).unwrap();
        assert_eq!(config.port, 8321);
        assert_eq!(config.quiet_period_secs, 7);
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("charla.toml");
        std::fs::write(&path, "port = 9000\nbridge_url = \"ws://bridge:1234\"\n").unwrap();

        let config = CharlaConfig::load(&path).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.bridge_url, "ws://bridge:1234");
        assert_eq!(config.bind, "127.0.0.1");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("charla.toml");
        std::fs::write(&path, "prot = 9000\n").unwrap();

        assert!(CharlaConfig::load(&path).is_err());
    }
}
