use crate::config::ConfigError;
use std::path::{Path, PathBuf};

/// Well-known filesystem locations: the system-wide config, the per-user
/// config directory, and the singleton lock file.
#[derive(Debug, Clone)]
pub struct Locations {
    system_config: PathBuf,
    user_dir: PathBuf,
}

impl Locations {
    /// Default content written to the user config when no config exists yet.
    const DEFAULT_CONFIG: &'static str = "\
# torguard configuration

[probe]
# Local SOCKS ports of the Tor proxy
socks_ports = [9050, 9150]
# Hosts to probe (localhost v4/v6)
check_hosts = [\"127.0.0.1\", \"::1\"]
# Exact process name looked up in the process table
process_name = \"tor\"

[monitor]
# Seconds to wait before each re-probe after a failure
grace_seconds = 8
# Re-probes that must all fail before the outage is confirmed
retries = 2
# Probe interval in seconds while healthy
check_interval = 3

[killswitch]
# Require an explicit YES before disabling networking (recommended)
require_confirm = true
# Interfaces that may be brought down; empty picks the first active one
interface_whitelist = []

[warning]
# Prefer a graphical warning dialog when a display is available
use_gui = true
# Optional image shown full-screen before the dialog
# red_image_path = \"~/red.png\"

[menu]
enabled = true

[logging]
file = \"/var/tmp/torguard.log\"
# status_file = \"/var/tmp/torguard.status\"
";

    /// System path `/etc/torguard.toml`, user dir from the platform config dir.
    pub fn discover() -> Self {
        let user_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("torguard");
        Self::new("/etc/torguard.toml", user_dir)
    }

    pub fn new(system_config: impl Into<PathBuf>, user_dir: impl Into<PathBuf>) -> Self {
        Self {
            system_config: system_config.into(),
            user_dir: user_dir.into(),
        }
    }

    pub fn system_config(&self) -> &Path {
        &self.system_config
    }

    /// Path to the per-user config file.
    pub fn user_config(&self) -> PathBuf {
        self.user_dir.join("torguard.toml")
    }

    /// Path to the singleton lock file.
    pub fn lock(&self) -> PathBuf {
        self.user_dir.join("torguard.lock")
    }

    /// Pick the config file to use.
    ///
    /// An explicit path must exist. Otherwise the system config wins if
    /// present, then the user config, which is created with commented
    /// defaults when neither exists.
    pub fn resolve_config(&self, explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::NotFound {
                    path: path.to_path_buf(),
                });
            }
            return Ok(path.to_path_buf());
        }

        if self.system_config.exists() {
            return Ok(self.system_config.clone());
        }

        let user_config = self.user_config();
        if !user_config.exists() {
            self.write_default_config(&user_config)
                .map_err(|e| ConfigError::Create {
                    path: user_config.clone(),
                    source: e,
                })?;
            tracing::info!(path = %user_config.display(), "created default config");
        }
        Ok(user_config)
    }

    fn write_default_config(&self, path: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.user_dir)?;
        std::fs::write(path, Self::DEFAULT_CONFIG)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths() {
        let loc = Locations::new("/etc/torguard.toml", "/home/u/.config/torguard");
        assert_eq!(loc.system_config(), Path::new("/etc/torguard.toml"));
        assert_eq!(
            loc.user_config(),
            PathBuf::from("/home/u/.config/torguard/torguard.toml")
        );
        assert_eq!(
            loc.lock(),
            PathBuf::from("/home/u/.config/torguard/torguard.lock")
        );
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let dir = tempdir().unwrap();
        let loc = Locations::new(dir.path().join("sys.toml"), dir.path().join("user"));
        let missing = dir.path().join("missing.toml");
        let err = loc.resolve_config(Some(&missing)).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));

        let present = dir.path().join("present.toml");
        std::fs::write(&present, "").unwrap();
        assert_eq!(loc.resolve_config(Some(&present)).unwrap(), present);
    }

    #[test]
    fn test_system_config_preferred() {
        let dir = tempdir().unwrap();
        let sys = dir.path().join("sys.toml");
        std::fs::write(&sys, "").unwrap();
        let loc = Locations::new(&sys, dir.path().join("user"));
        assert_eq!(loc.resolve_config(None).unwrap(), sys);
        assert!(!loc.user_config().exists());
    }

    #[test]
    fn test_user_config_created_with_defaults() {
        let dir = tempdir().unwrap();
        let loc = Locations::new(dir.path().join("sys.toml"), dir.path().join("user"));
        let path = loc.resolve_config(None).unwrap();
        assert_eq!(path, loc.user_config());

        let config = crate::config::load(&path).unwrap();
        assert_eq!(config.probe.socks_ports, vec![9050, 9150]);
        assert_eq!(config.monitor.retries, 2);
        assert!(config.killswitch.require_confirm);
    }

    #[test]
    fn test_existing_user_config_not_overwritten() {
        let dir = tempdir().unwrap();
        let loc = Locations::new(dir.path().join("sys.toml"), dir.path().join("user"));
        std::fs::create_dir_all(dir.path().join("user")).unwrap();
        std::fs::write(loc.user_config(), "[monitor]\nretries = 4\n").unwrap();

        let path = loc.resolve_config(None).unwrap();
        let contents = std::fs::read_to_string(path).unwrap();
        assert!(contents.contains("retries = 4"));
    }
}
