use crate::domain::config::{AtPortConfig, DeviceConfig, GlobalConfig, SessionConfig};
use crate::domain::error::{AtPortError, AtPortResult};
use std::fs;
use std::path::{Path, PathBuf};

const PROJECT_DIR: &str = ".atport";
const CONFIG_FILE: &str = "config.toml";

/// Configuration manager
pub struct ConfigManager {
    global_config_path: PathBuf,
    project_config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Create new configuration manager
    pub fn new() -> AtPortResult<Self> {
        let global_config_path = Self::get_global_config_path()?;
        let project_config_path = std::env::current_dir()
            .ok()
            .and_then(|dir| Self::find_project_config_path(&dir));

        Ok(Self {
            global_config_path,
            project_config_path,
        })
    }

    /// Manager rooted at explicit paths, without touching the environment
    pub fn with_paths(global_config_path: PathBuf, project_config_path: Option<PathBuf>) -> Self {
        Self {
            global_config_path,
            project_config_path,
        }
    }

    /// Load configuration from files
    pub fn load_config(&self) -> AtPortResult<AtPortConfig> {
        // Start with default configuration
        let mut config = AtPortConfig::default();

        // Global file contributes settings and devices
        if self.global_config_path.exists() {
            let global_config = self.load_config_from_path(&self.global_config_path)?;
            config.global = global_config.global;
            config.devices = global_config.devices;
        }

        // Project devices override global devices of the same name
        if let Some(project_path) = &self.project_config_path {
            if project_path.exists() {
                let project_config = self.load_config_from_path(project_path)?;
                for device in project_config.devices {
                    config.devices.retain(|existing| existing.name != device.name);
                    config.devices.push(device);
                }
            }
        }

        Ok(config)
    }

    /// Get global configuration path
    fn get_global_config_path() -> AtPortResult<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| AtPortError::Config {
            message: "Could not determine home directory".to_string(),
        })?;

        Ok(home.join(".config").join("atport").join(CONFIG_FILE))
    }

    /// Find project configuration path by walking up directory tree
    pub fn find_project_config_path(start: &Path) -> Option<PathBuf> {
        let mut path = start;

        loop {
            let config_path = path.join(PROJECT_DIR).join(CONFIG_FILE);
            if config_path.exists() {
                return Some(config_path);
            }

            path = path.parent()?;
        }
    }

    /// Load configuration from specific path and validate every device
    pub fn load_config_from_path(&self, path: &Path) -> AtPortResult<AtPortConfig> {
        let content = fs::read_to_string(path).map_err(|e| AtPortError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let config: AtPortConfig = toml::from_str(&content).map_err(|e| AtPortError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })?;

        for device in &config.devices {
            device.session.validate().map_err(|e| AtPortError::Config {
                message: format!("Device '{}' in {}: {}", device.name, path.display(), e),
            })?;
        }

        Ok(config)
    }

    /// Save configuration to specific path
    pub fn save_config_to_path(&self, path: &Path, config: &AtPortConfig) -> AtPortResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| AtPortError::Config {
                message: format!("Failed to create config directory: {}", e),
            })?;
        }

        let content = toml::to_string_pretty(config).map_err(|e| AtPortError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, content).map_err(|e| AtPortError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })
    }

    /// Create default project configuration under `path/.atport/`
    pub fn init_project_config(&self, path: &Path) -> AtPortResult<PathBuf> {
        let config_file = path.join(PROJECT_DIR).join(CONFIG_FILE);

        if config_file.exists() {
            return Err(AtPortError::Config {
                message: "Project configuration already exists".to_string(),
            });
        }

        let default_config = AtPortConfig {
            global: GlobalConfig::default(),
            devices: vec![DeviceConfig {
                name: "modem".to_string(),
                description: "Example AT modem".to_string(),
                port: "/dev/ttyACM0".to_string(),
                session: SessionConfig::default(),
            }],
        };

        self.save_config_to_path(&config_file, &default_config)?;

        Ok(config_file)
    }

    /// Get the current project config path (if any)
    pub fn get_project_config_path(&self) -> Option<&PathBuf> {
        self.project_config_path.as_ref()
    }

    /// Get the global config path
    pub fn get_global_config_path_ref(&self) -> &PathBuf {
        &self.global_config_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn isolated_manager(dir: &TempDir) -> ConfigManager {
        ConfigManager::with_paths(
            dir.path().join("global").join(CONFIG_FILE),
            Some(dir.path().join(PROJECT_DIR).join(CONFIG_FILE)),
        )
    }

    #[test]
    fn test_load_default_config() {
        let temp_dir = TempDir::new().unwrap();
        let manager = isolated_manager(&temp_dir);
        let config = manager.load_config().unwrap();

        assert_eq!(config.global.log_level, "info");
        assert_eq!(config.global.deadline_ms, 0);
        assert!(config.devices.is_empty());
    }

    #[test]
    fn test_init_project_config() {
        let temp_dir = TempDir::new().unwrap();
        let manager = isolated_manager(&temp_dir);

        let config_file = manager.init_project_config(temp_dir.path()).unwrap();
        assert!(config_file.exists());
        assert!(manager.init_project_config(temp_dir.path()).is_err());

        let config = manager.load_config().unwrap();
        assert_eq!(config.devices.len(), 1);
        assert_eq!(config.devices[0].session.baud_rate, 115_200);
    }

    #[test]
    fn test_project_devices_override_global() {
        let temp_dir = TempDir::new().unwrap();
        let manager = isolated_manager(&temp_dir);

        let device = |port: &str| DeviceConfig {
            name: "modem".to_string(),
            description: String::new(),
            port: port.to_string(),
            session: SessionConfig::default(),
        };

        let global = AtPortConfig {
            global: GlobalConfig { log_level: "debug".to_string(), deadline_ms: 5000 },
            devices: vec![device("/dev/ttyS0")],
        };
        manager.save_config_to_path(manager.get_global_config_path_ref(), &global).unwrap();

        let project = AtPortConfig { global: GlobalConfig::default(), devices: vec![device("/dev/ttyACM1")] };
        manager
            .save_config_to_path(manager.get_project_config_path().unwrap(), &project)
            .unwrap();

        let config = manager.load_config().unwrap();
        assert_eq!(config.global.log_level, "debug");
        assert_eq!(config.global.deadline_ms, 5000);
        assert_eq!(config.devices.len(), 1);
        assert_eq!(config.find_device("modem").unwrap().port, "/dev/ttyACM1");
    }

    #[test]
    fn test_invalid_device_rejected_on_load() {
        let temp_dir = TempDir::new().unwrap();
        let manager = isolated_manager(&temp_dir);
        let path = temp_dir.path().join("bad.toml");

        fs::write(
            &path,
            "[[devices]]\nname = \"bad\"\nport = \"/dev/null\"\n[devices.session]\nline_terminator = \"\"\n",
        )
        .unwrap();

        assert!(matches!(manager.load_config_from_path(&path), Err(AtPortError::Config { .. })));
    }

    #[test]
    fn test_find_project_config_walks_up() {
        let temp_dir = TempDir::new().unwrap();
        let manager = isolated_manager(&temp_dir);
        manager.init_project_config(temp_dir.path()).unwrap();

        let nested = temp_dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let found = ConfigManager::find_project_config_path(&nested).unwrap();
        assert_eq!(found, temp_dir.path().join(PROJECT_DIR).join(CONFIG_FILE));
    }
}
