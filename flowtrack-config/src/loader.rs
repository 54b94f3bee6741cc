//! Layered configuration loading (§6), mirroring `ferrex-server`'s
//! `infra/config/loader.rs`: compiled-in defaults, overlaid by an optional
//! TOML file, overlaid by `FLOWTRACK_*` environment variables, overlaid by
//! CLI flags — later sources win.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigLoadError;
use crate::models::{CliOverrides, CollectorSettings, EnvConfig, FileConfig};

const DEFAULT_CONFIG_LOCATIONS: &[&str] = &["flowtrack.toml", "config/flowtrack.toml"];

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub settings: CollectorSettings,
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        self.load_with_overrides(CliOverrides::default())
    }

    pub fn load_with_overrides(
        &self,
        cli: CliOverrides,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = self.load_dotenv()?;
        let env = EnvConfig::gather();

        let (file, config_path) = self.load_file_config(&env)?;

        let settings = compose(file, env, cli);

        Ok(ConfigLoad {
            settings,
            config_path,
            env_file_loaded,
        })
    }

    fn load_dotenv(&self) -> Result<bool, ConfigLoadError> {
        let result = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path),
            None => dotenvy::dotenv().map(|_| ()),
        };
        match result {
            Ok(()) => Ok(true),
            Err(dotenvy::Error::Io(_)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(FileConfig, Option<PathBuf>), ConfigLoadError> {
        let explicit = self
            .options
            .config_path
            .clone()
            .or_else(|| env.config_path.clone().map(PathBuf::from));

        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((read_file_config(&path)?, Some(path)));
        }

        for candidate in DEFAULT_CONFIG_LOCATIONS {
            let path = PathBuf::from(candidate);
            if path.exists() {
                return Ok((read_file_config(&path)?, Some(path)));
            }
        }

        Ok((FileConfig::default(), None))
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn compose(file: FileConfig, env: EnvConfig, cli: CliOverrides) -> CollectorSettings {
    let defaults = CollectorSettings::default();

    CollectorSettings {
        network_cidr: cli
            .network_cidr
            .or(env.network_cidr)
            .or(file.network_cidr)
            .or(defaults.network_cidr),
        snapshot_interval: secs(
            cli.snapshot_interval_secs,
            env.snapshot_interval_secs,
            file.snapshot_interval_secs,
            defaults.snapshot_interval,
        ),
        cleanup_interval: secs(
            cli.cleanup_interval_secs,
            env.cleanup_interval_secs,
            file.cleanup_interval_secs,
            defaults.cleanup_interval,
        ),
        retention_days: cli
            .retention_days
            .or(env.retention_days)
            .or(file.retention_days)
            .unwrap_or(defaults.retention_days),
        store_connection_string: cli
            .store_connection_string
            .or(env.store_connection_string)
            .or(file.store_connection_string)
            .or(defaults.store_connection_string),
        event_channel_capacity: cli
            .event_channel_capacity
            .or(env.event_channel_capacity)
            .or(file.event_channel_capacity)
            .unwrap_or(defaults.event_channel_capacity),
        directory_refresh_interval: secs(
            cli.directory_refresh_interval_secs,
            env.directory_refresh_interval_secs,
            file.directory_refresh_interval_secs,
            defaults.directory_refresh_interval,
        ),
    }
}

fn secs(cli: Option<u64>, env: Option<u64>, file: Option<u64>, default: Duration) -> Duration {
    cli.or(env)
        .or(file)
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_when_nothing_set() {
        let loader = ConfigLoader::new();
        let load = loader
            .load_with_overrides(CliOverrides::default())
            .unwrap();
        assert_eq!(load.settings.retention_days, 7);
        assert!(load.settings.network_cidr.is_none());
    }

    #[test]
    fn file_values_overridden_by_cli() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flowtrack.toml");
        let mut handle = std::fs::File::create(&path).unwrap();
        writeln!(handle, "retention_days = 3").unwrap();
        writeln!(handle, "network_cidr = \"10.0.0.0/24\"").unwrap();

        let loader = ConfigLoader::new().with_config_path(&path);
        let cli = CliOverrides {
            retention_days: Some(30),
            ..Default::default()
        };
        let load = loader.load_with_overrides(cli).unwrap();

        assert_eq!(load.settings.retention_days, 30);
        assert_eq!(load.settings.network_cidr.as_deref(), Some("10.0.0.0/24"));
        assert_eq!(load.config_path, Some(path));
    }

    #[test]
    fn missing_explicit_config_path_is_an_error() {
        let loader = ConfigLoader::new().with_config_path("/nonexistent/flowtrack.toml");
        assert!(matches!(
            loader.load(),
            Err(ConfigLoadError::MissingConfig { .. })
        ));
    }
}
