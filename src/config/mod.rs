use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use url::Url;

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "Mindspace";
const APP_NAME: &str = "mindspace";

const TOKEN_FILE_NAME: &str = "tokens.json";

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            let default_cfg = AppConfig::default();
            self.write_default_config(&default_cfg)?;
            return Ok(default_cfg);
        }
        self.load()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let cfg: AppConfig = toml::from_str(&raw).context("parsing config toml")?;
        Ok(cfg)
    }

    fn write_default_config(&self, cfg: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(cfg).context("serializing default config")?;
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = fs::File::create(&self.paths.config_file)
            .with_context(|| format!("creating config {}", self.paths.config_file.display()))?;
        file.write_all(toml.as_bytes())
            .context("writing default config")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub state_dir: PathBuf,
    pub token_file: PathBuf,
    pub drafts_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var("MINDSPACE_CONFIG").ok().map(PathBuf::from);
        let override_state = env::var("MINDSPACE_STATE").ok().map(PathBuf::from);

        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving XDG project directories")?;

        let config_dir = override_config
            .clone()
            .map(|p| {
                if p.is_dir() {
                    p
                } else {
                    p.parent().map(PathBuf::from).unwrap_or(p)
                }
            })
            .unwrap_or_else(|| project_dirs.config_dir().to_path_buf());

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("config.toml"));

        let state_dir = override_state.unwrap_or_else(|| {
            project_dirs
                .state_dir()
                .map(PathBuf::from)
                .unwrap_or_else(|| project_dirs.data_dir().join("state"))
        });

        Ok(Self {
            config_dir,
            config_file,
            token_file: state_dir.join(TOKEN_FILE_NAME),
            drafts_dir: state_dir.join("drafts"),
            log_dir: state_dir.join("logs"),
            state_dir,
        })
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            &self.config_dir,
            &self.state_dir,
            &self.drafts_dir,
            &self.log_dir,
        ] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiOptions,
    pub session: SessionOptions,
    pub auto_save: AutoSaveConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiOptions {
    /// Root of the Mindspace REST API. Endpoint paths are joined onto this,
    /// so it must end with a trailing slash.
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ApiOptions {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api/".to_string(),
            timeout_secs: 30,
        }
    }
}

impl ApiOptions {
    pub fn base_url(&self) -> Result<Url> {
        let mut raw = self.base_url.clone();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).with_context(|| format!("parsing api base url {raw}"))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Proactive silent-refresh period. The access token is re-minted on this
    /// schedule while a session is active, independent of actual expiry.
    pub refresh_interval_secs: u64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 4 * 60,
        }
    }
}

impl SessionOptions {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSaveConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
        }
    }
}

impl AutoSaveConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrips_through_toml() {
        let cfg = AppConfig::default();
        let toml = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml).expect("parse");
        assert_eq!(parsed.api.base_url, cfg.api.base_url);
        assert_eq!(
            parsed.session.refresh_interval_secs,
            cfg.session.refresh_interval_secs
        );
        assert_eq!(parsed.auto_save.interval_secs, cfg.auto_save.interval_secs);
    }

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let cfg: AppConfig = toml::from_str("[api]\nbase_url = \"https://notes.example/api\"\n")
            .expect("parse partial config");
        assert_eq!(cfg.api.base_url, "https://notes.example/api");
        assert!(cfg.auto_save.enabled);
        assert_eq!(cfg.session.refresh_interval_secs, 240);
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let options = ApiOptions {
            base_url: "https://notes.example/api".to_string(),
            timeout_secs: 5,
        };
        let url = options.base_url().expect("valid url");
        assert_eq!(url.as_str(), "https://notes.example/api/");
    }
}
