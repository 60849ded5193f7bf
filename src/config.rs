use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_vote_api_url")]
    pub vote_url: String,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_origin")]
    pub origin: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_notify_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_min_summary_interval_secs")]
    pub min_summary_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    #[serde(default = "default_push_mode")]
    pub mode: PushMode,
    #[serde(default = "default_push_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_push_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PushMode {
    Stdout,
    WebPush,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub vote_url: Option<String>,
    pub catalog_path: Option<String>,
    pub db_path: Option<String>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config/vote-sentinel/config.toml")
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        let parsed: Self = toml::from_str(&data)
            .with_context(|| format!("failed parsing TOML config: {}", path.display()))?;
        Ok(parsed)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(vote_url) = overrides.vote_url {
            self.api.vote_url = vote_url;
        }
        if let Some(catalog_path) = overrides.catalog_path {
            self.catalog.path = catalog_path;
        }
        if let Some(db_path) = overrides.db_path {
            self.storage.db_path = db_path;
        }
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating config directory: {}", parent.display())
            })?;
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    pub fn resolved_catalog_path(&self) -> PathBuf {
        expand_tilde(&self.catalog.path)
    }

    pub fn default_template() -> String {
        let template = r#"[api]
vote_url = "https://api.weyoung.vn/vote-token.htm"
timeout_secs = 12
origin = "https://weyoung.vn"

[catalog]
path = "~/.local/share/vote-sentinel/nominees.json"

[storage]
db_path = "~/.local/share/vote-sentinel/votes.db"

[poll]
interval_secs = 10

[notify]
interval_secs = 10
min_summary_interval_secs = 900

[push]
mode = "stdout"
ttl_secs = 60
timeout_secs = 10

[server]
host = "127.0.0.1"
port = 3000
cors_origins = []
"#;
        template.to_string()
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            vote_url: default_vote_api_url(),
            timeout_secs: default_http_timeout_secs(),
            origin: default_origin(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_notify_interval_secs(),
            min_summary_interval_secs: default_min_summary_interval_secs(),
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            mode: default_push_mode(),
            ttl_secs: default_push_ttl_secs(),
            timeout_secs: default_push_timeout_secs(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_vote_api_url() -> String {
    "https://api.weyoung.vn/vote-token.htm".to_string()
}

fn default_http_timeout_secs() -> u64 {
    12
}

fn default_origin() -> String {
    "https://weyoung.vn".to_string()
}

fn default_catalog_path() -> String {
    "~/.local/share/vote-sentinel/nominees.json".to_string()
}

fn default_db_path() -> String {
    "~/.local/share/vote-sentinel/votes.db".to_string()
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_notify_interval_secs() -> u64 {
    10
}

fn default_min_summary_interval_secs() -> u64 {
    crate::store::subscriptions::MIN_SUMMARY_INTERVAL_SECS
}

fn default_push_mode() -> PushMode {
    PushMode::Stdout
}

fn default_push_ttl_secs() -> u64 {
    60
}

fn default_push_timeout_secs() -> u64 {
    10
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    3000
}
