use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Logical bucket name, used as the URL namespace for public links.
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Managed prefix inside the bucket; reconciliation scans under it.
    #[serde(default = "default_base_path")]
    pub base_path: String,
    /// Root directory for the local object store provider.
    #[serde(default = "default_local_path")]
    pub local_path: String,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_allowed_mime")]
    pub allowed_mime: Vec<String>,
    #[serde(default = "default_thumbnail_width")]
    pub thumbnail_width: u32,
    #[serde(default = "default_thumbnail_height")]
    pub thumbnail_height: u32,
    /// Objects younger than this are never reported as orphans.
    #[serde(default = "default_orphan_grace_minutes")]
    pub orphan_grace_minutes: i64,
    /// Upper bound on objects examined in one reconciliation sweep.
    #[serde(default = "default_list_safety_limit")]
    pub list_safety_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_upload_limit")]
    pub upload_limit: u32,
    #[serde(default = "default_upload_window_secs")]
    pub upload_window_secs: u64,
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    1420
}

fn default_db_path() -> String {
    "data/pictor.db".to_string()
}

fn default_bucket() -> String {
    "gallery".to_string()
}

fn default_base_path() -> String {
    "gallery".to_string()
}

fn default_local_path() -> String {
    "data/objects".to_string()
}

fn default_max_file_size() -> u64 {
    20 * 1024 * 1024 // 20 MiB
}

fn default_allowed_mime() -> Vec<String> {
    [
        "image/jpeg",
        "image/png",
        "image/webp",
        "image/gif",
        "image/svg+xml",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_thumbnail_width() -> u32 {
    320
}

fn default_thumbnail_height() -> u32 {
    240
}

fn default_orphan_grace_minutes() -> i64 {
    5
}

fn default_list_safety_limit() -> usize {
    10_000
}

fn default_upload_limit() -> u32 {
    30
}

fn default_upload_window_secs() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            base_path: default_base_path(),
            local_path: default_local_path(),
            max_file_size: default_max_file_size(),
            allowed_mime: default_allowed_mime(),
            thumbnail_width: default_thumbnail_width(),
            thumbnail_height: default_thumbnail_height(),
            orphan_grace_minutes: default_orphan_grace_minutes(),
            list_safety_limit: default_list_safety_limit(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            upload_limit: default_upload_limit(),
            upload_window_secs: default_upload_window_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            storage: StorageConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides();
        config.ensure_directories()?;
        Ok(config)
    }

    /// Load configuration from conf.ini or config.toml
    fn load_from_file() -> anyhow::Result<Self> {
        let config_paths = ["conf.ini", "config.toml", "data/conf.ini", "data/config.toml"];

        for path in config_paths {
            if Path::new(path).exists() {
                let content = fs::read_to_string(path)?;
                let config: Config = toml::from_str(&content)?;
                tracing::info!("Loaded configuration from {}", path);
                return Ok(config);
            }
        }

        tracing::info!("No configuration file found, using defaults");
        Ok(Config::default())
    }

    /// Apply environment variable overrides
    /// Format: PICTOR_CONF_<SECTION>_<KEY>
    fn apply_env_overrides(&mut self) {
        // Server overrides
        if let Ok(val) = env::var("PICTOR_CONF_SERVER_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = env::var("PICTOR_CONF_SERVER_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }

        // Database overrides
        if let Ok(val) = env::var("PICTOR_CONF_DATABASE_PATH") {
            self.database.path = val;
        }

        // Storage overrides
        if let Ok(val) = env::var("PICTOR_CONF_STORAGE_BUCKET") {
            self.storage.bucket = val;
        }
        if let Ok(val) = env::var("PICTOR_CONF_STORAGE_BASE_PATH") {
            self.storage.base_path = val;
        }
        if let Ok(val) = env::var("PICTOR_CONF_STORAGE_LOCAL_PATH") {
            self.storage.local_path = val;
        }
        if let Ok(val) = env::var("PICTOR_CONF_STORAGE_MAX_FILE_SIZE") {
            if let Ok(size) = val.parse() {
                self.storage.max_file_size = size;
            }
        }
        if let Ok(val) = env::var("PICTOR_CONF_STORAGE_ALLOWED_MIME") {
            let types: Vec<String> = val
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect();
            if !types.is_empty() {
                self.storage.allowed_mime = types;
            }
        }
        if let Ok(val) = env::var("PICTOR_CONF_STORAGE_ORPHAN_GRACE_MINUTES") {
            if let Ok(minutes) = val.parse() {
                self.storage.orphan_grace_minutes = minutes;
            }
        }

        // Rate limit overrides
        if let Ok(val) = env::var("PICTOR_CONF_RATE_LIMIT_UPLOAD_LIMIT") {
            if let Ok(limit) = val.parse() {
                self.rate_limit.upload_limit = limit;
            }
        }
        if let Ok(val) = env::var("PICTOR_CONF_RATE_LIMIT_UPLOAD_WINDOW_SECS") {
            if let Ok(secs) = val.parse() {
                self.rate_limit.upload_window_secs = secs;
            }
        }
    }

    /// Ensure required directories exist
    fn ensure_directories(&self) -> anyhow::Result<()> {
        // Ensure database directory exists
        if let Some(parent) = Path::new(&self.database.path).parent() {
            fs::create_dir_all(parent)?;
        }

        // Ensure local object store directory exists
        fs::create_dir_all(&self.storage.local_path)?;

        Ok(())
    }
}
