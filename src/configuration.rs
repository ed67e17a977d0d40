use config::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs, io};

/// Prefix of the environment variables overriding the configuration file,
/// e.g. `MUSICATALOG__API__BASE_URL`.
const ENV_PREFIX: &str = "MUSICATALOG";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub endpoints: Endpoints,
    #[serde(default)]
    pub notifications: NotificationSettings,
    #[serde(default)]
    pub catalog: CatalogSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ApiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    30
}

/// Endpoint paths, relative to `api.base_url`.
#[derive(Debug, Clone, Deserialize)]
pub struct Endpoints {
    pub artists: String,
    pub albums: String,
    pub login: String,
    pub refresh: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            artists: "/v1/artist".to_string(),
            albums: "/v1/album".to_string(),
            login: "/auth/login".to_string(),
            refresh: "/auth/refresh".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationSettings {
    /// Raw WebSocket endpoint of the SockJS server.
    pub ws_url: String,
    pub topic: String,
    pub reconnect_delay_ms: u64,
    pub heartbeat_ms: u64,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:8080/ws/websocket".to_string(),
            topic: "/topic/albums".to_string(),
            reconnect_delay_ms: 5000,
            heartbeat_ms: 4000,
        }
    }
}

impl NotificationSettings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSettings {
    pub page_size: u32,
    pub album_page_size: u32,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            page_size: 12,
            album_page_size: 10,
        }
    }
}

pub fn get_configuration(cfg_file: &str) -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::new(cfg_file, config::FileFormat::Yaml))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}

pub struct ConfigFolder {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub session_db: PathBuf,
}

impl ConfigFolder {
    pub fn new() -> io::Result<Self> {
        let home_dir = env::var("HOME")
            .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME is not set"))?;
        Ok(Self::in_home(Path::new(&home_dir)))
    }

    pub fn in_home(home_dir: &Path) -> Self {
        let config_dir = home_dir.join(".musicatalog");
        Self {
            config_file: config_dir.join("config.yaml"),
            session_db: config_dir.join("session_db"),
            config_dir,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config_dir.exists() && self.config_file.exists()
    }
}

pub fn create_config(cfg_folder: &ConfigFolder) -> Result<(), Box<dyn std::error::Error>> {
    println!("\x1b[1m\x1b[32mCreating configuration...\x1b[0m");
    let config_dir = &cfg_folder.config_dir;

    if config_dir.exists() && !confirm_overwrite()? {
        println!("\x1b[33mOperation cancelled.\x1b[0m");
        return Ok(());
    }

    write_config(cfg_folder)?;

    println!("\x1b[32mConfiguration file created at:");
    println!("  -> ~/.musicatalog/config.yaml");
    println!("Session store created at:");
    println!("  -> ~/.musicatalog/session_db");
    println!("\x1b[0mPlease edit the configuration file with your backend URLs.");

    Ok(())
}

/// Writes the configuration template and the session store folder.
pub fn write_config(cfg_folder: &ConfigFolder) -> io::Result<()> {
    fs::create_dir_all(&cfg_folder.config_dir)?;
    fs::create_dir_all(&cfg_folder.session_db)?;

    let config_content = include_str!("config_template.yaml");
    fs::write(&cfg_folder.config_file, config_content)
}

fn confirm_overwrite() -> Result<bool, io::Error> {
    println!("\x1b[31mThe configuration folder already exists.");
    println!("Do you want to overwrite it? The current settings will be lost. (y/N)\x1b[0m");

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(input.trim().eq_ignore_ascii_case("y"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_template_matches_defaults() {
        let home = TempDir::new().unwrap();
        let folder = ConfigFolder::in_home(home.path());

        write_config(&folder).unwrap();
        assert!(folder.is_configured());
        assert!(folder.session_db.is_dir());

        let settings = get_configuration(folder.config_file.to_str().unwrap()).unwrap();
        assert_eq!(settings.api.base_url, "http://localhost:8080/api");
        assert_eq!(settings.endpoints.artists, "/v1/artist");
        assert_eq!(settings.endpoints.refresh, "/auth/refresh");
        assert_eq!(settings.notifications.topic, "/topic/albums");
        assert_eq!(settings.notifications.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(settings.catalog.page_size, 12);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let home = TempDir::new().unwrap();
        let file = home.path().join("config.yaml");
        fs::write(&file, "api:\n  base_url: https://api.production.com/api\n").unwrap();

        let settings = get_configuration(file.to_str().unwrap()).unwrap();
        assert_eq!(settings.api.base_url, "https://api.production.com/api");
        assert_eq!(settings.api.timeout_secs, 30);
        assert_eq!(settings.endpoints.login, "/auth/login");
        assert_eq!(settings.catalog.album_page_size, 10);
    }

    #[test]
    fn test_folder_layout() {
        let folder = ConfigFolder::in_home(Path::new("/home/user"));
        assert_eq!(folder.config_dir, Path::new("/home/user/.musicatalog"));
        assert_eq!(
            folder.config_file,
            Path::new("/home/user/.musicatalog/config.yaml")
        );
        assert_eq!(
            folder.session_db,
            Path::new("/home/user/.musicatalog/session_db")
        );
    }
}
