//! Server configuration: typed settings loaded from a `key=value` text file.

mod loader;
mod validation;

pub use loader::{load, ConfigError};
pub use validation::validate;

use serde::Serialize;

use crate::net::crypt::CryptKeys;

/// Database connection settings.
#[derive(Debug, Clone, Serialize)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip)]
    pub password: String,
    pub database: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            username: "shardfish".to_string(),
            password: String::new(),
            database: "shardfish".to_string(),
        }
    }
}

impl DbConfig {
    /// Connection URL for the postgres driver.
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }
}

/// The full server configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub lobby_addr: String,
    pub lobby_port: u16,
    pub status_addr: String,
    pub status_port: u16,

    /// Addresses advertised to clients (sent as UTF-16 on the wire).
    pub file_server_addr: String,
    pub auth_server_addr: String,
    pub game_server_addr: String,
    pub gate_server_addr: String,

    #[serde(skip)]
    pub auth_keys: Option<CryptKeys>,
    #[serde(skip)]
    pub game_keys: Option<CryptKeys>,
    #[serde(skip)]
    pub gate_keys: Option<CryptKeys>,
    /// The 16-byte "droid" key echoed to clients at login.
    #[serde(skip)]
    pub wdys_key: [u8; 16],

    pub db: DbConfig,

    pub file_root: String,
    pub age_path: String,
    pub sdl_path: String,

    pub welcome_msg: String,
    /// Accepted client build id; 0 disables the check.
    pub build_id: u32,
    pub restrict_logins: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lobby_addr: "0.0.0.0".to_string(),
            lobby_port: 14617,
            status_addr: "0.0.0.0".to_string(),
            status_port: 8080,
            file_server_addr: "127.0.0.1".to_string(),
            auth_server_addr: "127.0.0.1".to_string(),
            game_server_addr: "127.0.0.1".to_string(),
            gate_server_addr: "127.0.0.1".to_string(),
            auth_keys: None,
            game_keys: None,
            gate_keys: None,
            wdys_key: [0; 16],
            db: DbConfig::default(),
            file_root: "data".to_string(),
            age_path: "ages".to_string(),
            sdl_path: "SDL".to_string(),
            welcome_msg: "Welcome to the shard!".to_string(),
            build_id: 0,
            restrict_logins: false,
        }
    }
}

impl Config {
    pub fn lobby_bind(&self) -> String {
        format!("{}:{}", self.lobby_addr, self.lobby_port)
    }

    pub fn status_bind(&self) -> String {
        format!("{}:{}", self.status_addr, self.status_port)
    }
}
