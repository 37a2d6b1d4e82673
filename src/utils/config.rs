//! 配置管理模块

use crate::{NotifyError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// 客户端服务地址的环境变量
pub const SERVER_URL_ENV: &str = "ZAMMER_NOTIFY_URL";

/// 本地开发默认地址
const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:8081/ws";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            http: HttpConfig::default(),
            websocket: WebSocketConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

impl NotifyConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| NotifyError::IOError(format!("Failed to read config file: {}", e)))?;
        toml::from_str(&content)
            .map_err(|e| NotifyError::ConfigError(format!("Failed to parse config file: {}", e)))
    }

    pub fn load_default() -> Result<Self> {
        Self::load_from_file("config/notify.toml")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "zammer-notify".to_string(),
            environment: "development".to_string(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl HttpConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_ws_port")]
    pub port: u16,
}

impl WebSocketConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8081,
        }
    }
}

/// 通知客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// 通知服务地址
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// 断线后的最大重连次数，超出进入 Failed 终态
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// 重连间隔（固定，不做退避）
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// 单次连接尝试的超时
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 2000,
            connect_timeout_ms: 10_000,
        }
    }
}

impl ClientConfig {
    /// 从环境变量解析服务地址，未设置时使用本地开发默认值
    pub fn from_env() -> Self {
        let server_url =
            std::env::var(SERVER_URL_ENV).unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());
        Self {
            server_url,
            ..Self::default()
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_service_name() -> String {
    "zammer-notify".to_string()
}
fn default_environment() -> String {
    "development".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_ws_port() -> u16 {
    8081
}
fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}
fn default_max_reconnect_attempts() -> u32 {
    5
}
fn default_reconnect_delay_ms() -> u64 {
    2000
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
