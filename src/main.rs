//! Zammer 订单通知服务
//!
//! 集成功能：
//! 1. WebSocket 实时推送（房间路由 + 会话管理）
//! 2. HTTP 诊断接口（健康检查、路由统计）
//!
//! 运行: cargo run --bin zammer-notify-server

use actix_web::{middleware, web, App, HttpServer as ActixHttpServer};
use std::io;
use std::sync::Arc;

use zammer_notify::notification::RoomBroker;
use zammer_notify::service::http;
use zammer_notify::service::websocket::{ws_route, NotificationServer};
use zammer_notify::utils::config::NotifyConfig;

/// 通知服务运行时配置
#[derive(Debug, Clone)]
struct ServerConfig {
    /// HTTP 监听地址
    http_address: String,

    /// WebSocket 监听地址
    ws_address: String,
}

impl ServerConfig {
    fn from_toml(config: &NotifyConfig) -> Self {
        Self {
            http_address: config.http.bind_address(),
            ws_address: config.websocket.bind_address(),
        }
    }
}

/// 通知服务
struct NotifyServer {
    config: ServerConfig,

    /// 房间路由中心，WebSocket 会话和发布方共享
    broker: Arc<RoomBroker>,
}

impl NotifyServer {
    fn new(config: ServerConfig) -> Self {
        log::info!("Initializing notification server...");

        let broker = Arc::new(RoomBroker::new());
        log::info!("✅ Room broker initialized");

        Self { config, broker }
    }

    /// 启动 WebSocket 服务器
    async fn start_websocket_server(&self) -> io::Result<actix_web::dev::Server> {
        log::info!("Starting WebSocket server at {}...", self.config.ws_address);

        let ws_server = Arc::new(NotificationServer::new(self.broker.clone()));
        let bind_address = self.config.ws_address.clone();

        let server = ActixHttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(ws_server.clone()))
                .wrap(middleware::Logger::default())
                .route("/ws", web::get().to(ws_route))
                .route("/health", web::get().to(|| async { "OK" }))
        })
        .bind(&bind_address)?
        .run();

        log::info!("✅ WebSocket server started at ws://{}/ws", bind_address);

        Ok(server)
    }

    /// 启动 HTTP 诊断服务器
    async fn start_http_server(&self) -> io::Result<actix_web::dev::Server> {
        log::info!("Starting HTTP server at {}...", self.config.http_address);

        let broker = self.broker.clone();
        let bind_address = self.config.http_address.clone();

        let server = ActixHttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(broker.clone()))
                .wrap(middleware::Logger::default())
                .wrap(
                    actix_cors::Cors::default()
                        .allow_any_origin()
                        .allow_any_method()
                        .allow_any_header()
                        .max_age(3600),
                )
                .configure(http::configure)
        })
        .bind(&bind_address)?
        .run();

        log::info!("✅ HTTP server started at http://{}", bind_address);
        log::info!("   Health: http://{}/health", bind_address);
        log::info!("   Stats:  http://{}/api/stats", bind_address);

        Ok(server)
    }

    async fn run(self) -> io::Result<()> {
        let ws_server = self.start_websocket_server().await?;
        let http_server = self.start_http_server().await?;

        print_startup_banner(&self.config);

        tokio::try_join!(async { ws_server.await }, async { http_server.await })?;

        Ok(())
    }
}

/// 打印启动横幅
fn print_startup_banner(config: &ServerConfig) {
    println!("\n╔═══════════════════════════════════════════════════════════╗");
    println!("║              🚀 Zammer Notify Server Started              ║");
    println!("╚═══════════════════════════════════════════════════════════╝\n");

    println!("📡 Service Endpoints:");
    println!("   • WebSocket:   ws://{}/ws", config.ws_address);
    println!("   • Health:      http://{}/health", config.http_address);
    println!("   • Stats:       http://{}/api/stats", config.http_address);

    println!("\n📋 WebSocket Events:");
    println!("   ┌──────────────────────────────────────────────────────┐");
    println!("   │ seller-join    - 绑定卖家房间 (sellerId)             │");
    println!("   │ buyer-join     - 绑定买家房间 (userId)               │");
    println!("   │ ping           - 存活探测                            │");
    println!("   └──────────────────────────────────────────────────────┘");

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("🟢 Server is running. Press Ctrl+C to stop.\n");
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    // 初始化日志
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 1. 加载配置文件
    let toml_config = match NotifyConfig::load_default() {
        Ok(cfg) => cfg,
        Err(e) => {
            log::warn!("Failed to load config file: {}, using defaults", e);
            NotifyConfig::default()
        }
    };

    log::info!("Configuration loaded");
    log::info!("  Environment: {}", toml_config.server.environment);

    // 2. 转换为运行时配置，命令行参数覆盖
    let mut config = ServerConfig::from_toml(&toml_config);

    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        match args[i].as_str() {
            "--http" | "-h" => {
                if i + 1 < args.len() {
                    config.http_address = args[i + 1].clone();
                }
            }
            "--ws" | "-w" => {
                if i + 1 < args.len() {
                    config.ws_address = args[i + 1].clone();
                }
            }
            _ => {}
        }
    }

    let server = NotifyServer::new(config);
    server.run().await
}
