//! 对外服务层
//!
//! - `websocket`: 实时通知推送（会话 actor + 路由入口）
//! - `http`: 健康检查和路由统计

pub mod http;
pub mod websocket;
