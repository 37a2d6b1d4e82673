//! # ZAMMER-NOTIFY
//!
//! Zammer 电商平台实时订单通知系统
//!
//! ## 核心能力
//!
//! - **房间路由**: 按买家/卖家身份路由订单事件 (notification/)
//! - **WebSocket 推送**: 基于 Actix actor 的会话管理 (service/websocket)
//! - **通知客户端**: 连接管理/自动重连/房间重入/事件分发 (client/)
//! - **诊断接口**: 健康检查 + 路由统计 (service/http)
//!
//! ## 架构设计
//!
//! ```text
//! 业务系统 (订单服务)
//!     ↓ publish
//! RoomBroker (房间注册表、按房间路由)
//!     ↓
//! WsSession (Actix actor, 心跳、帧解析)
//!     ↓ WebSocket
//! NotifyClient (连接状态机、自动重入房间、事件分发)
//!     ↓ callback
//! 消费方 (看板页面)
//! ```
//!
//! ## 交付语义
//!
//! 通知是失效信号而非事务更新：每连接内按序、至多一次投递，
//! 断线期间的消息不缓存不重放，消费方收到通知后应向权威数据源重新拉取。

// ============================================================================
// 外部依赖
// ============================================================================

// Web 框架
pub use actix;
pub use actix_web;

// 异步运行时
pub use futures;
pub use tokio;

// 并发工具
pub use dashmap;
pub use parking_lot;

// 序列化
pub use serde;
pub use serde_json;

// 时间
pub use chrono;

// 日志
pub use log;

// 错误处理
pub use anyhow;
pub use thiserror;

// UUID
pub use uuid;

// ============================================================================
// 内部模块
// ============================================================================

/// 通知消息系统（线协议 + 房间路由）
pub mod notification;

/// 对外服务层 (WebSocket + HTTP)
pub mod service;

/// 通知客户端（连接管理、事件分发、自动重入房间）
pub mod client;

/// 工具模块
pub mod utils;

// ============================================================================
// 重导出常用类型
// ============================================================================

pub use client::{ConnectionState, ConnectionStatus, NotifyClient, Subscription};
pub use notification::{
    ClientFrame, Envelope, EventKind, Role, RoomBroker, RoomId, ServerFrame,
};

// ============================================================================
// 全局错误类型
// ============================================================================

/// 通知系统错误类型
///
/// 只覆盖会向调用方返回错误的路径（配置加载）。连接层和推送层的
/// 失败被吸收为状态和日志，不走这里。
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IOError(String),
}

pub type Result<T> = std::result::Result<T, NotifyError>;
