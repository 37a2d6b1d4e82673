//! 通知消息系统
//!
//! 提供订单通知的线协议定义和房间路由：
//! - 消息定义和序列化（线协议帧 + 生产端负载类型）
//! - 房间路由（RoomBroker）
//!
//! # 架构
//!
//! ```text
//! Business Module (订单服务)
//!         ↓ publish(room, frame)
//!     RoomBroker (房间注册表、扇出)
//!         ↓ mpsc<String>
//!     WsSession (actix actor)
//!         ↓ WebSocket
//!     NotifyClient
//! ```
//!
//! # 示例
//!
//! ```rust,no_run
//! use zammer_notify::notification::{OrderStatusNotify, RoomBroker, RoomId};
//! use tokio::sync::mpsc;
//!
//! let broker = RoomBroker::new();
//!
//! // WebSocket 会话注册并加入买家房间
//! let (session_tx, mut session_rx) = mpsc::unbounded_channel();
//! broker.register_session("session_01", session_tx);
//! broker.bind_room("session_01", RoomId::buyer("u1"));
//!
//! // 订单服务发布状态变更
//! let frame = OrderStatusNotify {
//!     order_id: "65a1".to_string(),
//!     order_number: "ORD-1001".to_string(),
//!     status: "shipped".to_string(),
//!     previous_status: Some("processing".to_string()),
//! }
//! .into_buyer_frame();
//!
//! broker.publish(&RoomId::buyer("u1"), &frame);
//! ```

pub mod broker;
pub mod message;

// 导出核心类型
pub use message::{
    ClientFrame,
    Envelope,
    EventKind,
    Role,
    RoomId,
    ServerFrame,
    // 生产端负载
    InvoiceReadyNotify,
    NewOrderNotify,
    OrderCancelledNotify,
    OrderStatusNotify,
};

pub use broker::{BrokerStats, BrokerStatsSnapshot, RoomBroker, SessionInfo};
