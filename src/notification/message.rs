//! 通知线协议定义
//!
//! 设计原则：
//! 1. 类型安全 - 事件名使用强类型枚举而非字符串
//! 2. 负载透传 - `data` 字段保持 `serde_json::Value`，客户端不做 schema 校验
//! 3. 高效序列化 - serde 内部标签枚举，事件名即 `event` 字段
//!
//! 买家和卖家收到的订单状态变更是两个不同的事件名
//! （`order-status-update` / `order-status-updated`），对应服务端两条
//! 独立的广播通道，两个名字都必须原样保留。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// 房间角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Seller,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buyer => "buyer",
            Self::Seller => "seller",
        }
    }

    /// 加入确认对应的事件类型
    pub fn joined_kind(&self) -> EventKind {
        match self {
            Self::Buyer => EventKind::BuyerJoined,
            Self::Seller => EventKind::SellerJoined,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 房间标识：(角色, 主键) 二元组
///
/// 一个连接同一时刻至多绑定一个房间，后加入者覆盖先加入者。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomId {
    pub role: Role,
    pub id: Arc<str>,
}

impl RoomId {
    pub fn buyer(id: impl Into<Arc<str>>) -> Self {
        Self {
            role: Role::Buyer,
            id: id.into(),
        }
    }

    pub fn seller(id: impl Into<Arc<str>>) -> Self {
        Self {
            role: Role::Seller,
            id: id.into(),
        }
    }

    /// 房间标签，用于日志和加入确认负载
    pub fn tag(&self) -> String {
        format!("{}:{}", self.role, self.id)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role, self.id)
    }
}

/// 消息信封：`{success, message, data}`
///
/// `data` 按事件不同携带不同 schema，这里不做校验，原样转发给处理器。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default)]
    pub data: serde_json::Value,
}

impl Envelope {
    pub fn new(data: serde_json::Value) -> Self {
        Self {
            success: Some(true),
            message: None,
            data,
        }
    }

    pub fn with_message(data: serde_json::Value, message: impl Into<String>) -> Self {
        Self {
            success: Some(true),
            message: Some(message.into()),
            data,
        }
    }
}

/// 客户端发出的帧
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientFrame {
    /// 绑定连接到卖家房间
    SellerJoin {
        #[serde(rename = "sellerId")]
        seller_id: String,
    },

    /// 绑定连接到买家房间
    BuyerJoin {
        #[serde(rename = "userId")]
        user_id: String,
    },

    /// 存活探测
    Ping,
}

impl ClientFrame {
    /// 按房间构造对应角色的加入帧
    pub fn join(room: &RoomId) -> Self {
        match room.role {
            Role::Buyer => Self::BuyerJoin {
                user_id: room.id.to_string(),
            },
            Role::Seller => Self::SellerJoin {
                seller_id: room.id.to_string(),
            },
        }
    }

    /// 加入帧携带的房间标识（`Ping` 返回 `None`）
    pub fn room(&self) -> Option<RoomId> {
        match self {
            Self::SellerJoin { seller_id } => Some(RoomId::seller(seller_id.as_str())),
            Self::BuyerJoin { user_id } => Some(RoomId::buyer(user_id.as_str())),
            Self::Ping => None,
        }
    }
}

/// 服务端推送的帧
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ServerFrame {
    /// 卖家房间加入确认（仅用于诊断日志）
    SellerJoined {
        #[serde(flatten)]
        envelope: Envelope,
    },

    /// 买家房间加入确认（仅用于诊断日志）
    BuyerJoined {
        #[serde(flatten)]
        envelope: Envelope,
    },

    /// 新订单（卖家侧）
    NewOrder {
        #[serde(flatten)]
        envelope: Envelope,
    },

    /// 订单状态变更（卖家侧）
    OrderStatusUpdated {
        #[serde(flatten)]
        envelope: Envelope,
    },

    /// 订单状态变更（买家侧，事件名与卖家侧不同，不可合并）
    OrderStatusUpdate {
        #[serde(flatten)]
        envelope: Envelope,
    },

    /// 买家取消订单（卖家侧）
    OrderCancelledByBuyer {
        #[serde(flatten)]
        envelope: Envelope,
    },

    /// 发票生成完毕（买家侧）
    InvoiceReady {
        #[serde(flatten)]
        envelope: Envelope,
    },

    /// 存活探测响应
    Pong {
        #[serde(flatten)]
        envelope: Envelope,
    },
}

impl ServerFrame {
    pub fn from_parts(kind: EventKind, envelope: Envelope) -> Self {
        match kind {
            EventKind::SellerJoined => Self::SellerJoined { envelope },
            EventKind::BuyerJoined => Self::BuyerJoined { envelope },
            EventKind::NewOrder => Self::NewOrder { envelope },
            EventKind::OrderStatusUpdated => Self::OrderStatusUpdated { envelope },
            EventKind::OrderStatusUpdate => Self::OrderStatusUpdate { envelope },
            EventKind::OrderCancelledByBuyer => Self::OrderCancelledByBuyer { envelope },
            EventKind::InvoiceReady => Self::InvoiceReady { envelope },
            EventKind::Pong => Self::Pong { envelope },
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::SellerJoined { .. } => EventKind::SellerJoined,
            Self::BuyerJoined { .. } => EventKind::BuyerJoined,
            Self::NewOrder { .. } => EventKind::NewOrder,
            Self::OrderStatusUpdated { .. } => EventKind::OrderStatusUpdated,
            Self::OrderStatusUpdate { .. } => EventKind::OrderStatusUpdate,
            Self::OrderCancelledByBuyer { .. } => EventKind::OrderCancelledByBuyer,
            Self::InvoiceReady { .. } => EventKind::InvoiceReady,
            Self::Pong { .. } => EventKind::Pong,
        }
    }

    pub fn envelope(&self) -> &Envelope {
        match self {
            Self::SellerJoined { envelope }
            | Self::BuyerJoined { envelope }
            | Self::NewOrder { envelope }
            | Self::OrderStatusUpdated { envelope }
            | Self::OrderStatusUpdate { envelope }
            | Self::OrderCancelledByBuyer { envelope }
            | Self::InvoiceReady { envelope }
            | Self::Pong { envelope } => envelope,
        }
    }

    pub fn into_envelope(self) -> Envelope {
        match self {
            Self::SellerJoined { envelope }
            | Self::BuyerJoined { envelope }
            | Self::NewOrder { envelope }
            | Self::OrderStatusUpdated { envelope }
            | Self::OrderStatusUpdate { envelope }
            | Self::OrderCancelledByBuyer { envelope }
            | Self::InvoiceReady { envelope }
            | Self::Pong { envelope } => envelope,
        }
    }
}

/// 事件类型（事件分发器的注册键）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    SellerJoined,
    BuyerJoined,
    NewOrder,
    OrderStatusUpdated,
    OrderStatusUpdate,
    OrderCancelledByBuyer,
    InvoiceReady,
    Pong,
}

impl EventKind {
    /// 线上的事件名（静态字符串，零分配）
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::SellerJoined => "seller-joined",
            Self::BuyerJoined => "buyer-joined",
            Self::NewOrder => "new-order",
            Self::OrderStatusUpdated => "order-status-updated",
            Self::OrderStatusUpdate => "order-status-update",
            Self::OrderCancelledByBuyer => "order-cancelled-by-buyer",
            Self::InvoiceReady => "invoice-ready",
            Self::Pong => "pong",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

// ============================================================================
// 生产端负载类型
// ============================================================================

/// 新订单通知（卖家侧）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderNotify {
    #[serde(rename = "_id")]
    pub order_id: String,
    pub order_number: String,
    pub status: String,
    pub total_price: f64,
    pub user: serde_json::Value,
    pub order_items: Vec<serde_json::Value>,
    pub created_at: String,
}

/// 订单状态变更通知（买家/卖家共用负载，事件名区分方向）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusNotify {
    #[serde(rename = "_id")]
    pub order_id: String,
    pub order_number: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<String>,
}

/// 买家取消订单通知（卖家侧）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCancelledNotify {
    pub order_number: String,
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// 发票就绪通知（买家侧）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceReadyNotify {
    pub order_id: String,
    pub order_number: String,
    pub invoice_url: String,
}

macro_rules! impl_into_envelope {
    ($($ty:ty => $kind:expr),* $(,)?) => {
        $(
            impl $ty {
                /// 包装为线协议信封
                pub fn into_envelope(self) -> Envelope {
                    Envelope::new(serde_json::to_value(self).unwrap_or_default())
                }

                /// 包装为完整服务端帧
                pub fn into_frame(self) -> ServerFrame {
                    ServerFrame::from_parts($kind, self.into_envelope())
                }
            }
        )*
    };
}

impl_into_envelope! {
    NewOrderNotify => EventKind::NewOrder,
    OrderCancelledNotify => EventKind::OrderCancelledByBuyer,
    InvoiceReadyNotify => EventKind::InvoiceReady,
}

impl OrderStatusNotify {
    pub fn into_envelope(self) -> Envelope {
        Envelope::new(serde_json::to_value(self).unwrap_or_default())
    }

    /// 卖家侧帧（`order-status-updated`）
    pub fn into_seller_frame(self) -> ServerFrame {
        ServerFrame::from_parts(EventKind::OrderStatusUpdated, self.into_envelope())
    }

    /// 买家侧帧（`order-status-update`）
    pub fn into_buyer_frame(self) -> ServerFrame {
        ServerFrame::from_parts(EventKind::OrderStatusUpdate, self.into_envelope())
    }
}
