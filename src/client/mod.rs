//! 通知客户端
//!
//! 面向业务代码的入口：一个 [`NotifyClient`] 实例对应一条到通知
//! 服务的持久连接。实例由调用方显式创建和注入，不使用全局单例，
//! 测试可以并行运行各自独立的客户端。
//!
//! ```no_run
//! use zammer_notify::client::NotifyClient;
//! use zammer_notify::utils::config::ClientConfig;
//!
//! # async fn demo() {
//! let client = NotifyClient::new(ClientConfig::from_env());
//! client.connect();
//!
//! let _sub = client.on_new_order(|env| {
//!     println!("new order: {}", env.data["orderNumber"]);
//! });
//!
//! // 连接建立后绑定卖家房间
//! client.join_seller_room("seller-42");
//! # }
//! ```

pub mod connection;
pub mod dispatcher;

pub use connection::{ConnectionState, ConnectionStatus};
pub use dispatcher::{EventDispatcher, Handler, Subscription};

use crate::notification::{ClientFrame, Envelope, EventKind, RoomId};
use crate::utils::config::ClientConfig;
use connection::{run_connection, ClientShared};
use std::sync::Arc;

/// 通知客户端
///
/// 克隆是浅拷贝，所有克隆共享同一条连接和同一张处理器表。
#[derive(Clone)]
pub struct NotifyClient {
    shared: Arc<ClientShared>,
    config: ClientConfig,
}

impl NotifyClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            shared: Arc::new(ClientShared::new()),
            config,
        }
    }

    /// 服务地址取自环境变量，其余参数为默认值
    pub fn with_env() -> Self {
        Self::new(ClientConfig::from_env())
    }

    // ========================================================================
    // 连接生命周期
    // ========================================================================

    /// 发起连接（幂等）
    ///
    /// 已在连接中/已连接/重连中时是空操作，不会建立第二条连接；
    /// 从 `Disconnected` 或 `Failed` 状态调用则启动新的连接任务。
    pub fn connect(&self) {
        match self.shared.state() {
            ConnectionState::Connecting
            | ConnectionState::Connected
            | ConnectionState::Reconnecting => {
                log::debug!("connect() ignored: already {:?}", self.shared.state());
                return;
            }
            ConnectionState::Disconnected | ConnectionState::Failed => {}
        }

        self.shared.reset_attempts();
        self.shared.set_state(ConnectionState::Connecting);
        log::info!("Connecting to notification service at {}", self.config.server_url);

        tokio::spawn(run_connection(
            self.shared.clone(),
            self.config.clone(),
            self.shared.generation(),
        ));
    }

    /// 主动断开并清空全部连接期状态
    ///
    /// 房间身份、socket_id、重连计数和所有已注册的处理器一并清除；
    /// 后续 `connect()` 从全新状态开始。
    pub fn disconnect(&self) {
        log::info!("Disconnecting from notification service");
        self.shared.teardown();
    }

    /// 显式重连：重置重试预算并重新建立连接
    ///
    /// 与 `connect()` 的区别是无条件执行（`Failed` 终态的唯一出口），
    /// 且保留房间身份和处理器，重连成功后自动重入房间。
    pub fn reconnect(&self) {
        log::info!("Explicit reconnect requested");

        self.shared.retire_transport();
        self.shared.reset_attempts();
        self.shared.set_state(ConnectionState::Connecting);

        tokio::spawn(run_connection(
            self.shared.clone(),
            self.config.clone(),
            self.shared.generation(),
        ));
    }

    // ========================================================================
    // 房间绑定
    // ========================================================================

    /// 绑定到买家房间；未连接时拒绝并返回 `false`
    pub fn join_buyer_room(&self, user_id: &str) -> bool {
        self.join_room(RoomId::buyer(user_id))
    }

    /// 绑定到卖家房间；未连接时拒绝并返回 `false`
    pub fn join_seller_room(&self, seller_id: &str) -> bool {
        self.join_room(RoomId::seller(seller_id))
    }

    /// 发送加入帧并记录身份，供断线重连后自动重入
    ///
    /// 同一连接重复加入不同房间时，后加入者覆盖先加入者。
    fn join_room(&self, room: RoomId) -> bool {
        let sender = self.shared.outbound.read().clone();
        match sender {
            Some(tx) => {
                if tx.send(ClientFrame::join(&room)).is_ok() {
                    log::info!("Joining {} room for {}", room.role, room.id);
                    *self.shared.identity.write() = Some(room);
                    true
                } else {
                    log::warn!("Cannot join {}: connection closing", room);
                    false
                }
            }
            None => {
                log::warn!("Cannot join {}: not connected", room);
                false
            }
        }
    }

    /// 发送存活探测；未连接时返回 `false`
    pub fn ping(&self) -> bool {
        let sender = self.shared.outbound.read().clone();
        match sender {
            Some(tx) => tx.send(ClientFrame::Ping).is_ok(),
            None => false,
        }
    }

    // ========================================================================
    // 状态查询
    // ========================================================================

    /// 状态快照（非阻塞）
    pub fn status(&self) -> ConnectionStatus {
        self.shared.status()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    // ========================================================================
    // 事件订阅
    // ========================================================================

    /// 订阅任意事件；同一事件可挂多个处理器，按注册顺序调用
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.shared.dispatcher.subscribe(kind, handler)
    }

    /// 退订单个订阅
    pub fn unsubscribe(&self, subscription: &Subscription) {
        self.shared.dispatcher.unsubscribe(subscription)
    }

    /// 移除某个事件的全部处理器
    pub fn remove_listeners(&self, kind: EventKind) {
        self.shared.dispatcher.remove_listeners(kind)
    }

    /// 新订单（卖家侧）
    pub fn on_new_order<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::NewOrder, handler)
    }

    /// 订单状态变更（卖家侧，`order-status-updated`）
    pub fn on_order_status_updated<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::OrderStatusUpdated, handler)
    }

    /// 订单状态变更（买家侧，`order-status-update`）
    pub fn on_order_status_update<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::OrderStatusUpdate, handler)
    }

    /// 买家取消订单（卖家侧）
    pub fn on_order_cancelled<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::OrderCancelledByBuyer, handler)
    }

    /// 发票就绪（买家侧）
    pub fn on_invoice_ready<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::InvoiceReady, handler)
    }

    /// 存活探测响应
    pub fn on_pong<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::Pong, handler)
    }

    #[cfg(test)]
    pub(crate) fn dispatcher(&self) -> &EventDispatcher {
        &self.shared.dispatcher
    }
}
