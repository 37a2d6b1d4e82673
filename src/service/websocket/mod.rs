//! WebSocket 服务模块
//!
//! 提供基于 WebSocket 的实时订单通知推送

pub mod session;

use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::sync::Arc;
use uuid::Uuid;

use self::session::WsSession;
use crate::notification::RoomBroker;

/// 通知 WebSocket 服务器
pub struct NotificationServer {
    /// 房间路由中心（与业务发布方共享）
    broker: Arc<RoomBroker>,
}

impl NotificationServer {
    pub fn new(broker: Arc<RoomBroker>) -> Self {
        Self { broker }
    }

    pub fn broker(&self) -> &Arc<RoomBroker> {
        &self.broker
    }

    /// 处理 WebSocket 连接
    ///
    /// 路由: `GET /ws`。房间绑定不走查询参数，统一通过
    /// `seller-join` / `buyer-join` 帧完成。
    pub async fn handle_connection(
        &self,
        req: HttpRequest,
        stream: web::Payload,
    ) -> Result<HttpResponse, Error> {
        let session_id = Uuid::new_v4().to_string();
        let session = WsSession::new(session_id, self.broker.clone());

        // session 在 Actor::started() 中自动注册到 broker
        let resp = ws::start(session, &req, stream)?;
        Ok(resp)
    }
}

/// WebSocket 路由处理函数
pub async fn ws_route(
    req: HttpRequest,
    stream: web::Payload,
    server: web::Data<Arc<NotificationServer>>,
) -> Result<HttpResponse, Error> {
    server.handle_connection(req, stream).await
}
