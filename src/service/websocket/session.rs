//! WebSocket 会话管理

use crate::notification::{ClientFrame, Envelope, RoomBroker, ServerFrame};
use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// 心跳间隔
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// 客户端超时时间
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);
/// 通知通道的泵送间隔
const PUSH_INTERVAL: Duration = Duration::from_millis(10);

/// WebSocket 会话
///
/// 每个连接一个 actor。在 `started()` 中向 broker 注册发送通道，
/// 房间绑定通过 `seller-join` / `buyer-join` 帧完成，后加入覆盖先加入。
pub struct WsSession {
    /// 会话 ID
    pub id: Arc<str>,

    /// 房间路由中心
    broker: Arc<RoomBroker>,

    /// 最后心跳时间
    heartbeat: Instant,

    /// 来自 broker 的通知接收端
    notification_rx: Option<mpsc::UnboundedReceiver<String>>,
}

impl WsSession {
    pub fn new(session_id: impl Into<Arc<str>>, broker: Arc<RoomBroker>) -> Self {
        Self {
            id: session_id.into(),
            broker,
            heartbeat: Instant::now(),
            notification_rx: None,
        }
    }

    /// 启动心跳检查
    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.heartbeat) > CLIENT_TIMEOUT {
                log::warn!("WebSocket session {} timed out, disconnecting", act.id);
                ctx.stop();
                return;
            }

            ctx.ping(b"");
        });
    }

    /// 启动通知泵：把 broker 推来的帧转写到 WebSocket
    fn start_notification_pump(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(PUSH_INTERVAL, |act, ctx| {
            if let Some(rx) = act.notification_rx.as_mut() {
                while let Ok(json) = rx.try_recv() {
                    ctx.text(json);
                }
            }
        });
    }

    /// 处理客户端帧
    fn handle_client_frame(&mut self, frame: ClientFrame, ctx: &mut ws::WebsocketContext<Self>) {
        match &frame {
            ClientFrame::SellerJoin { .. } | ClientFrame::BuyerJoin { .. } => {
                // room() 对加入帧必定返回 Some
                let Some(room) = frame.room() else { return };

                if !self.broker.bind_room(&self.id, room.clone()) {
                    log::warn!("Session {} join failed: not registered", self.id);
                    return;
                }

                // 角色对应的加入确认，负载仅用于对端诊断日志
                let ack = ServerFrame::from_parts(
                    room.role.joined_kind(),
                    Envelope::with_message(
                        serde_json::json!({
                            "room": room.tag(),
                            "sessionId": self.id.as_ref(),
                        }),
                        format!("joined {} room", room.role),
                    ),
                );
                self.send_frame(&ack, ctx);
            }

            ClientFrame::Ping => {
                self.heartbeat = Instant::now();
                self.send_frame(
                    &ServerFrame::from_parts(
                        crate::notification::EventKind::Pong,
                        Envelope::default(),
                    ),
                    ctx,
                );
            }
        }
    }

    /// 发送服务端帧
    fn send_frame(&self, frame: &ServerFrame, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::to_string(frame) {
            Ok(json) => ctx.text(json),
            Err(e) => log::error!("Failed to serialize {} frame: {}", frame.kind(), e),
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        log::info!("WebSocket session {} started", self.id);

        let (tx, rx) = mpsc::unbounded_channel();
        self.broker.register_session(self.id.clone(), tx);
        self.notification_rx = Some(rx);

        self.start_heartbeat(ctx);
        self.start_notification_pump(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        log::info!("WebSocket session {} stopped", self.id);
        self.broker.unregister_session(&self.id);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.heartbeat = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.heartbeat = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.heartbeat = Instant::now();

                match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(frame) => self.handle_client_frame(frame, ctx),
                    Err(e) => {
                        // 负载不做 schema 校验，未知帧只记日志，连接保持
                        log::error!(
                            "Session {} sent unparseable frame: {} ({})",
                            self.id,
                            e,
                            text.chars().take(128).collect::<String>()
                        );
                    }
                }
            }
            Ok(ws::Message::Binary(_)) => {
                log::warn!("Binary messages not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                log::info!("WebSocket session {} closed: {:?}", self.id, reason);
                ctx.stop();
            }
            _ => {}
        }
    }
}
