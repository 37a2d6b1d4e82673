//! 连接管理
//!
//! 维护到通知服务的单条持久连接：
//!
//! ```text
//! Disconnected → Connecting → Connected → (Disconnected | Reconnecting)
//!                                → Connected | Failed
//! ```
//!
//! - 连接尝试有固定超时；失败进入固定间隔的有界重试
//! - 重试预算耗尽进入 Failed 终态，只有显式 connect()/reconnect() 能退出
//! - 重连成功后如持有身份，自动重发加入帧；以服务端的加入确认
//!   （而非固定延时）作为重入完成的标志
//! - 所有连接层错误被吸收为状态和日志，不向调用方抛出

use crate::client::dispatcher::EventDispatcher;
use crate::notification::{ClientFrame, EventKind, Role, RoomId, ServerFrame};
use crate::utils::config::ClientConfig;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 连接状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// 未连接
    Disconnected,
    /// 首次连接中
    Connecting,
    /// 已连接
    Connected,
    /// 断线重连中
    Reconnecting,
    /// 重试预算耗尽（终态，需显式 reconnect）
    Failed,
}

/// 连接状态快照（只读，不阻塞）
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub is_connected: bool,
    /// 本条传输连接的标识，每次建立新传输时重新生成
    pub socket_id: Option<String>,
    pub reconnect_attempts: u32,
    pub role: Option<Role>,
    pub id: Option<String>,
}

/// 客户端共享状态
///
/// 连接任务、读写循环和调用方共享同一份；全部字段用细粒度锁或
/// 原子量保护，快照读取永不阻塞在网络上。
pub(crate) struct ClientShared {
    state: RwLock<ConnectionState>,
    socket_id: RwLock<Option<String>>,
    reconnect_attempts: AtomicU32,

    /// 当前绑定的身份；断线不清除，显式 disconnect() 才清除
    pub(crate) identity: RwLock<Option<RoomId>>,

    /// 出站帧通道，仅在传输存活期间为 Some
    pub(crate) outbound: RwLock<Option<mpsc::UnboundedSender<ClientFrame>>>,

    pub(crate) dispatcher: EventDispatcher,

    /// 连接代次：disconnect() 递增，旧任务据此自行退出
    generation: AtomicU64,
}

impl ClientShared {
    pub(crate) fn new() -> Self {
        Self {
            state: RwLock::new(ConnectionState::Disconnected),
            socket_id: RwLock::new(None),
            reconnect_attempts: AtomicU32::new(0),
            identity: RwLock::new(None),
            outbound: RwLock::new(None),
            dispatcher: EventDispatcher::new(),
            generation: AtomicU64::new(0),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn reset_attempts(&self) {
        self.reconnect_attempts.store(0, Ordering::Relaxed);
    }

    pub(crate) fn status(&self) -> ConnectionStatus {
        let identity = self.identity.read().clone();
        ConnectionStatus {
            state: self.state(),
            is_connected: self.is_connected(),
            socket_id: self.socket_id.read().clone(),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            role: identity.as_ref().map(|room| room.role),
            id: identity.map(|room| room.id.to_string()),
        }
    }

    /// 作废当前代次并拆除出站通道
    ///
    /// 代次递增和通道清空在同一把 outbound 写锁内完成，与
    /// [`try_install_transport`](Self::try_install_transport) 在锁上
    /// 串行化：递增之后，旧代次的连接任务不可能再安装传输。
    pub(crate) fn retire_transport(&self) {
        let mut outbound = self.outbound.write();
        self.bump_generation();
        *outbound = None;
    }

    /// 安装新建立的传输并进入 Connected
    ///
    /// 代次检查和安装持同一把 outbound 写锁，disconnect() 与
    /// 连接中的任务竞争时只有一方生效。返回 `false` 表示代次已
    /// 作废，调用方应丢弃传输并退出。
    pub(crate) fn try_install_transport(
        &self,
        generation: u64,
        sender: mpsc::UnboundedSender<ClientFrame>,
    ) -> bool {
        let mut outbound = self.outbound.write();
        if self.generation() != generation {
            return false;
        }
        *outbound = Some(sender);
        *self.socket_id.write() = Some(uuid::Uuid::new_v4().to_string());
        self.set_state(ConnectionState::Connected);
        true
    }

    /// 拆除本代次的传输；代次已作废时不触碰新传输
    pub(crate) fn try_clear_transport(&self, generation: u64) -> bool {
        let mut outbound = self.outbound.write();
        if self.generation() != generation {
            return false;
        }
        *outbound = None;
        drop(outbound);
        *self.socket_id.write() = None;
        true
    }

    /// 清空所有连接期状态（disconnect() 专用）
    pub(crate) fn teardown(&self) {
        self.retire_transport();
        *self.identity.write() = None;
        *self.socket_id.write() = None;
        self.reset_attempts();
        self.dispatcher.clear();
        self.set_state(ConnectionState::Disconnected);
    }
}

/// 读写循环的退出原因
enum Exit {
    /// 出站通道关闭（显式 disconnect）
    Clean,
    /// 传输丢失（对端关闭/IO 错误）
    Lost,
}

/// 连接任务主循环：连接、驱动读写、失败后有界重试
///
/// `generation` 是任务启动时的代次，disconnect() 递增代次后
/// 旧任务在下一个检查点自行退出。
pub(crate) async fn run_connection(
    shared: Arc<ClientShared>,
    config: ClientConfig,
    generation: u64,
) {
    let mut attempts: u32 = 0;

    loop {
        if shared.generation() != generation {
            return;
        }

        let connected =
            tokio::time::timeout(config.connect_timeout(), connect_async(config.server_url.as_str()))
                .await;

        match connected {
            Ok(Ok((ws, _response))) => {
                let (tx, rx) = mpsc::unbounded_channel();

                if !shared.try_install_transport(generation, tx.clone()) {
                    // disconnect() 赢得竞争，丢弃这条传输
                    return;
                }

                attempts = 0;
                shared.reset_attempts();
                log::info!("Notification channel connected to {}", config.server_url);

                // 自动重入房间：断线前持有身份则重发加入帧，
                // 服务端的加入确认到达才算重入完成
                if let Some(room) = shared.identity.read().clone() {
                    log::info!("Re-joining {} room for {}", room.role, room.id);
                    let _ = tx.send(ClientFrame::join(&room));
                }
                drop(tx);

                let exit = drive_connection(&shared, ws, rx).await;

                if !shared.try_clear_transport(generation) {
                    // disconnect()/reconnect() 已接管状态清理
                    return;
                }

                match exit {
                    Exit::Clean => {
                        shared.set_state(ConnectionState::Disconnected);
                        return;
                    }
                    Exit::Lost => {
                        // 直接进入 Reconnecting，中间不落回 Disconnected，
                        // 避免 connect() 在窗口期拉起第二个任务
                        shared.set_state(ConnectionState::Reconnecting);
                        log::warn!("Notification channel lost, reconnecting");
                    }
                }
            }
            Ok(Err(e)) => {
                log::warn!("Connect to {} failed: {}", config.server_url, e);
            }
            Err(_) => {
                log::warn!(
                    "Connect to {} timed out after {:?}",
                    config.server_url,
                    config.connect_timeout()
                );
            }
        }

        // 失败或断线：进入有界重试
        attempts += 1;
        shared.reconnect_attempts.store(attempts, Ordering::Relaxed);

        if attempts > config.max_reconnect_attempts {
            shared.set_state(ConnectionState::Failed);
            log::error!(
                "Reconnect budget exhausted ({} attempts), giving up until explicit reconnect",
                config.max_reconnect_attempts
            );
            return;
        }

        shared.set_state(ConnectionState::Reconnecting);
        log::info!(
            "Reconnect attempt {}/{} in {:?}",
            attempts,
            config.max_reconnect_attempts,
            config.reconnect_delay()
        );
        tokio::time::sleep(config.reconnect_delay()).await;
    }
}

/// 驱动一条已建立的传输：出站帧写入、入站帧分发、协议级心跳应答
async fn drive_connection(
    shared: &Arc<ClientShared>,
    ws: WsStream,
    mut outbound_rx: mpsc::UnboundedReceiver<ClientFrame>,
) -> Exit {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            frame = outbound_rx.recv() => match frame {
                Some(frame) => {
                    let json = match serde_json::to_string(&frame) {
                        Ok(json) => json,
                        Err(e) => {
                            log::error!("Failed to serialize outbound frame: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(json)).await {
                        log::warn!("Failed to send frame: {}", e);
                        return Exit::Lost;
                    }
                }
                None => {
                    // 出站通道被 disconnect() 关闭
                    let _ = sink.send(Message::Close(None)).await;
                    return Exit::Clean;
                }
            },

            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => handle_server_text(shared, &text),
                Some(Ok(Message::Ping(payload))) => {
                    if sink.send(Message::Pong(payload)).await.is_err() {
                        return Exit::Lost;
                    }
                }
                Some(Ok(Message::Close(reason))) => {
                    log::info!("Server closed connection: {:?}", reason);
                    return Exit::Lost;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    log::warn!("Transport error: {}", e);
                    return Exit::Lost;
                }
                None => {
                    return Exit::Lost;
                }
            },
        }
    }
}

/// 解析并分发一帧服务端消息
///
/// 负载不做 schema 校验，信封原样交给处理器；解析不了的帧只记日志。
fn handle_server_text(shared: &Arc<ClientShared>, text: &str) {
    let frame = match serde_json::from_str::<ServerFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            log::warn!(
                "Unparseable server frame: {} ({})",
                e,
                text.chars().take(128).collect::<String>()
            );
            return;
        }
    };

    let kind = frame.kind();
    match kind {
        EventKind::SellerJoined | EventKind::BuyerJoined => {
            // 加入确认：重入房间完成的标志，仅用于诊断日志
            log::info!(
                "Join acknowledged: {} ({})",
                kind,
                frame.envelope().data["room"].as_str().unwrap_or("?")
            );
        }
        EventKind::Pong => log::debug!("Pong received"),
        _ => log::debug!("{} received", kind),
    }

    shared.dispatcher.dispatch(kind, frame.envelope());
}
