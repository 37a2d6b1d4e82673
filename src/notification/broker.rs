//! 房间路由中心（RoomBroker）
//!
//! 职责：
//! 1. 管理所有 WebSocket 会话的发送通道
//! 2. 维护房间注册表：(角色, 主键) -> 会话列表
//! 3. 按房间路由订单事件到所有绑定的会话
//! 4. 统计信息（推送数/失败数/活跃会话数）
//!
//! 一个会话同一时刻至多绑定一个房间，重复绑定覆盖旧绑定。
//! 不做跨断线的消息缓存：会话不在线就收不到，消费方自行回源。

use super::message::{RoomId, ServerFrame};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// WebSocket 会话信息
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// 会话 ID
    pub session_id: Arc<str>,

    /// 当前绑定的房间（未加入任何房间时为 None）
    pub room: Option<RoomId>,

    /// 消息发送通道（发送序列化后的帧到 WebSocket 会话）
    pub sender: mpsc::UnboundedSender<String>,

    /// 连接时间
    pub connected_at: i64,

    /// 最后推送时间
    pub last_active: Arc<std::sync::atomic::AtomicI64>,
}

/// 房间路由中心
pub struct RoomBroker {
    /// 会话表：session_id -> SessionInfo
    sessions: DashMap<Arc<str>, SessionInfo>,

    /// 房间索引：room -> Vec<session_id>
    rooms: DashMap<RoomId, Vec<Arc<str>>>,

    /// 统计信息
    stats: Arc<BrokerStats>,
}

/// Broker 统计信息
#[derive(Debug, Default)]
pub struct BrokerStats {
    /// 已推送消息数
    pub messages_pushed: AtomicU64,

    /// 推送失败数
    pub messages_failed: AtomicU64,

    /// 无人订阅被丢弃的消息数
    pub messages_unrouted: AtomicU64,

    /// 当前会话数
    pub active_sessions: AtomicUsize,
}

impl RoomBroker {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            rooms: DashMap::new(),
            stats: Arc::new(BrokerStats::default()),
        }
    }

    /// 注册 WebSocket 会话
    ///
    /// 会话注册后尚未绑定任何房间，收不到任何订单事件。
    pub fn register_session(
        &self,
        session_id: impl Into<Arc<str>>,
        sender: mpsc::UnboundedSender<String>,
    ) {
        let session_id = session_id.into();

        let info = SessionInfo {
            session_id: session_id.clone(),
            room: None,
            sender,
            connected_at: chrono::Utc::now().timestamp(),
            last_active: Arc::new(std::sync::atomic::AtomicI64::new(
                chrono::Utc::now().timestamp(),
            )),
        };

        self.sessions.insert(session_id.clone(), info);
        self.stats.active_sessions.fetch_add(1, Ordering::Relaxed);

        log::info!("Session registered: {}", session_id);
    }

    /// 注销 WebSocket 会话（连接关闭时调用）
    pub fn unregister_session(&self, session_id: &str) {
        if let Some((_, info)) = self.sessions.remove(session_id) {
            if let Some(room) = info.room {
                self.detach_from_room(&room, session_id);
            }
            self.stats.active_sessions.fetch_sub(1, Ordering::Relaxed);
            log::info!("Session unregistered: {}", session_id);
        }
    }

    /// 绑定会话到房间（后绑定覆盖先绑定）
    ///
    /// 返回 `false` 表示会话不存在（已断开）。
    pub fn bind_room(&self, session_id: &str, room: RoomId) -> bool {
        let previous = match self.sessions.get_mut(session_id) {
            Some(mut info) => info.room.replace(room.clone()),
            None => {
                log::warn!("bind_room: unknown session {}", session_id);
                return false;
            }
        };

        if let Some(prev) = previous {
            if prev == room {
                log::debug!("Session {} re-joined room {}", session_id, room);
                return true;
            }
            self.detach_from_room(&prev, session_id);
            log::info!(
                "Session {} switched room {} -> {}",
                session_id,
                prev,
                room
            );
        }

        let session_key: Arc<str> = match self.sessions.get(session_id) {
            Some(info) => info.session_id.clone(),
            None => return false,
        };

        self.rooms
            .entry(room.clone())
            .or_insert_with(Vec::new)
            .push(session_key);

        log::info!("Session {} joined room {}", session_id, room);
        true
    }

    /// 会话当前绑定的房间
    pub fn session_room(&self, session_id: &str) -> Option<RoomId> {
        self.sessions
            .get(session_id)
            .and_then(|info| info.room.clone())
    }

    /// 发布事件到房间内的所有会话
    ///
    /// 序列化一次，扇出到每个绑定的会话。发送失败只计数和记日志，
    /// 不向调用方传播（死会话由 actor 停止时注销）。
    pub fn publish(&self, room: &RoomId, frame: &ServerFrame) {
        let json = match serde_json::to_string(frame) {
            Ok(json) => json,
            Err(e) => {
                log::error!("Failed to serialize {} frame: {}", frame.kind(), e);
                return;
            }
        };

        let session_ids = match self.rooms.get(room) {
            Some(ids) => ids.clone(),
            None => {
                self.stats.messages_unrouted.fetch_add(1, Ordering::Relaxed);
                log::debug!("No sessions in room {}, {} dropped", room, frame.kind());
                return;
            }
        };

        for session_id in &session_ids {
            let Some(session) = self.sessions.get(session_id.as_ref()) else {
                continue;
            };

            if let Err(e) = session.sender.send(json.clone()) {
                log::error!(
                    "Failed to push {} to session {}: {}",
                    frame.kind(),
                    session_id,
                    e
                );
                self.stats.messages_failed.fetch_add(1, Ordering::Relaxed);
            } else {
                self.stats.messages_pushed.fetch_add(1, Ordering::Relaxed);
                session
                    .last_active
                    .store(chrono::Utc::now().timestamp(), Ordering::Relaxed);
            }
        }
    }

    /// 直接推送一帧到指定会话（加入确认、pong）
    pub fn push_to_session(&self, session_id: &str, frame: &ServerFrame) {
        let Some(session) = self.sessions.get(session_id) else {
            return;
        };

        match serde_json::to_string(frame) {
            Ok(json) => {
                if session.sender.send(json).is_err() {
                    self.stats.messages_failed.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.stats.messages_pushed.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(e) => log::error!("Failed to serialize {} frame: {}", frame.kind(), e),
        }
    }

    /// 获取统计信息
    pub fn get_stats(&self) -> BrokerStatsSnapshot {
        BrokerStatsSnapshot {
            messages_pushed: self.stats.messages_pushed.load(Ordering::Relaxed),
            messages_failed: self.stats.messages_failed.load(Ordering::Relaxed),
            messages_unrouted: self.stats.messages_unrouted.load(Ordering::Relaxed),
            active_sessions: self.stats.active_sessions.load(Ordering::Relaxed),
            active_rooms: self.rooms.iter().filter(|e| !e.value().is_empty()).count(),
        }
    }

    fn detach_from_room(&self, room: &RoomId, session_id: &str) {
        if let Some(mut sessions) = self.rooms.get_mut(room) {
            sessions.retain(|sid| sid.as_ref() != session_id);
        }
        self.rooms.retain(|_room, sessions| !sessions.is_empty());
    }
}

impl Default for RoomBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// 统计信息快照
#[derive(Debug, Clone, Serialize)]
pub struct BrokerStatsSnapshot {
    pub messages_pushed: u64,
    pub messages_failed: u64,
    pub messages_unrouted: u64,
    pub active_sessions: usize,
    pub active_rooms: usize,
}
