//! 事件分发器
//!
//! 每个事件名维护一个按注册顺序排列的处理器列表，多个独立订阅方
//! 可以共存，各自通过返回的 `Subscription` 句柄单独退订。
//! （单槽位"后注册者挤掉先注册者"的旧行为是多路复用缺陷，这里
//! 有意替换为多订阅方注册表。）
//!
//! 处理器在连接的读任务上被同步调用，不应阻塞。

use crate::notification::{Envelope, EventKind};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 事件处理器
pub type Handler = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// 订阅句柄，用于单独退订
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    id: u64,
    kind: EventKind,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

/// 事件分发器
pub struct EventDispatcher {
    /// 处理器表：事件 -> [(订阅ID, 处理器)]，保持注册顺序
    handlers: DashMap<EventKind, Vec<(u64, Handler)>>,

    /// 订阅 ID 生成器
    next_id: AtomicU64,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// 订阅一个事件
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.handlers
            .entry(kind)
            .or_insert_with(Vec::new)
            .push((id, Arc::new(handler)));

        log::debug!("Subscribed to {} (subscription {})", kind, id);
        Subscription { id, kind }
    }

    /// 退订单个订阅；句柄已失效时为空操作
    pub fn unsubscribe(&self, subscription: &Subscription) {
        if let Some(mut handlers) = self.handlers.get_mut(&subscription.kind) {
            handlers.retain(|(id, _)| *id != subscription.id);
        }
        log::debug!(
            "Unsubscribed from {} (subscription {})",
            subscription.kind,
            subscription.id
        );
    }

    /// 移除某个事件的全部处理器；没有注册时为空操作
    pub fn remove_listeners(&self, kind: EventKind) {
        self.handlers.remove(&kind);
        log::debug!("Removed all listeners for {}", kind);
    }

    /// 移除全部处理器（断开连接时自动调用）
    pub fn clear(&self) {
        self.handlers.clear();
        log::debug!("All listeners removed");
    }

    /// 按注册顺序调用某事件的所有处理器
    pub fn dispatch(&self, kind: EventKind, envelope: &Envelope) {
        // 先拷出处理器再调用，处理器内部可以安全地订阅/退订
        let handlers: Vec<Handler> = match self.handlers.get(&kind) {
            Some(entry) => entry.iter().map(|(_, h)| h.clone()).collect(),
            None => {
                log::trace!("No listeners for {}, event dropped", kind);
                return;
            }
        };

        for handler in handlers {
            handler(envelope);
        }
    }

    /// 某事件的处理器数量
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, |h| h.len())
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
