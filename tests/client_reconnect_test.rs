//! 客户端连接管理集成测试
//!
//! 用裸 tokio-tungstenite 服务端模拟通知服务，可以按脚本接受连接、
//! 读帧、主动掐断，覆盖状态机、幂等连接、自动重入和有界重试。

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use zammer_notify::client::{ConnectionState, NotifyClient};
use zammer_notify::notification::Role;
use zammer_notify::utils::config::ClientConfig;

fn client_config(addr: SocketAddr) -> ClientConfig {
    ClientConfig {
        server_url: format!("ws://{}/ws", addr),
        max_reconnect_attempts: 2,
        reconnect_delay_ms: 50,
        connect_timeout_ms: 1000,
    }
}

async fn wait_for_state(client: &NotifyClient, state: ConnectionState, timeout_ms: u64) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    while tokio::time::Instant::now() < deadline {
        if client.state() == state {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));

    let counter = accepted.clone();
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut ws = accept_async(stream).await.unwrap();
                while ws.next().await.is_some() {}
            });
        }
    });

    let client = NotifyClient::new(client_config(addr));
    client.connect();
    assert!(wait_for_state(&client, ConnectionState::Connected, 2000).await);

    let socket_id = client.status().socket_id;
    assert!(socket_id.is_some());

    // 已连接时重复 connect 不建立第二条连接
    client.connect();
    client.connect();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(client.status().socket_id, socket_id);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_disconnect_closes_cleanly_without_retry() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));

    let counter = accepted.clone();
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut ws = accept_async(stream).await.unwrap();
                while ws.next().await.is_some() {}
            });
        }
    });

    let client = NotifyClient::new(client_config(addr));
    client.connect();
    assert!(wait_for_state(&client, ConnectionState::Connected, 2000).await);

    client.disconnect();
    assert_eq!(client.state(), ConnectionState::Disconnected);

    // 主动断开不触发重连
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_auto_resubscribe_after_server_drop() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // 服务端脚本：第一条连接收到加入帧后掐断，后续连接把收到的帧转发出来
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<(usize, String)>();
    tokio::spawn(async move {
        let mut conn_index = 0usize;
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            conn_index += 1;
            let index = conn_index;
            let tx = frame_tx.clone();
            tokio::spawn(async move {
                let mut ws = accept_async(stream).await.unwrap();
                while let Some(Ok(msg)) = ws.next().await {
                    if let Message::Text(text) = msg {
                        let _ = tx.send((index, text));
                        if index == 1 {
                            // 模拟服务端崩溃
                            return;
                        }
                    }
                }
            });
        }
    });

    let client = NotifyClient::new(client_config(addr));
    client.connect();
    assert!(wait_for_state(&client, ConnectionState::Connected, 2000).await);
    assert!(client.join_seller_room("s1"));

    let (index, first_join) = frame_rx.recv().await.unwrap();
    assert_eq!(index, 1);
    assert!(first_join.contains(r#""event":"seller-join""#));
    assert!(first_join.contains(r#""sellerId":"s1""#));

    // 第二条连接上的加入帧是客户端自动重发的
    let (index, second_join) =
        tokio::time::timeout(Duration::from_secs(5), frame_rx.recv())
            .await
            .expect("expected automatic re-join after reconnect")
            .unwrap();
    assert_eq!(index, 2);
    assert!(second_join.contains(r#""event":"seller-join""#));
    assert!(second_join.contains(r#""sellerId":"s1""#));

    assert!(wait_for_state(&client, ConnectionState::Connected, 2000).await);
    let status = client.status();
    assert_eq!(status.role, Some(Role::Seller));
    assert_eq!(status.id.as_deref(), Some("s1"));
}

#[tokio::test]
async fn test_bounded_retry_enters_failed() {
    // 占一个端口再释放，保证连接被立即拒绝
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = NotifyClient::new(client_config(addr));
    client.connect();

    assert!(wait_for_state(&client, ConnectionState::Failed, 5000).await);

    let status = client.status();
    // 预算 2 次重连 = 共 3 次连接尝试
    assert_eq!(status.reconnect_attempts, 3);

    // Failed 是终态，不再自行重试
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(client.state(), ConnectionState::Failed);
}

#[tokio::test]
async fn test_explicit_reconnect_leaves_failed_state() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = NotifyClient::new(client_config(addr));
    client.connect();
    assert!(wait_for_state(&client, ConnectionState::Failed, 5000).await);

    // 端口重新开放后显式重连成功
    let listener = TcpListener::bind(addr).await.unwrap();
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::spawn(async move {
                let mut ws = accept_async(stream).await.unwrap();
                while ws.next().await.is_some() {}
            });
        }
    });

    client.reconnect();
    assert!(wait_for_state(&client, ConnectionState::Connected, 2000).await);
    assert_eq!(client.status().reconnect_attempts, 0);
}

#[tokio::test]
async fn test_events_fan_out_to_all_subscribers() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(Message::Text(
            r#"{"event":"new-order","success":true,"data":{"orderNumber":"ORD-9"}}"#.to_string(),
        ))
        .await
        .unwrap();
        while ws.next().await.is_some() {}
    });

    let client = NotifyClient::new(client_config(addr));

    let (tx, mut rx) = mpsc::unbounded_channel::<(&'static str, String)>();
    let tx_a = tx.clone();
    let _sub_a = client.on_new_order(move |env| {
        let _ = tx_a.send(("a", env.data["orderNumber"].to_string()));
    });
    let tx_b = tx.clone();
    let _sub_b = client.on_new_order(move |env| {
        let _ = tx_b.send(("b", env.data["orderNumber"].to_string()));
    });

    client.connect();
    assert!(wait_for_state(&client, ConnectionState::Connected, 2000).await);

    // 两个独立订阅方各收到一次
    let mut seen = Vec::new();
    for _ in 0..2 {
        let (tag, order) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("handler not invoked")
            .unwrap();
        assert_eq!(order, r#""ORD-9""#);
        seen.push(tag);
    }
    assert_eq!(seen, vec!["a", "b"]);
}

#[tokio::test]
async fn test_buyer_and_seller_status_events_stay_distinct() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        // 买家侧事件名
        ws.send(Message::Text(
            r#"{"event":"order-status-update","data":{"orderNumber":"ORD-5","status":"shipped"}}"#
                .to_string(),
        ))
        .await
        .unwrap();
        while ws.next().await.is_some() {}
    });

    let client = NotifyClient::new(client_config(addr));

    let (tx, mut rx) = mpsc::unbounded_channel::<&'static str>();
    let tx_buyer = tx.clone();
    let _buyer = client.on_order_status_update(move |_| {
        let _ = tx_buyer.send("buyer");
    });
    let tx_seller = tx.clone();
    let _seller = client.on_order_status_updated(move |_| {
        let _ = tx_seller.send("seller");
    });

    client.connect();
    assert!(wait_for_state(&client, ConnectionState::Connected, 2000).await);

    let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("buyer handler not invoked")
        .unwrap();
    assert_eq!(first, "buyer");

    // 卖家侧处理器没有被错误触发
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_later_join_overwrites_identity() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                let _ = frame_tx.send(text);
            }
        }
    });

    let client = NotifyClient::new(client_config(addr));
    client.connect();
    assert!(wait_for_state(&client, ConnectionState::Connected, 2000).await);

    assert!(client.join_seller_room("s1"));
    assert!(client.join_buyer_room("u1"));

    let first = frame_rx.recv().await.unwrap();
    let second = frame_rx.recv().await.unwrap();
    assert!(first.contains("seller-join"));
    assert!(second.contains("buyer-join"));

    // 后加入者覆盖先加入者，断线重连只重入最新房间
    let status = client.status();
    assert_eq!(status.role, Some(Role::Buyer));
    assert_eq!(status.id.as_deref(), Some("u1"));
}
