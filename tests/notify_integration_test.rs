//! 通知服务端到端集成测试
//!
//! 在独立线程上跑完整的 actix 服务（WebSocket + HTTP 诊断接口），
//! 与测试共享同一个 RoomBroker，业务发布直接走 broker。

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use actix_web::{web, App, HttpServer};
use zammer_notify::notification::{
    NewOrderNotify, OrderStatusNotify, RoomBroker, RoomId,
};
use zammer_notify::service::http;
use zammer_notify::service::websocket::{ws_route, NotificationServer};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 在独立线程上启动服务，返回共享的 broker 和监听地址
fn spawn_server() -> (Arc<RoomBroker>, SocketAddr) {
    let broker = Arc::new(RoomBroker::new());
    let (addr_tx, addr_rx) = std::sync::mpsc::channel();

    let server_broker = broker.clone();
    std::thread::spawn(move || {
        actix_web::rt::System::new().block_on(async move {
            let ws_server = Arc::new(NotificationServer::new(server_broker.clone()));
            let broker_data = server_broker.clone();

            let server = HttpServer::new(move || {
                App::new()
                    .app_data(web::Data::new(ws_server.clone()))
                    .app_data(web::Data::new(broker_data.clone()))
                    .route("/ws", web::get().to(ws_route))
                    .configure(http::configure)
            })
            .workers(1)
            .bind("127.0.0.1:0")
            .expect("failed to bind test server");

            let addr = server.addrs()[0];
            addr_tx.send(addr).unwrap();

            server.run().await.unwrap();
        });
    });

    let addr = addr_rx.recv().expect("server failed to start");
    (broker, addr)
}

async fn connect_ws(addr: SocketAddr) -> WsClient {
    let (ws, _) = connect_async(format!("ws://{}/ws", addr))
        .await
        .expect("failed to connect");
    ws
}

/// 读下一条文本帧，跳过协议级心跳
async fn next_text(ws: &mut WsClient) -> String {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("connection closed")
            .expect("transport error");

        match msg {
            Message::Text(text) => return text,
            Message::Ping(payload) => {
                let _ = ws.send(Message::Pong(payload)).await;
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn test_join_ack_and_order_delivery() {
    let (broker, addr) = spawn_server();
    let mut ws = connect_ws(addr).await;

    ws.send(Message::Text(
        r#"{"event":"seller-join","sellerId":"s1"}"#.to_string(),
    ))
    .await
    .unwrap();

    // 加入确认带房间标签和会话 ID
    let ack = next_text(&mut ws).await;
    assert!(ack.contains(r#""event":"seller-joined""#));
    assert!(ack.contains(r#""room":"seller:s1""#));
    assert!(ack.contains("sessionId"));

    // 业务侧发布新订单，房间内的连接收到推送
    let frame = NewOrderNotify {
        order_id: "65b2".to_string(),
        order_number: "ORD-2002".to_string(),
        status: "pending".to_string(),
        total_price: 499.0,
        user: serde_json::json!({"name": "buyer one"}),
        order_items: vec![serde_json::json!({"qty": 1})],
        created_at: "2025-08-25T10:00:00Z".to_string(),
    }
    .into_frame();
    broker.publish(&RoomId::seller("s1"), &frame);

    let pushed = next_text(&mut ws).await;
    assert!(pushed.contains(r#""event":"new-order""#));
    assert!(pushed.contains(r#""orderNumber":"ORD-2002""#));
}

#[tokio::test]
async fn test_room_isolation_between_connections() {
    let (broker, addr) = spawn_server();
    let mut seller_one = connect_ws(addr).await;
    let mut seller_two = connect_ws(addr).await;

    seller_one
        .send(Message::Text(
            r#"{"event":"seller-join","sellerId":"s1"}"#.to_string(),
        ))
        .await
        .unwrap();
    seller_two
        .send(Message::Text(
            r#"{"event":"seller-join","sellerId":"s2"}"#.to_string(),
        ))
        .await
        .unwrap();
    next_text(&mut seller_one).await;
    next_text(&mut seller_two).await;

    let frame = OrderStatusNotify {
        order_id: "65a1".to_string(),
        order_number: "ORD-1001".to_string(),
        status: "shipped".to_string(),
        previous_status: Some("processing".to_string()),
    }
    .into_seller_frame();
    broker.publish(&RoomId::seller("s1"), &frame);

    let pushed = next_text(&mut seller_one).await;
    assert!(pushed.contains(r#""event":"order-status-updated""#));
    assert!(pushed.contains("ORD-1001"));

    // s2 的连接不能收到 s1 房间的事件
    let leaked = tokio::time::timeout(Duration::from_millis(300), seller_two.next()).await;
    match leaked {
        Err(_) => {}
        Ok(Some(Ok(Message::Ping(_)))) => {}
        Ok(other) => panic!("seller s2 unexpectedly received: {:?}", other),
    }
}

#[tokio::test]
async fn test_ping_pong_keeps_connection_alive() {
    let (_broker, addr) = spawn_server();
    let mut ws = connect_ws(addr).await;

    ws.send(Message::Text(r#"{"event":"ping"}"#.to_string()))
        .await
        .unwrap();

    let reply = next_text(&mut ws).await;
    assert!(reply.contains(r#""event":"pong""#));
}

#[tokio::test]
async fn test_unparseable_frame_does_not_kill_session() {
    let (broker, addr) = spawn_server();
    let mut ws = connect_ws(addr).await;

    ws.send(Message::Text("not json at all".to_string()))
        .await
        .unwrap();

    // 畸形帧只记日志，连接存活且仍可正常加入
    ws.send(Message::Text(
        r#"{"event":"buyer-join","userId":"u1"}"#.to_string(),
    ))
    .await
    .unwrap();

    let ack = next_text(&mut ws).await;
    assert!(ack.contains(r#""event":"buyer-joined""#));
    assert!(ack.contains(r#""room":"buyer:u1""#));

    let frame = OrderStatusNotify {
        order_id: "65a1".to_string(),
        order_number: "ORD-3003".to_string(),
        status: "delivered".to_string(),
        previous_status: None,
    }
    .into_buyer_frame();
    broker.publish(&RoomId::buyer("u1"), &frame);

    let pushed = next_text(&mut ws).await;
    assert!(pushed.contains(r#""event":"order-status-update""#));
}

#[tokio::test]
async fn test_http_health_and_stats() {
    let (_broker, addr) = spawn_server();
    let mut ws = connect_ws(addr).await;

    ws.send(Message::Text(
        r#"{"event":"seller-join","sellerId":"s1"}"#.to_string(),
    ))
    .await
    .unwrap();
    next_text(&mut ws).await;

    let health: serde_json::Value = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["service"], "zammer-notify");

    let stats: serde_json::Value = reqwest::get(format!("http://{}/api/stats", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["success"], true);
    assert_eq!(stats["data"]["active_sessions"], 1);
    assert_eq!(stats["data"]["active_rooms"], 1);
}

#[tokio::test]
async fn test_notify_client_against_real_server() {
    use zammer_notify::client::{ConnectionState, NotifyClient};
    use zammer_notify::utils::config::ClientConfig;

    let (broker, addr) = spawn_server();

    let client = NotifyClient::new(ClientConfig {
        server_url: format!("ws://{}/ws", addr),
        max_reconnect_attempts: 2,
        reconnect_delay_ms: 50,
        connect_timeout_ms: 1000,
    });

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    let _sub = client.on_new_order(move |env| {
        let _ = tx.send(env.data["orderNumber"].as_str().unwrap_or("").to_string());
    });

    client.connect();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while client.state() != ConnectionState::Connected {
        assert!(tokio::time::Instant::now() < deadline, "connect timed out");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(client.join_seller_room("s1"));

    // 等服务端完成房间绑定再发布
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while broker.get_stats().active_rooms == 0 {
        assert!(tokio::time::Instant::now() < deadline, "join not processed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let frame = NewOrderNotify {
        order_id: "65c3".to_string(),
        order_number: "ORD-4004".to_string(),
        status: "pending".to_string(),
        total_price: 89.0,
        user: serde_json::json!({"name": "buyer two"}),
        order_items: vec![serde_json::json!({"qty": 3})],
        created_at: "2025-08-25T11:00:00Z".to_string(),
    }
    .into_frame();
    broker.publish(&RoomId::seller("s1"), &frame);

    let order = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("notification not delivered")
        .unwrap();
    assert_eq!(order, "ORD-4004");
}
