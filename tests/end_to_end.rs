//! WebSocket sessions against a running server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use canvas_hub::protocol::TopicMode;
use canvas_hub::registry::{
    LockedRegistry, Registry, RegistryConfig, ShardedRegistry, Topic,
};
use canvas_hub::stats::HubStats;
use canvas_hub::{CanvasServer, ServerConfig};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Running<R: Registry> {
    addr: SocketAddr,
    registry: Arc<R>,
    stats: Arc<HubStats>,
    shutdown: CancellationToken,
    handle: JoinHandle<canvas_hub::Result<()>>,
}

impl<R: Registry> Running<R> {
    async fn start(config: ServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = CanvasServer::<R>::new(config.disable_stats());
        let registry = server.registry().clone();
        let stats = server.stats().clone();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(server.serve(listener, shutdown.clone()));

        Self {
            addr,
            registry,
            stats,
            shutdown,
            handle,
        }
    }

    /// Connect and wait until the session is subscribed
    async fn join(&self, room: &str) -> Client {
        let url = format!("ws://{}/ws/canvas/{}", self.addr, room);
        let (mut client, _) = tokio_tungstenite::connect_async(url).await.unwrap();

        // Echoes are only served once the session is registered
        client.send(Message::text("ready")).await.unwrap();
        assert_eq!(next(&mut client).await, Message::text("ready"));
        client
    }

    async fn stop(self) {
        self.shutdown.cancel();
        timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server should stop")
            .unwrap()
            .unwrap();
    }
}

async fn next(client: &mut Client) -> Message {
    timeout(Duration::from_secs(5), client.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("stream ended")
        .expect("websocket error")
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached");
}

async fn room_fan_out<R: Registry>() {
    let server = Running::<R>::start(ServerConfig::default()).await;

    // Use up ids so A gets 0x0102, whose two bytes differ in each byte order
    for _ in 0..0x0102 {
        let (id, _mailbox) = server.registry.allocate().unwrap();
        server.registry.delete_connection(id);
    }

    let mut a = server.join("room1").await;
    let mut b = server.join("room1").await;
    let mut c = server.join("room2").await;

    let room1 = Topic::from("/ws/canvas/room1");
    let a_id = server.registry.subscribers(&room1)[0].0;
    assert_eq!(a_id.get(), 0x0102);

    a.send(Message::binary(vec![0x00, 0x00, 0x00, 0x05]))
        .await
        .unwrap();

    let expected = [0x02u8, 0x01, 0x00, 0x00, 0x00, 0x05];
    assert_eq!(next(&mut b).await.into_data().as_ref(), &expected);
    assert_eq!(next(&mut a).await.into_data().as_ref(), &expected);

    assert!(timeout(Duration::from_millis(200), c.next()).await.is_err());

    server.stop().await;
}

async fn topic_is_full_path_by_default<R: Registry>() {
    let server = Running::<R>::start(ServerConfig::default()).await;
    let mut plain = server.join("room1").await;

    // Same room, different path spelling: a different topic
    let url = format!("ws://{}/ws/canvas/room1/", server.addr);
    let (mut slashed, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    slashed.send(Message::text("ready")).await.unwrap();
    next(&mut slashed).await;

    slashed
        .send(Message::binary(vec![0x00, 0x00, 0x00, 0x01]))
        .await
        .unwrap();
    next(&mut slashed).await;
    assert!(timeout(Duration::from_millis(200), plain.next())
        .await
        .is_err());

    server.stop().await;
}

async fn room_only_topics<R: Registry>() {
    let config = ServerConfig::default().topic_mode(TopicMode::RoomOnly);
    let server = Running::<R>::start(config).await;
    let mut plain = server.join("room1").await;

    let url = format!("ws://{}/ws/canvas/room1/", server.addr);
    let (mut slashed, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    slashed.send(Message::text("ready")).await.unwrap();
    next(&mut slashed).await;

    slashed
        .send(Message::binary(vec![0x00, 0x00, 0x00, 0x01]))
        .await
        .unwrap();
    let frame = next(&mut plain).await.into_data();
    assert_eq!(&frame[2..], &[0x00u8, 0x00, 0x00, 0x01]);

    server.stop().await;
}

async fn bad_path_refused<R: Registry>() {
    let server = Running::<R>::start(ServerConfig::default()).await;

    for path in ["/ws/canvas/abc", "/ws/canvas/room-1", "/ws/other/room1", "/"] {
        let url = format!("ws://{}{}", server.addr, path);
        match tokio_tungstenite::connect_async(url).await {
            Err(WsError::Http(response)) => assert_eq!(response.status(), StatusCode::NOT_FOUND),
            other => panic!("{} should be refused, got {:?}", path, other.map(|_| ())),
        }
    }

    assert_eq!(server.registry.allocated(), 0);
    let stats = server.stats.clone();
    wait_until(|| stats.snapshot().handshake_failures == 4).await;

    server.stop().await;
}

async fn encoded_path_accepted<R: Registry>() {
    let config = ServerConfig::default().topic_mode(TopicMode::RoomOnly);
    let server = Running::<R>::start(config).await;
    let mut plain = server.join("abCd").await;

    let url = format!("ws://{}/ws/canvas/ab%43d", server.addr);
    let (mut encoded, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    encoded.send(Message::text("ready")).await.unwrap();
    next(&mut encoded).await;

    assert_eq!(server.registry.subscribers(&Topic::from("abCd")).len(), 2);

    encoded
        .send(Message::binary(vec![0x00, 0x00, 0x00, 0x07]))
        .await
        .unwrap();
    let frame = next(&mut plain).await.into_data();
    assert_eq!(&frame[2..], &[0x00u8, 0x00, 0x00, 0x07]);

    server.stop().await;
}

async fn control_frames_echoed<R: Registry>() {
    let server = Running::<R>::start(ServerConfig::default()).await;
    let mut client = server.join("room1").await;

    client.send(Message::text("Hello Server!")).await.unwrap();
    assert_eq!(next(&mut client).await, Message::text("Hello Server!"));

    client
        .send(Message::Pong(vec![1, 2, 3].into()))
        .await
        .unwrap();
    assert_eq!(next(&mut client).await, Message::Pong(vec![1, 2, 3].into()));

    server.stop().await;
}

async fn malformed_frame_closes_session<R: Registry>() {
    let server = Running::<R>::start(ServerConfig::default()).await;
    let mut client = server.join("room1").await;
    assert_eq!(server.registry.channel_count(), 1);

    client
        .send(Message::binary(vec![0x00, 0x01, 0x02, 0x03, 0x04]))
        .await
        .unwrap();

    assert!(matches!(next(&mut client).await, Message::Close(_)));
    let registry = server.registry.clone();
    wait_until(|| registry.channel_count() == 0).await;
    assert_eq!(server.registry.subscription_count(), 0);
    assert_eq!(server.stats.snapshot().malformed_frames, 1);

    server.stop().await;
}

async fn exhausted_registry_rejects<R: Registry>() {
    let config =
        ServerConfig::default().registry(RegistryConfig::default().max_connections(1));
    let server = Running::<R>::start(config).await;
    let _first = server.join("room1").await;

    let url = format!("ws://{}/ws/canvas/room1", server.addr);
    let (mut second, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    match next(&mut second).await {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Again),
        other => panic!("expected close frame, got {:?}", other),
    }
    assert_eq!(server.stats.snapshot().connections_rejected, 1);

    server.stop().await;
}

async fn disconnect_cleans_up<R: Registry>() {
    let server = Running::<R>::start(ServerConfig::default()).await;
    let mut a = server.join("room1").await;
    let mut b = server.join("room1").await;
    assert_eq!(server.registry.channel_count(), 2);

    b.close(None).await.unwrap();
    let registry = server.registry.clone();
    wait_until(|| registry.channel_count() == 1).await;

    // The remaining subscriber still gets its own frames
    a.send(Message::binary(vec![0x00, 0x00, 0x01, 0x00]))
        .await
        .unwrap();
    let frame = next(&mut a).await.into_data();
    assert_eq!(&frame[2..], &[0x00u8, 0x00, 0x01, 0x00]);

    server.stop().await;
}

macro_rules! end_to_end {
    ($module:ident, $backend:ty) => {
        mod $module {
            use super::*;

            #[tokio::test]
            async fn test_room_fan_out() {
                room_fan_out::<$backend>().await;
            }

            #[tokio::test]
            async fn test_topic_is_full_path_by_default() {
                topic_is_full_path_by_default::<$backend>().await;
            }

            #[tokio::test]
            async fn test_room_only_topics() {
                room_only_topics::<$backend>().await;
            }

            #[tokio::test]
            async fn test_bad_path_refused() {
                bad_path_refused::<$backend>().await;
            }

            #[tokio::test]
            async fn test_encoded_path_accepted() {
                encoded_path_accepted::<$backend>().await;
            }

            #[tokio::test]
            async fn test_control_frames_echoed() {
                control_frames_echoed::<$backend>().await;
            }

            #[tokio::test]
            async fn test_malformed_frame_closes_session() {
                malformed_frame_closes_session::<$backend>().await;
            }

            #[tokio::test]
            async fn test_exhausted_registry_rejects() {
                exhausted_registry_rejects::<$backend>().await;
            }

            #[tokio::test]
            async fn test_disconnect_cleans_up() {
                disconnect_cleans_up::<$backend>().await;
            }
        }
    };
}

end_to_end!(locked, LockedRegistry);
end_to_end!(sharded, ShardedRegistry);
