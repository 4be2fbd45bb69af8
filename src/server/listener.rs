//! Hub server listener
//!
//! Handles the TCP accept loop and spawns a session per connection.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::error::Result;
use crate::hub::Hub;
use crate::server::config::ServerConfig;
use crate::server::session::Session;

/// TCP front end for a [`Hub`]
pub struct HubServer {
    config: ServerConfig,
    hub: Arc<Hub>,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl HubServer {
    /// Create a new server for the given hub
    ///
    /// The hub is shared, not owned: starting and stopping it stays with the
    /// caller.
    pub fn new(config: ServerConfig, hub: Arc<Hub>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            hub,
            connection_semaphore,
        }
    }

    /// Get a reference to the hub
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Run the server
    ///
    /// Accepts connections until the process exits; returns early only if
    /// binding fails.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Hub server listening");

        self.accept_loop(&listener).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Hub server listening");

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        }
    }

    /// Serve connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(addr = %addr, "Hub server listening");
        }

        self.accept_loop(&listener).await
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(error = %e, "Failed to configure socket");
            return;
        }

        let config = self.config.clone();
        let hub = Arc::clone(&self.hub);

        tokio::spawn(async move {
            // Held for the lifetime of the session
            let _permit = permit;

            if let Err(e) = Session::run(socket, peer_addr, config, hub).await {
                tracing::debug!(peer = %peer_addr, error = %e, "Session error");
            }
        });
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{json, Value};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
    use tokio::task::JoinHandle;

    use crate::hub::HubConfig;

    use super::*;

    struct TestClient {
        reader: BufReader<OwnedReadHalf>,
        writer: OwnedWriteHalf,
    }

    impl TestClient {
        async fn connect(addr: SocketAddr) -> Self {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (read_half, writer) = stream.into_split();
            Self {
                reader: BufReader::new(read_half),
                writer,
            }
        }

        async fn send(&mut self, frame: Value) {
            let mut line = serde_json::to_vec(&frame).unwrap();
            line.push(b'\n');
            self.writer.write_all(&line).await.unwrap();
        }

        async fn send_raw(&mut self, raw: &[u8]) {
            self.writer.write_all(raw).await.unwrap();
        }

        async fn recv(&mut self) -> Value {
            let mut line = String::new();
            let n = tokio::time::timeout(Duration::from_secs(2), self.reader.read_line(&mut line))
                .await
                .expect("timed out waiting for frame")
                .unwrap();
            assert!(n > 0, "connection closed");
            serde_json::from_str(&line).unwrap()
        }

        /// Receive frames until one of the given type arrives
        async fn recv_type(&mut self, frame_type: &str) -> Value {
            loop {
                let frame = self.recv().await;
                if frame["type"] == frame_type {
                    return frame;
                }
            }
        }

        async fn expect_silence(&mut self) {
            let mut line = String::new();
            let read =
                tokio::time::timeout(Duration::from_millis(100), self.reader.read_line(&mut line))
                    .await;
            assert!(read.is_err(), "unexpected frame: {}", line);
        }

        async fn expect_closed(&mut self) {
            let mut line = String::new();
            loop {
                line.clear();
                let n = tokio::time::timeout(Duration::from_secs(2), self.reader.read_line(&mut line))
                    .await
                    .expect("connection not closed")
                    .unwrap_or(0);
                if n == 0 {
                    return;
                }
            }
        }
    }

    async fn start_server(
        hub: Arc<Hub>,
        config: ServerConfig,
    ) -> (SocketAddr, JoinHandle<Result<()>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = HubServer::new(config, hub);
        let handle = tokio::spawn(async move { server.serve(listener).await });
        (addr, handle)
    }

    async fn started_hub() -> Arc<Hub> {
        let hub = Arc::new(Hub::new());
        hub.start().await;
        hub
    }

    #[tokio::test]
    async fn test_welcome_and_ping() {
        let hub = started_hub().await;
        let (addr, server) = start_server(Arc::clone(&hub), ServerConfig::default()).await;

        let mut client = TestClient::connect(addr).await;
        let welcome = client.recv().await;
        assert_eq!(welcome["type"], "welcome");
        assert!(welcome["connection_id"].is_u64());

        client.send(json!({"type": "ping"})).await;
        assert_eq!(client.recv().await, json!({"type": "pong"}));

        assert_eq!(hub.connection_count().await, 1);
        server.abort();
    }

    #[tokio::test]
    async fn test_room_broadcast_over_tcp() {
        let hub = started_hub().await;
        let (addr, server) = start_server(Arc::clone(&hub), ServerConfig::default()).await;

        let mut alice = TestClient::connect(addr).await;
        let mut bob = TestClient::connect(addr).await;
        let mut carol = TestClient::connect(addr).await;
        for client in [&mut alice, &mut bob, &mut carol] {
            client.recv_type("welcome").await;
        }

        for client in [&mut alice, &mut bob] {
            client.send(json!({"type": "join", "room": "ops"})).await;
            assert_eq!(
                client.recv().await,
                json!({"type": "joined", "room": "ops"})
            );
        }

        alice
            .send(json!({"type": "publish", "room": "ops", "payload": {"text": "hi"}}))
            .await;

        let published = alice.recv_type("published").await;
        assert_eq!(published["attempted"], 2);
        assert_eq!(published["delivered"], 2);
        assert_eq!(published["pruned"], json!([]));

        let message = bob.recv().await;
        assert_eq!(message["type"], "message");
        assert_eq!(message["room"], "ops");
        assert_eq!(message["payload"], json!({"text": "hi"}));

        carol.expect_silence().await;
        server.abort();
    }

    #[tokio::test]
    async fn test_disconnect_unregisters() {
        let hub = started_hub().await;
        let (addr, server) = start_server(Arc::clone(&hub), ServerConfig::default()).await;

        let mut client = TestClient::connect(addr).await;
        client.recv_type("welcome").await;
        client.send(json!({"type": "join", "room": "ops"})).await;
        client.recv_type("joined").await;
        assert_eq!(hub.room_count().await, 1);

        drop(client);

        for _ in 0..50 {
            if hub.connection_count().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(hub.connection_count().await, 0);
        assert_eq!(hub.room_count().await, 0);
        server.abort();
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_connection() {
        let hub = started_hub().await;
        let (addr, server) = start_server(Arc::clone(&hub), ServerConfig::default()).await;

        let mut client = TestClient::connect(addr).await;
        client.recv_type("welcome").await;

        client.send_raw(b"{not json}\n").await;
        let error = client.recv().await;
        assert_eq!(error["type"], "error");

        client.send(json!({"type": "join", "room": ""})).await;
        assert_eq!(client.recv().await["type"], "error");

        client.send(json!({"type": "ping"})).await;
        assert_eq!(client.recv().await["type"], "pong");
        server.abort();
    }

    #[tokio::test]
    async fn test_oversize_frame_closes_connection() {
        let hub = started_hub().await;
        let config = ServerConfig::default().max_frame_len(32);
        let (addr, server) = start_server(Arc::clone(&hub), config).await;

        let mut client = TestClient::connect(addr).await;
        client.recv_type("welcome").await;

        let mut big = vec![b'x'; 100];
        big.push(b'\n');
        client.send_raw(&big).await;

        let error = client.recv().await;
        assert_eq!(error["type"], "error");
        client.expect_closed().await;
        server.abort();
    }

    #[tokio::test]
    async fn test_publish_rejected_when_stopped() {
        let hub = started_hub().await;
        let (addr, server) = start_server(Arc::clone(&hub), ServerConfig::default()).await;

        let mut client = TestClient::connect(addr).await;
        client.recv_type("welcome").await;

        hub.stop().await;

        client
            .send(json!({"type": "publish", "payload": "late"}))
            .await;
        let error = client.recv().await;
        assert_eq!(error["type"], "error");
        assert_eq!(error["message"], "Hub is not active");

        client.send(json!({"type": "status"})).await;
        let status = client.recv().await;
        assert_eq!(status["type"], "status");
        assert_eq!(status["active"], false);
        assert_eq!(status["connection_count"], 1);

        // New connections are refused with an error frame
        let mut late = TestClient::connect(addr).await;
        assert_eq!(late.recv().await["type"], "error");
        late.expect_closed().await;
        server.abort();
    }

    #[tokio::test]
    async fn test_history_and_replay() {
        let hub = started_hub().await;
        let config = ServerConfig::default().history_replay(2);
        let (addr, server) = start_server(Arc::clone(&hub), config).await;

        for n in 0..3 {
            hub.broadcast(json!(n), Some("ops")).await.unwrap();
        }
        hub.broadcast(json!("global"), None).await.unwrap();

        let mut client = TestClient::connect(addr).await;
        client.recv_type("welcome").await;

        client.send(json!({"type": "join", "room": "ops"})).await;
        assert_eq!(client.recv().await["type"], "joined");
        assert_eq!(client.recv().await["payload"], json!(1));
        assert_eq!(client.recv().await["payload"], json!(2));

        client
            .send(json!({"type": "history", "limit": 10}))
            .await;
        let history = client.recv_type("history").await;
        let payloads: Vec<Value> = history["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["payload"].clone())
            .collect();
        assert_eq!(payloads, vec![json!(0), json!(1), json!(2), json!("global")]);

        client
            .send(json!({"type": "history", "room": "ops", "limit": 1}))
            .await;
        let history = client.recv_type("history").await;
        assert_eq!(history["messages"].as_array().unwrap().len(), 1);
        assert_eq!(history["messages"][0]["payload"], json!(2));
        server.abort();
    }

    #[tokio::test]
    async fn test_server_connection_limit() {
        let hub = started_hub().await;
        let config = ServerConfig::default().max_connections(1);
        let (addr, server) = start_server(Arc::clone(&hub), config).await;

        let mut first = TestClient::connect(addr).await;
        first.recv_type("welcome").await;

        let mut second = TestClient::connect(addr).await;
        second.expect_closed().await;

        assert_eq!(hub.connection_count().await, 1);
        server.abort();
    }

    #[tokio::test]
    async fn test_idle_timeout_disconnects() {
        let hub = started_hub().await;
        let config = ServerConfig::default().idle_timeout(Duration::from_millis(100));
        let (addr, server) = start_server(Arc::clone(&hub), config).await;

        let mut client = TestClient::connect(addr).await;
        client.recv_type("welcome").await;
        client.expect_closed().await;

        for _ in 0..50 {
            if hub.connection_count().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(hub.connection_count().await, 0);
        server.abort();
    }

    #[tokio::test]
    async fn test_room_traffic_keeps_listener_alive() {
        let hub = started_hub().await;
        let config = ServerConfig::default().idle_timeout(Duration::from_millis(300));
        let (addr, server) = start_server(Arc::clone(&hub), config).await;

        let mut listener = TestClient::connect(addr).await;
        listener.recv_type("welcome").await;
        listener.send(json!({"type": "join", "room": "ops"})).await;
        listener.recv_type("joined").await;

        for n in 0..6 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            hub.broadcast(json!(n), Some("ops")).await.unwrap();
            let message = listener.recv_type("message").await;
            assert_eq!(message["payload"], json!(n));
        }
        assert_eq!(hub.connection_count().await, 1);

        listener.expect_closed().await;
        server.abort();
    }

    #[tokio::test]
    async fn test_hub_limit_from_config() {
        let hub = Arc::new(Hub::with_config(HubConfig::default().max_connections(1)));
        hub.start().await;
        let (addr, server) = start_server(Arc::clone(&hub), ServerConfig::default()).await;

        let mut first = TestClient::connect(addr).await;
        first.recv_type("welcome").await;

        let mut second = TestClient::connect(addr).await;
        let error = second.recv().await;
        assert_eq!(error["type"], "error");
        assert_eq!(error["message"], "Connection limit reached (1)");
        server.abort();
    }
}
