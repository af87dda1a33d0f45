//! 聊天服务器核心实现
//!
//! 同时监听控制台终端（TCP）和 WebSocket 终端，两种连接共享同一个路由器。

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use protocol::{TcpListener, TransportListener};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::console::handle_console;
use crate::router::Router;
use crate::websocket::handle_websocket;

/// 优雅关闭时等待连接退出的最长时间
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// 当前连接计数
struct ConnectionCounter {
    count: AtomicUsize,
    max: usize,
}

impl ConnectionCounter {
    fn new(max: usize) -> Self {
        Self {
            count: AtomicUsize::new(0),
            max,
        }
    }

    /// 增加连接数，如果超过限制则返回 false
    fn try_add_connection(&self) -> bool {
        loop {
            let current = self.count.load(Ordering::SeqCst);
            if current >= self.max {
                return false;
            }
            if self
                .count
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// 减少连接数
    fn remove_connection(&self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }

    fn current(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

/// 聊天服务器
pub struct ChatServer {
    config: ServerConfig,
    router: Arc<Router>,
    connections: Arc<ConnectionCounter>,
    /// 关闭信号发送端
    shutdown_tx: watch::Sender<bool>,
    /// 关闭信号接收端（用于克隆给连接处理器）
    shutdown_rx: watch::Receiver<bool>,
}

impl ChatServer {
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            connections: Arc::new(ConnectionCounter::new(config.max_connections)),
            config,
            router: Arc::new(Router::new()),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// 绑定配置中的地址并运行，直到收到 Ctrl+C
    pub async fn run(&self) -> anyhow::Result<()> {
        let console = TcpListener::bind(&self.config.console_addr).await?;
        let websocket = tokio::net::TcpListener::bind(&self.config.websocket_addr).await?;

        self.serve(console, websocket, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
        })
        .await
    }

    /// 在已绑定的监听器上提供服务，`shutdown` 完成时优雅关闭
    pub async fn serve<F>(
        &self,
        console: TcpListener,
        websocket: tokio::net::TcpListener,
        shutdown: F,
    ) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        info!("Console terminal listening on {}", console.local_addr()?);
        info!("WebSocket terminal listening on {}", websocket.local_addr()?);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = console.accept() => {
                    match result {
                        Ok(transport) => {
                            if !self.connections.try_add_connection() {
                                warn!("Connection limit reached, rejecting console connection");
                                continue;
                            }

                            let router = Arc::clone(&self.router);
                            let connections = Arc::clone(&self.connections);
                            let shutdown_rx = self.shutdown_rx.clone();

                            tokio::spawn(async move {
                                if let Err(e) = handle_console(transport, router, shutdown_rx).await {
                                    debug!("Console handler error: {}", e);
                                }
                                connections.remove_connection();
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept console connection: {}", e);
                        }
                    }
                }

                result = websocket.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if !self.connections.try_add_connection() {
                                warn!("Connection limit reached, rejecting WebSocket connection from {}", addr);
                                continue;
                            }

                            let router = Arc::clone(&self.router);
                            let connections = Arc::clone(&self.connections);
                            let shutdown_rx = self.shutdown_rx.clone();

                            tokio::spawn(async move {
                                if let Err(e) = handle_websocket(stream, addr, router, shutdown_rx).await {
                                    debug!("WebSocket handler error: {}", e);
                                }
                                connections.remove_connection();
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept WebSocket connection: {}", e);
                        }
                    }
                }

                _ = &mut shutdown => {
                    info!("Received shutdown signal, initiating graceful shutdown...");
                    self.shutdown().await;
                    break;
                }
            }
        }

        Ok(())
    }

    /// 执行 graceful shutdown
    async fn shutdown(&self) {
        info!(
            "{} sessions online at shutdown",
            self.router.registry().online_count().await
        );

        // 通知所有连接处理器退出，各自完成登出清理
        let _ = self.shutdown_tx.send(true);

        let start = Instant::now();
        while self.connections.current() > 0 {
            if start.elapsed() > SHUTDOWN_GRACE {
                warn!(
                    "Shutdown timeout, {} connections still active",
                    self.connections.current()
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        info!("Server shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use protocol::{
        Connection, Inbound, Message, TcpTransport, Terminal, TextCodec, Transport,
        TransportConfig,
    };
    use tokio::sync::oneshot;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    #[test]
    fn test_connection_counter_limit() {
        let counter = ConnectionCounter::new(2);
        assert!(counter.try_add_connection());
        assert!(counter.try_add_connection());
        assert!(!counter.try_add_connection());
        counter.remove_connection();
        assert!(counter.try_add_connection());
        assert_eq!(counter.current(), 2);
    }

    /// 控制台收到的下一条原生消息
    async fn next_native<R, W>(conn: &mut Connection<R, W>) -> Message
    where
        R: tokio::io::AsyncRead + Unpin,
        W: tokio::io::AsyncWrite + Unpin,
    {
        match conn.recv().await.unwrap() {
            Inbound::Message(msg) => msg,
            other => panic!("Unexpected inbound: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_console_connection_ends_after_logout() {
        let console = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let websocket = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let console_addr = console.local_addr().unwrap().to_string();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server_handle = tokio::spawn(async move {
            let server = ChatServer::new(ServerConfig::default());
            server
                .serve(console, websocket, async {
                    let _ = stop_rx.await;
                })
                .await
        });

        let config = TransportConfig::default();
        let mut alice = Connection::new(TcpTransport::connect(&console_addr, &config).await.unwrap());
        alice
            .send(&Message::login("alice", Terminal::Console, 0))
            .await
            .unwrap();
        assert_eq!(next_native(&mut alice).await.content, "connected to server...");

        let mut bob = Connection::new(TcpTransport::connect(&console_addr, &config).await.unwrap());
        bob.send(&Message::login("bob", Terminal::Console, 0)).await.unwrap();
        assert_eq!(next_native(&mut bob).await.content, "connected to server...");
        assert_eq!(next_native(&mut alice).await.content, "bob joined the room...");

        // LOGOUT 之后紧跟的输入不再生效
        bob.send(&Message::logout("bob", 0)).await.unwrap();
        // 服务端可能已经关闭连接，后两次写入的结果无关紧要
        let _ = bob.send(&Message::login("bob", Terminal::Console, 0)).await;
        let _ = bob.send(&Message::chat("bob", "ghost", 0)).await;
        assert!(bob.recv().await.is_err());

        let left = next_native(&mut alice).await;
        assert_eq!(left.content, "bob left the room...");
        assert_eq!(left.online_count, 1);

        // 下一条推送是 alice 自己的回显，而不是重新加入的通知
        alice.send(&Message::chat("alice", "still alone", 0)).await.unwrap();
        let Inbound::Text(echo) = alice.recv().await.unwrap() else {
            panic!("expected the text echo");
        };
        assert_eq!(TextCodec::decode(&echo).unwrap().content, "still alone");

        stop_tx.send(()).unwrap();
        server_handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_console_and_websocket_share_room() {
        let console = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let websocket = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let console_addr = console.local_addr().unwrap();
        let websocket_addr = websocket.local_addr().unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server_handle = tokio::spawn(async move {
            let server = ChatServer::new(ServerConfig::default());
            server
                .serve(console, websocket, async {
                    let _ = stop_rx.await;
                })
                .await
        });

        // 控制台终端登录
        let transport = TcpTransport::connect(&console_addr.to_string(), &TransportConfig::default())
            .await
            .unwrap();
        let mut alice = Connection::new(transport);
        alice
            .send(&Message::login("alice", Terminal::Console, 0))
            .await
            .unwrap();
        let welcome = next_native(&mut alice).await;
        assert_eq!(welcome.content, "connected to server...");
        assert_eq!(welcome.online_count, 1);

        // WebSocket 终端登录
        let (mut web, _) = tokio_tungstenite::connect_async(format!("ws://{}", websocket_addr))
            .await
            .unwrap();
        web.send(WsMessage::Text("[LOGIN][0][webby][WebSocket]".to_string().into()))
            .await
            .unwrap();

        let frame = web.next().await.unwrap().unwrap();
        let reply = TextCodec::decode(frame.to_text().unwrap()).unwrap();
        assert_eq!(reply.content, "connected to server...");
        assert_eq!(reply.online_count, 2);

        let joined = next_native(&mut alice).await;
        assert_eq!(joined.content, "webby joined the room...");

        // WebSocket 聊天 → 控制台收到原生消息
        web.send(WsMessage::Text("[CHAT][0][webby] - hi alice".to_string().into()))
            .await
            .unwrap();
        let chat = next_native(&mut alice).await;
        assert!(chat.is_chat());
        assert_eq!(chat.sender, "webby");
        assert_eq!(chat.content, "hi alice");

        let echo = web.next().await.unwrap().unwrap();
        let echo = TextCodec::decode(echo.to_text().unwrap()).unwrap();
        assert_eq!(echo.sender, "you");

        // WebSocket 断开 → 控制台收到离开通知
        web.close(None).await.unwrap();
        let left = next_native(&mut alice).await;
        assert_eq!(left.content, "webby left the room...");
        assert_eq!(left.online_count, 1);

        stop_tx.send(()).unwrap();
        server_handle.await.unwrap().unwrap();
    }
}
