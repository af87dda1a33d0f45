//! 聊天室服务端
//!
//! 基于 Tokio 的异步服务器，同时接入控制台（TCP）与 WebSocket 两种终端

mod config;
mod console;
mod peer;
mod registry;
mod router;
mod server;
mod websocket;

use anyhow::Result;
use config::ServerConfig;
use server::ChatServer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("chat_server=debug".parse()?)
                .add_directive("protocol=debug".parse()?),
        )
        .init();

    let config = ServerConfig::from_args(std::env::args().skip(1));

    info!(
        "Chat Server starting (console: {}, websocket: {})",
        config.console_addr, config.websocket_addr
    );

    let server = ChatServer::new(config);
    server.run().await?;

    Ok(())
}
