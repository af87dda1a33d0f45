//! 聊天室客户端
//!
//! 控制台终端：`chat-client <nickname> [server_addr]`
//!
//! 输入任意文字发送聊天，`/flower` 送鲜花，`/quit` 退出。

mod client;
mod ui;

use anyhow::{bail, Result};
use protocol::DEFAULT_CONSOLE_ADDR;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("chat_client=info".parse()?))
        .init();

    let mut args = std::env::args().skip(1);
    let Some(nickname) = args.next() else {
        bail!("usage: chat-client <nickname> [server_addr]");
    };
    let addr = args.next().unwrap_or_else(|| DEFAULT_CONSOLE_ADDR.to_string());

    client::run(&addr, &nickname).await
}
