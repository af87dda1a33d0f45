//! 服务端配置

use protocol::{DEFAULT_CONSOLE_ADDR, DEFAULT_WEBSOCKET_ADDR, MAX_CONNECTIONS};

/// 服务端配置
#[derive(Clone, Debug, PartialEq)]
pub struct ServerConfig {
    /// 控制台终端（TCP）监听地址
    pub console_addr: String,
    /// WebSocket 终端监听地址
    pub websocket_addr: String,
    /// 最大同时连接数（两种终端合计）
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            console_addr: DEFAULT_CONSOLE_ADDR.to_string(),
            websocket_addr: DEFAULT_WEBSOCKET_ADDR.to_string(),
            max_connections: MAX_CONNECTIONS,
        }
    }
}

impl ServerConfig {
    /// 从命令行参数读取: `[console_addr] [websocket_addr]`
    pub fn from_args<I: IntoIterator<Item = String>>(args: I) -> Self {
        let mut args = args.into_iter();
        let mut config = Self::default();
        if let Some(addr) = args.next() {
            config.console_addr = addr;
        }
        if let Some(addr) = args.next() {
            config.websocket_addr = addr;
        }
        config
    }
}
