//! 协议常量定义

use std::time::Duration;

/// 二进制帧协议版本号（同时作为帧的起始字节）
pub const PROTOCOL_VERSION: u8 = 1;

/// 消息帧最大大小
pub const MAX_FRAME_SIZE: usize = 8192;

/// 文本协议解码时昵称保留的最大字符数
pub const MAX_NICKNAME_CHARS: usize = 9;

/// 送花冷却时间（毫秒）
pub const FLOWER_COOLDOWN_MS: u64 = 60_000;

/// 系统消息的发送者
pub const SYSTEM_SENDER: &str = "admin";

/// 回显给发送者本人时使用的发送者名称
pub const SELF_SENDER: &str = "you";

/// 控制台（TCP）终端默认监听地址
pub const DEFAULT_CONSOLE_ADDR: &str = "127.0.0.1:8080";

/// WebSocket 终端默认监听地址
pub const DEFAULT_WEBSOCKET_ADDR: &str = "127.0.0.1:8081";

/// 服务端最大连接数
pub const MAX_CONNECTIONS: usize = 100;

/// 连接超时（秒）
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// 连接超时 Duration
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(CONNECT_TIMEOUT_SECS);
