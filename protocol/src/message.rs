//! 消息类型定义

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::SYSTEM_SENDER;

/// 客户端终端类型，决定服务端向该会话推送时使用的编码
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Terminal {
    /// 原生 TCP 控制台客户端
    Console,
    /// 浏览器 WebSocket 客户端
    WebSocket,
}

impl Terminal {
    /// 终端类型在文本协议中的名称
    pub fn as_str(self) -> &'static str {
        match self {
            Terminal::Console => "Console",
            Terminal::WebSocket => "WebSocket",
        }
    }

    pub fn from_name(name: &str) -> Option<Terminal> {
        match name {
            "Console" => Some(Terminal::Console),
            "WebSocket" => Some(Terminal::WebSocket),
            _ => None,
        }
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 协议消息
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    /// 指令
    pub command: Command,
    /// 发送时间，Unix 时间戳（毫秒）
    pub sending_time: u64,
    /// 在线人数，仅 SYSTEM 消息有意义
    pub online_count: u32,
    /// 发送者昵称
    pub sender: String,
    /// 接收者（保留字段）
    pub receiver: String,
    /// 消息内容
    pub content: String,
    /// 终端类型，LOGIN 时设置
    pub terminal: Option<Terminal>,
}

impl Message {
    /// 创建指定指令的空消息
    pub fn new(command: Command) -> Self {
        Self {
            command,
            sending_time: 0,
            online_count: 0,
            sender: String::new(),
            receiver: String::new(),
            content: String::new(),
            terminal: None,
        }
    }

    /// 登录消息
    pub fn login(nickname: impl Into<String>, terminal: Terminal, sending_time: u64) -> Self {
        Self {
            sender: nickname.into(),
            terminal: Some(terminal),
            sending_time,
            ..Self::new(Command::Login)
        }
    }

    /// 登出消息
    pub fn logout(nickname: impl Into<String>, sending_time: u64) -> Self {
        Self {
            sender: nickname.into(),
            sending_time,
            ..Self::new(Command::Logout)
        }
    }

    /// 聊天消息
    pub fn chat(sender: impl Into<String>, content: impl Into<String>, sending_time: u64) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
            sending_time,
            ..Self::new(Command::Chat)
        }
    }

    /// 送花消息
    pub fn flower(sender: impl Into<String>, terminal: Terminal, sending_time: u64) -> Self {
        Self {
            sender: sender.into(),
            terminal: Some(terminal),
            sending_time,
            ..Self::new(Command::Flower)
        }
    }

    /// 系统消息，发送者固定为 admin
    pub fn system(online_count: u32, content: impl Into<String>, sending_time: u64) -> Self {
        Self {
            sender: SYSTEM_SENDER.to_string(),
            online_count,
            content: content.into(),
            sending_time,
            ..Self::new(Command::System)
        }
    }

    pub fn is_system(&self) -> bool {
        self.command == Command::System
    }

    pub fn is_login(&self) -> bool {
        self.command == Command::Login
    }

    pub fn is_logout(&self) -> bool {
        self.command == Command::Logout
    }

    pub fn is_chat(&self) -> bool {
        self.command == Command::Chat
    }

    pub fn is_flower(&self) -> bool {
        self.command == Command::Flower
    }
}

/// 当前 Unix 时间戳（毫秒）
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
