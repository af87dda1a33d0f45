//! 协议指令词汇表
//!
//! 固定的五条指令，以及判断一行文本是否属于本协议的工具函数。
//! 所有比较都区分大小写，不做任何规范化。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 协议指令
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// 系统消息（在线人数、加入/离开提示等）
    System,
    /// 登录
    Login,
    /// 登出
    Logout,
    /// 聊天
    Chat,
    /// 送鲜花
    Flower,
}

impl Command {
    /// 全部指令
    pub const ALL: [Command; 5] = [
        Command::System,
        Command::Login,
        Command::Logout,
        Command::Chat,
        Command::Flower,
    ];

    /// 指令在线路上的名称
    pub fn as_str(self) -> &'static str {
        match self {
            Command::System => "SYSTEM",
            Command::Login => "LOGIN",
            Command::Logout => "LOGOUT",
            Command::Chat => "CHAT",
            Command::Flower => "FLOWER",
        }
    }

    /// 按名称精确查找指令
    pub fn from_name(name: &str) -> Option<Command> {
        Command::ALL.into_iter().find(|cmd| cmd.as_str() == name)
    }

    pub fn is_system(name: &str) -> bool {
        name == Command::System.as_str()
    }

    pub fn is_login(name: &str) -> bool {
        name == Command::Login.as_str()
    }

    pub fn is_logout(name: &str) -> bool {
        name == Command::Logout.as_str()
    }

    pub fn is_chat(name: &str) -> bool {
        name == Command::Chat.as_str()
    }

    pub fn is_flower(name: &str) -> bool {
        name == Command::Flower.as_str()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 未知指令名
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown command: {0}")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::from_name(s).ok_or_else(|| UnknownCommand(s.to_string()))
    }
}

/// 判断一行文本是否"看起来像本协议"
///
/// 等价于 `^\[(SYSTEM|LOGIN|LOGOUT|CHAT|FLOWER)\]`：
/// 行首必须是一个方括号包裹、且恰好等于某条指令名的标记。
pub fn is_protocol_line(line: &str) -> bool {
    leading_command(line).is_some()
}

/// 取出行首方括号中的指令
pub(crate) fn leading_command(line: &str) -> Option<Command> {
    let rest = line.strip_prefix('[')?;
    let end = rest.find(']')?;
    Command::from_name(&rest[..end])
}
