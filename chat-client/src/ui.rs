//! 终端界面：解析用户输入、渲染收到的消息

use chrono::{DateTime, Local};
use protocol::{Command, Message};

/// 用户输入对应的操作
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    /// 发送聊天消息
    Chat(String),
    /// 送鲜花
    Flower,
    /// 登出并退出
    Quit,
}

/// 解析一行用户输入，空行返回 None
pub fn parse_input(line: &str) -> Option<UserCommand> {
    let line = line.trim();
    match line {
        "" => None,
        "/flower" => Some(UserCommand::Flower),
        "/quit" => Some(UserCommand::Quit),
        _ => Some(UserCommand::Chat(line.to_string())),
    }
}

/// 毫秒时间戳格式化为本地时间 HH:MM:SS
pub fn format_time(millis: u64) -> String {
    DateTime::from_timestamp_millis(millis as i64)
        .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string())
}

/// 渲染一条消息为一行输出
pub fn render(msg: &Message) -> String {
    let time = format_time(msg.sending_time);
    match msg.command {
        Command::System => format!(
            "{} [system] {} (online: {})",
            time, msg.content, msg.online_count
        ),
        Command::Chat => format!("{} {}: {}", time, msg.sender, msg.content),
        Command::Flower if msg.content.is_empty() => {
            format!("{} * {} sent a shower of flowers", time, msg.sender)
        }
        Command::Flower => format!("{} * {}", time, msg.content),
        Command::Login | Command::Logout => {
            format!("{} {} {}", time, msg.sender, msg.command)
        }
    }
}
