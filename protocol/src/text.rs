//! 文本行编解码
//!
//! WebSocket 客户端与按行输入使用的可读格式:
//! ```text
//! [CMD][TIME]            总是存在
//! [SENDER]               仅 LOGIN / CHAT / FLOWER
//! [TERMINAL]             仅 FLOWER，紧跟在 SENDER 之后
//! [ONLINE]               仅 SYSTEM
//!  - CONTENT             仅当内容非空白
//! ```
//!
//! 例如 `[CHAT][1700000000000][alice] - hello`。

use crate::command::{leading_command, Command};
use crate::message::{Message, Terminal};
use crate::{MAX_NICKNAME_CHARS, SYSTEM_SENDER};

/// 文本行编解码器
pub struct TextCodec;

impl TextCodec {
    /// 将消息编码为一行文本（不含换行符）
    pub fn encode(msg: &Message) -> String {
        let mut line = format!("[{}][{}]", msg.command, msg.sending_time);

        match msg.command {
            Command::Login | Command::Chat => {
                push_group(&mut line, &msg.sender);
            }
            Command::Flower => {
                push_group(&mut line, &msg.sender);
                push_group(&mut line, msg.terminal.map(Terminal::as_str).unwrap_or_default());
            }
            Command::System => {
                push_group(&mut line, &msg.online_count.to_string());
            }
            Command::Logout => {}
        }

        if !msg.content.trim().is_empty() {
            line.push_str(" - ");
            push_single_line(&mut line, &msg.content);
        }
        line
    }

    /// 解析一行文本
    ///
    /// 不属于本协议或不符合语法的行返回 `None`，调用方应当忽略该输入。
    /// 时间戳解析失败时按 0 处理，不影响整行解析。
    pub fn decode(line: &str) -> Option<Message> {
        let command = leading_command(line)?;
        let (groups, content) = split_line(line)?;

        let field = |index: usize| groups.get(index).copied().unwrap_or_default();
        let mut msg = Message::new(command);
        msg.sending_time = field(1).parse().unwrap_or(0);
        msg.content = content.unwrap_or_default().to_string();

        match command {
            Command::Login | Command::Logout | Command::Flower => {
                msg.sender = truncate_nickname(field(2));
                msg.terminal = Terminal::from_name(field(3));
            }
            Command::Chat => {
                msg.sender = truncate_nickname(field(2));
            }
            Command::System => {
                msg.sender = SYSTEM_SENDER.to_string();
                msg.online_count = field(2).parse().unwrap_or(0);
            }
        }
        Some(msg)
    }
}

fn push_group(line: &mut String, value: &str) {
    line.push('[');
    push_single_line(line, value);
    line.push(']');
}

/// 二进制帧带来的字段可能含有换行符，写入文本行时替换为空格
fn push_single_line(line: &mut String, value: &str) {
    line.extend(value.chars().map(|c| if matches!(c, '\r' | '\n') { ' ' } else { c }));
}

fn truncate_nickname(name: &str) -> String {
    name.chars().take(MAX_NICKNAME_CHARS).collect()
}

/// 拆分为方括号字段组和可选的 ` - ` 内容
fn split_line(line: &str) -> Option<(Vec<&str>, Option<&str>)> {
    let mut groups = Vec::new();
    let mut rest = line;

    while let Some(inner) = rest.strip_prefix('[') {
        let end = inner.find(']')?;
        groups.push(&inner[..end]);
        rest = &inner[end + 1..];
    }

    if groups.is_empty() {
        return None;
    }
    if rest.is_empty() {
        return Some((groups, None));
    }

    // 剩余部分必须是 `\s-\s(.*)`
    let mut chars = rest.char_indices();
    match (chars.next(), chars.next(), chars.next()) {
        (Some((_, a)), Some((_, '-')), Some((i, b))) if a.is_whitespace() && b.is_whitespace() => {
            Some((groups, Some(&rest[i + b.len_utf8()..])))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_chat() {
        let msg = Message::chat("alice", "hello", 1234);
        assert_eq!(TextCodec::encode(&msg), "[CHAT][1234][alice] - hello");
    }

    #[test]
    fn test_encode_login_without_content() {
        let msg = Message::login("bob", Terminal::WebSocket, 99);
        assert_eq!(TextCodec::encode(&msg), "[LOGIN][99][bob]");
    }

    #[test]
    fn test_encode_flower_includes_terminal() {
        let mut msg = Message::flower("bob", Terminal::Console, 5);
        msg.content = "bob sent a shower of flowers".to_string();
        assert_eq!(
            TextCodec::encode(&msg),
            "[FLOWER][5][bob][Console] - bob sent a shower of flowers"
        );
    }

    #[test]
    fn test_encode_system_includes_online_count() {
        let msg = Message::system(3, "carol joined the room...", 10);
        assert_eq!(
            TextCodec::encode(&msg),
            "[SYSTEM][10][3] - carol joined the room..."
        );
    }

    #[test]
    fn test_encode_logout_and_blank_content() {
        let mut msg = Message::logout("dave", 7);
        msg.content = "   ".to_string();
        assert_eq!(TextCodec::encode(&msg), "[LOGOUT][7]");
    }

    #[test]
    fn test_encode_replaces_line_breaks() {
        let msg = Message::chat("ali\nce", "first\nsecond\r\nthird", 7);
        let line = TextCodec::encode(&msg);
        assert_eq!(line, "[CHAT][7][ali ce] - first second  third");

        let decoded = TextCodec::decode(&line).unwrap();
        assert_eq!(decoded.content, "first second  third");
    }

    #[test]
    fn test_decode_login() {
        let msg = TextCodec::decode("[LOGIN][1700000000000][alice][WebSocket]").unwrap();
        assert_eq!(msg.command, Command::Login);
        assert_eq!(msg.sending_time, 1_700_000_000_000);
        assert_eq!(msg.sender, "alice");
        assert_eq!(msg.terminal, Some(Terminal::WebSocket));
        assert!(msg.content.is_empty());
    }

    #[test]
    fn test_decode_chat_content_keeps_separators() {
        let msg = TextCodec::decode("[CHAT][1][bob] - a - b [x]").unwrap();
        assert_eq!(msg.sender, "bob");
        assert_eq!(msg.content, "a - b [x]");
    }

    #[test]
    fn test_decode_truncates_nickname() {
        let msg = TextCodec::decode("[LOGIN][1][abcdefghijkl][Console]").unwrap();
        assert_eq!(msg.sender, "abcdefghi");

        let msg = TextCodec::decode("[CHAT][1][小明小红小刚小李小王小张] - hi").unwrap();
        assert_eq!(msg.sender.chars().count(), MAX_NICKNAME_CHARS);
    }

    #[test]
    fn test_decode_bad_timestamp_is_zero() {
        let msg = TextCodec::decode("[CHAT][yesterday][bob] - hi").unwrap();
        assert_eq!(msg.sending_time, 0);
        assert_eq!(msg.content, "hi");
    }

    #[test]
    fn test_decode_missing_fields() {
        let msg = TextCodec::decode("[LOGOUT]").unwrap();
        assert_eq!(msg.command, Command::Logout);
        assert_eq!(msg.sending_time, 0);
        assert!(msg.sender.is_empty());
        assert_eq!(msg.terminal, None);
    }

    #[test]
    fn test_decode_system() {
        let msg = TextCodec::decode("[SYSTEM][10][4] - hello").unwrap();
        assert!(msg.is_system());
        assert_eq!(msg.online_count, 4);
        assert_eq!(msg.sender, "admin");
        assert_eq!(msg.content, "hello");
    }

    #[test]
    fn test_decode_rejects_foreign_input() {
        assert!(TextCodec::decode("hello world").is_none());
        assert!(TextCodec::decode("[PING][1]").is_none());
        assert!(TextCodec::decode("[chat][1][bob] - hi").is_none());
        assert!(TextCodec::decode("").is_none());
    }

    #[test]
    fn test_decode_rejects_malformed_suffix() {
        assert!(TextCodec::decode("[CHAT][1][bob]hi").is_none());
        assert!(TextCodec::decode("[CHAT][1][bob] -hi").is_none());
        assert!(TextCodec::decode("[CHAT][1][bob").is_none());
    }

    #[test]
    fn test_chat_roundtrip() {
        let msg = Message::chat("erin", "see you at 5 - ok?", 1_700_000_123_456);
        let decoded = TextCodec::decode(&TextCodec::encode(&msg)).unwrap();
        assert_eq!(decoded.command, msg.command);
        assert_eq!(decoded.sending_time, msg.sending_time);
        assert_eq!(decoded.sender, msg.sender);
        assert_eq!(decoded.content, msg.content);
    }

    #[test]
    fn test_flower_roundtrip() {
        let msg = Message::flower("frank", Terminal::WebSocket, 77);
        let decoded = TextCodec::decode(&TextCodec::encode(&msg)).unwrap();
        assert_eq!(decoded.command, Command::Flower);
        assert_eq!(decoded.sending_time, 77);
        assert_eq!(decoded.sender, "frank");
        assert_eq!(decoded.terminal, Some(Terminal::WebSocket));
    }
}
