//! 二进制帧编解码
//!
//! 帧格式:
//! ```text
//! ┌────────────┬────────────────┬────────────────────────────────┐
//! │ Version(1B)│  Length (4B)   │         Payload (bincode)      │
//! │    u8      │    u32 BE      │         Message struct         │
//! └────────────┴────────────────┴────────────────────────────────┘
//! ```
//!
//! 控制台连接上二进制帧与文本行可以混合出现：以版本号字节开头的是
//! 二进制帧，其余按 `\n` 结尾的文本行处理。

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tracing::{debug, warn};

use crate::error::{ProtocolError, Result};
use crate::message::Message;
use crate::{MAX_FRAME_SIZE, PROTOCOL_VERSION};

/// 帧头大小: 1 字节版本 + 4 字节长度
const HEADER_SIZE: usize = 5;

/// 从连接上读到的一项输入
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// 二进制帧解出的消息
    Message(Message),
    /// 一行文本（已去掉行尾换行符），尚未经过文本协议解析
    Text(String),
}

/// 将消息编码为一个完整的二进制帧
pub fn encode_frame(msg: &Message) -> Result<Vec<u8>> {
    let payload = bincode::serialize(msg)?;

    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.push(PROTOCOL_VERSION);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// 校验帧头并取出消息体
fn split_frame(frame: &[u8]) -> Result<&[u8]> {
    let Some((header, payload)) = frame.split_first_chunk::<HEADER_SIZE>() else {
        return Err(ProtocolError::TruncatedFrame { len: frame.len() });
    };

    if header[0] != PROTOCOL_VERSION {
        return Err(ProtocolError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            actual: header[0],
        });
    }

    let length = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: length,
            max: MAX_FRAME_SIZE,
        });
    }

    payload
        .get(..length)
        .ok_or(ProtocolError::TruncatedFrame { len: frame.len() })
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

/// 单连接的二进制解码器
///
/// 第一次遇到无法解析的内容后自行停用，此后该连接上的二进制输入一律忽略，
/// 不会反复报错。空白内容视为"无可解码"，不影响解码器状态。
#[derive(Debug)]
pub struct BinaryDecoder {
    enabled: bool,
}

impl BinaryDecoder {
    pub fn new() -> Self {
        Self { enabled: true }
    }

    /// 解码器是否仍然启用
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 解码不含帧头的消息体
    pub fn decode_payload(&mut self, payload: &[u8]) -> Option<Message> {
        if !self.enabled || is_blank(payload) {
            return None;
        }

        match bincode::deserialize::<Message>(payload) {
            Ok(msg) => Some(msg),
            Err(e) => {
                self.disable(&ProtocolError::Serialization(e));
                None
            }
        }
    }

    /// 解码包含帧头的完整帧（WebSocket 二进制帧使用）
    pub fn decode_frame(&mut self, frame: &[u8]) -> Option<Message> {
        if !self.enabled || is_blank(frame) {
            return None;
        }

        match split_frame(frame) {
            Ok(payload) => self.decode_payload(payload),
            Err(e) => {
                self.disable(&e);
                None
            }
        }
    }

    fn disable(&mut self, reason: &ProtocolError) {
        warn!("Binary decoder disabled for this connection: {}", reason);
        self.enabled = false;
    }
}

impl Default for BinaryDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// 流读取器：逐项读取二进制帧或文本行
pub struct StreamReader<R> {
    reader: BufReader<R>,
    decoder: BinaryDecoder,
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin> StreamReader<R> {
    /// 创建新的流读取器
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            decoder: BinaryDecoder::new(),
            buffer: Vec::with_capacity(MAX_FRAME_SIZE),
        }
    }

    /// 二进制解码器是否仍然启用
    pub fn binary_enabled(&self) -> bool {
        self.decoder.is_enabled()
    }

    /// 读取下一项输入
    ///
    /// 无法解码的二进制帧和空行会被跳过；对端关闭时返回
    /// [`ProtocolError::ConnectionClosed`]。
    pub async fn read_inbound(&mut self) -> Result<Inbound> {
        loop {
            let first = match self.reader.fill_buf().await?.first() {
                Some(byte) => *byte,
                None => return Err(ProtocolError::ConnectionClosed),
            };

            if first == PROTOCOL_VERSION {
                self.read_payload().await?;
                if let Some(msg) = self.decoder.decode_payload(&self.buffer) {
                    return Ok(Inbound::Message(msg));
                }
                debug!("Skipped undecodable binary frame");
                continue;
            }

            let line = self.read_line().await?;
            if !line.trim().is_empty() {
                return Ok(Inbound::Text(line));
            }
        }
    }

    /// 读取帧头和消息体，消息体留在 `self.buffer`
    async fn read_payload(&mut self) -> Result<()> {
        let mut header = [0u8; HEADER_SIZE];
        self.reader
            .read_exact(&mut header)
            .await
            .map_err(map_eof)?;

        // 解析长度（大端序）
        let length = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
        if length > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: length,
                max: MAX_FRAME_SIZE,
            });
        }

        self.buffer.resize(length, 0);
        self.reader
            .read_exact(&mut self.buffer[..length])
            .await
            .map_err(map_eof)?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String> {
        self.buffer.clear();
        let limit = MAX_FRAME_SIZE as u64 + 1;
        let n = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut self.buffer)
            .await?;

        if n == 0 {
            return Err(ProtocolError::ConnectionClosed);
        }
        if self.buffer.last() != Some(&b'\n') && n as u64 == limit {
            return Err(ProtocolError::FrameTooLarge {
                size: n,
                max: MAX_FRAME_SIZE,
            });
        }

        let line = String::from_utf8_lossy(&self.buffer);
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

fn map_eof(e: std::io::Error) -> ProtocolError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        ProtocolError::ConnectionClosed
    } else {
        ProtocolError::Io(e)
    }
}

/// 流写入器
pub struct StreamWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> StreamWriter<W> {
    /// 创建新的流写入器
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// 以二进制帧写入一条消息
    pub async fn write_message(&mut self, msg: &Message) -> Result<()> {
        let frame = encode_frame(msg)?;
        self.writer.write_all(&frame).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// 写入一行文本
    pub async fn write_text(&mut self, text: &str) -> Result<()> {
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// 关闭写入端
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Terminal;
    use crate::text::TextCodec;
    use std::io::Cursor;

    fn frame_with_payload(payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![PROTOCOL_VERSION];
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let msg = Message {
            receiver: "nobody".to_string(),
            online_count: 2,
            content: "hi there".to_string(),
            ..Message::login("test_user", Terminal::Console, 1_700_000_000_000)
        };

        let mut buffer = Vec::new();
        {
            let mut writer = StreamWriter::new(&mut buffer);
            writer.write_message(&msg).await.unwrap();
        }

        let mut reader = StreamReader::new(Cursor::new(&buffer));
        let inbound = reader.read_inbound().await.unwrap();
        assert_eq!(inbound, Inbound::Message(msg));
    }

    #[tokio::test]
    async fn test_mixed_frames_and_lines() {
        let chat = Message::chat("alice", "Hello, world!", 1234567890);

        let mut buffer = Vec::new();
        {
            let mut writer = StreamWriter::new(&mut buffer);
            writer.write_text("[SYSTEM][1][2] - welcome").await.unwrap();
            writer.write_message(&chat).await.unwrap();
            writer.write_text("").await.unwrap();
            writer.write_text("plain text\r").await.unwrap();
        }

        let mut reader = StreamReader::new(Cursor::new(&buffer));
        assert_eq!(
            reader.read_inbound().await.unwrap(),
            Inbound::Text("[SYSTEM][1][2] - welcome".to_string())
        );
        assert_eq!(reader.read_inbound().await.unwrap(), Inbound::Message(chat));
        assert_eq!(
            reader.read_inbound().await.unwrap(),
            Inbound::Text("plain text".to_string())
        );
        assert!(matches!(
            reader.read_inbound().await,
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_bad_payload_disables_binary_decoding() {
        let valid = encode_frame(&Message::chat("bob", "later", 1)).unwrap();

        let mut buffer = frame_with_payload(&[0xff, 0xff, 0xff, 0xff, 0xff]);
        buffer.extend_from_slice(&valid);
        buffer.extend_from_slice(b"[CHAT][1][bob] - text still works\n");

        let mut reader = StreamReader::new(Cursor::new(&buffer));
        let inbound = reader.read_inbound().await.unwrap();
        assert!(!reader.binary_enabled());

        // 后续合法的二进制帧同样被跳过，只剩文本行
        let Inbound::Text(line) = inbound else {
            panic!("Unexpected inbound: {:?}", inbound);
        };
        let msg = TextCodec::decode(&line).unwrap();
        assert_eq!(msg.content, "text still works");
    }

    #[tokio::test]
    async fn test_blank_payload_is_noop() {
        let chat = Message::chat("carol", "after blank", 5);
        let mut buffer = frame_with_payload(b"  ");
        buffer.extend_from_slice(&encode_frame(&chat).unwrap());

        let mut reader = StreamReader::new(Cursor::new(&buffer));
        assert_eq!(reader.read_inbound().await.unwrap(), Inbound::Message(chat));
        assert!(reader.binary_enabled());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let mut buffer = vec![PROTOCOL_VERSION];
        buffer.extend_from_slice(&((MAX_FRAME_SIZE as u32) + 1).to_be_bytes());

        let mut reader = StreamReader::new(Cursor::new(&buffer));
        assert!(matches!(
            reader.read_inbound().await,
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_connection_closed() {
        let frame = encode_frame(&Message::chat("dave", "cut", 9)).unwrap();
        let truncated = &frame[..frame.len() - 2];

        let mut reader = StreamReader::new(Cursor::new(truncated));
        assert!(matches!(
            reader.read_inbound().await,
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_decode_frame() {
        let msg = Message::flower("erin", Terminal::WebSocket, 3);
        let frame = encode_frame(&msg).unwrap();

        let mut decoder = BinaryDecoder::new();
        assert_eq!(decoder.decode_frame(&frame), Some(msg));
        assert!(decoder.is_enabled());
    }

    #[test]
    fn test_decode_frame_blank_and_garbage() {
        let mut decoder = BinaryDecoder::new();
        assert_eq!(decoder.decode_frame(b""), None);
        assert_eq!(decoder.decode_frame(b" \n"), None);
        assert!(decoder.is_enabled());

        assert_eq!(decoder.decode_frame(b"not a frame"), None);
        assert!(!decoder.is_enabled());

        // 停用后即便是合法帧也不再解码
        let frame = encode_frame(&Message::chat("a", "b", 1)).unwrap();
        assert_eq!(decoder.decode_frame(&frame), None);
    }
}
