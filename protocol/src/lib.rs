//! 聊天室共享协议库
//!
//! 包含:
//! - 协议消息 (Message) 与指令词汇表 (Command)
//! - 二进制帧编解码 (codec)
//! - 文本行编解码 (TextCodec)
//! - 传输层抽象 (Transport trait)
//! - 连接封装 (Connection)

mod command;
mod message;
mod constants;
mod codec;
mod text;
mod transport;
mod connection;
mod error;

pub use command::{is_protocol_line, Command, UnknownCommand};
pub use message::{now_millis, Message, Terminal};
pub use constants::*;
pub use codec::{encode_frame, BinaryDecoder, Inbound, StreamReader, StreamWriter};
pub use text::TextCodec;
pub use transport::{Transport, TransportListener, TransportConfig, TcpTransport, TcpListener};
pub use connection::Connection;
pub use error::{ProtocolError, Result};
