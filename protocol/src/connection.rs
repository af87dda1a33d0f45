//! 连接封装
//!
//! 提供消息收发接口，封装传输层和编解码。

use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::{Inbound, StreamReader, StreamWriter};
use crate::error::Result;
use crate::message::Message;
use crate::transport::Transport;

/// 连接封装
///
/// 将传输层和编解码封装在一起。
///
/// # Type Parameters
/// * `R` - 读取端类型
/// * `W` - 写入端类型
pub struct Connection<R, W> {
    reader: StreamReader<R>,
    writer: StreamWriter<W>,
}

impl<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> Connection<R, W> {
    /// 从传输层创建连接
    pub fn new<T: Transport<Reader = R, Writer = W>>(transport: T) -> Self {
        let (reader, writer) = transport.split();
        Self {
            reader: StreamReader::new(reader),
            writer: StreamWriter::new(writer),
        }
    }

    /// 分离为读取端和写入端
    ///
    /// 用于需要并发读写的场景
    pub fn split(self) -> (StreamReader<R>, StreamWriter<W>) {
        (self.reader, self.writer)
    }

    /// 接收一项输入
    pub async fn recv(&mut self) -> Result<Inbound> {
        self.reader.read_inbound().await
    }

    /// 以二进制帧发送消息
    pub async fn send(&mut self, msg: &Message) -> Result<()> {
        self.writer.write_message(msg).await
    }
}
