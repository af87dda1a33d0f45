//! 连接句柄
//!
//! 路由器只通过 [`Peer`] 与连接打交道：推送消息或文本、读取地址、关闭。
//! 实际的 socket 写入由每个连接自己的写任务完成，路由器的发送从不阻塞。

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use protocol::{Message, Terminal};
use thiserror::Error;
use tokio::sync::mpsc;

/// 连接 ID 生成器
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// 连接标识，会话表按它而不是昵称区分连接
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// 分配一个新的连接 ID
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// 推送失败
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PeerError {
    /// 连接的写任务已经退出
    #[error("connection {0} closed")]
    Closed(ConnectionId),
}

/// 路由器眼中的一条连接
pub trait Peer: Send + Sync {
    fn id(&self) -> ConnectionId;

    /// 对端地址字符串
    fn remote_addr(&self) -> &str;

    /// 连接到达时所走的终端通道
    fn terminal(&self) -> Terminal;

    /// 推送原生消息
    fn send_message(&self, msg: &Message) -> Result<(), PeerError>;

    /// 推送一行文本
    fn send_text(&self, text: &str) -> Result<(), PeerError>;

    /// 请求关闭连接
    fn close(&self);
}

/// 写任务收到的指令
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(Message),
    Text(String),
    Close,
}

/// 基于 mpsc 通道的连接句柄
#[derive(Debug)]
pub struct ChannelPeer {
    id: ConnectionId,
    addr: String,
    terminal: Terminal,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ChannelPeer {
    /// 创建句柄，返回的接收端交给该连接的写任务
    pub fn new(
        addr: impl Into<String>,
        terminal: Terminal,
    ) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let peer = Self {
            id: ConnectionId::next(),
            addr: addr.into(),
            terminal,
            tx,
        };
        (peer, rx)
    }

    fn push(&self, item: Outbound) -> Result<(), PeerError> {
        self.tx.send(item).map_err(|_| PeerError::Closed(self.id))
    }
}

impl Peer for ChannelPeer {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn remote_addr(&self) -> &str {
        &self.addr
    }

    fn terminal(&self) -> Terminal {
        self.terminal
    }

    fn send_message(&self, msg: &Message) -> Result<(), PeerError> {
        self.push(Outbound::Message(msg.clone()))
    }

    fn send_text(&self, text: &str) -> Result<(), PeerError> {
        self.push(Outbound::Text(text.to_string()))
    }

    fn close(&self) {
        let _ = self.push(Outbound::Close);
    }
}
