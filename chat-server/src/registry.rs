//! 会话表
//!
//! 记录所有已登录的连接及其属性。会话按连接身份区分，两个连接可以使用
//! 相同的昵称。广播前先取快照，随后即可释放锁，慢连接不会拖住其他连接的
//! 登录和登出。
//!
//! 已登出的连接记为关闭，之后不能再次登录，直到连接被释放。

use std::collections::HashSet;
use std::sync::Arc;

use protocol::{Message, Terminal, FLOWER_COOLDOWN_MS};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::peer::{ConnectionId, Peer};

/// 单个已登录连接的会话
#[derive(Clone)]
pub struct Session {
    pub peer: Arc<dyn Peer>,
    pub nickname: String,
    pub remote_addr: String,
    pub terminal: Terminal,
    /// 最近一次成功送花的时间（毫秒），从未送过时为 None
    pub last_flower_time: Option<u64>,
}

impl Session {
    pub fn id(&self) -> ConnectionId {
        self.peer.id()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("nickname", &self.nickname)
            .field("remote_addr", &self.remote_addr)
            .field("terminal", &self.terminal)
            .field("last_flower_time", &self.last_flower_time)
            .finish()
    }
}

#[derive(Default)]
struct Sessions {
    /// 在线会话，按登录顺序
    active: Vec<Session>,
    /// 已登出、尚未释放的连接
    closed: HashSet<ConnectionId>,
}

/// 会话表
#[derive(Default)]
pub struct Registry {
    sessions: RwLock<Sessions>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新连接到达
    ///
    /// 会话在 LOGIN 时才创建，这里只做记录。
    pub fn register(&self, peer: &dyn Peer) {
        debug!(id = %peer.id(), addr = peer.remote_addr(), "Connection registered, waiting for LOGIN");
    }

    /// 登录：保存昵称、地址、终端类型并加入在线集合，返回当前在线人数
    ///
    /// 终端类型优先取 LOGIN 消息中声明的值，缺省时使用连接所在通道。
    /// 已关闭的连接返回 None。
    pub async fn on_login(&self, peer: Arc<dyn Peer>, msg: &Message) -> Option<u32> {
        let mut sessions = self.sessions.write().await;
        if sessions.closed.contains(&peer.id()) {
            debug!(id = %peer.id(), "Refusing LOGIN on closed connection");
            return None;
        }

        let session = Session {
            nickname: msg.sender.clone(),
            remote_addr: peer.remote_addr().to_string(),
            terminal: msg.terminal.unwrap_or_else(|| peer.terminal()),
            last_flower_time: None,
            peer,
        };

        info!(
            id = %session.id(),
            addr = %session.remote_addr,
            terminal = %session.terminal,
            "{} logged in",
            session.nickname
        );

        let active = &mut sessions.active;
        match active.iter_mut().find(|s| s.id() == session.id()) {
            Some(existing) => *existing = session,
            None => active.push(session),
        }
        Some(active.len() as u32)
    }

    /// 登出：移除会话、将连接记为关闭并返回其昵称
    ///
    /// 从未登录的连接返回 None，且不记为关闭。
    pub async fn on_logout(&self, id: ConnectionId) -> Option<String> {
        let mut sessions = self.sessions.write().await;
        let index = sessions.active.iter().position(|s| s.id() == id)?;
        let session = sessions.active.remove(index);
        sessions.closed.insert(id);
        info!(%id, "{} logged out", session.nickname);
        Some(session.nickname)
    }

    /// 连接已登出
    pub async fn is_closed(&self, id: ConnectionId) -> bool {
        self.sessions.read().await.closed.contains(&id)
    }

    /// 释放连接的全部记录，连接读循环结束后调用
    pub async fn release(&self, id: ConnectionId) {
        self.sessions.write().await.closed.remove(&id);
    }

    /// 查询会话
    pub async fn session(&self, id: ConnectionId) -> Option<Session> {
        self.sessions
            .read()
            .await
            .active
            .iter()
            .find(|s| s.id() == id)
            .cloned()
    }

    /// 查询昵称，未登录时返回 None
    pub async fn nickname(&self, id: ConnectionId) -> Option<String> {
        self.sessions
            .read()
            .await
            .active
            .iter()
            .find(|s| s.id() == id)
            .map(|s| s.nickname.clone())
    }

    /// 记录一次成功的送花
    pub async fn record_flower(&self, id: ConnectionId, time: u64) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.active.iter_mut().find(|s| s.id() == id) {
            session.last_flower_time = Some(time);
        }
    }

    /// 最近一次送花时间
    pub async fn last_flower_time(&self, id: ConnectionId) -> Option<u64> {
        self.sessions
            .read()
            .await
            .active
            .iter()
            .find(|s| s.id() == id)
            .and_then(|s| s.last_flower_time)
    }

    /// 距上次送花已满冷却时间，或从未送过花
    pub async fn flower_allowed(&self, id: ConnectionId, time: u64) -> bool {
        match self.last_flower_time(id).await {
            Some(last) => time.saturating_sub(last) >= FLOWER_COOLDOWN_MS,
            None => true,
        }
    }

    /// 当前在线会话的快照，按登录顺序排列
    pub async fn snapshot(&self) -> Vec<Session> {
        self.sessions.read().await.active.clone()
    }

    /// 在线人数
    pub async fn online_count(&self) -> u32 {
        self.sessions.read().await.active.len() as u32
    }
}
