//! 消息路由
//!
//! 两种终端的连接都把收到的消息交给 [`Router`]，由它更新会话表并向所有在线
//! 会话推送。推送格式按接收方终端区分：控制台终端直接收到原生消息，
//! 其余接收方（以及发送者本人的回显）收到文本编码。
//!
//! 每条连接的状态: `未登录 → 在线 → 关闭`。未登录时只有 LOGIN 有效，
//! 其余指令静默丢弃；关闭是终态，之后的所有指令都被丢弃。

use std::sync::Arc;

use protocol::{
    now_millis, Command, Message, Terminal, TextCodec, FLOWER_COOLDOWN_MS, SELF_SENDER,
};
use tracing::{debug, info, warn};

use crate::peer::{Peer, PeerError};
use crate::registry::{Registry, Session};

/// 推送失败、需要在广播结束后强制登出的连接
type Failed = Vec<Arc<dyn Peer>>;

/// 消息路由器
#[derive(Default)]
pub struct Router {
    registry: Registry,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// 新连接到达
    pub fn register(&self, peer: &dyn Peer) {
        self.registry.register(peer);
    }

    /// 处理一行文本输入，不属于本协议的内容直接忽略
    pub async fn handle_text(&self, peer: &Arc<dyn Peer>, line: &str) {
        match TextCodec::decode(line) {
            Some(msg) => self.handle_message(peer, msg).await,
            None => debug!(id = %peer.id(), "Ignoring non-protocol input: {:?}", line),
        }
    }

    /// 处理一条消息
    pub async fn handle_message(&self, peer: &Arc<dyn Peer>, msg: Message) {
        self.handle_message_at(peer, msg, now_millis()).await;
    }

    /// 以指定的当前时间（毫秒）处理一条消息
    pub async fn handle_message_at(&self, peer: &Arc<dyn Peer>, msg: Message, now: u64) {
        if self.registry.is_closed(peer.id()).await {
            debug!(id = %peer.id(), "Dropping {} from closed connection", msg.command);
            return;
        }

        let failed = match msg.command {
            Command::Login => self.login(peer, msg, now).await,
            Command::Chat => self.chat(peer, msg, now).await,
            Command::Flower => self.flower(peer, now).await,
            Command::Logout => match self.logout(peer, now).await {
                Some(failed) => {
                    peer.close();
                    failed
                }
                None => {
                    debug!(id = %peer.id(), "Ignoring LOGOUT from unauthenticated connection");
                    Vec::new()
                }
            },
            Command::System => {
                debug!(id = %peer.id(), "Dropping SYSTEM message from client");
                Vec::new()
            }
        };
        self.evict(failed, now).await;
    }

    /// 连接已关闭，前端应停止读取
    pub async fn is_closed(&self, peer: &Arc<dyn Peer>) -> bool {
        self.registry.is_closed(peer.id()).await
    }

    /// 连接断开时的清理，等同于一次 LOGOUT
    ///
    /// 调用后该连接不会再有输入，会话表中的关闭记录随之释放。
    pub async fn disconnect(&self, peer: &Arc<dyn Peer>) {
        let now = now_millis();
        let failed = self.logout(peer, now).await.unwrap_or_default();
        peer.close();
        self.evict(failed, now).await;
        self.registry.release(peer.id()).await;
    }

    async fn login(&self, peer: &Arc<dyn Peer>, msg: Message, now: u64) -> Failed {
        if msg.sender.trim().is_empty() {
            debug!(id = %peer.id(), "Dropping LOGIN without nickname");
            return Vec::new();
        }
        if self.registry.nickname(peer.id()).await.is_some() {
            debug!(id = %peer.id(), "Ignoring repeated LOGIN");
            return Vec::new();
        }

        let nickname = msg.sender.clone();
        let Some(online) = self.registry.on_login(Arc::clone(peer), &msg).await else {
            return Vec::new();
        };

        let mut failed = Vec::new();
        for session in self.registry.snapshot().await {
            let content = if session.id() == peer.id() {
                "connected to server...".to_string()
            } else {
                format!("{} joined the room...", nickname)
            };
            let notice = Message::system(online, content, now);
            let native = session.terminal == Terminal::Console;
            deliver(&session, &notice, native, &mut failed);
        }
        failed
    }

    async fn chat(&self, peer: &Arc<dyn Peer>, msg: Message, now: u64) -> Failed {
        let Some(origin) = self.registry.session(peer.id()).await else {
            debug!(id = %peer.id(), "Dropping CHAT from unauthenticated connection");
            return Vec::new();
        };
        debug!("{} says: {}", origin.nickname, msg.content);

        let mut failed = Vec::new();
        for session in self.registry.snapshot().await {
            let is_self = session.id() == origin.id();
            let sender = if is_self {
                SELF_SENDER
            } else {
                origin.nickname.as_str()
            };
            let out = Message::chat(sender, msg.content.as_str(), now);
            let native = session.terminal == Terminal::Console && !is_self;
            deliver(&session, &out, native, &mut failed);
        }
        failed
    }

    async fn flower(&self, peer: &Arc<dyn Peer>, now: u64) -> Failed {
        let Some(origin) = self.registry.session(peer.id()).await else {
            debug!(id = %peer.id(), "Dropping FLOWER from unauthenticated connection");
            return Vec::new();
        };

        if !self.registry.flower_allowed(origin.id(), now).await {
            let last = origin.last_flower_time.unwrap_or(now);
            let elapsed_secs = now.saturating_sub(last) / 1000;
            let remaining = (FLOWER_COOLDOWN_MS / 1000).saturating_sub(elapsed_secs);
            info!("{} is sending flowers too often, {}s left", origin.nickname, remaining);

            let online = self.registry.online_count().await;
            let mut reply = Message::system(
                online,
                format!("you are sending flowers too often, please try again in {} seconds", remaining),
                now,
            );
            reply.sender = SELF_SENDER.to_string();

            let mut failed = Vec::new();
            if let Err(e) = peer.send_text(&TextCodec::encode(&reply)) {
                warn!("Failed to deliver flower cooldown notice: {}", e);
                failed.push(Arc::clone(peer));
            }
            return failed;
        }

        self.registry.record_flower(origin.id(), now).await;
        info!("{} sent a shower of flowers", origin.nickname);

        let mut failed = Vec::new();
        for session in self.registry.snapshot().await {
            let is_self = session.id() == origin.id();
            let sender = if is_self {
                SELF_SENDER
            } else {
                origin.nickname.as_str()
            };
            let mut out = Message::flower(sender, origin.terminal, now);
            out.content = format!("{} sent a shower of flowers", sender);
            let native = session.terminal == Terminal::Console && !is_self;
            deliver(&session, &out, native, &mut failed);
        }
        failed
    }

    /// 移除会话并通知其余会话；从未登录的连接返回 None
    async fn logout(&self, peer: &Arc<dyn Peer>, now: u64) -> Option<Failed> {
        let nickname = self.registry.on_logout(peer.id()).await?;

        let online = self.registry.online_count().await;
        let notice = Message::system(online, format!("{} left the room...", nickname), now);

        let mut failed = Vec::new();
        for session in self.registry.snapshot().await {
            let native = session.terminal == Terminal::Console;
            deliver(&session, &notice, native, &mut failed);
        }
        Some(failed)
    }

    /// 强制登出推送失败的连接，登出通知本身失败的连接继续排队
    async fn evict(&self, mut failed: Failed, now: u64) {
        while let Some(peer) = failed.pop() {
            warn!(id = %peer.id(), addr = peer.remote_addr(), "Removing unreachable session");
            peer.close();
            failed.extend(self.logout(&peer, now).await.unwrap_or_default());
        }
    }
}

/// 按接收方推送：原生消息或文本编码
fn deliver(session: &Session, msg: &Message, native: bool, failed: &mut Failed) {
    let result: Result<(), PeerError> = if native {
        session.peer.send_message(msg)
    } else {
        session.peer.send_text(&TextCodec::encode(msg))
    };

    if let Err(e) = result {
        warn!("Failed to deliver to {}: {}", session.nickname, e);
        failed.push(Arc::clone(&session.peer));
    }
}
