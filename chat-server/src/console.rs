//! 控制台终端（TCP）连接处理
//!
//! 同一条 TCP 连接上既可以收发二进制帧，也可以收发文本行。

use std::sync::Arc;

use protocol::{
    Connection, Inbound, ProtocolError, StreamWriter, TcpTransport, Terminal, Transport,
};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::peer::{ChannelPeer, Outbound, Peer};
use crate::router::Router;

/// 处理单个控制台连接
pub async fn handle_console(
    transport: TcpTransport,
    router: Arc<Router>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = transport.peer_addr();
    let (mut reader, writer) = Connection::new(transport).split();

    let (peer, outbound_rx) = ChannelPeer::new(addr.to_string(), Terminal::Console);
    let peer: Arc<dyn Peer> = Arc::new(peer);
    router.register(peer.as_ref());
    debug!(id = %peer.id(), %addr, "Console connection accepted");

    let mut writer_task = tokio::spawn(write_loop(writer, outbound_rx));
    let mut writer_done = false;

    loop {
        tokio::select! {
            result = reader.read_inbound() => {
                match result {
                    Ok(Inbound::Message(msg)) => router.handle_message(&peer, msg).await,
                    Ok(Inbound::Text(line)) => router.handle_text(&peer, &line).await,
                    Err(ProtocolError::ConnectionClosed) => {
                        info!("{} disconnected", addr);
                        break;
                    }
                    Err(e) => {
                        warn!("Error receiving from {}: {}", addr, e);
                        break;
                    }
                }
                if router.is_closed(&peer).await {
                    debug!(id = %peer.id(), "Connection closed after LOGOUT");
                    break;
                }
            }

            // 写任务退出：LOGOUT 后主动关闭或写入失败
            _ = &mut writer_task, if !writer_done => {
                writer_done = true;
                break;
            }

            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("Shutdown signal received for {}", addr);
                    break;
                }
            }
        }
    }

    router.disconnect(&peer).await;
    if !writer_done {
        let _ = writer_task.await;
    }
    Ok(())
}

/// 写任务：原生消息写为二进制帧，文本写为一行
async fn write_loop(
    mut writer: StreamWriter<OwnedWriteHalf>,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(item) = outbound_rx.recv().await {
        let result = match item {
            Outbound::Message(msg) => writer.write_message(&msg).await,
            Outbound::Text(line) => writer.write_text(&line).await,
            Outbound::Close => break,
        };
        if let Err(e) = result {
            debug!("Failed to write to console client: {}", e);
            break;
        }
    }
    let _ = writer.shutdown().await;
}
