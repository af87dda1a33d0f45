//! WebSocket 终端连接处理
//!
//! 文本帧按文本协议解析；二进制帧按二进制帧格式解析，解析失败后
//! 该连接不再尝试二进制解码。推送一律使用文本帧。

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use protocol::{BinaryDecoder, Terminal, TextCodec};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::peer::{ChannelPeer, Outbound, Peer};
use crate::router::Router;

type WsSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;

/// 完成握手并处理单个 WebSocket 连接
pub async fn handle_websocket(
    stream: TcpStream,
    addr: SocketAddr,
    router: Arc<Router>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (sink, mut frames) = ws.split();

    let (peer, outbound_rx) = ChannelPeer::new(addr.to_string(), Terminal::WebSocket);
    let peer: Arc<dyn Peer> = Arc::new(peer);
    router.register(peer.as_ref());
    debug!(id = %peer.id(), %addr, "WebSocket connection accepted");

    let mut writer_task = tokio::spawn(write_loop(sink, outbound_rx));
    let mut writer_done = false;
    let mut decoder = BinaryDecoder::new();

    loop {
        tokio::select! {
            frame = frames.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        router.handle_text(&peer, text.as_str()).await;
                    }
                    Some(Ok(WsMessage::Binary(data))) => {
                        if let Some(msg) = decoder.decode_frame(&data) {
                            router.handle_message(&peer, msg).await;
                        }
                    }
                    Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {}
                    Some(Ok(WsMessage::Close(_))) | None => {
                        info!("{} disconnected", addr);
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("Error receiving from {}: {}", addr, e);
                        break;
                    }
                }
                if router.is_closed(&peer).await {
                    debug!(id = %peer.id(), "Connection closed after LOGOUT");
                    break;
                }
            }

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

/// 写任务：所有推送都以文本帧发出
async fn write_loop(mut sink: WsSink, mut outbound_rx: mpsc::UnboundedReceiver<Outbound>) {
    while let Some(item) = outbound_rx.recv().await {
        let frame = match item {
            Outbound::Text(line) => WsMessage::Text(line.into()),
            Outbound::Message(msg) => WsMessage::Text(TextCodec::encode(&msg).into()),
            Outbound::Close => break,
        };
        if let Err(e) = sink.send(frame).await {
            debug!("Failed to write to WebSocket client: {}", e);
            break;
        }
    }
    let _ = sink.close().await;
}
