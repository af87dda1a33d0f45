//! 控制台聊天客户端
//!
//! 以控制台终端身份登录，发送二进制帧；服务端推送的二进制帧和文本行都能显示。

use protocol::{
    now_millis, Connection, Inbound, Message, ProtocolError, StreamWriter, TcpTransport,
    Terminal, TextCodec, Transport, TransportConfig,
};
use tokio::io::{AsyncBufReadExt, AsyncWrite, BufReader};
use tracing::{debug, info, warn};

use crate::ui::{parse_input, render, UserCommand};

/// 连接服务器并运行，直到用户退出或服务器断开
pub async fn run(addr: &str, nickname: &str) -> anyhow::Result<()> {
    let transport = TcpTransport::connect(addr, &TransportConfig::default()).await?;
    info!("Connected to {}", addr);

    let mut conn = Connection::new(transport);
    conn.send(&Message::login(nickname, Terminal::Console, now_millis()))
        .await?;
    let (mut reader, mut writer) = conn.split();

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            // 接收服务器推送
            result = reader.read_inbound() => {
                match result {
                    Ok(Inbound::Message(msg)) => println!("{}", render(&msg)),
                    Ok(Inbound::Text(line)) => match TextCodec::decode(&line) {
                        Some(msg) => println!("{}", render(&msg)),
                        None => debug!("Ignoring non-protocol line: {}", line),
                    },
                    Err(ProtocolError::ConnectionClosed) => {
                        info!("Server closed connection");
                        break;
                    }
                    Err(e) => {
                        warn!("Receive error: {}", e);
                        break;
                    }
                }
            }

            // 处理用户输入
            line = stdin.next_line() => {
                let Some(line) = line? else {
                    // 标准输入结束，视同退出
                    logout(&mut writer, nickname).await?;
                    break;
                };
                match parse_input(&line) {
                    Some(UserCommand::Chat(content)) => {
                        writer
                            .write_message(&Message::chat(nickname, content, now_millis()))
                            .await?;
                    }
                    Some(UserCommand::Flower) => {
                        writer
                            .write_message(&Message::flower(nickname, Terminal::Console, now_millis()))
                            .await?;
                    }
                    Some(UserCommand::Quit) => {
                        logout(&mut writer, nickname).await?;
                        break;
                    }
                    None => {}
                }
            }
        }
    }

    Ok(())
}

async fn logout<W: AsyncWrite + Unpin>(
    writer: &mut StreamWriter<W>,
    nickname: &str,
) -> anyhow::Result<()> {
    writer
        .write_message(&Message::logout(nickname, now_millis()))
        .await?;
    writer.shutdown().await?;
    Ok(())
}
