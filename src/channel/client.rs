//! Websocket client for the automation server.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::protocol::{ClientMessage, ServerEvent};
use crate::config::ServerConfig;
use crate::errors::{ShellError, ShellResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelStatus {
    Connected,
    Disconnected,
}

/// Everything the channel reports to its owner.
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelUpdate {
    Status(ChannelStatus),
    Event(ServerEvent),
}

pub struct ServerChannel {
    outgoing: mpsc::UnboundedSender<ClientMessage>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ServerChannel {
    /// Connects, sends `init` and starts the read/write loop.
    pub async fn connect(
        cfg: &ServerConfig,
    ) -> ShellResult<(Self, mpsc::UnboundedReceiver<ChannelUpdate>)> {
        let mut stream = connect_with_retry(cfg).await?;
        let init = ClientMessage::init(cfg.viewport_width, cfg.viewport_height);
        stream
            .send(WsMessage::Text(encode(&init)?))
            .await
            .map_err(|err| ShellError::WebSocket(err.to_string()))?;

        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();
        let _ = updates_tx.send(ChannelUpdate::Status(ChannelStatus::Connected));

        let task = tokio::spawn(run(
            stream,
            outgoing_rx,
            updates_tx,
            Arc::clone(&connected),
            cancel.clone(),
        ));
        info!(target: "server-channel", url = %cfg.url, "connected to automation server");
        Ok((
            Self {
                outgoing,
                connected,
                cancel,
                task,
            },
            updates_rx,
        ))
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn send(&self, message: ClientMessage) -> ShellResult<()> {
        if !self.is_connected() {
            return Err(ShellError::ChannelClosed);
        }
        debug!(target: "server-channel", kind = message.kind(), "queueing message");
        self.outgoing
            .send(message)
            .map_err(|_| ShellError::ChannelClosed)
    }

    pub async fn close(self) {
        self.cancel.cancel();
        if let Err(err) = self.task.await {
            warn!(target: "server-channel", ?err, "channel task ended abnormally");
        }
    }
}

async fn connect_with_retry(cfg: &ServerConfig) -> ShellResult<WsStream> {
    let attempts = cfg.connect_retries.max(1);
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        match connect_async(cfg.url.as_str()).await {
            Ok((stream, _)) => return Ok(stream),
            Err(err) => {
                last_error = err.to_string();
                warn!(
                    target: "server-channel",
                    url = %cfg.url,
                    attempt,
                    attempts,
                    error = %err,
                    "automation server connection failed"
                );
                if attempt < attempts {
                    let backoff = cfg.retry_backoff_ms.saturating_mul(u64::from(attempt));
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
            }
        }
    }
    Err(ShellError::WebSocket(last_error))
}

fn encode(message: &ClientMessage) -> ShellResult<String> {
    serde_json::to_string(message).map_err(|err| ShellError::Protocol(err.to_string()))
}

async fn run(
    stream: WsStream,
    mut outgoing: mpsc::UnboundedReceiver<ClientMessage>,
    updates: mpsc::UnboundedSender<ChannelUpdate>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = write.close().await;
                break;
            }
            next = outgoing.recv() => {
                let Some(message) = next else { break };
                let text = match encode(&message) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(target: "server-channel", error = %err, "dropping unencodable message");
                        continue;
                    }
                };
                if let Err(err) = write.send(WsMessage::Text(text)).await {
                    warn!(target: "server-channel", error = %err, "send failed");
                    break;
                }
            }
            frame = read.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(ServerEvent::Unknown) => {
                        debug!(target: "server-channel", "ignoring unknown server event");
                    }
                    Ok(event) => {
                        let _ = updates.send(ChannelUpdate::Event(event));
                    }
                    Err(err) => {
                        warn!(target: "server-channel", error = %err, "malformed server event");
                    }
                },
                Some(Ok(WsMessage::Ping(data))) => {
                    if let Err(err) = write.send(WsMessage::Pong(data)).await {
                        warn!(target: "server-channel", error = %err, "pong failed");
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!(target: "server-channel", "automation server closed the connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(target: "server-channel", error = %err, "websocket error");
                    break;
                }
            },
        }
    }
    connected.store(false, Ordering::SeqCst);
    let _ = updates.send(ChannelUpdate::Status(ChannelStatus::Disconnected));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> serde_json::Value {
        loop {
            match ws.next().await {
                Some(Ok(WsMessage::Text(text))) => return serde_json::from_str(&text).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("unexpected frame {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn exchanges_messages_and_reports_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let init = next_text(&mut ws).await;
            assert_eq!(init["type"], "init");
            assert_eq!(init["config"]["viewport"]["width"], 1024);

            ws.send(WsMessage::Text(
                r#"{"type":"agent_thinking","message":"..."}"#.into(),
            ))
            .await
            .unwrap();
            ws.send(WsMessage::Text(
                r#"{"type":"recording_started","message":"Recording started"}"#.into(),
            ))
            .await
            .unwrap();

            let pause = next_text(&mut ws).await;
            assert_eq!(pause["type"], "pause_agent");
            ws.close(None).await.unwrap();
        });

        let cfg = ServerConfig {
            url: format!("ws://{addr}"),
            connect_retries: 1,
            ..ServerConfig::default()
        };
        let (channel, mut updates) = ServerChannel::connect(&cfg).await.unwrap();
        assert_eq!(
            updates.recv().await,
            Some(ChannelUpdate::Status(ChannelStatus::Connected))
        );
        assert_eq!(
            updates.recv().await,
            Some(ChannelUpdate::Event(ServerEvent::RecordingStarted {
                message: "Recording started".into()
            }))
        );

        channel.send(ClientMessage::PauseAgent).unwrap();
        assert_eq!(
            updates.recv().await,
            Some(ChannelUpdate::Status(ChannelStatus::Disconnected))
        );
        assert!(matches!(
            channel.send(ClientMessage::Reset),
            Err(ShellError::ChannelClosed)
        ));
        server.await.unwrap();
        channel.close().await;
    }

    #[tokio::test]
    async fn gives_up_after_configured_retries() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let cfg = ServerConfig {
            url: format!("ws://{addr}"),
            connect_retries: 2,
            retry_backoff_ms: 1,
            ..ServerConfig::default()
        };
        assert!(matches!(
            ServerChannel::connect(&cfg).await,
            Err(ShellError::WebSocket(_))
        ));
    }
}
