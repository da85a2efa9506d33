use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use super::message::{ClientMessage, ServerMessage};
use crate::anchor::{Anchor, AnchorClaim};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client speaking the anchor sync protocol.
pub struct AnchorClient {
    tx: SplitSink<Socket, Message>,
    rx: SplitStream<Socket>,
}

impl AnchorClient {
    pub async fn connect(url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| anyhow!("invalid ws url: {e}"))?;
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .with_context(|| format!("failed to connect to {url}"))?;
        let (tx, rx) = stream.split();
        Ok(Self { tx, rx })
    }

    pub async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        let text = message.encode()?;
        self.send_text(text).await
    }

    /// Send an arbitrary text frame, valid or not.
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<()> {
        let text: String = text.into();
        self.tx
            .send(Message::Text(text.into()))
            .await
            .context("failed to send frame")
    }

    pub async fn fetch_updates(&mut self, held: &[Anchor]) -> Result<()> {
        let anchor_data = held.iter().map(AnchorClaim::from).collect();
        self.send(&ClientMessage::FetchUpdates { anchor_data }).await
    }

    pub async fn fetch_first_update(&mut self, held: Vec<Anchor>) -> Result<()> {
        self.send(&ClientMessage::FetchFirstUpdate { anchor_data: held })
            .await
    }

    pub async fn update_anchors(&mut self, anchors: Vec<Anchor>) -> Result<()> {
        self.send(&ClientMessage::UpdateAnchor {
            anchor_data: anchors,
        })
        .await
    }

    /// Next protocol message, or `None` once the server closes the socket.
    /// Control frames and undecodable text are skipped.
    pub async fn recv(&mut self) -> Result<Option<ServerMessage>> {
        while let Some(msg) = self.rx.next().await {
            match msg.context("websocket read failed")? {
                Message::Text(text) => {
                    if let Ok(message) = serde_json::from_str::<ServerMessage>(text.as_str()) {
                        return Ok(Some(message));
                    }
                }
                Message::Binary(bin) => {
                    if let Ok(message) = serde_json::from_slice::<ServerMessage>(&bin) {
                        return Ok(Some(message));
                    }
                }
                Message::Close(_) => return Ok(None),
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        Ok(None)
    }

    /// Like [`recv`](Self::recv) but gives up after `wait`.
    pub async fn recv_timeout(&mut self, wait: Duration) -> Result<Option<ServerMessage>> {
        match tokio::time::timeout(wait, self.recv()).await {
            Ok(result) => result,
            Err(_) => Ok(None),
        }
    }

    /// Read until a message matches `pred`, discarding the rest.
    pub async fn recv_until<F>(&mut self, wait: Duration, mut pred: F) -> Result<ServerMessage>
    where
        F: FnMut(&ServerMessage) -> bool,
    {
        tokio::time::timeout(wait, async {
            loop {
                match self.recv().await {
                    Ok(Some(message)) if pred(&message) => return Ok(message),
                    Ok(Some(_)) => continue,
                    Ok(None) => return Err(anyhow!("connection closed")),
                    Err(err) => return Err(err),
                }
            }
        })
        .await
        .map_err(|_| anyhow!("timed out after {wait:?}"))?
    }

    pub async fn close(mut self) -> Result<()> {
        self.tx
            .send(Message::Close(None))
            .await
            .context("failed to send close frame")?;
        Ok(())
    }
}
